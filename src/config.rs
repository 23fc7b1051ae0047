// =============================================================================
// Sentinel Configuration — persisted agent settings with atomic save
// =============================================================================
//
// Every tunable lives here so the agent can be reconfigured by editing one
// JSON file. Persistence is atomic tmp-write-then-rename, with
// `#[serde(default = "...")]` on every field so older config files keep
// loading as fields are added.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::baseline_calculator::BaselinePolicy;
use crate::decision_engine::SourcePolicy;
use crate::delivery_client::WebhookTarget;

fn default_agent_id() -> String {
    "sentinel".to_string()
}

fn default_cron() -> String {
    "*/5 * * * *".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_max_age_days() -> i64 {
    90
}

fn default_min_per_source() -> usize {
    30
}

/// One monitored SQL data source.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub connection_uri: String,
    pub query: String,
    #[serde(default = "default_cron")]
    pub cron: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub baseline: BaselinePolicy,
    #[serde(default)]
    pub policy: SourcePolicy,
}

impl SourceConfig {
    #[cfg(test)]
    pub fn new_for_test(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: "postgres".to_string(),
            connection_uri: "postgres://test".to_string(),
            query: "select count(*) as row_count, max(created_at) as latest_timestamp from t".to_string(),
            cron: default_cron(),
            timeout_seconds: default_timeout_seconds(),
            baseline: BaselinePolicy::default(),
            policy: SourcePolicy::default(),
        }
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("name", &self.name)
            .field("source_type", &self.source_type)
            .field("connection_uri", &"<redacted>")
            .field("query", &self.query)
            .field("cron", &self.cron)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("baseline", &self.baseline)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Snapshot retention enforced by `StateLedger::purge_old_snapshots`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "default_min_per_source")]
    pub min_per_source: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            min_per_source: default_min_per_source(),
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub targets: Vec<WebhookTarget>,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            dry_run: false,
            sources: Vec::new(),
            targets: Vec::new(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl SentinelConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            source_count = config.sources.len(),
            target_count = config.targets.len(),
            "config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialize config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let config: SentinelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.agent_id, "sentinel");
        assert!(!config.dry_run);
        assert!(config.sources.is_empty());
        assert_eq!(config.retention.max_age_days, 90);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{"agent_id": "prod-sentinel", "sources": []}"#;
        let config: SentinelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.agent_id, "prod-sentinel");
        assert_eq!(config.retention.min_per_source, 30);
    }

    #[test]
    fn roundtrip_serialization() {
        let config = SentinelConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SentinelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent_id, config.agent_id);
    }

    #[test]
    fn save_then_load_roundtrips_through_disk() {
        let dir = std::env::temp_dir().join(format!("sentinel-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let mut config = SentinelConfig::default();
        config.agent_id = "disk-roundtrip".to_string();
        config.save(&path).unwrap();

        let loaded = SentinelConfig::load(&path).unwrap();
        assert_eq!(loaded.agent_id, "disk-roundtrip");

        std::fs::remove_dir_all(&dir).ok();
    }
}
