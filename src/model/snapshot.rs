// =============================================================================
// Snapshot — one probe result for one source at one instant
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single collection attempt against a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectStatus {
    Success,
    CollectFailed,
}

impl std::fmt::Display for CollectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::CollectFailed => write!(f, "COLLECT_FAILED"),
        }
    }
}

/// One probe result for one source, as produced by the Collector.
///
/// Invariant: `collect_status == CollectFailed` implies `row_count` and
/// `latest_timestamp` are both `None`. Callers constructing a `Snapshot`
/// directly (rather than through `Snapshot::failed`/`Snapshot::success`)
/// are responsible for upholding this; the Decision Engine does not
/// re-validate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub source_name: String,
    pub collected_at: DateTime<Utc>,
    pub collect_status: CollectStatus,
    pub row_count: Option<i64>,
    pub latest_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Snapshot {
    /// Build a successful snapshot.
    pub fn success(
        source_name: impl Into<String>,
        collected_at: DateTime<Utc>,
        row_count: i64,
        latest_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            collected_at,
            collect_status: CollectStatus::Success,
            row_count: Some(row_count),
            latest_timestamp,
            metrics: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Build a failed snapshot. `row_count` and `latest_timestamp` are
    /// forced to `None` regardless of what the caller passes, so the
    /// invariant always holds at construction time.
    pub fn failed(
        source_name: impl Into<String>,
        collected_at: DateTime<Utc>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error_code".to_string(), error_code.into());
        metadata.insert("error_message".to_string(), error_message.into());

        Self {
            source_name: source_name.into(),
            collected_at,
            collect_status: CollectStatus::CollectFailed,
            row_count: None,
            latest_timestamp: None,
            metrics: HashMap::new(),
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.collect_status, CollectStatus::Success)
    }
}
