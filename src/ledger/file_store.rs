// =============================================================================
// FileStore — single-writer, JSON/JSONL-on-disk reference StateLedger
// =============================================================================
//
// Layout under `base_dir`:
//   schema_meta.json     {"version": "1"} row, written once on first open and
//                         checked (not rewritten) on every subsequent one
//   snapshots.jsonl      one Snapshot per line, append-only
//   alert_states.json    full map keyed by "source_name/target_name", atomic
//                         tmp-write-then-rename on every upsert (same pattern
//                         as `runtime_config.rs`'s `RuntimeConfig::save`)
//   delivery_log.jsonl   one DeliveryRecord per line, append-only
//
// An in-process cache (`Mutex`-guarded, loaded once at construction) backs
// reads so `list_snapshots`/`get_alert_state` don't re-parse the file on
// every call; every mutation updates the cache and the file together under
// the same lock, so the two never drift within one process. The ledger
// makes no cross-process locking guarantee beyond that — the
// single-writer-per-source contract is the caller's responsibility.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{AlertState, DeliveryRecord, Snapshot};

use super::{LedgerError, LedgerStats, ListSnapshotsFilter, StateLedger};

/// Schema version of the on-disk layout. Bump and add a migration in
/// `FileStore::open` whenever `snapshots.jsonl`/`alert_states.json`/
/// `delivery_log.jsonl`'s shape changes.
const CURRENT_SCHEMA_VERSION: &str = "1";

/// The `schema_meta` versioning row, written once at first `open` and
/// checked on every subsequent one.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaMeta {
    version: String,
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serde(e.to_string())
    }
}

fn alert_key(source: &str, target: &str) -> String {
    format!("{source}/{target}")
}

struct Cache {
    snapshots: Vec<Snapshot>,
    alert_states: HashMap<String, AlertState>,
    delivery_log: Vec<DeliveryRecord>,
}

pub struct FileStore {
    base_dir: PathBuf,
    cache: Mutex<Cache>,
}

impl FileStore {
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;

        let schema_meta_path = base_dir.join("schema_meta.json");
        match read_schema_meta(&schema_meta_path)? {
            Some(meta) if meta.version != CURRENT_SCHEMA_VERSION => {
                return Err(LedgerError::SchemaMismatch(format!(
                    "on-disk schema version {} does not match supported version {CURRENT_SCHEMA_VERSION}",
                    meta.version
                )));
            }
            Some(_) => {}
            None => write_json_atomic(
                &schema_meta_path,
                &SchemaMeta {
                    version: CURRENT_SCHEMA_VERSION.to_string(),
                },
            )?,
        }

        let snapshots = read_jsonl(&base_dir.join("snapshots.jsonl"))?;
        let delivery_log = read_jsonl(&base_dir.join("delivery_log.jsonl"))?;
        let alert_states = read_alert_states(&base_dir.join("alert_states.json"))?;

        tracing::info!(
            path = %base_dir.display(),
            snapshot_count = snapshots.len(),
            delivery_count = delivery_log.len(),
            "file store opened"
        );

        Ok(Self {
            base_dir,
            cache: Mutex::new(Cache {
                snapshots,
                alert_states,
                delivery_log,
            }),
        })
    }

    fn snapshots_path(&self) -> PathBuf {
        self.base_dir.join("snapshots.jsonl")
    }

    fn delivery_log_path(&self) -> PathBuf {
        self.base_dir.join("delivery_log.jsonl")
    }

    fn alert_states_path(&self) -> PathBuf {
        self.base_dir.join("alert_states.json")
    }
}

fn read_schema_meta(path: &Path) -> Result<Option<SchemaMeta>, LedgerError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Atomic tmp-write-then-rename, same pattern as `runtime_config.rs`'s
/// `RuntimeConfig::save`; generic over any small full-rewrite JSON value
/// (`schema_meta.json`, `alert_states.json`).
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), LedgerError> {
    let tmp_path = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(LedgerError::from))
        .collect()
}

fn append_jsonl<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), LedgerError> {
    let line = serde_json::to_string(value)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn rewrite_jsonl<T: serde::Serialize>(path: &Path, values: &[T]) -> Result<(), LedgerError> {
    let tmp_path = path.with_extension("jsonl.tmp");
    let mut buf = String::new();
    for value in values {
        buf.push_str(&serde_json::to_string(value)?);
        buf.push('\n');
    }
    std::fs::write(&tmp_path, buf)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_alert_states(path: &Path) -> Result<HashMap<String, AlertState>, LedgerError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn save_alert_states(path: &Path, states: &HashMap<String, AlertState>) -> Result<(), LedgerError> {
    write_json_atomic(path, states)
}

impl StateLedger for FileStore {
    fn append_snapshot(&self, snapshot: &Snapshot) -> Result<u64, LedgerError> {
        let mut cache = self.cache.lock();
        append_jsonl(&self.snapshots_path(), snapshot)?;
        cache.snapshots.push(snapshot.clone());
        Ok(cache.snapshots.len() as u64)
    }

    fn get_last_snapshot(&self, source: &str) -> Result<Option<Snapshot>, LedgerError> {
        let cache = self.cache.lock();
        Ok(cache
            .snapshots
            .iter()
            .filter(|s| s.source_name == source)
            .max_by_key(|s| s.collected_at)
            .cloned())
    }

    fn list_snapshots(&self, source: &str, filter: ListSnapshotsFilter) -> Result<Vec<Snapshot>, LedgerError> {
        let cache = self.cache.lock();
        let now = chrono::Utc::now();
        let mut matched: Vec<Snapshot> = cache
            .snapshots
            .iter()
            .filter(|s| s.source_name == source)
            .filter(|s| !filter.success_only || s.is_success())
            .filter(|s| match filter.max_age_days {
                Some(days) => s.collected_at >= now - chrono::Duration::days(days),
                None => true,
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn get_alert_state(&self, source: &str, target: &str) -> Result<Option<AlertState>, LedgerError> {
        let cache = self.cache.lock();
        Ok(cache.alert_states.get(&alert_key(source, target)).cloned())
    }

    fn set_alert_state(&self, state: &AlertState) -> Result<(), LedgerError> {
        let mut cache = self.cache.lock();
        cache
            .alert_states
            .insert(alert_key(&state.source_name, &state.target_name), state.clone());
        save_alert_states(&self.alert_states_path(), &cache.alert_states)
    }

    fn log_delivery(&self, record: &DeliveryRecord) -> Result<(), LedgerError> {
        let mut cache = self.cache.lock();
        append_jsonl(&self.delivery_log_path(), record)?;
        cache.delivery_log.push(record.clone());
        Ok(())
    }

    fn purge_old_snapshots(&self, max_age_days: i64, min_per_source: usize) -> Result<usize, LedgerError> {
        let mut cache = self.cache.lock();
        let cutoff = chrono::Utc::now() - chrono::Duration::days(max_age_days);

        let mut by_source: HashMap<String, Vec<Snapshot>> = HashMap::new();
        for snap in cache.snapshots.drain(..) {
            by_source.entry(snap.source_name.clone()).or_default().push(snap);
        }

        let mut kept = Vec::new();
        let mut deleted = 0usize;
        for (_source, mut snaps) in by_source {
            snaps.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
            let mut retained_successful = 0usize;
            for snap in snaps {
                let must_retain = snap.is_success() && retained_successful < min_per_source;
                if must_retain {
                    retained_successful += 1;
                    kept.push(snap);
                } else if snap.collected_at >= cutoff {
                    kept.push(snap);
                } else {
                    deleted += 1;
                }
            }
        }

        rewrite_jsonl(&self.snapshots_path(), &kept)?;
        cache.snapshots = kept;
        Ok(deleted)
    }

    fn stats(&self, source: &str) -> Result<LedgerStats, LedgerError> {
        let cache = self.cache.lock();
        let source_snaps: Vec<&Snapshot> = cache.snapshots.iter().filter(|s| s.source_name == source).collect();
        let oldest = source_snaps.iter().map(|s| s.collected_at).min();
        let newest = source_snaps.iter().map(|s| s.collected_at).max();

        let deliveries: Vec<&DeliveryRecord> = cache.delivery_log.iter().filter(|d| d.source_name == source).collect();
        let delivery_success_count = deliveries.iter().filter(|d| d.success).count();
        let delivery_failure_count = deliveries.iter().filter(|d| !d.success).count();

        Ok(LedgerStats {
            snapshot_count: source_snaps.len(),
            oldest_snapshot_at: oldest,
            newest_snapshot_at: newest,
            delivery_success_count,
            delivery_failure_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(h)
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sentinel-ledger-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn append_persists_across_reopen() {
        let dir = temp_dir("append-reopen");
        {
            let store = FileStore::open(&dir).unwrap();
            store.append_snapshot(&Snapshot::success("orders", t(0), 10, None)).unwrap();
        }
        let reopened = FileStore::open(&dir).unwrap();
        let last = reopened.get_last_snapshot("orders").unwrap().unwrap();
        assert_eq!(last.row_count, Some(10));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn alert_state_persists_across_reopen() {
        let dir = temp_dir("alert-state-reopen");
        {
            let store = FileStore::open(&dir).unwrap();
            store.set_alert_state(&AlertState::unset("orders", "slack", t(0))).unwrap();
        }
        let reopened = FileStore::open(&dir).unwrap();
        assert!(reopened.get_alert_state("orders", "slack").unwrap().is_some());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn open_writes_schema_meta_row_on_first_open() {
        let dir = temp_dir("schema-meta-write");
        FileStore::open(&dir).unwrap();
        let content = std::fs::read_to_string(dir.join("schema_meta.json")).unwrap();
        let meta: SchemaMeta = serde_json::from_str(&content).unwrap();
        assert_eq!(meta.version, CURRENT_SCHEMA_VERSION);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn open_rejects_unsupported_schema_version() {
        let dir = temp_dir("schema-meta-mismatch");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("schema_meta.json"), r#"{"version":"99"}"#).unwrap();

        let err = FileStore::open(&dir).unwrap_err();
        assert!(matches!(err, LedgerError::SchemaMismatch(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reopen_does_not_rewrite_existing_schema_meta() {
        let dir = temp_dir("schema-meta-reopen");
        FileStore::open(&dir).unwrap();
        FileStore::open(&dir).unwrap();
        let content = std::fs::read_to_string(dir.join("schema_meta.json")).unwrap();
        let meta: SchemaMeta = serde_json::from_str(&content).unwrap();
        assert_eq!(meta.version, CURRENT_SCHEMA_VERSION);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn purge_rewrites_snapshots_file() {
        let dir = temp_dir("purge-rewrite");
        let store = FileStore::open(&dir).unwrap();
        for i in 0..3 {
            store
                .append_snapshot(&Snapshot::success("orders", t(-1000 - i), 100, None))
                .unwrap();
        }
        let deleted = store.purge_old_snapshots(1, 1).unwrap();
        assert_eq!(deleted, 2);

        let reopened = FileStore::open(&dir).unwrap();
        let remaining = reopened
            .list_snapshots(
                "orders",
                ListSnapshotsFilter {
                    limit: None,
                    max_age_days: None,
                    success_only: false,
                },
            )
            .unwrap();
        assert_eq!(remaining.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
