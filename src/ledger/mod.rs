// =============================================================================
// State Ledger — durable append-and-upsert store for snapshots, alert
// states, and delivery records
// =============================================================================
//
// A narrow capability trait, not a polymorphic store hierarchy:
// tagged-variant discrimination beats runtime subclass lookup — here
// there is exactly one interface and callers hold `&dyn StateLedger`,
// never downcast. Two implementations ship with this crate: `FileStore`
// (single-writer, JSON/JSONL on disk) for production, and
// `InMemoryLedger` for tests.
//
// All operations are synchronous: the reference file store performs
// blocking local file I/O, exposing plain synchronous methods from
// inside an async call graph rather than marking every accessor `async`.

pub mod file_store;
pub mod memory;

use thiserror::Error;

use crate::model::{AlertState, DeliveryRecord, Snapshot};

pub use file_store::FileStore;
pub use memory::InMemoryLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("schema version mismatch: {0}")]
    SchemaMismatch(String),
}

/// Filters applied by `StateLedger::list_snapshots` before `limit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListSnapshotsFilter {
    pub limit: Option<usize>,
    pub max_age_days: Option<i64>,
    pub success_only: bool,
}

/// Read-only aggregate stats over one source's stored snapshots and
/// deliveries. Additive — used only by the CLI's one-shot
/// summary output, never consulted by the core decision path.
#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub snapshot_count: usize,
    pub oldest_snapshot_at: Option<chrono::DateTime<chrono::Utc>>,
    pub newest_snapshot_at: Option<chrono::DateTime<chrono::Utc>>,
    pub delivery_success_count: usize,
    pub delivery_failure_count: usize,
}

/// Operations the core consumes from the durable store . The
/// ledger serializes writes per source; concurrent reads are permitted.
/// `set_alert_state` is atomic.
pub trait StateLedger: Send + Sync {
    /// Durable append; returns a monotonically assigned id.
    fn append_snapshot(&self, snapshot: &Snapshot) -> Result<u64, LedgerError>;

    /// Most recent snapshot for `source` by `collected_at`, or `None` if
    /// the source has never been collected.
    fn get_last_snapshot(&self, source: &str) -> Result<Option<Snapshot>, LedgerError>;

    /// Snapshots for `source`, newest-first, with `filter` applied before
    /// `filter.limit`.
    fn list_snapshots(&self, source: &str, filter: ListSnapshotsFilter) -> Result<Vec<Snapshot>, LedgerError>;

    /// `None` when this (source, target) pair has never been evaluated.
    fn get_alert_state(&self, source: &str, target: &str) -> Result<Option<AlertState>, LedgerError>;

    /// Upsert keyed by `(source_name, target_name)`.
    fn set_alert_state(&self, state: &AlertState) -> Result<(), LedgerError>;

    /// Append-only.
    fn log_delivery(&self, record: &DeliveryRecord) -> Result<(), LedgerError>;

    /// Delete snapshots older than `max_age_days` while retaining at
    /// least `min_per_source` most recent successful snapshots per
    /// source. Returns the number of snapshots deleted.
    fn purge_old_snapshots(&self, max_age_days: i64, min_per_source: usize) -> Result<usize, LedgerError>;

    /// Read-only aggregate stats for one source (additive).
    fn stats(&self, source: &str) -> Result<LedgerStats, LedgerError>;
}
