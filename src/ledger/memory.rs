// =============================================================================
// InMemoryLedger — StateLedger backed by plain Vec/HashMap behind a Mutex
// =============================================================================
//
// The test double the Alert Pipeline's own test module (and any caller
// that wants a `StateLedger` without touching disk) uses: a durable
// production store and an in-memory testing store behind the same trait.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::model::{AlertState, DeliveryRecord, Snapshot};

use super::{LedgerError, LedgerStats, ListSnapshotsFilter, StateLedger};

struct Inner {
    snapshots: Vec<Snapshot>,
    next_id: u64,
    alert_states: HashMap<(String, String), AlertState>,
    delivery_log: Vec<DeliveryRecord>,
}

pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshots: Vec::new(),
                next_id: 1,
                alert_states: HashMap::new(),
                delivery_log: Vec::new(),
            }),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StateLedger for InMemoryLedger {
    fn append_snapshot(&self, snapshot: &Snapshot) -> Result<u64, LedgerError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.snapshots.push(snapshot.clone());
        Ok(id)
    }

    fn get_last_snapshot(&self, source: &str) -> Result<Option<Snapshot>, LedgerError> {
        let inner = self.inner.lock();
        Ok(inner
            .snapshots
            .iter()
            .filter(|s| s.source_name == source)
            .max_by_key(|s| s.collected_at)
            .cloned())
    }

    fn list_snapshots(&self, source: &str, filter: ListSnapshotsFilter) -> Result<Vec<Snapshot>, LedgerError> {
        let inner = self.inner.lock();
        let now = chrono::Utc::now();
        let mut matched: Vec<Snapshot> = inner
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
        let inner = self.inner.lock();
        Ok(inner.alert_states.get(&(source.to_string(), target.to_string())).cloned())
    }

    fn set_alert_state(&self, state: &AlertState) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock();
        inner
            .alert_states
            .insert((state.source_name.clone(), state.target_name.clone()), state.clone());
        Ok(())
    }

    fn log_delivery(&self, record: &DeliveryRecord) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock();
        inner.delivery_log.push(record.clone());
        Ok(())
    }

    fn purge_old_snapshots(&self, max_age_days: i64, min_per_source: usize) -> Result<usize, LedgerError> {
        let mut inner = self.inner.lock();
        let cutoff = chrono::Utc::now() - chrono::Duration::days(max_age_days);

        let mut by_source: HashMap<String, Vec<Snapshot>> = HashMap::new();
        for snap in inner.snapshots.drain(..) {
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

        inner.snapshots = kept;
        Ok(deleted)
    }

    fn stats(&self, source: &str) -> Result<LedgerStats, LedgerError> {
        let inner = self.inner.lock();
        let source_snaps: Vec<&Snapshot> = inner.snapshots.iter().filter(|s| s.source_name == source).collect();
        let oldest = source_snaps.iter().map(|s| s.collected_at).min();
        let newest = source_snaps.iter().map(|s| s.collected_at).max();

        let deliveries: Vec<&DeliveryRecord> = inner.delivery_log.iter().filter(|d| d.source_name == source).collect();
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
