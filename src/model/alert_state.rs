// =============================================================================
// AlertState — persisted per-(source, target) memory of what was last notified
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::DecisionStatus;

/// One per (source, target) pair once that pair has been evaluated at
/// least once. Upserted by the Alert Pipeline, read back by the Ledger on
/// every reconcile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertState {
    pub source_name: String,
    pub target_name: String,
    pub last_notified_status: DecisionStatus,
    pub reason_hash: String,
    pub last_change_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
}

impl AlertState {
    /// The state for a (source, target) pair that has never been
    /// notified — used as the implicit prior when the Ledger has no row.
    pub fn unset(source_name: impl Into<String>, target_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            last_notified_status: DecisionStatus::Unknown,
            reason_hash: String::new(),
            last_change_at: now,
            last_sent_at: now,
            cooldown_until: now,
        }
    }
}
