// =============================================================================
// BaselineSummary — rolling statistical summary of recent successful snapshots
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived, never stored; recomputed on every check by the Baseline
/// Calculator. Every statistic is `None` when there is not enough history
/// to compute it meaningfully (see `baseline_calculator::compute`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSummary {
    pub snapshot_count: usize,
    pub row_count_median: Option<f64>,
    pub row_count_min: Option<f64>,
    pub row_count_max: Option<f64>,
    pub row_count_stddev: Option<f64>,
    pub expected_interval_seconds: Option<f64>,
    pub oldest_snapshot_at: Option<DateTime<Utc>>,
    pub newest_snapshot_at: Option<DateTime<Utc>>,
}

impl BaselineSummary {
    /// The summary for a source with no eligible history.
    pub fn empty() -> Self {
        Self {
            snapshot_count: 0,
            row_count_median: None,
            row_count_min: None,
            row_count_max: None,
            row_count_stddev: None,
            expected_interval_seconds: None,
            oldest_snapshot_at: None,
            newest_snapshot_at: None,
        }
    }
}

impl Default for BaselineSummary {
    fn default() -> Self {
        Self::empty()
    }
}
