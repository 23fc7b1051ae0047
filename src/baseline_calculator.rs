// =============================================================================
// Baseline Calculator — pure statistical summary of recent successful
// snapshots for one source
// =============================================================================
//
// Algorithm:
//   1. Filter to SUCCESS status, non-null row count, collected within
//      `max_age_days` of `now`.
//   2. Sort by `collected_at` ascending; keep the most recent `window_size`
//      entries.
//   3. Empty selection => snapshot_count = 0, every statistic None.
//   4. row_count_median (linear-interpolation), min, max, population
//      stddev (None when fewer than 2 samples).
//   5. expected_interval_seconds = median of positive consecutive deltas
//      between collected_at values (None when fewer than 2 samples).
//   6. oldest_snapshot_at / newest_snapshot_at from the selection.
//
// Pure and deterministic: no I/O, no wall-clock reads (`now` is a
// parameter), no panics on malformed input.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{BaselineSummary, Snapshot};

/// Policy governing which snapshots contribute to a baseline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaselinePolicy {
    pub window_size: usize,
    pub max_age_days: i64,
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        Self {
            window_size: 30,
            max_age_days: 30,
        }
    }
}

/// Compute the `BaselineSummary` for one source from an unordered
/// collection of its historical snapshots.
pub fn compute(snapshots: &[Snapshot], policy: &BaselinePolicy, now: DateTime<Utc>) -> BaselineSummary {
    let cutoff = now - Duration::days(policy.max_age_days);

    let mut eligible: Vec<&Snapshot> = snapshots
        .iter()
        .filter(|s| s.is_success() && s.row_count.is_some() && s.collected_at >= cutoff)
        .collect();

    eligible.sort_by_key(|s| s.collected_at);

    let window_start = eligible.len().saturating_sub(policy.window_size);
    let selected = &eligible[window_start..];

    if selected.is_empty() {
        debug!(source_count = 0, "baseline computed from empty selection");
        return BaselineSummary::empty();
    }

    let counts: Vec<f64> = selected.iter().map(|s| s.row_count.unwrap() as f64).collect();

    let mut sorted_counts = counts.clone();
    sorted_counts.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let median = Some(median_of_sorted(&sorted_counts));
    let min = sorted_counts.first().copied();
    let max = sorted_counts.last().copied();
    let stddev = population_stddev(&counts);

    let expected_interval_seconds = expected_interval(selected);

    let oldest = selected.first().map(|s| s.collected_at);
    let newest = selected.last().map(|s| s.collected_at);

    debug!(
        source_count = selected.len(),
        median = median,
        stddev = stddev,
        "baseline computed"
    );

    BaselineSummary {
        snapshot_count: selected.len(),
        row_count_median: median,
        row_count_min: min,
        row_count_max: max,
        row_count_stddev: stddev,
        expected_interval_seconds,
        oldest_snapshot_at: oldest,
        newest_snapshot_at: newest,
    }
}

/// Linear-interpolation median of an already-sorted slice. Ties in an
/// even-length slice use the lower-midpoint average, matching the
/// edge-case note.
fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        let lo = sorted[n / 2 - 1];
        let hi = sorted[n / 2];
        (lo + hi) / 2.0
    }
}

/// Population standard deviation. `None` when fewer than 2 samples.
fn population_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Median of positive consecutive deltas between `collected_at` values.
/// `None` when fewer than 2 samples (matching the stddev threshold).
fn expected_interval(selected: &[&Snapshot]) -> Option<f64> {
    if selected.len() < 2 {
        return None;
    }

    let mut deltas: Vec<f64> = selected
        .windows(2)
        .filter_map(|w| {
            let delta = (w[1].collected_at - w[0].collected_at).num_seconds() as f64;
            if delta > 0.0 {
                Some(delta)
            } else {
                None
            }
        })
        .collect();

    if deltas.is_empty() {
        return None;
    }

    deltas.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(median_of_sorted(&deltas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snap_at(hour_offset: i64, row_count: i64) -> Snapshot {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour_offset);
        Snapshot::success("orders", t, row_count, None)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn zero_samples_yields_empty_summary() {
        let summary = compute(&[], &BaselinePolicy::default(), now());
        assert_eq!(summary.snapshot_count, 0);
        assert!(summary.row_count_median.is_none());
        assert!(summary.row_count_stddev.is_none());
        assert!(summary.expected_interval_seconds.is_none());
    }

    #[test]
    fn one_sample_has_stats_but_no_stddev_or_interval() {
        let snaps = vec![snap_at(0, 100)];
        let summary = compute(&snaps, &BaselinePolicy::default(), now());
        assert_eq!(summary.snapshot_count, 1);
        assert_eq!(summary.row_count_median, Some(100.0));
        assert_eq!(summary.row_count_min, Some(100.0));
        assert_eq!(summary.row_count_max, Some(100.0));
        assert!(summary.row_count_stddev.is_none());
        assert!(summary.expected_interval_seconds.is_none());
    }

    #[test]
    fn two_samples_produce_stddev_and_interval() {
        let snaps = vec![snap_at(0, 100), snap_at(6, 120)];
        let summary = compute(&snaps, &BaselinePolicy::default(), now());
        assert_eq!(summary.snapshot_count, 2);
        assert_eq!(summary.row_count_median, Some(110.0));
        assert!(summary.row_count_stddev.is_some());
        assert_eq!(summary.expected_interval_seconds, Some(6.0 * 3600.0));
    }

    #[test]
    fn non_monotonic_timestamps_are_sorted_before_windowing() {
        let snaps = vec![snap_at(12, 300), snap_at(0, 100), snap_at(6, 200)];
        let summary = compute(&snaps, &BaselinePolicy::default(), now());
        assert_eq!(summary.oldest_snapshot_at, Some(snap_at(0, 100).collected_at));
        assert_eq!(summary.newest_snapshot_at, Some(snap_at(12, 300).collected_at));
    }

    #[test]
    fn window_size_keeps_only_most_recent_entries() {
        let snaps: Vec<Snapshot> = (0..10).map(|i| snap_at(i * 6, 100 + i)).collect();
        let policy = BaselinePolicy {
            window_size: 3,
            max_age_days: 30,
        };
        let summary = compute(&snaps, &policy, now());
        assert_eq!(summary.snapshot_count, 3);
        // The three most recent: row counts 107, 108, 109.
        assert_eq!(summary.row_count_min, Some(107.0));
        assert_eq!(summary.row_count_max, Some(109.0));
    }

    #[test]
    fn max_age_days_excludes_stale_snapshots() {
        let snaps = vec![snap_at(-30 * 24, 999), snap_at(0, 100)];
        let policy = BaselinePolicy {
            window_size: 30,
            max_age_days: 5,
        };
        let summary = compute(&snaps, &policy, now());
        assert_eq!(summary.snapshot_count, 1);
        assert_eq!(summary.row_count_median, Some(100.0));
    }

    #[test]
    fn collect_failed_snapshots_are_excluded() {
        let mut failed = snap_at(0, 0);
        failed.collect_status = crate::model::CollectStatus::CollectFailed;
        failed.row_count = None;
        let snaps = vec![failed, snap_at(6, 100)];
        let summary = compute(&snaps, &BaselinePolicy::default(), now());
        assert_eq!(summary.snapshot_count, 1);
    }

    #[test]
    fn zero_valued_counts_are_legitimate_samples() {
        let snaps = vec![snap_at(0, 0), snap_at(6, 0)];
        let summary = compute(&snaps, &BaselinePolicy::default(), now());
        assert_eq!(summary.row_count_median, Some(0.0));
        assert_eq!(summary.row_count_stddev, Some(0.0));
    }

    #[test]
    fn median_even_count_uses_lower_midpoint_average() {
        let counts = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(median_of_sorted(&counts), 2.5);
    }

    #[test]
    fn median_odd_count_uses_middle_value() {
        let counts = [1.0, 2.0, 3.0];
        assert_eq!(median_of_sorted(&counts), 2.0);
    }
}
