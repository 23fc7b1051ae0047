// =============================================================================
// Decision Engine — rules R1-R6 applied to one snapshot against its baseline
// =============================================================================
//
// Rule evaluation order , each a small pure gate returning
// `Option<Reason>`:
//   R1  Collection failure        -> COLLECT_FAILED, critical, stops further
//                                     rules (the only short-circuit).
//   R2  Zero rows                 -> VOLUME_ZERO, critical
//   R3  Minimum volume            -> VOLUME_BELOW_MINIMUM, critical
//   R4  Hard freshness            -> DATA_STALE, critical
//   R5  Volume deviation          -> VOLUME_DEVIATION, warning
//   R6  Interval freshness        -> DATA_STALE, warning (skipped if R4
//                                     already fired — one DATA_STALE per
//                                     decision, critical wins)
//
// Status = most severe reason's severity; OK with an empty reason list if
// no rule fires. Confidence is a step function over baseline.snapshot_count
// and never gates rule firing (documented, not a bug — see DESIGN.md).
//
// All comparisons are strict (`>`, never `>=`); no epsilon. The engine
// never panics: malformed/missing policy fields simply disable the rule
// they configure.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{BaselineSummary, Decision, DecisionStatus, Reason, ReasonCode, Severity, Snapshot};

/// Per-source tunables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourcePolicy {
    pub max_age_hours: Option<f64>,
    #[serde(default = "default_freshness_factor")]
    pub freshness_factor: f64,
    pub min_row_count: Option<i64>,
    #[serde(default = "default_deviation_factor")]
    pub deviation_factor: f64,
}

fn default_freshness_factor() -> f64 {
    2.0
}

fn default_deviation_factor() -> f64 {
    3.0
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            max_age_hours: None,
            freshness_factor: default_freshness_factor(),
            min_row_count: None,
            deviation_factor: default_deviation_factor(),
        }
    }
}

/// Evaluate all rules for one snapshot and produce a `Decision`. Pure and
/// deterministic: identical inputs always produce a bit-identical output.
pub fn decide(snapshot: &Snapshot, baseline: &BaselineSummary, policy: &SourcePolicy, now: DateTime<Utc>) -> Decision {
    let mut reasons = Vec::new();

    // R1 — collection failure short-circuits every other rule.
    if let Some(r1) = rule_collect_failed(snapshot) {
        reasons.push(r1);
        let confidence = confidence_for(baseline.snapshot_count);
        return Decision {
            status: DecisionStatus::Anomaly,
            reasons,
            metrics: echoed_metrics(snapshot),
            baseline: Some(baseline.clone()),
            confidence,
        };
    }

    if let Some(r) = rule_zero_volume(snapshot) {
        reasons.push(r);
    }
    if let Some(r) = rule_minimum_volume(snapshot, policy) {
        reasons.push(r);
    }

    let hard_freshness_fired = if let Some(r) = rule_hard_freshness(snapshot, policy, now) {
        reasons.push(r);
        true
    } else {
        false
    };

    if let Some(r) = rule_volume_deviation(snapshot, baseline, policy) {
        reasons.push(r);
    }

    if !hard_freshness_fired {
        if let Some(r) = rule_interval_freshness(snapshot, baseline, policy, now) {
            reasons.push(r);
        }
    }

    let status = Decision::status_for_reasons(&reasons);
    let confidence = confidence_for(baseline.snapshot_count);

    Decision {
        status,
        reasons,
        metrics: echoed_metrics(snapshot),
        baseline: Some(baseline.clone()),
        confidence,
    }
}

/// Metrics map echoed onto the wire payload: always carries `row_count`
/// and `latest_timestamp` (null when absent), plus whatever free-form
/// metrics the Collector attached to the snapshot.
fn echoed_metrics(snapshot: &Snapshot) -> HashMap<String, serde_json::Value> {
    let mut metrics = HashMap::new();
    metrics.insert(
        "row_count".to_string(),
        snapshot.row_count.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
    );
    metrics.insert(
        "latest_timestamp".to_string(),
        snapshot
            .latest_timestamp
            .map(|t| serde_json::Value::String(t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)))
            .unwrap_or(serde_json::Value::Null),
    );
    for (k, v) in &snapshot.metrics {
        metrics.insert(k.clone(), serde_json::Value::from(*v));
    }
    metrics
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn rule_collect_failed(snapshot: &Snapshot) -> Option<Reason> {
    if snapshot.is_success() {
        return None;
    }
    let mut details = HashMap::new();
    if let Some(code) = snapshot.metadata.get("error_code") {
        details.insert("error_code".to_string(), serde_json::Value::String(code.clone()));
    }
    Some(
        Reason::new(
            ReasonCode::CollectFailed,
            Severity::Critical,
            format!(
                "collection failed: {}",
                snapshot.metadata.get("error_message").cloned().unwrap_or_default()
            ),
        )
        .with_detail(
            "error_code",
            serde_json::Value::String(snapshot.metadata.get("error_code").cloned().unwrap_or_default()),
        ),
    )
}

fn rule_zero_volume(snapshot: &Snapshot) -> Option<Reason> {
    if snapshot.row_count == Some(0) {
        Some(Reason::new(ReasonCode::VolumeZero, Severity::Critical, "row count is zero"))
    } else {
        None
    }
}

fn rule_minimum_volume(snapshot: &Snapshot, policy: &SourcePolicy) -> Option<Reason> {
    let min = policy.min_row_count?;
    let count = snapshot.row_count?;
    if count < min {
        Some(
            Reason::new(
                ReasonCode::VolumeBelowMinimum,
                Severity::Critical,
                format!("row count {count} is below minimum {min}"),
            )
            .with_detail("row_count", count)
            .with_detail("min_row_count", min),
        )
    } else {
        None
    }
}

fn rule_hard_freshness(snapshot: &Snapshot, policy: &SourcePolicy, now: DateTime<Utc>) -> Option<Reason> {
    let max_age_hours = policy.max_age_hours?;
    let latest = snapshot.latest_timestamp?;
    let age_hours = (now - latest).num_seconds() as f64 / 3600.0;
    if age_hours > max_age_hours {
        Some(
            Reason::new(
                ReasonCode::DataStale,
                Severity::Critical,
                format!("latest data is {age_hours:.1}h old, exceeds max_age_hours {max_age_hours}"),
            )
            .with_detail("age_hours", age_hours)
            .with_detail("max_age_hours", max_age_hours),
        )
    } else {
        None
    }
}

fn rule_volume_deviation(snapshot: &Snapshot, baseline: &BaselineSummary, policy: &SourcePolicy) -> Option<Reason> {
    let median = baseline.row_count_median?;
    let stddev = baseline.row_count_stddev?;
    if stddev <= 0.0 {
        return None;
    }
    let count = snapshot.row_count? as f64;
    let deviation = (count - median).abs();
    let threshold = policy.deviation_factor * stddev;
    if deviation > threshold {
        Some(
            Reason::new(
                ReasonCode::VolumeDeviation,
                Severity::Warning,
                format!("row count {count} deviates from median {median} by {deviation:.1} (threshold {threshold:.1})"),
            )
            .with_detail("row_count", count)
            .with_detail("median", median)
            .with_detail("stddev", stddev),
        )
    } else {
        None
    }
}

fn rule_interval_freshness(
    snapshot: &Snapshot,
    baseline: &BaselineSummary,
    policy: &SourcePolicy,
    now: DateTime<Utc>,
) -> Option<Reason> {
    let expected_interval = baseline.expected_interval_seconds?;
    let latest = snapshot.latest_timestamp?;
    let age_seconds = (now - latest).num_seconds() as f64;
    let threshold = policy.freshness_factor * expected_interval;
    if age_seconds > threshold {
        Some(
            Reason::new(
                ReasonCode::DataStale,
                Severity::Warning,
                format!(
                    "latest data is {age_seconds:.0}s old, exceeds {}x expected interval {expected_interval:.0}s",
                    policy.freshness_factor
                ),
            )
            .with_detail("age_seconds", age_seconds)
            .with_detail("expected_interval_seconds", expected_interval),
        )
    } else {
        None
    }
}

/// Step function over `baseline.snapshot_count` . Informational
/// only — never used to suppress a rule.
fn confidence_for(snapshot_count: usize) -> f64 {
    if snapshot_count >= 10 {
        1.0
    } else if snapshot_count >= 5 {
        0.8
    } else if snapshot_count >= 3 {
        0.5
    } else {
        0.3
    }
}
