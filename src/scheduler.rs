// =============================================================================
// Scheduler — thin interval-driven runner satisfying the "(source_config,
// now_instant) at times from a cron expression, at most one concurrent
// check per source" contract
// =============================================================================
//
// The embedded cron-style scheduler's internals (full cron-expression
// parsing, catch-up semantics, timezone handling) are out of scope — this
// is a `tokio::time::interval` runner per source, one `tokio::spawn` task
// each, following the same per-symbol loop pattern the rest of this crate
// uses in `main.rs`
// (`loop { interval.tick().await; ... }`). Because each source's checks run
// sequentially inside one task body, "at most one concurrent check per
// source" holds trivially: the next tick cannot begin a new check until the
// previous one has returned.
//
// `interval_from_cron` understands only the common `*/N * * * *` minutes-
// wildcard shorthand; anything else falls back to a 5 minute default. A
// production scheduler would parse full cron expressions via a dedicated
// crate — out of scope here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::alert_pipeline::AlertPipeline;
use crate::baseline_calculator;
use crate::collector::Collector;
use crate::config::{RetentionPolicy, SourceConfig};
use crate::decision_engine;
use crate::delivery_client::WebhookTarget;
use crate::ledger::{ListSnapshotsFilter, StateLedger};
use crate::model::DecisionStatus;

fn interval_from_cron(expr: &str) -> Duration {
    if let Some(rest) = expr.strip_prefix("*/") {
        if let Some(minutes_str) = rest.split_whitespace().next() {
            if let Ok(minutes) = minutes_str.parse::<u64>() {
                if minutes > 0 {
                    return Duration::from_secs(minutes * 60);
                }
            }
        }
    }
    Duration::from_secs(5 * 60)
}

/// Runs one check cycle for `source`: Collect -> Ledger.append -> Baseline
/// -> Decide -> Alert reconcile, matching data-flow exactly. Retention
/// purging is not part of this cycle — see `purge_all`. Returns the
/// resulting Decision's status so the caller (CLI or scheduler loop) can
/// derive an exit code.
pub async fn run_check<C: Collector + ?Sized>(
    collector: &C,
    ledger: &dyn StateLedger,
    pipeline: &AlertPipeline,
    source: &SourceConfig,
    targets: &[WebhookTarget],
) -> anyhow::Result<DecisionStatus> {
    let now = Utc::now();

    let snapshot = collector.collect(source).await;
    ledger.append_snapshot(&snapshot)?;

    let history = ledger.list_snapshots(
        &source.name,
        ListSnapshotsFilter {
            limit: Some(source.baseline.window_size.max(1) * 4),
            max_age_days: Some(source.baseline.max_age_days),
            success_only: false,
        },
    )?;

    let baseline = baseline_calculator::compute(&history, &source.baseline, now);
    let mut decision = decision_engine::decide(&snapshot, &baseline, &source.policy, now);
    decision.baseline = Some(baseline);

    info!(
        source = %source.name,
        status = %decision.status,
        reason_count = decision.reasons.len(),
        "check complete"
    );

    pipeline
        .reconcile(ledger, &source.name, &source.source_type, &decision, targets, now)
        .await?;

    Ok(decision.status)
}

/// Purge stale snapshots for every source. Run from the scheduler's own
/// periodic loop or at startup — never from inside `run_check` itself, so
/// a retention sweep can never delay or fail a check.
pub fn purge_all(ledger: &dyn StateLedger, sources: &[SourceConfig], retention: &RetentionPolicy) {
    for source in sources {
        match ledger.purge_old_snapshots(retention.max_age_days, retention.min_per_source) {
            Ok(deleted) if deleted > 0 => info!(source = %source.name, deleted, "purged stale snapshots"),
            Ok(_) => {}
            Err(e) => error!(source = %source.name, error = %e, "purge failed"),
        }
    }
}

/// Spawns one long-running `tokio::task` per source, each ticking on its
/// own `interval_from_cron(source.cron)` cadence.
pub fn spawn_all<C: Collector + 'static>(
    sources: Vec<SourceConfig>,
    targets: Vec<WebhookTarget>,
    collector: Arc<C>,
    ledger: Arc<dyn StateLedger>,
    pipeline: Arc<AlertPipeline>,
    retention: RetentionPolicy,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles: Vec<tokio::task::JoinHandle<()>> = sources
        .iter()
        .cloned()
        .map(|source| {
            let collector = collector.clone();
            let ledger = ledger.clone();
            let pipeline = pipeline.clone();
            let targets = targets.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval_from_cron(&source.cron));
                loop {
                    interval.tick().await;
                    match run_check(&*collector, &*ledger, &pipeline, &source, &targets).await {
                        Ok(status) => {
                            if status != DecisionStatus::Ok {
                                warn!(source = %source.name, %status, "source is not healthy");
                            }
                        }
                        Err(e) => error!(source = %source.name, error = %e, "check failed"),
                    }
                }
            })
        })
        .collect();

    // One periodic retention sweep for all sources, entirely decoupled
    // from any single source's check cadence.
    {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(6 * 3600));
            loop {
                interval.tick().await;
                purge_all(&*ledger, &sources, &retention);
            }
        }));
    }

    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slash_n_minute_shorthand() {
        assert_eq!(interval_from_cron("*/5 * * * *"), Duration::from_secs(300));
        assert_eq!(interval_from_cron("*/1 * * * *"), Duration::from_secs(60));
    }

    #[test]
    fn falls_back_to_five_minutes_for_unsupported_expressions() {
        assert_eq!(interval_from_cron("0 9 * * MON-FRI"), Duration::from_secs(300));
        assert_eq!(interval_from_cron("garbage"), Duration::from_secs(300));
    }
}
