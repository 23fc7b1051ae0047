// =============================================================================
// Sentinel — Data-Quality Monitoring Agent — Main Entry Point
// =============================================================================

mod alert_pipeline;
mod baseline_calculator;
mod collector;
mod config;
mod decision_engine;
mod delivery_client;
mod ledger;
mod model;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::collector::NullCollector;
use crate::config::SentinelConfig;
use crate::delivery_client::DeliveryClient;
use crate::ledger::FileStore;
use crate::model::DecisionStatus;

#[derive(Parser)]
#[command(name = "sentinel", version, about = "Data-quality monitoring agent")]
struct Cli {
    /// Path to the agent's JSON configuration file.
    #[arg(long, default_value = "sentinel.json")]
    config: PathBuf,

    /// Directory the file-backed ledger persists state under.
    #[arg(long, default_value = "sentinel_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent continuously, checking every configured source on its
    /// own schedule until interrupted.
    Run,
    /// Run a single check for one configured source and exit.
    Check {
        /// Name of the source to check, as it appears in the config file.
        source: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let sentinel_config = SentinelConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, path = %cli.config.display(), "failed to load config, using defaults");
        SentinelConfig::default()
    });

    info!(
        agent_id = %sentinel_config.agent_id,
        source_count = sentinel_config.sources.len(),
        target_count = sentinel_config.targets.len(),
        dry_run = sentinel_config.dry_run,
        "sentinel starting"
    );

    let ledger: Arc<dyn ledger::StateLedger> = match FileStore::open(&cli.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, path = %cli.data_dir.display(), "failed to open ledger");
            std::process::exit(1);
        }
    };

    // No SQL dialect adapter ships with this crate ;
    // a real deployment supplies its own `Collector` implementation here.
    let collector = Arc::new(NullCollector);

    let pipeline = Arc::new(alert_pipeline::AlertPipeline::new(
        DeliveryClient::new(),
        sentinel_config.agent_id.clone(),
        sentinel_config.dry_run,
    ));

    match cli.command {
        Command::Run => {
            // One best-effort sweep at startup in addition to the scheduler's
            // own periodic one, so a long-idle restart doesn't wait 6 hours
            // before retention first runs.
            scheduler::purge_all(&*ledger, &sentinel_config.sources, &sentinel_config.retention);

            let handles = scheduler::spawn_all(
                sentinel_config.sources.clone(),
                sentinel_config.targets.clone(),
                collector,
                ledger,
                pipeline,
                sentinel_config.retention,
            );

            info!(task_count = handles.len(), "all source checks scheduled, press Ctrl+C to stop");

            tokio::signal::ctrl_c().await?;
            warn!("shutdown signal received, stopping");
            for handle in handles {
                handle.abort();
            }
            info!("sentinel shut down complete");
            Ok(())
        }
        Command::Check { source } => {
            let Some(source_config) = sentinel_config.sources.iter().find(|s| s.name == source) else {
                error!(source = %source, "no such source in config");
                std::process::exit(1);
            };

            let status = scheduler::run_check(&*collector, &*ledger, &pipeline, source_config, &sentinel_config.targets).await;

            if let Ok(stats) = ledger.stats(&source) {
                info!(
                    source = %source,
                    snapshot_count = stats.snapshot_count,
                    delivery_success_count = stats.delivery_success_count,
                    delivery_failure_count = stats.delivery_failure_count,
                    "ledger summary"
                );
            }

            match status {
                Ok(DecisionStatus::Ok) => {
                    info!(source = %source, "OK");
                    std::process::exit(0);
                }
                Ok(status) => {
                    warn!(source = %source, %status, "not healthy");
                    std::process::exit(2);
                }
                Err(e) => {
                    error!(source = %source, error = %e, "check failed");
                    std::process::exit(1);
                }
            }
        }
    }
}
