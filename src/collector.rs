// =============================================================================
// Collector — external interface to one SQL data source
// =============================================================================
//
// SQL dialect adapters are out of scope: this module
// defines only the contract a real adapter must satisfy, plus a
// `NullCollector` used by the CLI's `check` dry-run path and by tests that
// don't need a live database.
//
// `collect` never throws through the interface: collection errors are
// encoded as a `Snapshot` with `collect_status = COLLECT_FAILED` rather
// than a `Result::Err`.

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::config::SourceConfig;
use crate::model::Snapshot;

/// Internal failure modes a real adapter maps onto `Snapshot::failed`'s
/// `error_code`. Never surfaced past `collect` itself — this enum exists so
/// adapters have a shared vocabulary of `error_code` strings, not as a type
/// that crosses the `Collector` boundary.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("authentication failed")]
    AuthFailed,
    #[error("query timed out")]
    Timeout,
    #[error("malformed result: {0}")]
    MalformedResult(String),
    #[error("required column missing: {0}")]
    MissingColumn(String),
}

impl CollectionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionRefused => "CONN_REFUSED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::MalformedResult(_) => "MALFORMED_RESULT",
            Self::MissingColumn(_) => "MISSING_COLUMN",
        }
    }
}

/// Probes one configured source and returns a `Snapshot`. Implementations
/// run a query returning two columns (`row_count`, optional
/// `latest_timestamp`); dialect-specific adapters (Postgres, MySQL, etc.)
/// live outside this crate.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, source: &SourceConfig) -> Snapshot;
}

/// Always reports `COLLECT_FAILED`. Used by the CLI's offline `check`
/// command and by pipeline tests that exercise everything downstream of
/// collection without a live database.
pub struct NullCollector;

#[async_trait]
impl Collector for NullCollector {
    async fn collect(&self, source: &SourceConfig) -> Snapshot {
        Snapshot::failed(
            source.name.clone(),
            Utc::now(),
            CollectionError::ConnectionRefused.code(),
            "NullCollector never connects to a real source",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    #[tokio::test]
    async fn null_collector_always_reports_collect_failed() {
        let source = SourceConfig::new_for_test("orders");
        let snapshot = NullCollector.collect(&source).await;
        assert!(!snapshot.is_success());
        assert_eq!(
            snapshot.metadata.get("error_code").map(String::as_str),
            Some("CONN_REFUSED")
        );
    }
}
