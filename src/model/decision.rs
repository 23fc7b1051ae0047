// =============================================================================
// Decision — the typed verdict for one snapshot against its baseline
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::baseline::BaselineSummary;
use super::reason::{Reason, Severity};

/// Overall health verdict. `Unknown` is never produced by the Decision
/// Engine itself — it exists only as the sentinel "no decision yet" value
/// the Alert Pipeline uses before any check has run for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionStatus {
    Ok,
    Warning,
    Anomaly,
    Unknown,
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Anomaly => write!(f, "ANOMALY"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Output of the Decision Engine for one (snapshot, baseline, policy)
/// triple. Transient — never persisted directly, only referenced from
/// DeliveryRecord/WebhookPayload at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub status: DecisionStatus,
    pub reasons: Vec<Reason>,
    pub metrics: HashMap<String, serde_json::Value>,
    pub baseline: Option<BaselineSummary>,
    pub confidence: f64,
}

impl Decision {
    /// Derive the status implied by a reason list: ANOMALY if any
    /// critical reason is present, else WARNING if any reason is present,
    /// else OK. Matches universal invariants exactly.
    pub fn status_for_reasons(reasons: &[Reason]) -> DecisionStatus {
        if reasons.iter().any(|r| r.severity == Severity::Critical) {
            DecisionStatus::Anomaly
        } else if !reasons.is_empty() {
            DecisionStatus::Warning
        } else {
            DecisionStatus::Ok
        }
    }

    pub fn has_critical(&self) -> bool {
        self.reasons.iter().any(|r| r.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reason::ReasonCode;

    #[test]
    fn empty_reasons_yield_ok() {
        assert_eq!(Decision::status_for_reasons(&[]), DecisionStatus::Ok);
    }

    #[test]
    fn any_warning_without_critical_yields_warning() {
        let reasons = vec![Reason::new(ReasonCode::VolumeDeviation, Severity::Warning, "x")];
        assert_eq!(Decision::status_for_reasons(&reasons), DecisionStatus::Warning);
    }

    #[test]
    fn any_critical_yields_anomaly_regardless_of_warnings() {
        let reasons = vec![
            Reason::new(ReasonCode::VolumeDeviation, Severity::Warning, "x"),
            Reason::new(ReasonCode::VolumeZero, Severity::Critical, "y"),
        ];
        assert_eq!(Decision::status_for_reasons(&reasons), DecisionStatus::Anomaly);
    }
}
