// =============================================================================
// WebhookPayload — the bit-exact wire format sent to webhook targets
// =============================================================================
//
// Field order in the struct definitions below is the field order emitted
// by `serde_json::to_string` (struct fields serialize in declaration
// order), which is exactly what the Delivery Client signs. Do not reorder
// these fields without checking the HMAC signature is computed over the
// same bytes a receiver would produce by re-serializing the parsed
// payload.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::baseline::BaselineSummary;
use super::decision::{Decision, DecisionStatus};
use super::reason::Reason;

/// One of the four wire event types. `Info` is never emitted by the Alert
/// Pipeline's state machine — it exists for test/diagnostic payloads only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Anomaly,
    Warning,
    Recovery,
    Info,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Anomaly => "anomaly",
            Self::Warning => "warning",
            Self::Recovery => "recovery",
            Self::Info => "info",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionWire {
    pub status: String,
    pub reasons: Vec<Reason>,
    pub confidence: f64,
}

impl From<&Decision> for DecisionWire {
    fn from(d: &Decision) -> Self {
        // Wire format only ever carries OK/WARNING/ANOMALY — UNKNOWN is
        // the pre-first-check sentinel and is never serialized onto the
        // wire (no Decision with status Unknown is ever handed to the
        // payload builder).
        let status = match d.status {
            DecisionStatus::Ok => "OK",
            DecisionStatus::Warning => "WARNING",
            DecisionStatus::Anomaly => "ANOMALY",
            DecisionStatus::Unknown => "OK",
        };
        Self {
            status: status.to_string(),
            reasons: d.reasons.clone(),
            confidence: d.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineWire {
    pub snapshot_count: usize,
    pub row_count_median: Option<f64>,
    pub row_count_min: Option<f64>,
    pub row_count_max: Option<f64>,
    pub row_count_stddev: Option<f64>,
    pub expected_interval_seconds: Option<f64>,
}

impl From<&BaselineSummary> for BaselineWire {
    fn from(b: &BaselineSummary) -> Self {
        Self {
            snapshot_count: b.snapshot_count,
            row_count_median: b.row_count_median,
            row_count_min: b.row_count_min,
            row_count_max: b.row_count_max,
            row_count_stddev: b.row_count_stddev,
            expected_interval_seconds: b.expected_interval_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextWire {
    pub agent_id: String,
}

/// Constructed fresh for every send; hashed (by the caller) to form the
/// `payload_hash` recorded on the DeliveryRecord. Every field is set at
/// construction time — there is no builder pattern, matching
/// `app_state.rs`'s `StateSnapshot` construction style (one big literal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub version: String,
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source: SourceDescriptor,
    pub decision: DecisionWire,
    pub metrics: HashMap<String, serde_json::Value>,
    pub baseline: BaselineWire,
    pub context: ContextWire,
}

impl WebhookPayload {
    pub fn new(
        source_name: impl Into<String>,
        source_type: impl Into<String>,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        decision: &Decision,
        agent_id: impl Into<String>,
    ) -> Self {
        let baseline = decision
            .baseline
            .as_ref()
            .map(BaselineWire::from)
            .unwrap_or_else(|| BaselineWire::from(&BaselineSummary::empty()));

        Self {
            version: "1".to_string(),
            event_id: Uuid::new_v4().to_string(),
            event_type,
            timestamp,
            source: SourceDescriptor {
                name: source_name.into(),
                source_type: source_type.into(),
            },
            decision: DecisionWire::from(decision),
            metrics: decision.metrics.clone(),
            baseline,
            context: ContextWire { agent_id: agent_id.into() },
        }
    }

    /// A synthetic "info" payload for manual/diagnostic test sends. The
    /// state machine never produces one of these itself.
    pub fn test_info(source_name: impl Into<String>, agent_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            version: "1".to_string(),
            event_id: Uuid::new_v4().to_string(),
            event_type: EventType::Info,
            timestamp: now,
            source: SourceDescriptor {
                name: source_name.into(),
                source_type: "test".to_string(),
            },
            decision: DecisionWire {
                status: "OK".to_string(),
                reasons: Vec::new(),
                confidence: 1.0,
            },
            metrics: HashMap::new(),
            baseline: BaselineWire::from(&BaselineSummary::empty()),
            context: ContextWire { agent_id: agent_id.into() },
        }
    }

    /// Canonical JSON body: UTF-8, insertion-order keys, no trailing
    /// newline. This is exactly what gets HMAC-signed and POSTed.
    pub fn to_canonical_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reason::Severity;
    use crate::model::ReasonCode;

    fn sample_decision() -> Decision {
        Decision {
            status: DecisionStatus::Anomaly,
            reasons: vec![Reason::new(ReasonCode::VolumeZero, Severity::Critical, "zero rows")],
            metrics: HashMap::from([("row_count".to_string(), serde_json::Value::from(0))]),
            baseline: Some(BaselineSummary::empty()),
            confidence: 0.3,
        }
    }

    #[test]
    fn roundtrip_reproduces_every_field() {
        let now: DateTime<Utc> = "2024-01-15T10:00:00Z".parse().unwrap();
        let decision = sample_decision();
        let payload = WebhookPayload::new("orders_db", "postgres", EventType::Anomaly, now, &decision, "agent-1");

        let bytes = payload.to_canonical_json().unwrap();
        let parsed: WebhookPayload = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed.version, "1");
        assert_eq!(parsed.event_id, payload.event_id);
        assert_eq!(parsed.event_type, EventType::Anomaly);
        assert_eq!(parsed.timestamp, now);
        assert_eq!(parsed.source.name, "orders_db");
        assert_eq!(parsed.decision.status, "ANOMALY");
        assert_eq!(parsed.context.agent_id, "agent-1");
    }

    #[test]
    fn event_id_is_unique_per_instance() {
        let now: DateTime<Utc> = "2024-01-15T10:00:00Z".parse().unwrap();
        let decision = sample_decision();
        let a = WebhookPayload::new("s", "t", EventType::Anomaly, now, &decision, "agent");
        let b = WebhookPayload::new("s", "t", EventType::Anomaly, now, &decision, "agent");
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn event_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EventType::Anomaly).unwrap(), "\"anomaly\"");
        assert_eq!(serde_json::to_string(&EventType::Recovery).unwrap(), "\"recovery\"");
    }

    #[test]
    fn no_trailing_newline_in_canonical_json() {
        let now: DateTime<Utc> = "2024-01-15T10:00:00Z".parse().unwrap();
        let decision = sample_decision();
        let payload = WebhookPayload::new("s", "t", EventType::Anomaly, now, &decision, "agent");
        let bytes = payload.to_canonical_json().unwrap();
        assert_ne!(bytes.last(), Some(&b'\n'));
    }
}
