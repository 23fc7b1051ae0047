// =============================================================================
// DeliveryRecord — append-only audit trail of webhook delivery attempts
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::EventType;

/// Outcome of a single `DeliveryClient::send` call. Not an error type —
/// delivery failure is recorded as data, never bubbled as a hard error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

impl DeliveryResult {
    pub fn ok(http_status: u16, latency_ms: u64) -> Self {
        Self {
            success: true,
            http_status: Some(http_status),
            latency_ms,
            error_message: None,
        }
    }

    pub fn failed(http_status: Option<u16>, latency_ms: u64, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            http_status,
            latency_ms,
            error_message: Some(error_message.into()),
        }
    }
}

/// One row of the append-only `delivery_log` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub source_name: String,
    pub target_name: String,
    pub event_type: EventType,
    pub payload_hash: String,
    pub delivered_at: DateTime<Utc>,
    pub success: bool,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

impl DeliveryRecord {
    pub fn new(
        source_name: impl Into<String>,
        target_name: impl Into<String>,
        event_type: EventType,
        payload_hash: impl Into<String>,
        delivered_at: DateTime<Utc>,
        result: &DeliveryResult,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            event_type,
            payload_hash: payload_hash.into(),
            delivered_at,
            success: result.success,
            http_status: result.http_status,
            latency_ms: result.latency_ms,
            error_message: result.error_message.clone(),
        }
    }
}
