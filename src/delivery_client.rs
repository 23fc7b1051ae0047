// =============================================================================
// Delivery Client — HMAC-signed webhook delivery with bounded retries
// =============================================================================
//
// A `reqwest::Client` wrapped in a cheaply-`Clone`-able struct, with
// per-request HMAC-SHA256 signing and `#[instrument]`-annotated async
// methods. Delivery failure is recorded as `DeliveryResult` data, never
// propagated as a hard error — an unreachable webhook receiver must not
// stop the agent.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::model::{DeliveryResult, EventType, WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

/// Per-attempt delays after the first attempt (which fires at 0s). Four
/// attempts total.
const RETRY_DELAYS_MS: [u64; 3] = [1_000, 5_000, 15_000];

fn default_timeout_seconds() -> u64 {
    10
}

fn default_cooldown_minutes() -> i64 {
    60
}

/// One configured notification destination.
#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    pub events: Vec<EventType>,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl WebhookTarget {
    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

impl std::fmt::Debug for WebhookTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookTarget")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("events", &self.events)
            .field("cooldown_minutes", &self.cooldown_minutes)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Sends one `WebhookPayload` to one `WebhookTarget`, retrying on
/// transient failures up to the bounded schedule below.
#[derive(Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
}

impl DeliveryClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Send `payload` to `target`, retrying up to 3 additional times on
    /// network errors, timeouts, and HTTP 5xx/408/425/429. Returns a
    /// `DeliveryResult` describing the outcome of the final attempt;
    /// `latency_ms` spans the first attempt to the last.
    #[instrument(skip(self, payload), fields(target = %target.name, event = %event_type))]
    pub async fn send(&self, target: &WebhookTarget, payload: &WebhookPayload, event_type: EventType) -> DeliveryResult {
        let body = match payload.to_canonical_json() {
            Ok(b) => b,
            Err(e) => return DeliveryResult::failed(None, 0, format!("failed to serialize payload: {e}")),
        };

        let started = std::time::Instant::now();
        let mut attempts_remaining_delays = RETRY_DELAYS_MS.iter();
        let mut last_error: Option<String> = None;
        let mut last_status: Option<u16> = None;

        loop {
            match self.attempt(target, &body, event_type, &payload.source.name).await {
                Ok(status) if (200..300).contains(&status) => {
                    debug!(status, "delivery succeeded");
                    return DeliveryResult::ok(status, started.elapsed().as_millis() as u64);
                }
                Ok(status) => {
                    last_status = Some(status);
                    last_error = Some(format!("non-2xx response: {status}"));
                    if !is_retryable_status(status) {
                        warn!(status, "delivery failed terminally");
                        return DeliveryResult::failed(Some(status), started.elapsed().as_millis() as u64, last_error.unwrap());
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            match attempts_remaining_delays.next() {
                Some(delay_ms) => {
                    warn!(delay_ms, error = ?last_error, "delivery attempt failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                }
                None => {
                    warn!(error = ?last_error, "delivery exhausted all retries");
                    return DeliveryResult::failed(
                        last_status,
                        started.elapsed().as_millis() as u64,
                        last_error.unwrap_or_else(|| "unknown delivery failure".to_string()),
                    );
                }
            }
        }
    }

    /// Single HTTP attempt. `Ok(status)` on any response received; `Err`
    /// only for transport-level failures (connect/timeout/decode).
    async fn attempt(&self, target: &WebhookTarget, body: &[u8], event_type: EventType, source_name: &str) -> Result<u16, String> {
        let mut request = self
            .client
            .post(&target.url)
            .timeout(std::time::Duration::from_secs(target.timeout_seconds))
            .header("Content-Type", "application/json")
            .header("X-Event", event_type.to_string())
            .header("X-Source", source_name.to_string())
            .body(body.to_vec());

        if let Some(secret) = &target.secret {
            request = request.header("X-Signature", Self::sign(secret, body));
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}

impl Default for DeliveryClient {
    fn default() -> Self {
        Self::new()
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_spec() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(425));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn target_subscribes_to_checks_configured_events() {
        let target = WebhookTarget {
            name: "slack".to_string(),
            url: "https://example.test/hook".to_string(),
            secret: None,
            events: vec![EventType::Anomaly, EventType::Recovery],
            cooldown_minutes: default_cooldown_minutes(),
            timeout_seconds: default_timeout_seconds(),
        };
        assert!(target.subscribes_to(EventType::Anomaly));
        assert!(!target.subscribes_to(EventType::Warning));
    }

    #[test]
    fn sign_produces_stable_sha256_prefixed_hex() {
        let sig = DeliveryClient::sign("my-secret", b"{\"a\":1}");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
    }
}
