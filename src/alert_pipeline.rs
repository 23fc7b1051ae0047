// =============================================================================
// Alert Pipeline — per-(source, target) notification state machine
// =============================================================================
//
// Stateful reconciler: for each configured `WebhookTarget`, compares the
// current `Decision` against the `AlertState` the ledger has on file,
// decides whether an event is due, and — unless running in dry-run mode —
// builds and signs a payload, attempts delivery, and commits the outcome.
// The dry-run/live split mirrors a demo/live execution split: one path
// performs the side effect (delivery + ledger writes), the other only
// simulates it and mutates nothing.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::delivery_client::{DeliveryClient, WebhookTarget};
use crate::ledger::StateLedger;
use crate::model::{AlertState, Decision, DecisionStatus, DeliveryRecord, EventType, WebhookPayload};

/// Stable short digest over the ascending-sorted reason codes of a
/// decision, used for dedup.
pub fn reason_hash(decision: &Decision) -> String {
    let mut codes: Vec<&str> = decision.reasons.iter().map(|r| r.code.as_str()).collect();
    codes.sort_unstable();
    let joined = codes.join(",");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(&digest[..8])
}

fn payload_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

fn status_to_event(status: DecisionStatus) -> Option<EventType> {
    match status {
        DecisionStatus::Warning => Some(EventType::Warning),
        DecisionStatus::Anomaly => Some(EventType::Anomaly),
        DecisionStatus::Ok | DecisionStatus::Unknown => None,
    }
}

/// Event emitted for a genuine `prior -> current` status transition. Only
/// called when `prior != current`.
fn transition_event(prior: DecisionStatus, current: DecisionStatus) -> Option<EventType> {
    use DecisionStatus::*;
    match (prior, current) {
        (_, Ok) => Some(EventType::Recovery),
        (Ok, Warning) => Some(EventType::Warning),
        (Ok, Anomaly) => Some(EventType::Anomaly),
        (Warning, Anomaly) => Some(EventType::Anomaly),
        (Anomaly, Warning) => None,
        _ => None,
    }
}

/// Decide which event (if any) is due for one target, given its prior
/// `AlertState` and the current decision. Returns `None` when nothing
/// should be dispatched — either because the transition table says so, or
/// because a same-status re-alert is suppressed by an unexpired cooldown.
fn event_due(prior: &AlertState, current_status: DecisionStatus, current_reason_hash: &str, now: DateTime<Utc>) -> Option<EventType> {
    let prior_normalized = match prior.last_notified_status {
        DecisionStatus::Unknown => DecisionStatus::Ok,
        other => other,
    };

    if prior_normalized == current_status {
        if current_status == DecisionStatus::Ok {
            return None;
        }
        let hash_changed = prior.reason_hash != current_reason_hash;
        let cooldown_elapsed = now >= prior.cooldown_until;
        if hash_changed && cooldown_elapsed {
            return status_to_event(current_status);
        }
        return None;
    }

    transition_event(prior_normalized, current_status)
}

pub struct AlertPipeline {
    delivery_client: DeliveryClient,
    agent_id: String,
    dry_run: bool,
}

impl AlertPipeline {
    pub fn new(delivery_client: DeliveryClient, agent_id: impl Into<String>, dry_run: bool) -> Self {
        Self {
            delivery_client,
            agent_id: agent_id.into(),
            dry_run,
        }
    }

    /// Reconcile one source's `Decision` against every configured target.
    /// Returns the payloads that were (or, in dry-run mode, would be)
    /// dispatched. In dry-run mode the ledger is never written to and the
    /// Delivery Client is never invoked.
    #[instrument(skip(self, ledger, decision, targets), fields(source = source_name, dry_run = self.dry_run))]
    pub async fn reconcile(
        &self,
        ledger: &dyn StateLedger,
        source_name: &str,
        source_type: &str,
        decision: &Decision,
        targets: &[WebhookTarget],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<WebhookPayload>> {
        let current_hash = reason_hash(decision);
        let mut dispatched = Vec::new();

        for target in targets {
            let prior = ledger
                .get_alert_state(source_name, &target.name)?
                .unwrap_or_else(|| AlertState::unset(source_name, target.name.as_str(), now));

            let Some(event_type) = event_due(&prior, decision.status, &current_hash, now) else {
                debug!(target = %target.name, "no event due");
                continue;
            };

            if !target.subscribes_to(event_type) {
                debug!(target = %target.name, %event_type, "target not subscribed, suppressed without state change");
                continue;
            }

            let payload = WebhookPayload::new(source_name, source_type, event_type, now, decision, self.agent_id.as_str());

            if self.dry_run {
                info!(target = %target.name, %event_type, "dry-run: would dispatch");
                dispatched.push(payload);
                continue;
            }

            self.dispatch_live(ledger, source_name, target, event_type, &payload, &prior, decision, &current_hash, now)
                .await?;
            dispatched.push(payload);
        }

        Ok(dispatched)
    }

    async fn dispatch_live(
        &self,
        ledger: &dyn StateLedger,
        source_name: &str,
        target: &WebhookTarget,
        event_type: EventType,
        payload: &WebhookPayload,
        prior: &AlertState,
        decision: &Decision,
        current_hash: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let body = payload.to_canonical_json()?;
        let result = self.delivery_client.send(target, payload, event_type).await;

        let prior_normalized = match prior.last_notified_status {
            DecisionStatus::Unknown => DecisionStatus::Ok,
            other => other,
        };
        let last_change_at = if prior_normalized != decision.status { now } else { prior.last_change_at };

        let new_state = AlertState {
            source_name: source_name.to_string(),
            target_name: target.name.clone(),
            last_notified_status: decision.status,
            reason_hash: current_hash.to_string(),
            last_change_at,
            last_sent_at: now,
            cooldown_until: now + Duration::minutes(target.cooldown_minutes),
        };
        // State advances regardless of delivery outcome (prevents alert storms
        // on receiver recovery), committed before the delivery record per the
        // ledger's documented write order.
        ledger.set_alert_state(&new_state)?;

        let record = DeliveryRecord::new(source_name, target.name.as_str(), event_type, payload_hash(&body), now, &result);
        ledger.log_delivery(&record)?;

        info!(
            target = %target.name,
            %event_type,
            success = result.success,
            http_status = ?result.http_status,
            "delivery committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::model::{Reason, ReasonCode, Severity};
    use chrono::TimeZone;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn decision(status: DecisionStatus, reasons: Vec<Reason>) -> Decision {
        Decision {
            status,
            reasons,
            metrics: Default::default(),
            baseline: None,
            confidence: 1.0,
        }
    }

    #[test]
    fn ok_to_ok_never_fires() {
        let prior = AlertState::unset("orders", "slack", t(0));
        let hash = reason_hash(&decision(DecisionStatus::Ok, vec![]));
        assert!(event_due(&prior, DecisionStatus::Ok, &hash, t(1)).is_none());
    }

    #[test]
    fn unset_to_anomaly_fires_anomaly() {
        let prior = AlertState::unset("orders", "slack", t(0));
        let hash = reason_hash(&decision(
            DecisionStatus::Anomaly,
            vec![Reason::new(ReasonCode::VolumeZero, Severity::Critical, "zero")],
        ));
        assert_eq!(event_due(&prior, DecisionStatus::Anomaly, &hash, t(1)), Some(EventType::Anomaly));
    }

    #[test]
    fn anomaly_to_warning_does_not_downgrade_noisily() {
        let mut prior = AlertState::unset("orders", "slack", t(0));
        prior.last_notified_status = DecisionStatus::Anomaly;
        let hash = reason_hash(&decision(
            DecisionStatus::Warning,
            vec![Reason::new(ReasonCode::DataStale, Severity::Warning, "stale")],
        ));
        assert!(event_due(&prior, DecisionStatus::Warning, &hash, t(1)).is_none());
    }

    #[test]
    fn warning_to_ok_and_anomaly_to_ok_both_recover() {
        let mut prior = AlertState::unset("orders", "slack", t(0));
        prior.last_notified_status = DecisionStatus::Warning;
        let hash = reason_hash(&decision(DecisionStatus::Ok, vec![]));
        assert_eq!(event_due(&prior, DecisionStatus::Ok, &hash, t(1)), Some(EventType::Recovery));

        prior.last_notified_status = DecisionStatus::Anomaly;
        assert_eq!(event_due(&prior, DecisionStatus::Ok, &hash, t(1)), Some(EventType::Recovery));
    }

    #[test]
    fn same_status_within_cooldown_never_re_alerts_even_if_hash_changed() {
        let mut prior = AlertState::unset("orders", "slack", t(0));
        prior.last_notified_status = DecisionStatus::Warning;
        prior.reason_hash = "aaaa".to_string();
        prior.cooldown_until = t(60);

        let hash = "bbbb".to_string();
        assert!(event_due(&prior, DecisionStatus::Warning, &hash, t(10)).is_none());
    }

    #[test]
    fn same_status_after_cooldown_with_changed_hash_re_alerts() {
        let mut prior = AlertState::unset("orders", "slack", t(0));
        prior.last_notified_status = DecisionStatus::Warning;
        prior.reason_hash = "aaaa".to_string();
        prior.cooldown_until = t(1);

        let hash = "bbbb".to_string();
        assert_eq!(event_due(&prior, DecisionStatus::Warning, &hash, t(2)), Some(EventType::Warning));
    }

    #[test]
    fn same_status_same_hash_never_re_alerts_regardless_of_cooldown() {
        let mut prior = AlertState::unset("orders", "slack", t(0));
        prior.last_notified_status = DecisionStatus::Warning;
        prior.reason_hash = "aaaa".to_string();
        prior.cooldown_until = t(1);

        let hash = "aaaa".to_string();
        assert!(event_due(&prior, DecisionStatus::Warning, &hash, t(100)).is_none());
    }

    #[tokio::test]
    async fn dry_run_never_touches_the_ledger() {
        let ledger = InMemoryLedger::new();
        let pipeline = AlertPipeline::new(DeliveryClient::new(), "agent-1", true);
        let targets = vec![WebhookTarget {
            name: "slack".to_string(),
            url: "https://example.test/hook".to_string(),
            secret: None,
            events: vec![EventType::Anomaly],
            cooldown_minutes: 60,
            timeout_seconds: 10,
        }];
        let decision = decision(
            DecisionStatus::Anomaly,
            vec![Reason::new(ReasonCode::VolumeZero, Severity::Critical, "zero rows")],
        );

        let payloads = pipeline
            .reconcile(&ledger, "orders_db", "postgres", &decision, &targets, t(0))
            .await
            .unwrap();

        assert_eq!(payloads.len(), 1);
        assert!(ledger.get_alert_state("orders_db", "slack").unwrap().is_none());
    }

    #[tokio::test]
    async fn unsubscribed_target_is_suppressed_without_state_change() {
        let ledger = InMemoryLedger::new();
        let pipeline = AlertPipeline::new(DeliveryClient::new(), "agent-1", true);
        let targets = vec![WebhookTarget {
            name: "slack".to_string(),
            url: "https://example.test/hook".to_string(),
            secret: None,
            events: vec![EventType::Recovery],
            cooldown_minutes: 60,
            timeout_seconds: 10,
        }];
        let decision = decision(
            DecisionStatus::Anomaly,
            vec![Reason::new(ReasonCode::VolumeZero, Severity::Critical, "zero rows")],
        );

        let payloads = pipeline
            .reconcile(&ledger, "orders_db", "postgres", &decision, &targets, t(0))
            .await
            .unwrap();

        assert!(payloads.is_empty());
    }
}
