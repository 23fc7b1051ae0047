// =============================================================================
// Data Model — Sentinel Monitoring Agent
// =============================================================================
//
// The value types every other module is built around: a collected
// `Snapshot`, the derived `BaselineSummary`, the `Decision` a check produces
// against that baseline, the per-target `AlertState` the Alert Pipeline
// persists, the `DeliveryRecord` audit trail, and the `WebhookPayload` wire
// format.

pub mod alert_state;
pub mod baseline;
pub mod decision;
pub mod delivery_record;
pub mod payload;
pub mod reason;
pub mod snapshot;

pub use alert_state::AlertState;
pub use baseline::BaselineSummary;
pub use decision::{Decision, DecisionStatus};
pub use delivery_record::{DeliveryRecord, DeliveryResult};
pub use payload::{EventType, SourceDescriptor, WebhookPayload};
pub use reason::{Reason, ReasonCode, Severity};
pub use snapshot::{CollectStatus, Snapshot};
