// =============================================================================
// Reason — a single finding contributed by one Decision Engine rule
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fixed, wire-stable reason codes . Consumers key on `code`,
/// never on `message`, which is free-form human text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    CollectFailed,
    VolumeZero,
    VolumeBelowMinimum,
    VolumeDeviation,
    DataStale,
}

impl ReasonCode {
    /// The stable wire string for this code, matching the enum variant
    /// name exactly.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectFailed => "COLLECT_FAILED",
            Self::VolumeZero => "VOLUME_ZERO",
            Self::VolumeBelowMinimum => "VOLUME_BELOW_MINIMUM",
            Self::VolumeDeviation => "VOLUME_DEVIATION",
            Self::DataStale => "DATA_STALE",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a single reason. A Decision's overall status is the most
/// severe of its reasons' severities (critical > warning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// One finding produced by a single Decision Engine rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl Reason {
    pub fn new(code: ReasonCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_wire_strings_match_catalog() {
        assert_eq!(ReasonCode::CollectFailed.as_str(), "COLLECT_FAILED");
        assert_eq!(ReasonCode::VolumeZero.as_str(), "VOLUME_ZERO");
        assert_eq!(ReasonCode::VolumeBelowMinimum.as_str(), "VOLUME_BELOW_MINIMUM");
        assert_eq!(ReasonCode::VolumeDeviation.as_str(), "VOLUME_DEVIATION");
        assert_eq!(ReasonCode::DataStale.as_str(), "DATA_STALE");
    }

    #[test]
    fn severity_ordering_critical_above_warning() {
        assert!(Severity::Critical > Severity::Warning);
    }

    #[test]
    fn reason_code_serializes_to_wire_string() {
        let json = serde_json::to_string(&ReasonCode::VolumeBelowMinimum).unwrap();
        assert_eq!(json, "\"VOLUME_BELOW_MINIMUM\"");
    }
}
