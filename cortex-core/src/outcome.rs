//! The uniform result of every primitive dispatch.

use serde::{Deserialize, Serialize};

/// What came back from executing a primitive action.
///
/// Invariant: dispatch always produces an `Outcome` — executor errors are
/// folded into `success: false` with a non-empty `error`, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the action achieved its effect.
    pub success: bool,
    /// Canonical action name.
    pub action: String,
    /// Total attempts made (1 = no retries needed).
    pub attempts: u32,
    /// Retries consumed (attempts - 1).
    pub retries_used: u32,
    /// Wall-clock duration of the whole dispatch in milliseconds.
    pub duration_ms: u64,
    /// Error message when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Action-specific result fields (item counts, positions, ...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Outcome {
    /// A successful outcome with action-specific data.
    #[must_use]
    pub fn ok(action: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            action: action.into(),
            attempts: 1,
            retries_used: 0,
            duration_ms: 0,
            error: None,
            data,
        }
    }

    /// A failed outcome carrying an error message.
    #[must_use]
    pub fn failed(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.into(),
            attempts: 1,
            retries_used: 0,
            duration_ms: 0,
            error: Some(error.into()),
            data: serde_json::Value::Null,
        }
    }

    /// Set the attempt accounting on this outcome.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self.retries_used = attempts.saturating_sub(1);
        self
    }

    /// Set the measured duration on this outcome.
    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_carries_error() {
        let o = Outcome::failed("mine", "no pickaxe");
        assert!(!o.success);
        assert_eq!(o.error.as_deref(), Some("no pickaxe"));
    }

    #[test]
    fn attempt_accounting() {
        let o = Outcome::ok("craft", serde_json::Value::Null).with_attempts(3);
        assert_eq!(o.retries_used, 2);
    }
}
