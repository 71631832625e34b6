//! Error types for the port boundaries.

use std::time::Duration;

/// Errors from the game-adapter port.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The connection to the game server dropped.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The command referenced something that no longer exists.
    #[error("stale reference: {0}")]
    StaleReference(String),
    /// The avatar cannot perform the command right now.
    #[error("unable: {0}")]
    Unable(String),
    /// The command did not finish in time.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    /// Any other adapter error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl AdapterError {
    /// Whether the command is worth retrying as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::Timeout(_) | Self::Unable(_))
    }
}

/// Errors from the language-model port.
#[derive(Debug, thiserror::Error)]
pub enum LmError {
    // Retryable errors
    /// Network-level error (connection reset, DNS failure, etc.).
    #[error("network error: {0}")]
    Network(String),
    /// Rate limited by the provider.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimit {
        /// Suggested retry delay, if the provider gave one.
        retry_after: Option<Duration>,
    },
    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    /// Provider service is temporarily unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Terminal errors
    /// Malformed or invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The call was cancelled.
    #[error("cancelled")]
    Cancelled,
    /// The request queue's circuit breaker is open.
    #[error("circuit open")]
    CircuitOpen,
    /// Any other provider error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl LmError {
    /// Whether this error is likely transient and the call can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimit { .. } | Self::Timeout(_) | Self::ServiceUnavailable(_)
        )
    }
}

/// Errors from the sandbox port.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The code failed validation against the allowed surface.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// Execution threw inside the sandbox.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// Execution exceeded the wall-clock budget.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    /// Any other sandbox error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the memory port. All memory failures are non-fatal to
/// the caller; they are logged and swallowed at the call site.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The backend rejected or lost the write.
    #[error("store failed: {0}")]
    StoreFailed(String),
    /// The query could not be answered.
    #[error("recall failed: {0}")]
    RecallFailed(String),
    /// Any other memory error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from skill execution.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// No skill under that name.
    #[error("skill not found: {0}")]
    NotFound(String),
    /// The skill body threw.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// The input did not match the skill's schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lm_retryable_classification() {
        assert!(LmError::Network("reset".into()).is_retryable());
        assert!(LmError::RateLimit { retry_after: None }.is_retryable());
        assert!(!LmError::InvalidRequest("bad".into()).is_retryable());
        assert!(!LmError::CircuitOpen.is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SkillError::NotFound("gather_water".into()).to_string(),
            "skill not found: gather_water"
        );
    }
}
