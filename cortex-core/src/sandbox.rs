//! The sandbox port — validation and bounded execution of code blobs.

use crate::error::SandboxError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of validating a code blob against the allowed surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    /// Whether the code may be executed.
    pub valid: bool,
    /// Human-readable problems found (empty when valid).
    #[serde(default)]
    pub issues: Vec<String>,
}

/// The sandbox port. Generated code only ever runs here, bound to a
/// finite ABI: the adapter command surface plus a read-only blackboard
/// view. Validation rejects references to anything outside that surface.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Statically check a code blob against the allowed surface.
    async fn validate(&self, code: &str) -> Result<Validation, SandboxError>;

    /// Run a validated blob with the given context bindings. The
    /// implementation must enforce the wall-clock timeout.
    async fn execute(
        &self,
        code: &str,
        bindings: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, SandboxError>;
}
