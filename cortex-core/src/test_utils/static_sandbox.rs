//! StaticSandbox — denylist validation, echo execution.

use crate::error::SandboxError;
use crate::sandbox::{Sandbox, Validation};
use async_trait::async_trait;
use std::time::Duration;

/// A [`Sandbox`] that validates by substring denylist and "executes" by
/// echoing the bindings back. Good enough to exercise the validate →
/// hot-swap pipeline without a real interpreter.
pub struct StaticSandbox {
    denied: Vec<String>,
}

impl StaticSandbox {
    /// Denies references outside the allowed surface by default.
    pub fn new() -> Self {
        Self {
            denied: vec!["require(".into(), "import ".into(), "process.".into()],
        }
    }

    /// Add a denied substring.
    pub fn deny(mut self, token: impl Into<String>) -> Self {
        self.denied.push(token.into());
        self
    }
}

impl Default for StaticSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for StaticSandbox {
    async fn validate(&self, code: &str) -> Result<Validation, SandboxError> {
        let issues: Vec<String> = self
            .denied
            .iter()
            .filter(|t| code.contains(t.as_str()))
            .map(|t| format!("reference outside allowed surface: {t}"))
            .collect();
        Ok(Validation {
            valid: issues.is_empty(),
            issues,
        })
    }

    async fn execute(
        &self,
        code: &str,
        bindings: serde_json::Value,
        _timeout: Duration,
    ) -> Result<serde_json::Value, SandboxError> {
        if code.contains("throw") {
            return Err(SandboxError::ExecutionFailed("scripted throw".into()));
        }
        Ok(bindings)
    }
}
