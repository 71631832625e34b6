//! The primitive trait, execution context, and registry.

use cortex_core::{ActionName, AdapterError, AgentConfig, GameAdapter, SkillError};
use cortex_kernel::{Blackboard, LockManager, SignalBus};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Errors produced inside primitive executors. These never leave
/// dispatch — they are folded into failed outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The actuator port failed.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    /// The action exceeded its hard timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    /// The params record is missing or mistypes a required field.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// A skill executor failed.
    #[error("skill error: {0}")]
    Skill(#[from] SkillError),
    /// Any other executor failure.
    #[error("{0}")]
    Failed(String),
}

/// Per-action retry defaults consulted when neither the caller nor the
/// override table says otherwise.
#[derive(Debug, Clone, Copy)]
pub struct RetryDefaults {
    /// Retries after the first attempt.
    pub retries: u32,
    /// First backoff delay.
    pub base_delay: Duration,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            retries: 1,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Everything a primitive needs to act on the world.
#[derive(Clone)]
pub struct ActionContext {
    /// The actuator port.
    pub adapter: Arc<dyn GameAdapter>,
    /// Shared state.
    pub blackboard: Arc<Blackboard>,
    /// Actuator arbitration.
    pub locks: LockManager,
    /// The bus, for primitives that raise signals (request-new-tool).
    pub bus: SignalBus,
    /// Agent configuration.
    pub config: AgentConfig,
    /// Cancellation for the enclosing task.
    pub cancel: CancellationToken,
}

/// Object-safe trait for a primitive action implementation.
///
/// The adapter tables ([`positional`](Self::positional),
/// [`keep_top_level`](Self::keep_top_level)) drive dispatch-side
/// normalization so both array-based and record-based callers work.
pub trait PrimitiveAction: Send + Sync {
    /// Which primitive this is.
    fn name(&self) -> ActionName;

    /// Param names for positional (array) callers, in order.
    fn positional(&self) -> &'static [&'static str];

    /// Semantic params preserved at the top level during option folding.
    fn keep_top_level(&self) -> &'static [&'static str];

    /// Retry defaults for this primitive.
    fn retry_defaults(&self) -> RetryDefaults {
        RetryDefaults::default()
    }

    /// Hard timeout for one attempt.
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Execute with normalized, policy-merged params. Returns
    /// action-specific data for the outcome.
    fn execute<'a>(
        &'a self,
        params: &'a serde_json::Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<serde_json::Value, ActionError>>;
}

/// The primitive registry. All nineteen primitives are present in
/// [`ActionRegistry::standard`].
pub struct ActionRegistry {
    actions: HashMap<ActionName, Arc<dyn PrimitiveAction>>,
}

impl ActionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// The full builtin set.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for action in crate::builtin::all() {
            registry.register(action);
        }
        registry
    }

    /// Register a primitive. Overwrites any existing one of that name.
    pub fn register(&mut self, action: Arc<dyn PrimitiveAction>) {
        self.actions.insert(action.name(), action);
    }

    /// Look up a primitive.
    #[must_use]
    pub fn get(&self, name: ActionName) -> Option<&Arc<dyn PrimitiveAction>> {
        self.actions.get(&name)
    }

    /// Number of registered primitives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_primitive() {
        let registry = ActionRegistry::standard();
        for name in ActionName::all() {
            assert!(registry.get(*name).is_some(), "missing {name}");
        }
        assert_eq!(registry.len(), ActionName::all().len());
    }
}
