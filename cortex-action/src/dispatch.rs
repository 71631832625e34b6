//! Policy-gated, retry-wrapped dispatch producing uniform outcomes.

use crate::normalize::{adapt_positional, fold_options};
use crate::registry::{ActionContext, ActionError, ActionRegistry};
use cortex_core::{ActionName, Directive, Outcome, Signal, SkillRegistry, deep_merge};
use cortex_kernel::{RetryOptions, SignalBus, retry};
use cortex_rules::BehaviorEngine;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Per-action parameter overrides installed by the evolution engine.
/// Consulted after caller options and before primitive defaults.
#[derive(Clone, Default)]
pub struct OverrideTable {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl OverrideTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a patch into the override record for an action.
    pub fn set_override(&self, action: &str, patch: Value) {
        let mut table = self.inner.write().unwrap();
        let entry = table
            .entry(action.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        deep_merge(entry, &patch);
    }

    /// The current override record for an action.
    #[must_use]
    pub fn get(&self, action: &str) -> Option<Value> {
        self.inner.read().unwrap().get(action).cloned()
    }

    /// Drop an action's overrides.
    pub fn clear(&self, action: &str) {
        self.inner.write().unwrap().remove(action);
    }
}

/// One action's outcome tallies.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ActionStat {
    /// Successful dispatches.
    pub successes: u64,
    /// Failed dispatches.
    pub failures: u64,
    /// Sum of dispatch durations, milliseconds.
    pub total_duration_ms: u64,
}

/// The action-stat table the evolution engine reads. Written by
/// dispatch on every outcome.
#[derive(Clone, Default)]
pub struct ActionStats {
    inner: Arc<Mutex<HashMap<String, ActionStat>>>,
}

impl ActionStats {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome.
    pub fn record(&self, action: &str, success: bool, duration_ms: u64) {
        let mut table = self.inner.lock().unwrap();
        let stat = table.entry(action.to_string()).or_default();
        if success {
            stat.successes += 1;
        } else {
            stat.failures += 1;
        }
        stat.total_duration_ms += duration_ms;
    }

    /// One action's tallies.
    #[must_use]
    pub fn get(&self, action: &str) -> ActionStat {
        self.inner
            .lock()
            .unwrap()
            .get(action)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of the whole table.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, ActionStat> {
        self.inner.lock().unwrap().clone()
    }
}

/// The dispatcher: primitives in, outcomes out, errors never.
pub struct Dispatcher {
    registry: ActionRegistry,
    rules: Arc<BehaviorEngine>,
    skills: Arc<dyn SkillRegistry>,
    overrides: OverrideTable,
    stats: ActionStats,
    bus: SignalBus,
    ctx: ActionContext,
}

impl Dispatcher {
    /// Assemble a dispatcher.
    #[must_use]
    pub fn new(
        registry: ActionRegistry,
        rules: Arc<BehaviorEngine>,
        skills: Arc<dyn SkillRegistry>,
        bus: SignalBus,
        ctx: ActionContext,
    ) -> Self {
        Self {
            registry,
            rules,
            skills,
            overrides: OverrideTable::new(),
            stats: ActionStats::new(),
            bus,
            ctx,
        }
    }

    /// Handle to the override table (shared with the evolution engine).
    #[must_use]
    pub fn overrides(&self) -> OverrideTable {
        self.overrides.clone()
    }

    /// Handle to the action-stat table.
    #[must_use]
    pub fn stats(&self) -> ActionStats {
        self.stats.clone()
    }

    /// Dispatch a directive. Always returns an outcome; errors are
    /// folded in, never thrown.
    pub async fn dispatch(&self, directive: &Directive) -> Outcome {
        let started = Instant::now();
        let type_name = directive.action_type.as_str();

        let Some(name) = ActionName::parse(type_name) else {
            return self.dispatch_skill(type_name, directive.params.clone(), started).await;
        };
        let Some(primitive) = self.registry.get(name) else {
            return Outcome::failed(type_name, format!("Unknown action type: {type_name}"));
        };

        // Normalize: positional adaptation, then option folding.
        let mut params = adapt_positional(primitive.positional(), &directive.params);
        fold_options(&mut params, primitive.keep_top_level());

        // Policy gate. A block is final: logged, not retried.
        let params = match self.rules.apply_action_policy(name.as_str(), params) {
            Ok(merged) => merged,
            Err(reason) => {
                tracing::warn!(action = %name, reason = %reason, "action blocked by policy");
                let outcome = Outcome::failed(name.as_str(), reason)
                    .with_duration_ms(started.elapsed().as_millis() as u64);
                self.stats
                    .record(name.as_str(), false, outcome.duration_ms);
                return outcome;
            }
        };

        // Executor override routes to a skill instead of the primitive.
        if let Some(executor) = params
            .get("options")
            .and_then(|o| o.get("executor"))
            .and_then(Value::as_str)
        {
            let executor = executor.to_string();
            return self.dispatch_skill(&executor, params.clone(), started).await;
        }

        // Resolve retry/timeout knobs: caller options win, then the
        // evolution engine's overrides, then the primitive's defaults.
        let defaults = primitive.retry_defaults();
        let mut knobs = self
            .overrides
            .get(name.as_str())
            .unwrap_or_else(|| json!({}));
        if let Some(caller) = params.get("options") {
            deep_merge(&mut knobs, caller);
        }
        let retries = knobs
            .get("retries")
            .and_then(Value::as_u64)
            .map_or(defaults.retries, |n| n as u32);
        let base_delay = knobs
            .get("baseDelay")
            .and_then(Value::as_u64)
            .map_or(defaults.base_delay, Duration::from_millis);
        let timeout = knobs
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .map_or(primitive.default_timeout(), Duration::from_millis);

        let opts = RetryOptions {
            max_retries: retries,
            base_delay,
            max_delay: Duration::from_secs(10),
            context: name.as_str().to_string(),
        };
        let result = retry(&opts, |_attempt| {
            let params = &params;
            async move {
                match tokio::time::timeout(timeout, primitive.execute(params, &self.ctx)).await {
                    Ok(inner) => inner,
                    Err(_) => Err(ActionError::Timeout(timeout)),
                }
            }
        })
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok(retried) => Outcome::ok(name.as_str(), retried.value)
                .with_attempts(retried.attempts)
                .with_duration_ms(duration_ms),
            Err(e) => {
                let outcome = Outcome::failed(name.as_str(), e.to_string())
                    .with_attempts(retries + 1)
                    .with_duration_ms(duration_ms);
                self.bus.publish(
                    Signal::ActionFailed,
                    json!({"action": name.as_str(), "error": outcome.error}),
                );
                outcome
            }
        };
        self.stats
            .record(name.as_str(), outcome.success, duration_ms);
        tracing::debug!(
            action = %name,
            success = outcome.success,
            attempts = outcome.attempts,
            duration_ms,
            "dispatch finished"
        );
        outcome
    }

    /// Tool/skill fallback for unknown types and executor overrides.
    async fn dispatch_skill(&self, name: &str, params: Value, started: Instant) -> Outcome {
        let Some(skill) = self.skills.find_skill(name) else {
            return Outcome::failed(name, format!("Unknown action type: {name}"));
        };
        let result = skill.call(params).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok(data) => Outcome::ok(name, data).with_duration_ms(duration_ms),
            Err(e) => {
                self.bus.publish(
                    Signal::ActionFailed,
                    json!({"action": name, "error": e.to_string()}),
                );
                Outcome::failed(name, e.to_string()).with_duration_ms(duration_ms)
            }
        };
        self.stats.record(name, outcome.success, duration_ms);
        outcome
    }
}
