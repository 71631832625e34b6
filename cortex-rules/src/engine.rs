//! The rule store, policy merging, safety filter, and outcome accounting.

use crate::rule::{self, BehaviorRule, RuleSpec, RuleTrigger};
use chrono::{Duration as ChronoDuration, Utc};
use cortex_core::{Signal, deep_merge};
use cortex_kernel::SignalBus;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pruning timer period.
pub const PRUNE_PERIOD: Duration = Duration::from_secs(60);
/// Consecutive negative events that revert the most recent rule.
const REVERT_AFTER_NEGATIVES: u32 = 3;
/// Only rules younger than this are credited or reverted.
const ACCOUNTING_WINDOW_HOURS: i64 = 24;

/// Patch fragments that are never accepted, serialized form matched
/// case-insensitively.
const DENYLIST: &[&str] = &[
    "rm -rf",
    "mkfs",
    "dd if=",
    ":(){",
    "del /f",
    "disable_self_preservation",
    "disable_death_recovery",
    "disable_watchdog",
    "allow_destructive_commands",
];

/// Per-source accounting the engine maintains across reverts.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SourceStats {
    /// Reliability score; reverts cost 2 each.
    pub instruction_reliability: i32,
    /// How many of this source's rules were reverted.
    pub reverted_rules: u32,
}

impl Default for SourceStats {
    fn default() -> Self {
        Self {
            instruction_reliability: 10,
            reverted_rules: 0,
        }
    }
}

struct Accounting {
    consecutive_negatives: u32,
    credits: HashMap<String, u32>,
}

/// The behavior rule engine. Single writer, many readers; policy
/// getters see a consistent snapshot per call.
pub struct BehaviorEngine {
    bus: SignalBus,
    rules: RwLock<Vec<BehaviorRule>>,
    sources: RwLock<HashMap<String, SourceStats>>,
    accounting: Mutex<Accounting>,
    next_id: AtomicU64,
}

impl BehaviorEngine {
    /// Create an empty engine publishing rule events to `bus`.
    #[must_use]
    pub fn new(bus: SignalBus) -> Self {
        Self {
            bus,
            rules: RwLock::new(Vec::new()),
            sources: RwLock::new(HashMap::new()),
            accounting: Mutex::new(Accounting {
                consecutive_negatives: 0,
                credits: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Compile a spec into a rule under a fresh id. `trust` sets the
    /// recorded score and thereby the TTL.
    pub fn compile_rule(&self, spec: RuleSpec, source: &str, trust: i32) -> BehaviorRule {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("rule_{}_{seq}", Utc::now().timestamp_millis());
        rule::compile(spec, id, source, trust)
    }

    /// Insert a rule, keeping the list sorted by descending priority.
    /// Returns `None` — and leaves the list unchanged — when the
    /// serialized patch matches the safety denylist.
    pub fn add_rule(&self, rule: BehaviorRule) -> Option<String> {
        let serialized = rule.action_patch.to_string().to_lowercase();
        if let Some(token) = DENYLIST.iter().find(|t| serialized.contains(*t)) {
            tracing::warn!(rule = %rule.id, token, "rule rejected by safety filter");
            return None;
        }
        let id = rule.id.clone();
        {
            let mut rules = self.rules.write().unwrap();
            let at = rules
                .iter()
                .position(|r| r.priority < rule.priority)
                .unwrap_or(rules.len());
            rules.insert(at, rule);
        }
        self.bus.publish(Signal::RuleLearned, json!({ "rule_id": id }));
        Some(id)
    }

    /// Compile and insert in one step, at the source's current trust.
    pub fn learn(&self, spec: RuleSpec, source: &str) -> Option<String> {
        let rule = self.compile_rule(spec, source, self.trust_of(source));
        self.add_rule(rule)
    }

    /// Current trust score for a source.
    #[must_use]
    pub fn trust_of(&self, source: &str) -> i32 {
        self.sources
            .read()
            .unwrap()
            .get(source)
            .copied()
            .unwrap_or_default()
            .instruction_reliability
    }

    /// Accounting stats for a source.
    #[must_use]
    pub fn source_stats(&self, source: &str) -> SourceStats {
        self.sources
            .read()
            .unwrap()
            .get(source)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of every stored rule (live and not).
    #[must_use]
    pub fn export_rules(&self) -> Vec<BehaviorRule> {
        self.rules.read().unwrap().clone()
    }

    /// Replace the store with previously persisted rules, dropping
    /// anything already expired and restoring the priority sort.
    pub fn import_rules(&self, mut rules: Vec<BehaviorRule>) {
        let now = Utc::now();
        rules.retain(|r| r.is_live(now));
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        *self.rules.write().unwrap() = rules;
    }

    /// Number of live rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().unwrap().len()
    }

    /// Retire expired rules. Runs on the pruning timer.
    pub fn prune(&self) {
        let now = Utc::now();
        let mut rules = self.rules.write().unwrap();
        let before = rules.len();
        rules.retain(|r| r.is_live(now));
        let removed = before - rules.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned expired rules");
        }
    }

    /// Drive the 60-second pruning timer until `shutdown` fires.
    pub async fn run_pruning(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(PRUNE_PERIOD);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => self.prune(),
            }
        }
    }

    // --- Policy merging ---

    /// The combat policy: defaults plus every active matching patch's
    /// `combat` subtree, merged in ascending priority order so the
    /// highest-priority rule has the final word.
    #[must_use]
    pub fn combat_policy(&self, ctx: &serde_json::Value) -> serde_json::Value {
        let mut policy = json!({
            "retreatHealth": 6.0,
            "shield": true,
            "totemThreshold": 10.0,
            "engageRange": 8.0,
        });
        self.merge_domain(&mut policy, "combat", ctx, None);
        policy
    }

    /// The self-preservation policy under the same merge rules.
    #[must_use]
    pub fn self_preservation_policy(&self, ctx: &serde_json::Value) -> serde_json::Value {
        let mut policy = json!({
            "autoEat": true,
            "autoEatStart": 14.0,
            "fleeOnCritical": true,
        });
        self.merge_domain(&mut policy, "selfPreservation", ctx, None);
        policy
    }

    /// Apply action policy to dispatch params. Returns the merged
    /// params, or an error when a matching patch blocks the action.
    pub fn apply_action_policy(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        let mut merged = params;
        let ctx = json!({});
        self.merge_domain(&mut merged, "actions", &ctx, Some(action));
        if merged.get("blocked").and_then(serde_json::Value::as_bool) == Some(true) {
            return Err(format!("Action blocked by behavior rule: {action}"));
        }
        Ok(merged)
    }

    /// Merge every live matching rule's patch subtree for `domain` into
    /// `target`, lowest priority first.
    fn merge_domain(
        &self,
        target: &mut serde_json::Value,
        domain: &str,
        ctx: &serde_json::Value,
        action: Option<&str>,
    ) {
        let now = Utc::now();
        let rules = self.rules.read().unwrap();
        // Stored descending; apply ascending so higher priority wins.
        for rule in rules.iter().rev() {
            if !rule.is_live(now) || !Self::condition_matches(rule, ctx, action) {
                continue;
            }
            let subtree = match action {
                Some(name) => rule
                    .action_patch
                    .get(domain)
                    .and_then(|actions| actions.get(name)),
                None => rule.action_patch.get(domain),
            };
            if let Some(patch) = subtree {
                deep_merge(target, patch);
            }
        }
    }

    fn condition_matches(
        rule: &BehaviorRule,
        ctx: &serde_json::Value,
        action: Option<&str>,
    ) -> bool {
        match rule.condition.trigger {
            RuleTrigger::Always => true,
            RuleTrigger::HealthBelow => {
                let health = ctx.get("health").and_then(serde_json::Value::as_f64);
                match (health, rule.condition.value) {
                    (Some(h), Some(threshold)) => h < threshold,
                    _ => false,
                }
            }
            RuleTrigger::Action => match action {
                Some(name) => rule.condition.domain == "*" || rule.condition.domain == name,
                None => false,
            },
        }
    }

    // --- Outcome accounting ---

    /// Subscribe the engine's accounting to bus events. Call once at
    /// boot with the engine already in an `Arc`.
    pub fn wire_accounting(self: &Arc<Self>, bus: &SignalBus) {
        for signal in [Signal::TaskCompleted] {
            let engine = Arc::clone(self);
            bus.subscribe(signal, move |_| {
                let engine = Arc::clone(&engine);
                async move {
                    engine.on_positive_event();
                    Ok(())
                }
            });
        }
        for signal in [Signal::TaskFailed, Signal::ActionFailed, Signal::Death] {
            let engine = Arc::clone(self);
            bus.subscribe(signal, move |_| {
                let engine = Arc::clone(&engine);
                async move {
                    engine.on_negative_event();
                    Ok(())
                }
            });
        }
    }

    /// Credit the most recent young rule and reset the negative streak.
    pub fn on_positive_event(&self) {
        let mut accounting = self.accounting.lock().unwrap();
        accounting.consecutive_negatives = 0;
        if let Some(id) = self.most_recent_young_rule() {
            *accounting.credits.entry(id).or_insert(0) += 1;
        }
    }

    /// Count a negative event; at three in a row, revert the most
    /// recent young rule.
    pub fn on_negative_event(&self) {
        let should_revert = {
            let mut accounting = self.accounting.lock().unwrap();
            accounting.consecutive_negatives += 1;
            if accounting.consecutive_negatives >= REVERT_AFTER_NEGATIVES {
                accounting.consecutive_negatives = 0;
                true
            } else {
                false
            }
        };
        if should_revert
            && let Some(id) = self.most_recent_young_rule()
        {
            self.revert_rule(&id);
        }
    }

    /// Credits accumulated for a rule.
    #[must_use]
    pub fn credits_of(&self, rule_id: &str) -> u32 {
        self.accounting
            .lock()
            .unwrap()
            .credits
            .get(rule_id)
            .copied()
            .unwrap_or(0)
    }

    fn most_recent_young_rule(&self) -> Option<String> {
        let now = Utc::now();
        let window = ChronoDuration::hours(ACCOUNTING_WINDOW_HOURS);
        self.rules
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.is_live(now) && now - r.created_at < window)
            .max_by_key(|r| r.created_at)
            .map(|r| r.id.clone())
    }

    /// Deactivate and remove a rule, debiting its source.
    pub fn revert_rule(&self, rule_id: &str) {
        let source = {
            let mut rules = self.rules.write().unwrap();
            let Some(pos) = rules.iter().position(|r| r.id == rule_id) else {
                return;
            };
            let mut rule = rules.remove(pos);
            rule.active = false;
            rule.source_player
        };
        {
            let mut sources = self.sources.write().unwrap();
            let stats = sources.entry(source.clone()).or_default();
            stats.instruction_reliability -= 2;
            stats.reverted_rules += 1;
        }
        tracing::info!(rule = %rule_id, source = %source, "rule reverted");
        self.bus
            .publish(Signal::RuleReverted, json!({ "rule_id": rule_id }));
    }

    // --- Persistence ---

    /// Write the rule set to `path` as pretty-printed JSON.
    pub async fn save_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        let rules = self.export_rules();
        let text = serde_json::to_string_pretty(&rules)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, text).await
    }

    /// Load a previously saved rule set. A missing file is an empty set.
    pub async fn load_from(&self, path: &std::path::Path) -> std::io::Result<()> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let rules: Vec<BehaviorRule> = serde_json::from_str(&text)?;
                self.import_rules(rules);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleCondition;

    fn engine() -> BehaviorEngine {
        BehaviorEngine::new(SignalBus::new())
    }

    fn blocked_mine_spec(priority: i32) -> RuleSpec {
        RuleSpec {
            intent: "stop mining".into(),
            source_text: "stop mining".into(),
            scope: "global".into(),
            condition: RuleCondition {
                domain: "mine".into(),
                trigger: RuleTrigger::Action,
                value: None,
            },
            action_patch: json!({"actions": {"mine": {"blocked": true}}}),
            priority,
        }
    }

    #[tokio::test]
    async fn denylisted_patch_is_rejected() {
        let engine = engine();
        let mut spec = blocked_mine_spec(10);
        spec.action_patch = json!({"actions": {"mine": {"cmd": "rm -rf /world"}}});
        let rule = engine.compile_rule(spec, "mallory", 5);
        assert!(engine.add_rule(rule).is_none());
        assert_eq!(engine.rule_count(), 0);

        let mut spec = blocked_mine_spec(10);
        spec.action_patch = json!({"combat": {"disable_self_preservation": true}});
        let rule = engine.compile_rule(spec, "mallory", 5);
        assert!(engine.add_rule(rule).is_none());
        assert_eq!(engine.rule_count(), 0);
    }

    #[tokio::test]
    async fn action_policy_blocks_action() {
        let engine = engine();
        engine.learn(blocked_mine_spec(90), "alice").unwrap();
        let err = engine
            .apply_action_policy("mine", json!({"targetBlock": "stone"}))
            .unwrap_err();
        assert!(err.to_lowercase().contains("blocked"));
        // Other actions are untouched.
        let ok = engine
            .apply_action_policy("craft", json!({"recipe": "stick"}))
            .unwrap();
        assert_eq!(ok, json!({"recipe": "stick"}));
    }

    #[tokio::test]
    async fn higher_priority_rule_wins_merge() {
        let engine = engine();
        let mut low = blocked_mine_spec(10);
        low.condition = RuleCondition {
            domain: "combat".into(),
            trigger: RuleTrigger::Always,
            value: None,
        };
        low.action_patch = json!({"combat": {"retreatHealth": 9.0}});
        let mut high = low.clone();
        high.priority = 80;
        high.action_patch = json!({"combat": {"retreatHealth": 11.0}});
        engine.learn(low, "alice").unwrap();
        engine.learn(high, "bob").unwrap();

        let policy = engine.combat_policy(&json!({}));
        assert_eq!(policy["retreatHealth"], 11.0);
        assert_eq!(policy["shield"], true);
    }

    #[tokio::test]
    async fn health_below_trigger_gates_on_ctx() {
        let engine = engine();
        let mut spec = blocked_mine_spec(10);
        spec.condition = RuleCondition {
            domain: "combat".into(),
            trigger: RuleTrigger::HealthBelow,
            value: Some(8.0),
        };
        spec.action_patch = json!({"combat": {"retreatHealth": 12.0}});
        engine.learn(spec, "alice").unwrap();

        let healthy = engine.combat_policy(&json!({"health": 18.0}));
        assert_eq!(healthy["retreatHealth"], 6.0);
        let hurt = engine.combat_policy(&json!({"health": 5.0}));
        assert_eq!(hurt["retreatHealth"], 12.0);
    }

    #[tokio::test]
    async fn self_preservation_policy_merges_patches() {
        let engine = engine();
        let mut spec = blocked_mine_spec(20);
        spec.condition = RuleCondition {
            domain: "selfPreservation".into(),
            trigger: RuleTrigger::Always,
            value: None,
        };
        spec.action_patch = json!({"selfPreservation": {"autoEatStart": 16.0}});
        engine.learn(spec, "alice").unwrap();

        let policy = engine.self_preservation_policy(&json!({}));
        assert_eq!(policy["autoEatStart"], 16.0);
        assert_eq!(policy["autoEat"], true);
        assert_eq!(policy["fleeOnCritical"], true);
    }

    #[tokio::test]
    async fn three_negatives_revert_most_recent_rule() {
        let engine = Arc::new(engine());
        let id = engine.learn(blocked_mine_spec(10), "alice").unwrap();
        engine.on_negative_event();
        engine.on_negative_event();
        assert_eq!(engine.rule_count(), 1);
        engine.on_negative_event();
        assert_eq!(engine.rule_count(), 0);
        let stats = engine.source_stats("alice");
        assert_eq!(stats.instruction_reliability, 8);
        assert_eq!(stats.reverted_rules, 1);
        assert_eq!(engine.credits_of(&id), 0);
    }

    #[tokio::test]
    async fn positive_event_resets_streak_and_credits() {
        let engine = engine();
        let id = engine.learn(blocked_mine_spec(10), "alice").unwrap();
        engine.on_negative_event();
        engine.on_negative_event();
        engine.on_positive_event();
        engine.on_negative_event();
        engine.on_negative_event();
        assert_eq!(engine.rule_count(), 1);
        assert_eq!(engine.credits_of(&id), 1);
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("behavior_rules.json");
        let engine = engine();
        engine.learn(blocked_mine_spec(42), "alice").unwrap();
        engine.save_to(&path).await.unwrap();

        let restored = BehaviorEngine::new(SignalBus::new());
        restored.load_from(&path).await.unwrap();
        assert_eq!(restored.export_rules(), engine.export_rules());
    }
}
