//! Rule records and compilation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default rule time-to-live.
pub const DEFAULT_TTL_HOURS: i64 = 12;
/// Extended TTL for rules from highly trusted sources.
pub const TRUSTED_TTL_DAYS: i64 = 7;
/// Trust score at which the extended TTL applies.
pub const TRUSTED_SCORE: i32 = 25;

/// When a rule's patch applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTrigger {
    /// Applies to every matching policy query.
    Always,
    /// Applies while health is below `condition.value`.
    HealthBelow,
    /// Applies to action-policy queries whose action matches
    /// `condition.domain`.
    Action,
}

/// The match condition on a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    /// Domain selector: a policy domain (`combat`, `selfPreservation`)
    /// or an action name for `Action` triggers. `*` matches anything.
    pub domain: String,
    /// Trigger kind.
    pub trigger: RuleTrigger,
    /// Numeric threshold for `HealthBelow`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// A compiled behavior rule. Field names match the persisted
/// `behavior_rules.json` schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorRule {
    /// Unique id.
    pub id: String,
    /// Short statement of what the rule is for.
    pub intent: String,
    /// The instruction text the rule was compiled from.
    pub source_text: String,
    /// Who issued the instruction.
    pub source_player: String,
    /// Trust score of the source at compile time.
    pub trust_score: i32,
    /// Scope tag, e.g. `global` or a place name.
    pub scope: String,
    /// When the patch applies.
    pub condition: RuleCondition,
    /// The policy patch, deep-merged into matching policy queries.
    pub action_patch: serde_json::Value,
    /// Merge order: higher priority is applied first.
    pub priority: i32,
    /// Compile time.
    pub created_at: DateTime<Utc>,
    /// Expiry; the pruning timer retires the rule after this.
    pub expires_at: DateTime<Utc>,
    /// Schema version of this record.
    pub version: u32,
    /// Cleared when the rule is reverted or expired.
    pub active: bool,
}

impl BehaviorRule {
    /// Whether the rule may still be applied at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at > now
    }
}

/// Caller-facing rule specification handed to
/// [`crate::BehaviorEngine::compile_rule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Short statement of what the rule is for.
    pub intent: String,
    /// The instruction text the rule was compiled from.
    #[serde(default)]
    pub source_text: String,
    /// Scope tag; defaults to `global`.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// When the patch applies.
    pub condition: RuleCondition,
    /// The policy patch.
    pub action_patch: serde_json::Value,
    /// Merge priority.
    #[serde(default)]
    pub priority: i32,
}

fn default_scope() -> String {
    "global".to_string()
}

/// Build a rule from a spec. The TTL is 12 hours, or 7 days when the
/// source's trust is at least [`TRUSTED_SCORE`].
#[must_use]
pub fn compile(spec: RuleSpec, id: String, source: &str, trust: i32) -> BehaviorRule {
    let now = Utc::now();
    let ttl = if trust >= TRUSTED_SCORE {
        Duration::days(TRUSTED_TTL_DAYS)
    } else {
        Duration::hours(DEFAULT_TTL_HOURS)
    };
    BehaviorRule {
        id,
        intent: spec.intent,
        source_text: spec.source_text,
        source_player: source.to_string(),
        trust_score: trust,
        scope: spec.scope,
        condition: spec.condition,
        action_patch: spec.action_patch,
        priority: spec.priority,
        created_at: now,
        expires_at: now + ttl,
        version: 1,
        active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> RuleSpec {
        RuleSpec {
            intent: "avoid mining at night".into(),
            source_text: "don't mine at night".into(),
            scope: "global".into(),
            condition: RuleCondition {
                domain: "mine".into(),
                trigger: RuleTrigger::Action,
                value: None,
            },
            action_patch: json!({"actions": {"mine": {"blocked": true}}}),
            priority: 50,
        }
    }

    #[test]
    fn trusted_sources_get_long_ttl() {
        let casual = compile(spec(), "r1".into(), "alice", 5);
        let trusted = compile(spec(), "r2".into(), "bob", 30);
        assert!(trusted.expires_at - trusted.created_at > casual.expires_at - casual.created_at);
        assert_eq!(
            casual.expires_at - casual.created_at,
            Duration::hours(DEFAULT_TTL_HOURS)
        );
    }

    #[test]
    fn persisted_field_names_are_camel_case() {
        let rule = compile(spec(), "r1".into(), "alice", 5);
        let v = serde_json::to_value(&rule).unwrap();
        assert!(v.get("sourcePlayer").is_some());
        assert!(v.get("trustScore").is_some());
        assert!(v.get("actionPatch").is_some());
        assert!(v.get("createdAt").is_some());
        assert!(v.get("expiresAt").is_some());
    }

    #[test]
    fn round_trip_preserves_rule() {
        let rule = compile(spec(), "r1".into(), "alice", 5);
        let text = serde_json::to_string_pretty(&rule).unwrap();
        let back: BehaviorRule = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rule);
    }
}
