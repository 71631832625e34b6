//! Property tests for rule serialization under the pruning policy.

use cortex_kernel::SignalBus;
use cortex_rules::{BehaviorEngine, RuleCondition, RuleSpec, RuleTrigger};
use proptest::prelude::*;

fn spec(intent: String, priority: i32) -> RuleSpec {
    RuleSpec {
        intent,
        source_text: "prop".into(),
        scope: "global".into(),
        condition: RuleCondition {
            domain: "combat".into(),
            trigger: RuleTrigger::Always,
            value: None,
        },
        action_patch: serde_json::json!({"combat": {"engageRange": 7.0}}),
        priority,
    }
}

proptest! {
    // serialize → reload → deserialize yields an equal rule set.
    #[test]
    fn rule_set_survives_json_round_trip(
        intents in prop::collection::vec("[a-z ]{1,24}", 1..6),
        priorities in prop::collection::vec(-100i32..100, 1..6),
    ) {
        let engine = BehaviorEngine::new(SignalBus::new());
        for (intent, priority) in intents.iter().zip(priorities.iter()) {
            engine.learn(spec(intent.clone(), *priority), "prop").unwrap();
        }
        let exported = engine.export_rules();

        let text = serde_json::to_string_pretty(&exported).unwrap();
        let reloaded = BehaviorEngine::new(SignalBus::new());
        reloaded.import_rules(serde_json::from_str(&text).unwrap());

        prop_assert_eq!(reloaded.export_rules(), exported);
    }

    // Priority order is maintained on insert regardless of insert order.
    #[test]
    fn rules_stay_priority_sorted(
        priorities in prop::collection::vec(-100i32..100, 1..10),
    ) {
        let engine = BehaviorEngine::new(SignalBus::new());
        for (i, priority) in priorities.iter().enumerate() {
            engine.learn(spec(format!("rule {i}"), *priority), "prop").unwrap();
        }
        let actual: Vec<i32> = engine.export_rules().iter().map(|r| r.priority).collect();
        let mut sorted = actual.clone();
        sorted.sort_by_key(|p| std::cmp::Reverse(*p));
        prop_assert_eq!(actual, sorted);
    }
}
