//! Dispatch-level integration: normalization, policy, retries, chains.

use cortex_action::{ActionContext, ActionRegistry, ChainExecutor, ChainStep, Dispatcher};
use cortex_core::test_utils::{FnSkill, InMemorySkills, SimAdapter, SimWorld};
use cortex_core::{AgentConfig, Directive, GameAdapter, SkillRegistry, Vec3};
use cortex_kernel::{Blackboard, LockManager, SignalBus};
use cortex_rules::{BehaviorEngine, RuleCondition, RuleSpec, RuleTrigger};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Rig {
    adapter: Arc<SimAdapter>,
    skills: Arc<InMemorySkills>,
    rules: Arc<BehaviorEngine>,
    blackboard: Arc<Blackboard>,
    dispatcher: Arc<Dispatcher>,
}

fn rig(world: SimWorld) -> Rig {
    let adapter = Arc::new(SimAdapter::new(world));
    let bus = SignalBus::new();
    let blackboard = Arc::new(Blackboard::new());
    let skills = Arc::new(InMemorySkills::new());
    let rules = Arc::new(BehaviorEngine::new(bus.clone()));
    let ctx = ActionContext {
        adapter: Arc::clone(&adapter) as Arc<dyn GameAdapter>,
        blackboard: Arc::clone(&blackboard),
        locks: LockManager::new(),
        bus: bus.clone(),
        config: AgentConfig::default(),
        cancel: CancellationToken::new(),
    };
    let dispatcher = Arc::new(Dispatcher::new(
        ActionRegistry::standard(),
        Arc::clone(&rules),
        Arc::clone(&skills) as Arc<dyn SkillRegistry>,
        bus,
        ctx,
    ));
    Rig {
        adapter,
        skills,
        rules,
        blackboard,
        dispatcher,
    }
}

fn directive(action_type: &str, params: Value) -> Directive {
    Directive {
        action_type: action_type.to_string(),
        params,
        action_id: None,
    }
}

// Ensure-item craft chain: three oak logs become four planks through
// the first available plank recipe.
#[tokio::test]
async fn ensure_item_crafts_planks_end_to_end() {
    let mut world = SimWorld::default();
    world.give("oak_log", 3);
    let rig = rig(world);

    let outcome = rig
        .dispatcher
        .dispatch(&directive(
            "ensure-item",
            json!({"itemName": "planks", "targetCount": 4}),
        ))
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.data["item"], "planks");
    assert!(outcome.data["count"].as_u64().unwrap() >= 4);
    rig.adapter
        .with_world(|w| assert_eq!(w.crafted[0].0, "oak_planks"));
}

// A rule patching `actions.mine.blocked` turns mine dispatches into
// policy-block outcomes.
#[tokio::test]
async fn policy_blocked_action_fails_without_retry() {
    let mut world = SimWorld::default();
    world.blocks.push(cortex_core::Block {
        name: "stone".into(),
        position: Vec3::new(2.0, 63.0, 0.0),
        solid: true,
    });
    let rig = rig(world);
    rig.rules
        .learn(
            RuleSpec {
                intent: "no mining".into(),
                source_text: "stop mining".into(),
                scope: "global".into(),
                condition: RuleCondition {
                    domain: "mine".into(),
                    trigger: RuleTrigger::Action,
                    value: None,
                },
                action_patch: json!({"actions": {"mine": {"blocked": true}}}),
                priority: 90,
            },
            "alice",
        )
        .unwrap();

    let outcome = rig
        .dispatcher
        .dispatch(&directive("mine", json!({"targetBlock": "stone"})))
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.action, "mine");
    assert!(outcome.error.unwrap().to_lowercase().contains("blocked"));
    rig.adapter.with_world(|w| assert!(w.digs.is_empty()));
}

// Positional callers go through the adapter table.
#[tokio::test]
async fn positional_params_are_adapted() {
    let mut world = SimWorld::default();
    world.give("oak_log", 2);
    let rig = rig(world);
    let outcome = rig
        .dispatcher
        .dispatch(&directive("craft", json!(["oak_planks", 4])))
        .await;
    assert!(outcome.success, "{:?}", outcome.error);
    rig.adapter
        .with_world(|w| assert!(w.count_of("oak_planks") >= 4));
}

#[tokio::test]
async fn unknown_type_reports_unknown_action() {
    let rig = rig(SimWorld::default());
    let outcome = rig
        .dispatcher
        .dispatch(&directive("teleport", json!({})))
        .await;
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Unknown action type: teleport")
    );
}

#[tokio::test]
async fn unknown_type_falls_back_to_skill_registry() {
    let rig = rig(SimWorld::default());
    rig.skills.register(Arc::new(FnSkill::new("wave", |params| {
        Ok(json!({"waved_at": params["target"]}))
    })));
    let outcome = rig
        .dispatcher
        .dispatch(&directive("wave", json!({"target": "alice"})))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.data["waved_at"], "alice");
}

// Boundary: move-to with a 1 ms budget and no retries fails fast with
// a timeout error.
#[tokio::test]
async fn move_to_with_tiny_timeout_fails_fast() {
    let mut world = SimWorld::default();
    world.goto_delay = Some(std::time::Duration::from_millis(200));
    let rig = rig(world);
    let outcome = rig
        .dispatcher
        .dispatch(&directive(
            "move-to",
            json!({
                "position": {"x": 4.0, "y": 64.0, "z": 4.0},
                "options": {"timeoutMs": 1, "retries": 0}
            }),
        ))
        .await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("timeout"));
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.duration_ms < 100);
}

// Executor override reroutes a primitive to a skill, and outcome
// accounting stays per-dispatch idempotent.
#[tokio::test]
async fn executor_override_routes_to_skill_and_counts_once() {
    let rig = rig(SimWorld::default());
    rig.skills
        .register(Arc::new(FnSkill::new("custom_miner", |_| {
            Ok(json!({"mined": 1}))
        })));
    for _ in 0..3 {
        let outcome = rig
            .dispatcher
            .dispatch(&directive(
                "mine",
                json!({"targetBlock": "stone", "executor": "custom_miner"}),
            ))
            .await;
        assert!(outcome.success);
    }
    let stats = rig.dispatcher.stats().get("custom_miner");
    assert_eq!(stats.successes, 3);
    assert_eq!(stats.failures, 0);
}

// Evolution-engine overrides feed retry knobs ahead of defaults.
#[tokio::test]
async fn override_table_raises_retries() {
    let mut world = SimWorld::default();
    world.fail_goto = Some("path blocked".into());
    let rig = rig(world);
    rig.dispatcher
        .overrides()
        .set_override("move-to", json!({"retries": 3, "baseDelay": 1}));
    let outcome = rig
        .dispatcher
        .dispatch(&directive(
            "move-to",
            json!({"position": {"x": 1.0, "y": 64.0, "z": 1.0}}),
        ))
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.retries_used, 3);
}

// Chain with a blackboard variable: step b receives the stored home
// position through `${h}`.
#[tokio::test]
async fn chain_resolves_blackboard_variable() {
    let rig = rig(SimWorld::default());
    rig.blackboard
        .set("pos.home", json!({"x": 10.0, "y": 64.0, "z": 10.0}), "test");
    let executor = ChainExecutor::new(
        Arc::clone(&rig.dispatcher),
        Arc::clone(&rig.skills) as Arc<dyn SkillRegistry>,
        Arc::clone(&rig.blackboard),
    );

    let chain: Vec<ChainStep> = serde_json::from_value(json!([
        {"id": "a", "kind": "blackboard-op", "op": "read", "name": "pos.home", "store_as": "h"},
        {"id": "b", "kind": "primitive", "name": "move-to", "params": {"position": "${h}"}}
    ]))
    .unwrap();

    let result = executor.execute_chain(&chain, &json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.history.len(), 2);
    rig.adapter.with_world(|w| {
        assert_eq!(w.gotos, vec![Vec3::new(10.0, 64.0, 10.0)]);
    });
}

// Chain halts at the failing stage and reports it; local memory stays
// chain-private.
#[tokio::test]
async fn chain_halts_with_stage_and_isolates_memory() {
    let rig = rig(SimWorld::default());
    let executor = Arc::new(ChainExecutor::new(
        Arc::clone(&rig.dispatcher),
        Arc::clone(&rig.skills) as Arc<dyn SkillRegistry>,
        Arc::clone(&rig.blackboard),
    ));

    let chain: Vec<ChainStep> = serde_json::from_value(json!([
        {"id": "seed", "kind": "blackboard-op", "op": "read", "name": "missing.key", "store_as": "x"},
        {"id": "boom", "kind": "primitive", "name": "eat", "params": {}},
        {"id": "after", "kind": "wait", "params": {"ms": 1}}
    ]))
    .unwrap();

    // No food in the world: `eat` fails, the chain halts at `boom`.
    let result = executor.execute_chain(&chain, &json!({"token": "one"})).await;
    assert!(!result.success);
    assert_eq!(result.stage.as_deref(), Some("boom"));
    assert_eq!(result.history.len(), 2);

    // A sibling chain sees none of the first chain's locals.
    let probe: Vec<ChainStep> = serde_json::from_value(json!([
        {"id": "p", "kind": "wait", "params": {"ms": "${token}"}}
    ]))
    .unwrap();
    let sibling = executor.execute_chain(&probe, &json!({})).await;
    // `${token}` must be unresolved here — the wait falls back to the
    // 1000 ms default rather than the sibling's value.
    assert!(sibling.success);
    assert_eq!(sibling.history[0].data["waited_ms"], 1000);
}

// Conditions skip steps without failing the chain.
#[tokio::test]
async fn false_condition_skips_step() {
    let rig = rig(SimWorld::default());
    rig.blackboard.set("status.health", json!(18.0), "test");
    let executor = ChainExecutor::new(
        Arc::clone(&rig.dispatcher),
        Arc::clone(&rig.skills) as Arc<dyn SkillRegistry>,
        Arc::clone(&rig.blackboard),
    );
    let chain: Vec<ChainStep> = serde_json::from_value(json!([
        {
            "id": "heal",
            "kind": "primitive",
            "name": "eat",
            "params": {},
            "condition": {"left": "${BB.status.health}", "op": "<", "right": 8}
        }
    ]))
    .unwrap();
    let result = executor.execute_chain(&chain, &json!({})).await;
    assert!(result.success);
    assert!(result.history[0].skipped);
}
