//! End-to-end scenarios against the assembled agent.

use cortex::prelude::*;
use cortex_core::test_utils::{
    InMemorySkills, RecordingMemory, ScriptedModel, SimAdapter, SimWorld, StaticSandbox,
};
use cortex_core::{Entity, GameEvent};
use cortex_rules::{RuleCondition, RuleTrigger};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct World {
    adapter: Arc<SimAdapter>,
    model: Arc<ScriptedModel>,
    skills: Arc<InMemorySkills>,
    agent: Arc<Agent>,
}

fn world(sim: SimWorld) -> World {
    let adapter = Arc::new(SimAdapter::new(sim));
    let model = Arc::new(ScriptedModel::new());
    let skills = Arc::new(InMemorySkills::new());
    let ports = AgentPorts {
        adapter: Arc::clone(&adapter) as Arc<dyn GameAdapter>,
        language_model: Arc::clone(&model) as Arc<dyn LanguageModel>,
        language_model_factory: None,
        sandbox: Arc::new(StaticSandbox::new()),
        memory: Arc::new(RecordingMemory::new()),
        skills: Arc::clone(&skills) as Arc<dyn SkillRegistry>,
    };
    let agent = Agent::new(ports, cortex_core::AgentConfig::default(), None);
    World {
        adapter,
        model,
        skills,
        agent,
    }
}

fn zombie(id: u64, x: f64) -> Entity {
    Entity {
        id,
        kind: "zombie".into(),
        position: Vec3::new(x, 64.0, 0.0),
        velocity: Vec3::default(),
        hostile: true,
        alive: true,
        fused: false,
    }
}

// S1: inventory {oak_log: 3}; ensure-item(planks, 4) crafts oak planks.
#[tokio::test]
async fn s1_ensure_item_craft_chain() {
    let mut sim = SimWorld::default();
    sim.give("oak_log", 3);
    let w = world(sim);
    w.agent.boot().await.unwrap();

    let outcome = w
        .agent
        .dispatcher()
        .dispatch(&Directive {
            action_type: "ensure-item".into(),
            params: json!({"itemName": "planks", "targetCount": 4}),
            action_id: None,
        })
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.data["item"], "planks");
    assert!(outcome.data["count"].as_u64().unwrap() >= 4);
    w.adapter
        .with_world(|sim| assert_eq!(sim.crafted[0].0, "oak_planks"));
    w.agent.shutdown().await.unwrap();
}

// S2: a priority-90 rule blocking mine turns dispatches into failures.
#[tokio::test]
async fn s2_policy_blocked_action() {
    let w = world(SimWorld::default());
    w.agent.boot().await.unwrap();
    w.agent
        .rules()
        .learn(
            RuleSpec {
                intent: "protect the landscape".into(),
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

    let outcome = w
        .agent
        .dispatcher()
        .dispatch(&Directive {
            action_type: "mine".into(),
            params: json!({"targetBlock": "stone"}),
            action_id: None,
        })
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.action, "mine");
    assert!(outcome.error.unwrap().to_lowercase().contains("blocked"));
    w.agent.shutdown().await.unwrap();
}

// S3: at health 5 in ENGAGE with a target at distance 3, the reflex
// retreats within a tick and settles back to IDLE.
#[tokio::test]
async fn s3_combat_retreat_on_low_hp() {
    let mut sim = SimWorld::default();
    sim.status.health = 5.0;
    sim.entities.push(zombie(7, 3.0));
    let w = world(sim);
    w.agent.boot().await.unwrap();

    w.agent
        .handle_event(GameEvent::EntityHurt {
            amount: 6.0,
            attacker: Some(7),
        })
        .await;

    // The 50 ms reflex loop does the rest.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(w.agent.combat().retreats(), 1);
    assert_eq!(w.agent.combat().state(), CombatState::Idle);
    w.agent.shutdown().await.unwrap();
}

// S4: a task failure produces a snapshot and a prefixed fix skill;
// repeating the same failure short-circuits the model.
#[tokio::test]
async fn s4_failure_drives_evolution() {
    let w = world(SimWorld::default());
    w.agent.boot().await.unwrap();
    w.model
        .push_coding(r#"{"thought": "craft a bucket first", "code": "ensure bucket"}"#);

    let payload = json!({"task": {"name": "gather_water"}, "error": "No water bucket"});
    w.agent.bus().publish(Signal::TaskFailed, payload.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let names = w.skills.discover_skills();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("gather_water"));
    assert_eq!(w.model.coding_calls(), 1);

    w.agent.bus().publish(Signal::TaskFailed, payload);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(w.model.coding_calls(), 1, "second failure must short-circuit");
    w.agent.shutdown().await.unwrap();
}

// S5: a chain reads pos.home into `h` and hands it to move-to.
#[tokio::test]
async fn s5_chain_with_variable() {
    let w = world(SimWorld::default());
    w.agent.boot().await.unwrap();
    w.agent
        .blackboard()
        .set("pos.home", json!({"x": 10.0, "y": 64.0, "z": 10.0}), "test");

    let chain: Vec<ChainStep> = serde_json::from_value(json!([
        {"id": "a", "kind": "blackboard-op", "op": "read", "name": "pos.home", "store_as": "h"},
        {"id": "b", "kind": "primitive", "name": "move-to", "params": {"position": "${h}"}}
    ]))
    .unwrap();

    let result = w.agent.chains().execute_chain(&chain, &json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.history.len(), 2);
    w.adapter.with_world(|sim| {
        assert_eq!(sim.gotos, vec![Vec3::new(10.0, 64.0, 10.0)]);
    });
    w.agent.shutdown().await.unwrap();
}

// S6: a task that never yields its token is terminated by the watchdog
// with TIMEOUT_AUTO_HEALED after its age limit.
#[tokio::test(start_paused = true)]
async fn s6_task_watchdog_heals_stuck_task() {
    let w = world(SimWorld::default());
    // No boot: drive the scheduler deterministically, as the tick loop
    // would, without the other paused-time loops in play.
    let reasons = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let reasons = Arc::clone(&reasons);
        w.agent.bus().subscribe(Signal::TaskFailed, move |ev| {
            let reasons = Arc::clone(&reasons);
            async move {
                reasons
                    .lock()
                    .unwrap()
                    .push(ev.payload["reason"].as_str().unwrap_or("").to_string());
                Ok(())
            }
        });
    }

    w.agent
        .scheduler()
        .submit(TaskSpec::new("stuck", Priority::Normal, |_| async {
            std::future::pending::<()>().await;
            Ok(json!({}))
        }));
    w.agent.scheduler().tick();
    assert_eq!(w.agent.scheduler().active_count(), 1);

    tokio::time::advance(Duration::from_secs(121)).await;
    w.agent.scheduler().tick();
    tokio::time::advance(Duration::from_secs(3)).await;
    w.agent.scheduler().tick();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(w.agent.scheduler().active_count(), 0);
    assert_eq!(&*reasons.lock().unwrap(), &["TIMEOUT_AUTO_HEALED".to_string()]);
}
