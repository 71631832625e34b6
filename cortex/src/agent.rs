//! The process-scoped agent assembly.

use crate::persist::{self, CoreExtraction, MentalSnapshot, PersistPaths};
use cortex_action::{ActionContext, ActionRegistry, ChainExecutor, Dispatcher};
use cortex_combat::{CombatConfig, CombatReflex, CombatState};
use cortex_core::{
    AgentConfig, EntityFilter, GameAdapter, GameEvent, LanguageModel, Sandbox, SemanticMemory,
    Signal, SkillRegistry, shared_genetic_params,
};
use cortex_evolution::{EvolutionConfig, EvolutionEngine};
use cortex_kernel::{Blackboard, LmQueue, LmQueueConfig, LockManager, Scheduler, SignalBus};
use cortex_rules::BehaviorEngine;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Factory for fresh language-model clients, used by the soft reset.
pub type LmFactory = Arc<dyn Fn() -> Arc<dyn LanguageModel> + Send + Sync>;

/// The external collaborators the runtime consumes.
pub struct AgentPorts {
    /// The actuator port.
    pub adapter: Arc<dyn GameAdapter>,
    /// The planning port.
    pub language_model: Arc<dyn LanguageModel>,
    /// Builds a replacement client when the planning layer degrades.
    /// Without one, soft resets only clear the breaker.
    pub language_model_factory: Option<LmFactory>,
    /// The validation port for generated code.
    pub sandbox: Arc<dyn Sandbox>,
    /// The durable-facts port.
    pub memory: Arc<dyn SemanticMemory>,
    /// The opaque-skill port.
    pub skills: Arc<dyn SkillRegistry>,
}

/// The agent: one instance each of the nine core subsystems, owned
/// exclusively, constructed at boot and torn down on shutdown.
pub struct Agent {
    config: AgentConfig,
    paths: Option<PersistPaths>,
    adapter: Arc<dyn GameAdapter>,
    bus: SignalBus,
    blackboard: Arc<Blackboard>,
    locks: LockManager,
    lmq: Arc<LmQueue>,
    lm_factory: Option<LmFactory>,
    scheduler: Arc<Scheduler>,
    rules: Arc<BehaviorEngine>,
    dispatcher: Arc<Dispatcher>,
    chains: Arc<ChainExecutor>,
    combat: Arc<CombatReflex>,
    evolution: Arc<EvolutionEngine>,
    shutdown: CancellationToken,
    loops: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Agent {
    /// Assemble an agent from its ports. Nothing runs until
    /// [`boot`](Self::boot).
    #[must_use]
    pub fn new(ports: AgentPorts, config: AgentConfig, data_dir: Option<&Path>) -> Arc<Self> {
        let bus = SignalBus::new();
        let blackboard = Arc::new(Blackboard::new());
        let locks = LockManager::new();
        let genetics = shared_genetic_params();

        let lmq = Arc::new(LmQueue::new(
            Arc::clone(&ports.language_model),
            LmQueueConfig::default(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            bus.clone(),
            Arc::clone(&blackboard),
            config.critical_health,
        ));
        let rules = Arc::new(BehaviorEngine::new(bus.clone()));

        let ctx = ActionContext {
            adapter: Arc::clone(&ports.adapter),
            blackboard: Arc::clone(&blackboard),
            locks: locks.clone(),
            bus: bus.clone(),
            config: config.clone(),
            cancel: CancellationToken::new(),
        };
        let dispatcher = Arc::new(Dispatcher::new(
            ActionRegistry::standard(),
            Arc::clone(&rules),
            Arc::clone(&ports.skills),
            bus.clone(),
            ctx,
        ));
        let chains = Arc::new(ChainExecutor::new(
            Arc::clone(&dispatcher),
            Arc::clone(&ports.skills),
            Arc::clone(&blackboard),
        ));
        let combat = Arc::new(CombatReflex::new(
            Arc::clone(&ports.adapter),
            Arc::clone(&rules),
            locks.clone(),
            bus.clone(),
            Arc::clone(&blackboard),
            Arc::clone(&genetics),
            CombatConfig::default(),
        ));
        let evolution = Arc::new(EvolutionEngine::new(
            Arc::clone(&lmq),
            Arc::clone(&ports.sandbox),
            Arc::clone(&ports.memory),
            Arc::clone(&ports.skills),
            Arc::clone(&ports.adapter),
            bus.clone(),
            dispatcher.overrides(),
            dispatcher.stats(),
            genetics,
            EvolutionConfig {
                sandbox_timeout: Duration::from_secs(config.timeouts.code_execution),
                allow_code_execution: config.allow_insecure_coding,
                ..EvolutionConfig::default()
            },
        ));

        Arc::new(Self {
            paths: data_dir.map(PersistPaths::new),
            adapter: ports.adapter,
            bus,
            blackboard,
            locks,
            lmq,
            lm_factory: ports.language_model_factory,
            scheduler,
            rules,
            dispatcher,
            chains,
            combat,
            evolution,
            config,
            shutdown: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
        })
    }

    /// Load persisted state, wire every subscription, start the loops,
    /// and announce readiness.
    pub async fn boot(self: &Arc<Self>) -> std::io::Result<()> {
        if let Some(paths) = &self.paths {
            self.rules.load_from(&paths.rules).await?;
            let metrics = cortex_evolution::LearningMetrics::load_from(&paths.metrics).await?;
            self.evolution.restore_metrics(metrics);
            let reflexes = persist::load_reflexes(&paths.reflexes).await?;
            self.evolution.import_reflexes(reflexes);
            let snapshot = MentalSnapshot::load_from(&paths.snapshot).await?;
            self.blackboard
                .set("mental.stateStack", json!(snapshot.state_stack), "boot");
            self.blackboard
                .set("places", snapshot.spatial_map, "boot");
        }

        self.rules.wire_accounting(&self.bus);
        self.evolution.wire(&self.bus);

        // Emergency recall tears down the current exclusive work and
        // pulls the reflex out of combat.
        {
            let agent = Arc::clone(self);
            self.bus.subscribe(Signal::EmergencyRecall, move |_| {
                let agent = Arc::clone(&agent);
                async move {
                    agent.scheduler.cancel_exclusive();
                    agent.combat.emergency_exit().await;
                    Ok(())
                }
            });
        }

        // Planning-layer degradation: swap in a fresh client when we
        // can build one; rules and memory survive.
        {
            let agent = Arc::clone(self);
            self.bus.subscribe(Signal::System2Degraded, move |_| {
                let agent = Arc::clone(&agent);
                async move {
                    match &agent.lm_factory {
                        Some(factory) => {
                            agent.lmq.swap_model(factory());
                            tracing::info!("planning layer soft-reset with a fresh client");
                        }
                        None => tracing::warn!("planning layer degraded, no client factory"),
                    }
                    Ok(())
                }
            });
        }

        // Self-preservation: low health triggers an eat dispatch under
        // the merged policy, throttled to one attempt per window.
        {
            let agent = Arc::clone(self);
            self.bus.subscribe_throttled(
                Signal::HealthLow,
                Duration::from_secs(5),
                move |ev| {
                    let agent = Arc::clone(&agent);
                    async move {
                        let health = ev.payload["health"].as_f64().unwrap_or(20.0);
                        let policy = agent
                            .rules
                            .self_preservation_policy(&json!({ "health": health }));
                        let auto_eat = policy["autoEat"].as_bool().unwrap_or(true);
                        let start = policy["autoEatStart"].as_f64().unwrap_or(14.0);
                        if auto_eat && health <= start {
                            let outcome = agent
                                .dispatcher
                                .dispatch(&cortex_core::Directive {
                                    action_type: "eat".into(),
                                    params: json!({}),
                                    action_id: None,
                                })
                                .await;
                            if !outcome.success {
                                tracing::debug!(
                                    error = outcome.error.as_deref().unwrap_or(""),
                                    "auto-eat failed"
                                );
                            }
                        }
                        Ok(())
                    }
                },
            );
        }

        // A short in-world explanation for failed commands, throttled
        // so a failing loop doesn't flood chat.
        {
            let agent = Arc::clone(self);
            self.bus.subscribe_throttled(
                Signal::ActionFailed,
                Duration::from_secs(5),
                move |ev| {
                    let agent = Arc::clone(&agent);
                    async move {
                        let action = ev.payload["action"].as_str().unwrap_or("action");
                        let error = ev.payload["error"].as_str().unwrap_or("failed");
                        agent
                            .send_chat(&format!("can't {action}: {error}"))
                            .await;
                        Ok(())
                    }
                },
            );
        }

        // The long-running loops.
        let mut loops = self.loops.lock().unwrap();
        let scheduler = Arc::clone(&self.scheduler);
        let token = self.shutdown.child_token();
        loops.push(tokio::spawn(async move { scheduler.run(token).await }));
        let combat = Arc::clone(&self.combat);
        let token = self.shutdown.child_token();
        loops.push(tokio::spawn(async move { combat.run(token).await }));
        let rules = Arc::clone(&self.rules);
        let token = self.shutdown.child_token();
        loops.push(tokio::spawn(async move { rules.run_pruning(token).await }));
        drop(loops);

        self.bus.publish(Signal::BotReady, json!({}));
        tracing::info!("agent booted");
        Ok(())
    }

    /// Map one inbound adapter event onto at most one bus signal plus
    /// blackboard updates.
    pub async fn handle_event(&self, event: GameEvent) {
        match event {
            GameEvent::Spawn => {
                self.blackboard.set("status.spawned", json!(true), "adapter");
                self.bus.publish(Signal::BotSpawned, json!({}));
            }
            GameEvent::Health { health } => {
                self.blackboard.set("status.health", json!(health), "adapter");
                if health <= self.config.critical_health {
                    self.bus
                        .publish(Signal::HealthCritical, json!({ "health": health }));
                } else if health <= self.config.auto_eat_start {
                    self.bus.publish(Signal::HealthLow, json!({ "health": health }));
                }
            }
            GameEvent::Food { food } => {
                self.blackboard.set("status.food", json!(food), "adapter");
                self.blackboard.set(
                    "threat.hunger",
                    json!(food <= self.config.critical_food),
                    "adapter",
                );
            }
            GameEvent::EntityHurt { amount, attacker } => {
                self.bus.publish(
                    Signal::DamageTaken,
                    json!({"amount": amount, "attacker": attacker}),
                );
                if amount > 4.0 && self.combat.state() == CombatState::Idle {
                    self.engage_attacker(attacker).await;
                }
            }
            GameEvent::Death {
                position,
                dimension,
            } => {
                self.scheduler.cancel_exclusive();
                self.combat.emergency_exit().await;
                self.blackboard.set("status.health", json!(0.0), "adapter");
                self.bus.publish(
                    Signal::Death,
                    json!({"position": position, "dimension": dimension}),
                );
                self.send_chat(&format!(
                    "died at ({:.0}, {:.0}, {:.0}) in {dimension}",
                    position.x, position.y, position.z
                ))
                .await;
            }
            GameEvent::Idle => {
                self.bus.publish(
                    Signal::EnvironmentScan,
                    json!({"status": self.blackboard.snapshot("status")}),
                );
            }
            GameEvent::Time { age } => {
                self.blackboard.set("world.time", json!(age), "adapter");
            }
            GameEvent::Chat { username, message } => {
                self.blackboard.set(
                    "chat.last",
                    json!({"username": username, "message": message}),
                    "adapter",
                );
            }
            GameEvent::Whisper { username, message } => {
                self.blackboard.set(
                    "chat.lastWhisper",
                    json!({"username": username, "message": message}),
                    "adapter",
                );
            }
            GameEvent::PhysicsTick => {}
            GameEvent::PlayerCollect { item, count } => {
                self.blackboard.set(
                    "inventory.lastCollected",
                    json!({"item": item, "count": count}),
                    "adapter",
                );
            }
            GameEvent::Message { json } => {
                self.blackboard.set("server.lastMessage", json, "adapter");
            }
        }
    }

    async fn engage_attacker(&self, attacker: Option<u64>) {
        let target = match attacker {
            Some(id) => self
                .adapter
                .nearby_entities(32.0)
                .await
                .ok()
                .and_then(|entities| entities.into_iter().find(|e| e.id == id)),
            None => self
                .adapter
                .nearest_entity(EntityFilter::Hostile)
                .await
                .ok()
                .flatten(),
        };
        if let Some(target) = target {
            self.combat.enter_combat(&target).await;
        }
    }

    /// Outbound chat honoring the `only_chat_with` whitelist.
    async fn send_chat(&self, text: &str) {
        let result = match self.config.only_chat_with.first() {
            Some(user) => self.adapter.whisper(user, text).await,
            None => self.adapter.chat(text).await,
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "outbound chat failed");
        }
    }

    /// Swap in a fresh language-model client by hand. Rules and memory
    /// are untouched.
    pub fn soft_reset(&self, fresh: Arc<dyn LanguageModel>) {
        self.lmq.swap_model(fresh);
    }

    /// Stop the loops and flush persisted state.
    pub async fn shutdown(&self) -> std::io::Result<()> {
        self.shutdown.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.loops.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }

        if let Some(paths) = &self.paths {
            self.rules.save_to(&paths.rules).await?;
            let metrics = self.evolution.metrics();
            metrics.save_to(&paths.metrics).await?;
            let reflexes = self.evolution.export_reflexes();
            persist::save_reflexes(&paths.reflexes, &reflexes).await?;

            let inventory_summary = self
                .adapter
                .inventory()
                .await
                .map(|stacks| {
                    stacks
                        .iter()
                        .map(|s| format!("{} x{}", s.name, s.count))
                        .collect()
                })
                .unwrap_or_default();
            let snapshot = MentalSnapshot {
                state_stack: self
                    .blackboard
                    .get("mental.stateStack")
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_else(|| vec!["idle".to_string()]),
                spatial_map: self.blackboard.snapshot("places"),
                inventory_summary,
            };
            snapshot.save_to(&paths.snapshot).await?;

            persist::save_extraction(
                &paths.extraction,
                &CoreExtraction {
                    rules: self.rules.export_rules(),
                    reflexes,
                    metrics,
                },
            )
            .await?;
        }
        tracing::info!("agent shut down");
        Ok(())
    }

    // --- Component accessors ---

    /// The signal bus.
    #[must_use]
    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// The blackboard.
    #[must_use]
    pub fn blackboard(&self) -> &Arc<Blackboard> {
        &self.blackboard
    }

    /// The lock manager.
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// The task scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The behavior rule engine.
    #[must_use]
    pub fn rules(&self) -> &Arc<BehaviorEngine> {
        &self.rules
    }

    /// The action dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The chain executor.
    #[must_use]
    pub fn chains(&self) -> &Arc<ChainExecutor> {
        &self.chains
    }

    /// The combat reflex.
    #[must_use]
    pub fn combat(&self) -> &Arc<CombatReflex> {
        &self.combat
    }

    /// The evolution engine.
    #[must_use]
    pub fn evolution(&self) -> &Arc<EvolutionEngine> {
        &self.evolution
    }

    /// The language-model queue.
    #[must_use]
    pub fn lmq(&self) -> &Arc<LmQueue> {
        &self.lmq
    }

    /// The agent configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}
