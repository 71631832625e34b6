//! The evolution engine: failure → fix pipeline and parameter adaptation.

use crate::metrics::LearningMetrics;
use crate::snapshot::{FailureSnapshot, extract_code, fingerprint};
use chrono::{DateTime, Utc};
use cortex_action::{ActionStats, OverrideTable};
use cortex_core::{
    ChatMessage, GameAdapter, LmError, LmPriority, Sandbox, SemanticMemory, Signal, SkillError,
    SharedGeneticParams, Skill, SkillRegistry,
};
use cortex_kernel::{LmQueue, SignalBus};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Static tuning for the engine.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    /// Wall-clock budget for sandboxed execution of generated skills.
    pub sandbox_timeout: Duration,
    /// Whether generated skills may actually execute. When false,
    /// fixes are still synthesized, validated, and registered, but
    /// calling one fails (`allow_insecure_coding`).
    pub allow_code_execution: bool,
    /// Strafe jitter standard deviation after a win.
    pub win_jitter: f64,
    /// Strafe jitter standard deviation after a loss.
    pub loss_jitter: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            sandbox_timeout: Duration::from_secs(90),
            allow_code_execution: false,
            win_jitter: 0.05,
            loss_jitter: 0.35,
        }
    }
}

/// A retained failure→fix mapping, persisted to
/// `dynamic_reflexes.json` and re-armed on boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicReflex {
    /// The failure fingerprint this fix answers.
    pub hash: String,
    /// The task the failure came from.
    pub task: String,
    /// The registered skill that fixes it.
    pub skill: String,
    /// When the fix was learned.
    pub created_at: DateTime<Utc>,
}

struct EvoState {
    known_fixes: HashMap<String, String>,
    pending: HashSet<String>,
    reflexes: Vec<DynamicReflex>,
    generated_code: HashMap<String, String>,
    last_active_skill: Option<String>,
    fix_counter: u64,
}

/// A skill whose body is a generated code blob run through the sandbox
/// port.
struct GeneratedSkill {
    name: String,
    code: String,
    sandbox: Arc<dyn Sandbox>,
    timeout: Duration,
    execution_allowed: bool,
}

impl Skill for GeneratedSkill {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn call(
        &self,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, SkillError>> + Send + '_>> {
        Box::pin(async move {
            if !self.execution_allowed {
                return Err(SkillError::ExecutionFailed(
                    "insecure coding is disabled by configuration".into(),
                ));
            }
            self.sandbox
                .execute(&self.code, params, self.timeout)
                .await
                .map_err(|e| SkillError::ExecutionFailed(e.to_string()))
        })
    }
}

/// The evolution engine. One instance per agent, wired to the bus at
/// boot.
pub struct EvolutionEngine {
    lm: Arc<LmQueue>,
    sandbox: Arc<dyn Sandbox>,
    memory: Arc<dyn SemanticMemory>,
    skills: Arc<dyn SkillRegistry>,
    adapter: Arc<dyn GameAdapter>,
    bus: SignalBus,
    overrides: OverrideTable,
    stats: ActionStats,
    genetics: SharedGeneticParams,
    config: EvolutionConfig,
    state: Mutex<EvoState>,
    metrics: Mutex<LearningMetrics>,
}

impl EvolutionEngine {
    /// Assemble an engine.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        lm: Arc<LmQueue>,
        sandbox: Arc<dyn Sandbox>,
        memory: Arc<dyn SemanticMemory>,
        skills: Arc<dyn SkillRegistry>,
        adapter: Arc<dyn GameAdapter>,
        bus: SignalBus,
        overrides: OverrideTable,
        stats: ActionStats,
        genetics: SharedGeneticParams,
        config: EvolutionConfig,
    ) -> Self {
        Self {
            lm,
            sandbox,
            memory,
            skills,
            adapter,
            bus,
            overrides,
            stats,
            genetics,
            config,
            state: Mutex::new(EvoState {
                known_fixes: HashMap::new(),
                pending: HashSet::new(),
                reflexes: Vec::new(),
                generated_code: HashMap::new(),
                last_active_skill: None,
                fix_counter: 0,
            }),
            metrics: Mutex::new(LearningMetrics::default()),
        }
    }

    /// Subscribe the engine to its input signals. Call once at boot
    /// with the engine already in an `Arc`.
    pub fn wire(self: &Arc<Self>, bus: &SignalBus) {
        let engine = Arc::clone(self);
        bus.subscribe(Signal::TaskFailed, move |ev| {
            let engine = Arc::clone(&engine);
            async move {
                engine.handle_task_failed(&ev.payload).await;
                Ok(())
            }
        });
        let engine = Arc::clone(self);
        bus.subscribe(Signal::SkillFailed, move |ev| {
            let engine = Arc::clone(&engine);
            async move {
                engine.handle_task_failed(&ev.payload).await;
                Ok(())
            }
        });
        let engine = Arc::clone(self);
        bus.subscribe(Signal::Death, move |ev| {
            let engine = Arc::clone(&engine);
            async move {
                engine.handle_death(&ev.payload).await;
                Ok(())
            }
        });
        let engine = Arc::clone(self);
        bus.subscribe(Signal::CombatEnded, move |ev| {
            let engine = Arc::clone(&engine);
            async move {
                let win = ev.payload.get("win").and_then(Value::as_bool).unwrap_or(false);
                engine.on_combat_outcome(win);
                Ok(())
            }
        });
    }

    /// Snapshot of the current metrics.
    #[must_use]
    pub fn metrics(&self) -> LearningMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Overwrite the metrics (used when restoring persisted state).
    pub fn restore_metrics(&self, metrics: LearningMetrics) {
        *self.metrics.lock().unwrap() = metrics;
    }

    /// The retained failure→fix mappings.
    #[must_use]
    pub fn export_reflexes(&self) -> Vec<DynamicReflex> {
        self.state.lock().unwrap().reflexes.clone()
    }

    /// Re-arm persisted reflexes (the fix skills themselves must be
    /// re-registered separately; unknown skills just miss on lookup).
    pub fn import_reflexes(&self, reflexes: Vec<DynamicReflex>) {
        let mut state = self.state.lock().unwrap();
        for reflex in &reflexes {
            state
                .known_fixes
                .insert(reflex.hash.clone(), reflex.skill.clone());
        }
        state.reflexes = reflexes;
    }

    /// The fix skill learned for a fingerprint, if any.
    #[must_use]
    pub fn fix_for(&self, hash: &str) -> Option<String> {
        self.state.lock().unwrap().known_fixes.get(hash).cloned()
    }

    /// Record which skill deliberation ran last (refactored on death).
    pub fn set_last_active_skill(&self, name: &str) {
        self.state.lock().unwrap().last_active_skill = Some(name.to_string());
    }

    /// Handle to the per-action override table this engine writes.
    pub fn set_override(&self, action: &str, patch: Value) {
        self.overrides.set_override(action, patch);
    }

    /// Read side of the action-stat table (dispatch writes it).
    #[must_use]
    pub fn action_stats(&self) -> ActionStats {
        self.stats.clone()
    }

    /// Build a failure snapshot from the live world.
    pub async fn capture_snapshot(&self, task_name: &str, error: &str) -> FailureSnapshot {
        let status = self.adapter.status().await.ok();
        let inventory = self.adapter.inventory().await.unwrap_or_default();
        let nearby_blocks = self
            .adapter
            .nearby_entities(8.0)
            .await
            .map(|entities| entities.into_iter().map(|e| e.kind).collect())
            .unwrap_or_default();
        let snapshot = FailureSnapshot {
            task_name: task_name.to_string(),
            error_message: error.to_string(),
            error_hash: fingerprint(task_name, error),
            position: status.as_ref().map(|s| s.position),
            health: status.as_ref().map_or(0.0, |s| s.health),
            food: status.as_ref().map_or(0.0, |s| s.food),
            inventory_summary: inventory
                .iter()
                .map(|s| format!("{} x{}", s.name, s.count))
                .collect(),
            nearby_blocks,
            timestamp: Utc::now(),
        };
        self.metrics.lock().unwrap().snapshots_captured += 1;
        snapshot
    }

    /// The task-failed path: snapshot, dedup, synthesize, validate,
    /// hot-swap, publish.
    pub async fn handle_task_failed(&self, payload: &Value) {
        let task_name = payload
            .get("task")
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown_task")
            .to_string();
        let error = payload
            .get("error")
            .or_else(|| payload.get("reason"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        let snapshot = self.capture_snapshot(&task_name, &error).await;
        let hash = snapshot.error_hash.clone();

        // Short-circuit: already fixed or already being fixed.
        {
            let mut state = self.state.lock().unwrap();
            if state.known_fixes.contains_key(&hash) || state.pending.contains(&hash) {
                tracing::debug!(hash = %hash, "failure already handled");
                return;
            }
            state.pending.insert(hash.clone());
        }

        let result = self.synthesize_fix(&snapshot).await;
        let mut state = self.state.lock().unwrap();
        state.pending.remove(&hash);
        match result {
            Ok(skill_name) => {
                state.known_fixes.insert(hash.clone(), skill_name.clone());
                state.reflexes.push(DynamicReflex {
                    hash: hash.clone(),
                    task: task_name,
                    skill: skill_name.clone(),
                    created_at: Utc::now(),
                });
                drop(state);
                let mut metrics = self.metrics.lock().unwrap();
                metrics.skills_learned += 1;
                metrics.last_updated = Utc::now();
                drop(metrics);
                self.bus.publish(
                    Signal::SkillLearned,
                    json!({"skill": skill_name, "hash": hash}),
                );
            }
            Err(e) => {
                drop(state);
                tracing::warn!(hash = %hash, error = %e, "fix synthesis failed");
                if matches!(e, FixError::Lm(LmError::CircuitOpen)) {
                    self.bus
                        .publish(Signal::System2Degraded, json!({"source": "evolution"}));
                }
            }
        }
    }

    /// The death path: retrospective lesson, optional skill refactor.
    pub async fn handle_death(&self, payload: &Value) {
        let messages = vec![
            ChatMessage::system(
                "You are the after-action reviewer of a game-playing agent. \
                 Answer with exactly one sentence.",
            ),
            ChatMessage::user(format!(
                "The agent just died. Event: {payload}. \
                 What is the one lesson to remember?"
            )),
        ];
        match self.lm.chat(LmPriority::Normal, &messages).await {
            Ok(lesson) => {
                let stored = self
                    .memory
                    .remember("death_lesson", &[lesson.clone()], payload.clone())
                    .await;
                match stored {
                    Ok(()) => {
                        self.bus
                            .publish(Signal::MemoryStored, json!({"kind": "death_lesson"}));
                        let mut metrics = self.metrics.lock().unwrap();
                        metrics.death_lessons += 1;
                        metrics.last_updated = Utc::now();
                    }
                    Err(e) => tracing::warn!(error = %e, "storing death lesson failed"),
                }
            }
            Err(e) => tracing::warn!(error = %e, "death retrospective failed"),
        }

        let refactor_target = {
            let state = self.state.lock().unwrap();
            state
                .last_active_skill
                .clone()
                .map(|name| (name.clone(), state.generated_code.get(&name).cloned()))
        };
        if let Some((name, old_code)) = refactor_target {
            if let Err(e) = self.refactor_skill(&name, old_code.as_deref(), payload).await {
                tracing::warn!(skill = %name, error = %e, "death refactor failed");
            }
        }
    }

    /// Combat parameter adaptation: losses explore (bigger jitter,
    /// retreat earlier), wins settle (small jitter).
    pub fn on_combat_outcome(&self, win: bool) {
        let jitter_sd = if win {
            self.config.win_jitter
        } else {
            self.config.loss_jitter
        };
        let jitter = {
            let normal = Normal::new(0.0, jitter_sd).expect("valid distribution");
            let mut rng = rand::rng();
            normal.sample(&mut rng)
        };
        let updated = {
            let mut params = self.genetics.write().unwrap();
            params.strafe_distance += jitter;
            if !win {
                params.retreat_health += 0.5;
            }
            *params = params.clamped();
            *params
        };
        {
            let mut metrics = self.metrics.lock().unwrap();
            if win {
                metrics.combat_wins += 1;
            } else {
                metrics.combat_losses += 1;
            }
            metrics.last_updated = Utc::now();
        }
        tracing::debug!(
            win,
            strafe = updated.strafe_distance,
            retreat = updated.retreat_health,
            "genetic params adapted"
        );
    }

    async fn synthesize_fix(&self, snapshot: &FailureSnapshot) -> Result<String, FixError> {
        let messages = vec![
            ChatMessage::system(
                "You repair a game-playing agent by writing small skills against \
                 its actuator API. Respond as JSON: {\"thought\": ..., \"code\": ...}.",
            ),
            ChatMessage::user(format!(
                "Task `{}` failed with `{}`. Full snapshot:\n{}\nWrite a skill that \
                 makes this task succeed next time.",
                snapshot.task_name,
                snapshot.error_message,
                serde_json::to_string_pretty(snapshot).unwrap_or_default(),
            )),
        ];
        let response = self.lm.prompt_coding(LmPriority::High, &messages).await?;
        let draft = extract_code(&response).ok_or(FixError::NoCode)?;

        let validation = self.sandbox.validate(&draft.code).await?;
        if !validation.valid {
            return Err(FixError::Invalid(validation.issues.join("; ")));
        }

        let skill_name = {
            let mut state = self.state.lock().unwrap();
            state.fix_counter += 1;
            let name = format!("{}_fix_{}", snapshot.task_name, state.fix_counter);
            state.generated_code.insert(name.clone(), draft.code.clone());
            name
        };
        self.skills.register(Arc::new(GeneratedSkill {
            name: skill_name.clone(),
            code: draft.code,
            sandbox: Arc::clone(&self.sandbox),
            timeout: self.config.sandbox_timeout,
            execution_allowed: self.config.allow_code_execution,
        }));
        tracing::info!(skill = %skill_name, "fix hot-swapped into the skill library");
        Ok(skill_name)
    }

    async fn refactor_skill(
        &self,
        name: &str,
        old_code: Option<&str>,
        death_payload: &Value,
    ) -> Result<(), FixError> {
        let messages = vec![
            ChatMessage::system(
                "You repair a game-playing agent by rewriting one of its skills. \
                 Respond as JSON: {\"thought\": ..., \"code\": ...}.",
            ),
            ChatMessage::user(format!(
                "The agent died while skill `{name}` was active. Death event: \
                 {death_payload}. Current code:\n{}\nRewrite it to avoid this death.",
                old_code.unwrap_or("<unavailable>"),
            )),
        ];
        let response = self.lm.prompt_coding(LmPriority::Normal, &messages).await?;
        let draft = extract_code(&response).ok_or(FixError::NoCode)?;
        let validation = self.sandbox.validate(&draft.code).await?;
        if !validation.valid {
            return Err(FixError::Invalid(validation.issues.join("; ")));
        }
        self.state
            .lock()
            .unwrap()
            .generated_code
            .insert(name.to_string(), draft.code.clone());
        self.skills.register(Arc::new(GeneratedSkill {
            name: name.to_string(),
            code: draft.code,
            sandbox: Arc::clone(&self.sandbox),
            timeout: self.config.sandbox_timeout,
            execution_allowed: self.config.allow_code_execution,
        }));
        let mut metrics = self.metrics.lock().unwrap();
        metrics.skills_refactored += 1;
        metrics.last_updated = Utc::now();
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum FixError {
    #[error("language model: {0}")]
    Lm(#[from] LmError),
    #[error("sandbox: {0}")]
    Sandbox(#[from] cortex_core::SandboxError),
    #[error("no code block in response")]
    NoCode,
    #[error("validation failed: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::shared_genetic_params;
    use cortex_core::test_utils::{
        InMemorySkills, RecordingMemory, ScriptedModel, SimAdapter, StaticSandbox,
    };
    use cortex_kernel::LmQueueConfig;

    struct Fixture {
        model: Arc<ScriptedModel>,
        skills: Arc<InMemorySkills>,
        memory: Arc<RecordingMemory>,
        genetics: SharedGeneticParams,
        engine: Arc<EvolutionEngine>,
    }

    fn fixture() -> Fixture {
        let model = Arc::new(ScriptedModel::new());
        let skills = Arc::new(InMemorySkills::new());
        let memory = Arc::new(RecordingMemory::new());
        let genetics = shared_genetic_params();
        let engine = Arc::new(EvolutionEngine::new(
            Arc::new(LmQueue::new(
                Arc::clone(&model) as Arc<dyn cortex_core::LanguageModel>,
                LmQueueConfig {
                    max_retries: 0,
                    ..LmQueueConfig::default()
                },
            )),
            Arc::new(StaticSandbox::new()),
            Arc::clone(&memory) as Arc<dyn SemanticMemory>,
            Arc::clone(&skills) as Arc<dyn SkillRegistry>,
            Arc::new(SimAdapter::default()),
            SignalBus::new(),
            OverrideTable::new(),
            ActionStats::new(),
            Arc::clone(&genetics),
            EvolutionConfig::default(),
        ));
        Fixture {
            model,
            skills,
            memory,
            genetics,
            engine,
        }
    }

    fn failure_payload() -> Value {
        json!({"task": {"name": "gather_water"}, "error": "No water bucket"})
    }

    #[tokio::test]
    async fn failure_learns_a_prefixed_skill() {
        let f = fixture();
        f.model
            .push_coding(r#"{"thought": "craft a bucket", "code": "ensure bucket"}"#);
        f.engine.handle_task_failed(&failure_payload()).await;

        let names = f.skills.discover_skills();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("gather_water"));
        assert_eq!(f.engine.metrics().skills_learned, 1);
        let hash = fingerprint("gather_water", "No water bucket");
        assert_eq!(f.engine.fix_for(&hash), Some(names[0].clone()));
    }

    #[tokio::test]
    async fn repeated_failure_short_circuits() {
        let f = fixture();
        f.model
            .push_coding(r#"{"thought": "craft a bucket", "code": "ensure bucket"}"#);
        f.engine.handle_task_failed(&failure_payload()).await;
        f.engine.handle_task_failed(&failure_payload()).await;
        assert_eq!(f.model.coding_calls(), 1);
        assert_eq!(f.skills.discover_skills().len(), 1);
    }

    #[tokio::test]
    async fn invalid_code_is_not_registered() {
        let f = fixture();
        f.model
            .push_coding(r#"{"thought": "bad", "code": "import os; process.exit()"}"#);
        f.engine.handle_task_failed(&failure_payload()).await;
        assert!(f.skills.discover_skills().is_empty());
        assert_eq!(f.engine.metrics().skills_learned, 0);
    }

    #[tokio::test]
    async fn death_stores_a_lesson() {
        let f = fixture();
        f.model.push_chat("Never fight skeletons without a shield.");
        f.engine
            .handle_death(&json!({"position": {"x": 0, "y": 64, "z": 0}}))
            .await;
        let recorded = f.memory.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "death_lesson");
        assert_eq!(f.engine.metrics().death_lessons, 1);
    }

    #[tokio::test]
    async fn losses_raise_retreat_health_and_clamp() {
        let f = fixture();
        for _ in 0..40 {
            f.engine.on_combat_outcome(false);
        }
        let params = *f.genetics.read().unwrap();
        assert_eq!(params.retreat_health, 12.0);
        assert!(params.strafe_distance >= 1.5 && params.strafe_distance <= 5.0);
        assert_eq!(f.engine.metrics().combat_losses, 40);
    }

    #[tokio::test]
    async fn reflex_round_trip_restores_known_fixes() {
        let f = fixture();
        f.model
            .push_coding(r#"{"thought": "t", "code": "fix"}"#);
        f.engine.handle_task_failed(&failure_payload()).await;
        let exported = f.engine.export_reflexes();
        assert_eq!(exported.len(), 1);

        let fresh = fixture();
        fresh.engine.import_reflexes(exported.clone());
        assert_eq!(
            fresh.engine.fix_for(&exported[0].hash),
            Some(exported[0].skill.clone())
        );
        // A re-seen failure does not trigger synthesis.
        fresh.engine.handle_task_failed(&failure_payload()).await;
        assert_eq!(fresh.model.coding_calls(), 0);
    }
}
