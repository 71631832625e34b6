#![deny(missing_docs)]
//! # cortex — umbrella crate
//!
//! Single import surface for the cortex runtime. Re-exports the
//! component crates and provides [`Agent`], the process-scoped assembly
//! that wires them together with explicit init/teardown — there are no
//! global singletons anywhere in the runtime.
//!
//! ```ignore
//! let agent = Agent::new(ports, AgentConfig::default(), Some(data_dir));
//! agent.boot().await?;
//! // feed adapter events:
//! agent.handle_event(GameEvent::Health { health: 7.0 }).await;
//! agent.shutdown().await?;
//! ```

pub use cortex_action;
pub use cortex_combat;
pub use cortex_core;
pub use cortex_evolution;
pub use cortex_kernel;
pub use cortex_rules;

pub mod agent;
pub mod persist;

pub use agent::{Agent, AgentPorts};
pub use persist::{MentalSnapshot, PersistPaths};

/// Initialize process logging from `RUST_LOG` (or `info` by default).
/// Call once at startup; repeated calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

/// Happy-path imports for embedding the runtime.
pub mod prelude {
    pub use crate::agent::{Agent, AgentPorts};
    pub use cortex_action::{ChainExecutor, ChainStep, Dispatcher};
    pub use cortex_combat::{CombatReflex, CombatState};
    pub use cortex_core::{
        ActionName, AgentConfig, Directive, GameAdapter, GameEvent, LanguageModel, Outcome,
        Sandbox, SemanticMemory, Signal, SignalEvent, Skill, SkillRegistry, Vec3,
    };
    pub use cortex_evolution::EvolutionEngine;
    pub use cortex_kernel::{
        Blackboard, LmQueue, LockManager, Priority, Scheduler, SignalBus, TaskSpec,
    };
    pub use cortex_rules::{BehaviorEngine, RuleSpec};
}
