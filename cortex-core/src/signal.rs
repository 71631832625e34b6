//! The closed signal vocabulary of the runtime bus.

use serde::{Deserialize, Serialize};

/// Name of a bus signal. The set is closed: producers and consumers agree
/// on the payload schema per name, and a typo is a compile error rather
/// than a silently dead subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
    /// Health dropped below the configured low-water mark.
    HealthLow,
    /// Health dropped below the survival threshold.
    HealthCritical,
    /// A hostile entity was detected in range.
    ThreatDetected,
    /// The avatar took damage.
    DamageTaken,
    /// The combat reflex entered ENGAGE.
    CombatStarted,
    /// The combat reflex returned to IDLE.
    CombatEnded,
    /// A scheduled task ran to completion.
    TaskCompleted,
    /// A scheduled task failed, timed out, or was auto-healed.
    TaskFailed,
    /// A primitive action exhausted its retries.
    ActionFailed,
    /// A behavior rule was compiled and stored.
    RuleLearned,
    /// A behavior rule was reverted after consecutive failures.
    RuleReverted,
    /// The evolution engine hot-swapped a new skill in.
    SkillLearned,
    /// A registered skill threw during execution.
    SkillFailed,
    /// The avatar died.
    Death,
    /// A fact was stored through the memory port.
    MemoryStored,
    /// A perception snapshot of the surroundings was published.
    EnvironmentScan,
    /// Deliberative code requested a tool it does not have.
    ToolNeeded,
    /// A systemic failure (tick breaker, watchdog) occurred.
    SystemError,
    /// All current work must be abandoned and the avatar recalled.
    EmergencyRecall,
    /// The planning layer is degraded and should be soft-reset.
    System2Degraded,
    /// The combat reflex locked onto a target.
    EngagedTarget,
    /// The avatar entity spawned into the world.
    BotSpawned,
    /// Boot finished; all subsystems are wired.
    BotReady,
}

impl Signal {
    /// The wire name of this signal (kebab-case, matches serde).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::HealthLow => "health-low",
            Self::HealthCritical => "health-critical",
            Self::ThreatDetected => "threat-detected",
            Self::DamageTaken => "damage-taken",
            Self::CombatStarted => "combat-started",
            Self::CombatEnded => "combat-ended",
            Self::TaskCompleted => "task-completed",
            Self::TaskFailed => "task-failed",
            Self::ActionFailed => "action-failed",
            Self::RuleLearned => "rule-learned",
            Self::RuleReverted => "rule-reverted",
            Self::SkillLearned => "skill-learned",
            Self::SkillFailed => "skill-failed",
            Self::Death => "death",
            Self::MemoryStored => "memory-stored",
            Self::EnvironmentScan => "environment-scan",
            Self::ToolNeeded => "tool-needed",
            Self::SystemError => "system-error",
            Self::EmergencyRecall => "emergency-recall",
            Self::System2Degraded => "system2-degraded",
            Self::EngagedTarget => "engaged-target",
            Self::BotSpawned => "bot-spawned",
            Self::BotReady => "bot-ready",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One publication on the bus: a signal name plus its payload record.
///
/// Components that need causal ordering across actors thread a
/// `correlation_id` through; the bus itself only guarantees FIFO per
/// (signal, subscriber).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Which signal this is.
    pub signal: Signal,
    /// The payload record. Schema is fixed per signal name.
    pub payload: serde_json::Value,
    /// Optional correlation id for cross-actor causal ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl SignalEvent {
    /// Create an event with the given payload and no correlation id.
    #[must_use]
    pub fn new(signal: Signal, payload: serde_json::Value) -> Self {
        Self {
            signal,
            payload,
            correlation_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_kebab_case() {
        assert_eq!(Signal::System2Degraded.name(), "system2-degraded");
        assert_eq!(Signal::TaskFailed.to_string(), "task-failed");
    }

    #[test]
    fn serde_round_trip_matches_wire_name() {
        let json = serde_json::to_string(&Signal::EmergencyRecall).unwrap();
        assert_eq!(json, "\"emergency-recall\"");
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Signal::EmergencyRecall);
    }
}
