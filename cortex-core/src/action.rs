//! Primitive action names, directives, and caller options.

use serde::{Deserialize, Serialize};

/// The closed set of primitive actions the runtime can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionName {
    /// Break and collect a block.
    Mine,
    /// Craft an item from a recipe.
    Craft,
    /// Place a block from inventory.
    Place,
    /// Smelt items in a furnace.
    Smelt,
    /// Walk to a position.
    MoveTo,
    /// Collect a resource type found nearby.
    GatherNearby,
    /// Guarantee an inventory count, crafting the delta if needed.
    EnsureItem,
    /// Pick up dropped item entities.
    CollectDrops,
    /// Eat the best available food.
    Eat,
    /// Equip an item into a slot.
    Equip,
    /// Attack an entity.
    Attack,
    /// Craft the first candidate recipe that works.
    CraftFirstAvailable,
    /// Guarantee an off-hand item.
    EnsureOffhand,
    /// Choose totem or shield for the off hand by health.
    EnforceCombatPosture,
    /// Stand still and hold the current position.
    HoldPosition,
    /// Wander within the territorial radius.
    SafeWander,
    /// Idle head movement to look alive.
    HumanLook,
    /// Ask the planner for the next strategic step.
    AdvanceStrategy,
    /// Ask the evolution engine for a tool that does not exist yet.
    RequestNewTool,
}

impl ActionName {
    /// Canonical kebab-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mine => "mine",
            Self::Craft => "craft",
            Self::Place => "place",
            Self::Smelt => "smelt",
            Self::MoveTo => "move-to",
            Self::GatherNearby => "gather-nearby",
            Self::EnsureItem => "ensure-item",
            Self::CollectDrops => "collect-drops",
            Self::Eat => "eat",
            Self::Equip => "equip",
            Self::Attack => "attack",
            Self::CraftFirstAvailable => "craft-first-available",
            Self::EnsureOffhand => "ensure-offhand",
            Self::EnforceCombatPosture => "enforce-combat-posture",
            Self::HoldPosition => "hold-position",
            Self::SafeWander => "safe-wander",
            Self::HumanLook => "human-look",
            Self::AdvanceStrategy => "advance-strategy",
            Self::RequestNewTool => "request-new-tool",
        }
    }

    /// Every primitive name, for registry construction.
    #[must_use]
    pub fn all() -> &'static [ActionName] {
        &[
            Self::Mine,
            Self::Craft,
            Self::Place,
            Self::Smelt,
            Self::MoveTo,
            Self::GatherNearby,
            Self::EnsureItem,
            Self::CollectDrops,
            Self::Eat,
            Self::Equip,
            Self::Attack,
            Self::CraftFirstAvailable,
            Self::EnsureOffhand,
            Self::EnforceCombatPosture,
            Self::HoldPosition,
            Self::SafeWander,
            Self::HumanLook,
            Self::AdvanceStrategy,
            Self::RequestNewTool,
        ]
    }

    /// Parse a caller-supplied type name. Directives arrive in several
    /// spellings (`move-to`, `moveTo`, `moveto`); hyphens, underscores and
    /// case are ignored.
    #[must_use]
    pub fn parse(name: &str) -> Option<ActionName> {
        let squashed: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|a| a.as_str().replace('-', "") == squashed)
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-provided execution options, folded out of the params record
/// during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionOptions {
    /// Retry count override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Backoff base delay override, milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay: Option<u64>,
    /// Hard timeout for the whole action, milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Keep executing a chain even if this action fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    /// Named executor override (skill name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
}

/// A dispatch request: a type name selecting a primitive (or skill), the
/// params record (named or positional), and an optional caller-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    /// The action type name as the caller spelled it.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Named record or positional array of parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Caller-assigned id for telemetry correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}
