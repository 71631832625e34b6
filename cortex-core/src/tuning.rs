//! Adaptive combat tuning shared between the reflex and the evolution
//! engine.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Bounds for [`GeneticParams::strafe_distance`].
pub const STRAFE_DISTANCE_RANGE: (f64, f64) = (1.5, 5.0);
/// Bounds for [`GeneticParams::retreat_health`].
pub const RETREAT_HEALTH_RANGE: (f64, f64) = (4.0, 12.0);

/// The numeric triple the evolution engine adapts from combat outcomes.
/// The combat reflex reads it every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneticParams {
    /// Preferred orbit distance while engaging, blocks.
    pub strafe_distance: f64,
    /// Health below which the reflex retreats.
    pub retreat_health: f64,
    /// How aggressively attack opportunities are taken, 0..1.
    pub attack_urgency: f64,
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            strafe_distance: 2.5,
            retreat_health: 6.0,
            attack_urgency: 0.7,
        }
    }
}

impl GeneticParams {
    /// Clamp every field into its legal range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.strafe_distance = self
            .strafe_distance
            .clamp(STRAFE_DISTANCE_RANGE.0, STRAFE_DISTANCE_RANGE.1);
        self.retreat_health = self
            .retreat_health
            .clamp(RETREAT_HEALTH_RANGE.0, RETREAT_HEALTH_RANGE.1);
        self.attack_urgency = self.attack_urgency.clamp(0.0, 1.0);
        self
    }
}

/// Single-writer (evolution), many-reader (combat tick) handle.
pub type SharedGeneticParams = Arc<RwLock<GeneticParams>>;

/// A fresh shared handle with defaults.
#[must_use]
pub fn shared_genetic_params() -> SharedGeneticParams {
    Arc::new(RwLock::new(GeneticParams::default()))
}
