//! Inbound world events from the game adapter.

use crate::adapter::Vec3;
use serde::{Deserialize, Serialize};

/// A pre-parsed event from the game connection. Each event maps to at
/// most one bus signal; the facade owns that mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// The avatar entity spawned into the world.
    Spawn,
    /// Health changed.
    Health {
        /// New health value.
        health: f64,
    },
    /// Food level changed.
    Food {
        /// New food value.
        food: f64,
    },
    /// The avatar was hurt.
    EntityHurt {
        /// Damage amount.
        amount: f64,
        /// Attacker entity id, when known.
        attacker: Option<u64>,
    },
    /// The avatar died.
    Death {
        /// Where it happened.
        position: Vec3,
        /// Dimension name.
        dimension: String,
    },
    /// Nothing happened for a while.
    Idle,
    /// World time advanced.
    Time {
        /// World age in ticks.
        age: u64,
    },
    /// Public chat line.
    Chat {
        /// Sender.
        username: String,
        /// Message body.
        message: String,
    },
    /// Private message.
    Whisper {
        /// Sender.
        username: String,
        /// Message body.
        message: String,
    },
    /// One physics step elapsed.
    PhysicsTick,
    /// A dropped item was collected.
    PlayerCollect {
        /// Item name.
        item: String,
        /// Stack size collected.
        count: u32,
    },
    /// Raw structured server message (JSON chat component).
    Message {
        /// The JSON message body.
        json: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serde_shape() {
        let ev = GameEvent::Health { health: 9.5 };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "health");
        assert_eq!(v["health"], 9.5);
    }
}
