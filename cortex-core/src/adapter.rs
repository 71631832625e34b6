//! The actuator port — avatar commands out, world queries in.

use crate::error::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A position or direction in the world. All protocol positions are
/// 3-tuples of 64-bit floats.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// East/west.
    pub x: f64,
    /// Up/down.
    pub y: f64,
    /// North/south.
    pub z: f64,
}

impl Vec3 {
    /// Construct from components.
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Vector from `self` to `other`.
    #[must_use]
    pub fn direction_to(&self, other: &Vec3) -> Vec3 {
        Vec3::new(other.x - self.x, other.y - self.y, other.z - self.z)
    }

    /// The same vector scaled to unit length. Zero stays zero.
    #[must_use]
    pub fn normalized(&self) -> Vec3 {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if len == 0.0 {
            return *self;
        }
        Vec3::new(self.x / len, self.y / len, self.z / len)
    }

    /// Dot product.
    #[must_use]
    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

/// A live entity as reported by the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Protocol-assigned entity id.
    pub id: u64,
    /// Entity kind, e.g. `"zombie"`, `"arrow"`, `"creeper"`, `"item"`.
    pub kind: String,
    /// Current position.
    pub position: Vec3,
    /// Current velocity.
    pub velocity: Vec3,
    /// Whether the adapter classifies this entity as hostile.
    pub hostile: bool,
    /// Whether the entity is still alive/valid.
    pub alive: bool,
    /// Whether the entity's fuse is lit (explosives only).
    #[serde(default)]
    pub fused: bool,
}

/// A block as reported by the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block name, e.g. `"oak_log"`.
    pub name: String,
    /// Block position (integer-aligned, but carried as floats).
    pub position: Vec3,
    /// Whether the block is solid (can be stood on).
    pub solid: bool,
}

/// One inventory stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item name, e.g. `"oak_planks"`.
    pub name: String,
    /// Stack size.
    pub count: u32,
    /// Remaining durability, for damageable items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durability: Option<u32>,
}

/// A point-in-time view of the avatar's own state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatus {
    /// Current health points.
    pub health: f64,
    /// Current food level.
    pub food: f64,
    /// Current position.
    pub position: Vec3,
    /// Round-trip latency to the server in milliseconds.
    pub latency_ms: u64,
    /// Dimension name, e.g. `"overworld"`.
    pub dimension: String,
}

/// Equipment destination for [`GameAdapter::equip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquipSlot {
    /// Main hand.
    Hand,
    /// Off hand (shield, totem).
    OffHand,
    /// Helmet.
    Head,
    /// Chestplate.
    Torso,
    /// Leggings.
    Legs,
    /// Boots.
    Feet,
}

/// A movement control the adapter can latch on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Control {
    /// Walk forward.
    Forward,
    /// Walk backward.
    Back,
    /// Strafe left.
    Left,
    /// Strafe right.
    Right,
    /// Jump.
    Jump,
    /// Sprint modifier.
    Sprint,
}

/// Selector for [`GameAdapter::nearest_entity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFilter {
    /// Any hostile mob.
    Hostile,
    /// Dropped item entities.
    Item,
    /// Other players.
    Player,
    /// A specific entity kind by name.
    Kind(String),
    /// Anything alive.
    Any,
}

/// The outbound half of the game-adapter port.
///
/// The runtime owns exactly one adapter and treats every call as a
/// suspension point. Adapters are expected to resolve when the command
/// has been issued, not when its world effect is complete — except for
/// [`goto`](Self::goto), which resolves on arrival or fails.
///
/// Implementations: a protocol client in production, [`crate::test_utils`]
/// doubles in tests.
#[async_trait]
pub trait GameAdapter: Send + Sync {
    /// Current avatar state.
    async fn status(&self) -> Result<BotStatus, AdapterError>;

    /// Full inventory listing.
    async fn inventory(&self) -> Result<Vec<ItemStack>, AdapterError>;

    /// Live entities within `radius` of the avatar.
    async fn nearby_entities(&self, radius: f64) -> Result<Vec<Entity>, AdapterError>;

    /// Nearest entity matching the filter, if any.
    async fn nearest_entity(&self, filter: EntityFilter) -> Result<Option<Entity>, AdapterError>;

    /// Break a block. `force_look` turns the head before digging.
    async fn dig(&self, block: &Block, force_look: bool) -> Result<(), AdapterError>;

    /// Place the held block against `against` on the face given by `face`.
    async fn place_block(&self, against: &Block, face: Vec3) -> Result<(), AdapterError>;

    /// Craft `count` of `recipe`, optionally at a crafting table.
    async fn craft(&self, recipe: &str, count: u32, use_table: bool) -> Result<(), AdapterError>;

    /// Smelt `count` of `input` using `fuel` in a reachable furnace.
    async fn smelt(&self, input: &str, fuel: &str, count: u32) -> Result<(), AdapterError>;

    /// Move an inventory item into an equipment slot.
    async fn equip(&self, item: &str, slot: EquipSlot) -> Result<(), AdapterError>;

    /// Turn the head toward a point.
    async fn look_at(&self, pos: Vec3) -> Result<(), AdapterError>;

    /// Latch a movement control on or off.
    async fn set_control_state(&self, control: Control, state: bool) -> Result<(), AdapterError>;

    /// Release every latched control.
    async fn clear_control_states(&self) -> Result<(), AdapterError>;

    /// Swing at an entity.
    async fn attack(&self, entity_id: u64) -> Result<(), AdapterError>;

    /// Start using the held item (draw bow, raise shield).
    async fn activate_item(&self) -> Result<(), AdapterError>;

    /// Stop using the held item.
    async fn deactivate_item(&self) -> Result<(), AdapterError>;

    /// Eat/drink the held item to completion.
    async fn consume(&self) -> Result<(), AdapterError>;

    /// Walk to a position. Resolves on arrival.
    async fn goto(&self, pos: Vec3) -> Result<(), AdapterError>;

    /// Say something in public chat.
    async fn chat(&self, text: &str) -> Result<(), AdapterError>;

    /// Whisper to a named player.
    async fn whisper(&self, user: &str, text: &str) -> Result<(), AdapterError>;

    /// Nearest block whose name is in `matching`, within `max_distance`.
    async fn find_block(
        &self,
        matching: &[String],
        max_distance: f64,
    ) -> Result<Option<Block>, AdapterError>;

    /// The block at an exact position.
    async fn block_at(&self, pos: Vec3) -> Result<Option<Block>, AdapterError>;

    /// First block hit by a ray, if any.
    async fn raycast(
        &self,
        from: Vec3,
        direction: Vec3,
        max_distance: f64,
    ) -> Result<Option<Block>, AdapterError>;

    /// Whether this adapter exposes the raw packet hooks crystal-aura
    /// needs. Protocol-version dependent; defaults to unsupported.
    fn supports_crystal_aura(&self) -> bool {
        false
    }
}
