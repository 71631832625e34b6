//! SimAdapter — a scriptable in-memory world behind the actuator port.

use crate::adapter::{
    Block, BotStatus, Control, Entity, EntityFilter, EquipSlot, GameAdapter, ItemStack, Vec3,
};
use crate::error::AdapterError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mutable world state owned by a [`SimAdapter`]. Tests construct one,
/// hand it to the adapter, and later inspect the command logs.
#[derive(Debug)]
pub struct SimWorld {
    /// Avatar state returned by `status`.
    pub status: BotStatus,
    /// Inventory returned by `inventory` and mutated by `craft`.
    pub inventory: Vec<ItemStack>,
    /// Entities visible to `nearby_entities`/`nearest_entity`.
    pub entities: Vec<Entity>,
    /// Blocks visible to `find_block`/`block_at`.
    pub blocks: Vec<Block>,
    /// Recipes: name → (inputs per batch, output count per batch).
    pub recipes: HashMap<String, (Vec<(String, u32)>, u32)>,
    /// Smelting outputs: input item → output item.
    pub smelts: HashMap<String, String>,
    /// Scripted raycast result (None = clear line of sight).
    pub raycast_hit: Option<Block>,
    /// When set, `goto` fails with this message.
    pub fail_goto: Option<String>,
    /// When set, `goto` sleeps this long before resolving.
    pub goto_delay: Option<std::time::Duration>,
    /// When set, `status` fails with this message.
    pub fail_status: Option<String>,

    /// Log of control-state changes.
    pub controls: Vec<(Control, bool)>,
    /// Log of chat lines sent.
    pub chat_log: Vec<String>,
    /// Log of whispers sent.
    pub whispers: Vec<(String, String)>,
    /// Log of equips.
    pub equips: Vec<(String, EquipSlot)>,
    /// Log of attacked entity ids.
    pub attacks: Vec<u64>,
    /// Log of dug block names.
    pub digs: Vec<String>,
    /// Log of goto destinations.
    pub gotos: Vec<Vec3>,
    /// Log of crafted (recipe, count).
    pub crafted: Vec<(String, u32)>,
    /// Number of `consume` calls.
    pub consumed: u32,
    /// Number of `clear_control_states` calls.
    pub control_clears: u32,
    /// Whether the held item is currently activated.
    pub item_active: bool,
}

impl Default for SimWorld {
    fn default() -> Self {
        let mut recipes = HashMap::new();
        for wood in ["oak", "spruce", "birch", "jungle", "acacia", "dark_oak"] {
            recipes.insert(
                format!("{wood}_planks"),
                (vec![(format!("{wood}_log"), 1)], 4),
            );
        }
        recipes.insert("stick".into(), (vec![("oak_planks".into(), 2)], 4));
        recipes.insert("crafting_table".into(), (vec![("oak_planks".into(), 4)], 1));
        let mut smelts = HashMap::new();
        smelts.insert("raw_iron".to_string(), "iron_ingot".to_string());
        smelts.insert("raw_gold".to_string(), "gold_ingot".to_string());
        Self {
            status: BotStatus {
                health: 20.0,
                food: 20.0,
                position: Vec3::default(),
                latency_ms: 40,
                dimension: "overworld".into(),
            },
            inventory: Vec::new(),
            entities: Vec::new(),
            blocks: Vec::new(),
            recipes,
            smelts,
            raycast_hit: None,
            fail_goto: None,
            goto_delay: None,
            fail_status: None,
            controls: Vec::new(),
            chat_log: Vec::new(),
            whispers: Vec::new(),
            equips: Vec::new(),
            attacks: Vec::new(),
            digs: Vec::new(),
            gotos: Vec::new(),
            crafted: Vec::new(),
            consumed: 0,
            control_clears: 0,
            item_active: false,
        }
    }
}

impl SimWorld {
    /// Count of an item across all stacks.
    pub fn count_of(&self, item: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|s| s.name == item)
            .map(|s| s.count)
            .sum()
    }

    /// Add `count` of `item` to the inventory.
    pub fn give(&mut self, item: &str, count: u32) {
        if let Some(stack) = self.inventory.iter_mut().find(|s| s.name == item) {
            stack.count += count;
        } else {
            self.inventory.push(ItemStack {
                name: item.into(),
                count,
                durability: None,
            });
        }
    }

    fn take(&mut self, item: &str, count: u32) -> bool {
        let have = self.count_of(item);
        if have < count {
            return false;
        }
        let mut remaining = count;
        for stack in &mut self.inventory {
            if stack.name == item {
                let used = stack.count.min(remaining);
                stack.count -= used;
                remaining -= used;
            }
        }
        self.inventory.retain(|s| s.count > 0);
        true
    }
}

/// A [`GameAdapter`] over a [`SimWorld`].
pub struct SimAdapter {
    world: Mutex<SimWorld>,
}

impl SimAdapter {
    /// Wrap a world.
    pub fn new(world: SimWorld) -> Self {
        Self {
            world: Mutex::new(world),
        }
    }

    /// Run `f` against the world (inspect logs, mutate state mid-test).
    pub fn with_world<R>(&self, f: impl FnOnce(&mut SimWorld) -> R) -> R {
        let mut world = self.world.lock().unwrap();
        f(&mut world)
    }
}

impl Default for SimAdapter {
    fn default() -> Self {
        Self::new(SimWorld::default())
    }
}

#[async_trait]
impl GameAdapter for SimAdapter {
    async fn status(&self) -> Result<BotStatus, AdapterError> {
        let world = self.world.lock().unwrap();
        if let Some(msg) = &world.fail_status {
            return Err(AdapterError::ConnectionLost(msg.clone()));
        }
        Ok(world.status.clone())
    }

    async fn inventory(&self) -> Result<Vec<ItemStack>, AdapterError> {
        Ok(self.world.lock().unwrap().inventory.clone())
    }

    async fn nearby_entities(&self, radius: f64) -> Result<Vec<Entity>, AdapterError> {
        let world = self.world.lock().unwrap();
        let me = world.status.position;
        Ok(world
            .entities
            .iter()
            .filter(|e| e.position.distance_to(&me) <= radius)
            .cloned()
            .collect())
    }

    async fn nearest_entity(&self, filter: EntityFilter) -> Result<Option<Entity>, AdapterError> {
        let world = self.world.lock().unwrap();
        let me = world.status.position;
        let mut best: Option<&Entity> = None;
        for e in world.entities.iter().filter(|e| e.alive) {
            let matches = match &filter {
                EntityFilter::Hostile => e.hostile,
                EntityFilter::Item => e.kind == "item",
                EntityFilter::Player => e.kind == "player",
                EntityFilter::Kind(k) => &e.kind == k,
                EntityFilter::Any => true,
            };
            if matches
                && best.is_none_or(|b| {
                    e.position.distance_to(&me) < b.position.distance_to(&me)
                })
            {
                best = Some(e);
            }
        }
        Ok(best.cloned())
    }

    async fn dig(&self, block: &Block, _force_look: bool) -> Result<(), AdapterError> {
        let mut world = self.world.lock().unwrap();
        world.digs.push(block.name.clone());
        let name = block.name.clone();
        world.give(&name, 1);
        Ok(())
    }

    async fn place_block(&self, _against: &Block, _face: Vec3) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn craft(&self, recipe: &str, count: u32, _use_table: bool) -> Result<(), AdapterError> {
        let mut world = self.world.lock().unwrap();
        let Some((inputs, per_batch)) = world.recipes.get(recipe).cloned() else {
            return Err(AdapterError::Unable(format!("no recipe for {recipe}")));
        };
        let batches = count.div_ceil(per_batch);
        for _ in 0..batches {
            for (item, n) in &inputs {
                if !world.take(item, *n) {
                    return Err(AdapterError::Unable(format!(
                        "missing ingredient {item} for {recipe}"
                    )));
                }
            }
            world.give(recipe, per_batch);
        }
        world.crafted.push((recipe.to_string(), count));
        Ok(())
    }

    async fn smelt(&self, input: &str, fuel: &str, count: u32) -> Result<(), AdapterError> {
        let mut world = self.world.lock().unwrap();
        let Some(output) = world.smelts.get(input).cloned() else {
            return Err(AdapterError::Unable(format!("{input} cannot be smelted")));
        };
        if world.count_of(fuel) == 0 {
            return Err(AdapterError::Unable(format!("no {fuel} for fuel")));
        }
        if !world.take(input, count) {
            return Err(AdapterError::Unable(format!("not enough {input}")));
        }
        world.give(&output, count);
        Ok(())
    }

    async fn equip(&self, item: &str, slot: EquipSlot) -> Result<(), AdapterError> {
        let mut world = self.world.lock().unwrap();
        if world.count_of(item) == 0 {
            return Err(AdapterError::Unable(format!("no {item} to equip")));
        }
        world.equips.push((item.to_string(), slot));
        Ok(())
    }

    async fn look_at(&self, _pos: Vec3) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn set_control_state(&self, control: Control, state: bool) -> Result<(), AdapterError> {
        self.world.lock().unwrap().controls.push((control, state));
        Ok(())
    }

    async fn clear_control_states(&self) -> Result<(), AdapterError> {
        self.world.lock().unwrap().control_clears += 1;
        Ok(())
    }

    async fn attack(&self, entity_id: u64) -> Result<(), AdapterError> {
        self.world.lock().unwrap().attacks.push(entity_id);
        Ok(())
    }

    async fn activate_item(&self) -> Result<(), AdapterError> {
        self.world.lock().unwrap().item_active = true;
        Ok(())
    }

    async fn deactivate_item(&self) -> Result<(), AdapterError> {
        self.world.lock().unwrap().item_active = false;
        Ok(())
    }

    async fn consume(&self) -> Result<(), AdapterError> {
        self.world.lock().unwrap().consumed += 1;
        Ok(())
    }

    async fn goto(&self, pos: Vec3) -> Result<(), AdapterError> {
        let delay = {
            let world = self.world.lock().unwrap();
            if let Some(msg) = &world.fail_goto {
                return Err(AdapterError::Unable(msg.clone()));
            }
            world.goto_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut world = self.world.lock().unwrap();
        world.gotos.push(pos);
        world.status.position = pos;
        Ok(())
    }

    async fn chat(&self, text: &str) -> Result<(), AdapterError> {
        self.world.lock().unwrap().chat_log.push(text.to_string());
        Ok(())
    }

    async fn whisper(&self, user: &str, text: &str) -> Result<(), AdapterError> {
        self.world
            .lock()
            .unwrap()
            .whispers
            .push((user.to_string(), text.to_string()));
        Ok(())
    }

    async fn find_block(
        &self,
        matching: &[String],
        max_distance: f64,
    ) -> Result<Option<Block>, AdapterError> {
        let world = self.world.lock().unwrap();
        let me = world.status.position;
        Ok(world
            .blocks
            .iter()
            .filter(|b| matching.contains(&b.name) && b.position.distance_to(&me) <= max_distance)
            .min_by(|a, b| {
                a.position
                    .distance_to(&me)
                    .total_cmp(&b.position.distance_to(&me))
            })
            .cloned())
    }

    async fn block_at(&self, pos: Vec3) -> Result<Option<Block>, AdapterError> {
        let world = self.world.lock().unwrap();
        Ok(world
            .blocks
            .iter()
            .find(|b| b.position.distance_to(&pos) < 0.5)
            .cloned())
    }

    async fn raycast(
        &self,
        _from: Vec3,
        _direction: Vec3,
        _max_distance: f64,
    ) -> Result<Option<Block>, AdapterError> {
        Ok(self.world.lock().unwrap().raycast_hit.clone())
    }
}
