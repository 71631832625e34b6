//! The builtin primitive set.
//!
//! Every primitive is a thin composition over the actuator port.
//! Movement primitives lease the `move` actuator lock with a short
//! timeout and back off when a reflex holds it; the combat reflex
//! acquires with timeout 0 and therefore always wins contention.

use crate::registry::{ActionContext, ActionError, PrimitiveAction, RetryDefaults};
use cortex_core::{ActionName, EquipSlot, Signal, Vec3};
use cortex_kernel::LockManager;
use futures::future::BoxFuture;
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Owner id used for deliberative actuator leases.
const OWNER: &str = "deliberative";
/// How long deliberative code waits for an actuator, milliseconds.
const LEASE_TIMEOUT_MS: i64 = 100;

/// Preferred foods, best first.
const FOOD_RANK: &[&str] = &[
    "enchanted_golden_apple",
    "golden_apple",
    "cooked_beef",
    "cooked_porkchop",
    "cooked_chicken",
    "bread",
    "baked_potato",
    "apple",
    "carrot",
];

/// Wood variants recognized by the plank helpers.
const WOOD_VARIANTS: &[&str] = &["oak", "spruce", "birch", "jungle", "acacia", "dark_oak"];

/// Every builtin primitive.
#[must_use]
pub fn all() -> Vec<Arc<dyn PrimitiveAction>> {
    vec![
        Arc::new(MineAction),
        Arc::new(CraftAction),
        Arc::new(PlaceAction),
        Arc::new(SmeltAction),
        Arc::new(MoveToAction),
        Arc::new(GatherNearbyAction),
        Arc::new(EnsureItemAction),
        Arc::new(CollectDropsAction),
        Arc::new(EatAction),
        Arc::new(EquipAction),
        Arc::new(AttackAction),
        Arc::new(CraftFirstAvailableAction),
        Arc::new(EnsureOffhandAction),
        Arc::new(EnforceCombatPostureAction),
        Arc::new(HoldPositionAction),
        Arc::new(SafeWanderAction),
        Arc::new(HumanLookAction),
        Arc::new(AdvanceStrategyAction),
        Arc::new(RequestNewToolAction),
    ]
}

// --- Param helpers ---

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ActionError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::InvalidParams(format!("missing string field `{key}`")))
}

fn opt_u64(params: &Value, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn opt_f64(params: &Value, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn option_f64(params: &Value, key: &str, default: f64) -> f64 {
    params
        .get("options")
        .and_then(|o| o.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(default)
}

fn parse_position(value: &Value) -> Result<Vec3, ActionError> {
    if let Some(arr) = value.as_array()
        && arr.len() == 3
    {
        let coords: Vec<f64> = arr.iter().filter_map(Value::as_f64).collect();
        if coords.len() == 3 {
            return Ok(Vec3::new(coords[0], coords[1], coords[2]));
        }
    }
    let (x, y, z) = (
        value.get("x").and_then(Value::as_f64),
        value.get("y").and_then(Value::as_f64),
        value.get("z").and_then(Value::as_f64),
    );
    match (x, y, z) {
        (Some(x), Some(y), Some(z)) => Ok(Vec3::new(x, y, z)),
        _ => Err(ActionError::InvalidParams(format!(
            "not a position: {value}"
        ))),
    }
}

fn position_json(pos: Vec3) -> Value {
    json!({"x": pos.x, "y": pos.y, "z": pos.z})
}

// --- Actuator leases ---

struct ActuatorLease<'a> {
    locks: &'a LockManager,
    name: &'static str,
}

impl Drop for ActuatorLease<'_> {
    fn drop(&mut self) {
        self.locks.release(self.name, OWNER);
    }
}

async fn lease<'a>(
    ctx: &'a ActionContext,
    name: &'static str,
) -> Result<ActuatorLease<'a>, ActionError> {
    if ctx.locks.acquire(name, OWNER, LEASE_TIMEOUT_MS).await {
        Ok(ActuatorLease {
            locks: &ctx.locks,
            name,
        })
    } else {
        Err(ActionError::Failed(format!(
            "{name} actuator is held by a reflex"
        )))
    }
}

// --- Inventory helpers ---

async fn count_matching(ctx: &ActionContext, item: &str) -> Result<u32, ActionError> {
    let inventory = ctx.adapter.inventory().await?;
    let count = match item {
        "planks" => inventory
            .iter()
            .filter(|s| s.name.ends_with("_planks"))
            .map(|s| s.count)
            .sum(),
        "log" | "logs" => inventory
            .iter()
            .filter(|s| s.name.ends_with("_log"))
            .map(|s| s.count)
            .sum(),
        exact => inventory
            .iter()
            .filter(|s| s.name == exact)
            .map(|s| s.count)
            .sum(),
    };
    Ok(count)
}

fn plank_candidates() -> Vec<String> {
    WOOD_VARIANTS
        .iter()
        .map(|wood| format!("{wood}_planks"))
        .collect()
}

fn is_tool(name: &str) -> bool {
    ["_pickaxe", "_axe", "_sword", "_shovel", "_hoe"]
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

// --- Smart helpers ---

/// Craft the first workable candidate. Plank candidates are prioritized
/// toward variants whose matching log is in inventory and fast-fail
/// entirely when no wood source exists.
async fn craft_first_available(
    ctx: &ActionContext,
    candidates: &[String],
    count: u32,
) -> Result<Value, ActionError> {
    let inventory = ctx.adapter.inventory().await?;
    let have = |item: &str| -> u32 {
        inventory
            .iter()
            .filter(|s| s.name == item)
            .map(|s| s.count)
            .sum()
    };

    let mut ordered: Vec<&String> = candidates.iter().collect();
    ordered.sort_by_key(|candidate| match candidate.strip_suffix("_planks") {
        Some(wood) if have(&format!("{wood}_log")) > 0 => 0u8,
        _ => 1,
    });

    let mut last_error = None;
    for candidate in ordered {
        if let Some(wood) = candidate.strip_suffix("_planks")
            && have(&format!("{wood}_log")) == 0
        {
            continue;
        }
        match ctx.adapter.craft(candidate, count, false).await {
            Ok(()) => return Ok(json!({"crafted": candidate, "count": count})),
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    Err(ActionError::Failed(last_error.unwrap_or_else(|| {
        "no craftable candidate (no wood source in inventory)".to_string()
    })))
}

/// Guarantee `target` of `item`, crafting the delta through the
/// compound recipes where needed. Boxed for recursion.
fn ensure_item<'a>(
    ctx: &'a ActionContext,
    item: &'a str,
    target: u32,
) -> BoxFuture<'a, Result<Value, ActionError>> {
    Box::pin(async move {
        let have = count_matching(ctx, item).await?;
        if have >= target {
            return Ok(json!({"item": item, "count": have}));
        }
        let needed = target - have;

        match item {
            "planks" => {
                craft_first_available(ctx, &plank_candidates(), needed).await?;
            }
            "crafting_table" => {
                ensure_item(ctx, "planks", needed * 4).await?;
                ctx.adapter.craft("crafting_table", needed, false).await?;
            }
            "stick" => {
                ensure_item(ctx, "planks", needed.div_ceil(4) * 2).await?;
                ctx.adapter.craft("stick", needed, false).await?;
            }
            tool if is_tool(tool) => {
                ensure_tool_materials(ctx, tool).await?;
                ctx.adapter.craft(tool, needed, true).await?;
            }
            other => {
                ctx.adapter.craft(other, needed, false).await?;
            }
        }

        let now = count_matching(ctx, item).await?;
        if now >= target {
            Ok(json!({"item": item, "count": now}))
        } else {
            Err(ActionError::Failed(format!(
                "could not reach {target} {item}, have {now}"
            )))
        }
    })
}

/// Make sure the head material and sticks for a tool are on hand.
/// Wooden tools are fully self-sufficient; mined materials must already
/// be in inventory.
async fn ensure_tool_materials(ctx: &ActionContext, tool: &str) -> Result<(), ActionError> {
    ensure_item(ctx, "stick", 2).await?;
    if tool.starts_with("wooden_") {
        ensure_item(ctx, "planks", 3).await?;
        return Ok(());
    }
    let material = if tool.starts_with("stone_") {
        "cobblestone"
    } else if tool.starts_with("iron_") {
        "iron_ingot"
    } else if tool.starts_with("golden_") {
        "gold_ingot"
    } else if tool.starts_with("diamond_") {
        "diamond"
    } else {
        return Err(ActionError::InvalidParams(format!(
            "unknown tool tier: {tool}"
        )));
    };
    if count_matching(ctx, material).await? < 3 {
        return Err(ActionError::Failed(format!(
            "missing material for {tool}: need 3 {material}"
        )));
    }
    Ok(())
}

// --- Primitives ---

/// Break and collect blocks of a target type.
pub struct MineAction;

impl PrimitiveAction for MineAction {
    fn name(&self) -> ActionName {
        ActionName::Mine
    }
    fn positional(&self) -> &'static [&'static str] {
        &["targetBlock", "count"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["targetBlock", "count"]
    }
    fn retry_defaults(&self) -> RetryDefaults {
        RetryDefaults {
            retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(15)
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let target = require_str(params, "targetBlock")?;
            let count = opt_u64(params, "count", 1);
            let max_distance = option_f64(params, "maxDistance", 32.0);
            let _lease = lease(ctx, "move").await?;
            let mut mined = 0u64;
            for _ in 0..count {
                if ctx.cancel.is_cancelled() {
                    return Err(ActionError::Failed("cancelled".into()));
                }
                let block = ctx
                    .adapter
                    .find_block(&[target.to_string()], max_distance)
                    .await?
                    .ok_or_else(|| {
                        ActionError::Failed(format!(
                            "no {target} within {max_distance} blocks"
                        ))
                    })?;
                ctx.adapter.goto(block.position).await?;
                ctx.adapter.dig(&block, true).await?;
                mined += 1;
            }
            Ok(json!({"block": target, "mined": mined}))
        })
    }
}

/// Craft a recipe.
pub struct CraftAction;

impl PrimitiveAction for CraftAction {
    fn name(&self) -> ActionName {
        ActionName::Craft
    }
    fn positional(&self) -> &'static [&'static str] {
        &["recipe", "count"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["recipe", "count", "table"]
    }
    fn retry_defaults(&self) -> RetryDefaults {
        RetryDefaults {
            retries: 2,
            base_delay: Duration::from_millis(300),
        }
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let recipe = require_str(params, "recipe")?;
            let count = opt_u64(params, "count", 1) as u32;
            let table = params
                .get("table")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            ctx.adapter.craft(recipe, count, table).await?;
            Ok(json!({"crafted": recipe, "count": count}))
        })
    }
}

/// Place a block from inventory at a position.
pub struct PlaceAction;

impl PrimitiveAction for PlaceAction {
    fn name(&self) -> ActionName {
        ActionName::Place
    }
    fn positional(&self) -> &'static [&'static str] {
        &["block", "position"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["block", "position"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let block = require_str(params, "block")?;
            let pos = parse_position(
                params
                    .get("position")
                    .ok_or_else(|| ActionError::InvalidParams("missing `position`".into()))?,
            )?;
            let below = Vec3::new(pos.x, pos.y - 1.0, pos.z);
            let against = ctx
                .adapter
                .block_at(below)
                .await?
                .ok_or_else(|| ActionError::Failed("no supporting block below target".into()))?;
            ctx.adapter.equip(block, EquipSlot::Hand).await?;
            ctx.adapter
                .place_block(&against, Vec3::new(0.0, 1.0, 0.0))
                .await?;
            Ok(json!({"placed": block, "position": position_json(pos)}))
        })
    }
}

/// Smelt items in a reachable furnace.
pub struct SmeltAction;

impl PrimitiveAction for SmeltAction {
    fn name(&self) -> ActionName {
        ActionName::Smelt
    }
    fn positional(&self) -> &'static [&'static str] {
        &["input", "fuel", "count"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["input", "fuel", "count"]
    }
    fn retry_defaults(&self) -> RetryDefaults {
        RetryDefaults {
            retries: 2,
            base_delay: Duration::from_millis(400),
        }
    }
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(20)
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let input = require_str(params, "input")?;
            let fuel = params
                .get("fuel")
                .and_then(Value::as_str)
                .unwrap_or("coal");
            let count = opt_u64(params, "count", 1) as u32;
            ctx.adapter.smelt(input, fuel, count).await?;
            Ok(json!({"smelted": input, "count": count}))
        })
    }
}

/// Walk to a position.
pub struct MoveToAction;

impl PrimitiveAction for MoveToAction {
    fn name(&self) -> ActionName {
        ActionName::MoveTo
    }
    fn positional(&self) -> &'static [&'static str] {
        &["position"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["position"]
    }
    fn retry_defaults(&self) -> RetryDefaults {
        RetryDefaults {
            retries: 1,
            base_delay: Duration::from_millis(300),
        }
    }
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(25)
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let pos = parse_position(
                params
                    .get("position")
                    .ok_or_else(|| ActionError::InvalidParams("missing `position`".into()))?,
            )?;
            let _lease = lease(ctx, "move").await?;
            ctx.adapter.goto(pos).await?;
            Ok(json!({"position": position_json(pos)}))
        })
    }
}

/// Find and collect a resource type nearby.
pub struct GatherNearbyAction;

impl PrimitiveAction for GatherNearbyAction {
    fn name(&self) -> ActionName {
        ActionName::GatherNearby
    }
    fn positional(&self) -> &'static [&'static str] {
        &["resource", "count"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["resource", "count"]
    }
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(20)
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let resource = require_str(params, "resource")?;
            let count = opt_u64(params, "count", 1);
            let max_distance = option_f64(params, "maxDistance", 32.0);
            let _lease = lease(ctx, "move").await?;
            let mut gathered = 0u64;
            for _ in 0..count {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                let Some(block) = ctx
                    .adapter
                    .find_block(&[resource.to_string()], max_distance)
                    .await?
                else {
                    break;
                };
                ctx.adapter.goto(block.position).await?;
                ctx.adapter.dig(&block, true).await?;
                gathered += 1;
            }
            if gathered == 0 {
                return Err(ActionError::Failed(format!(
                    "no {resource} within {max_distance} blocks"
                )));
            }
            Ok(json!({"resource": resource, "gathered": gathered}))
        })
    }
}

/// Guarantee an inventory count, crafting the delta if needed.
pub struct EnsureItemAction;

impl PrimitiveAction for EnsureItemAction {
    fn name(&self) -> ActionName {
        ActionName::EnsureItem
    }
    fn positional(&self) -> &'static [&'static str] {
        &["itemName", "targetCount"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["itemName", "targetCount"]
    }
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(20)
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let item = require_str(params, "itemName")?;
            let target = opt_u64(params, "targetCount", 1) as u32;
            ensure_item(ctx, item, target).await
        })
    }
}

/// Pick up dropped item entities.
pub struct CollectDropsAction;

impl PrimitiveAction for CollectDropsAction {
    fn name(&self) -> ActionName {
        ActionName::CollectDrops
    }
    fn positional(&self) -> &'static [&'static str] {
        &["radius"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["radius"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let radius = opt_f64(params, "radius", 8.0);
            let _lease = lease(ctx, "move").await?;
            let drops: Vec<_> = ctx
                .adapter
                .nearby_entities(radius)
                .await?
                .into_iter()
                .filter(|e| e.kind == "item" && e.alive)
                .collect();
            let mut collected = 0u64;
            for drop in &drops {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                ctx.adapter.goto(drop.position).await?;
                collected += 1;
            }
            Ok(json!({"collected": collected}))
        })
    }
}

/// Eat the best available food.
pub struct EatAction;

impl PrimitiveAction for EatAction {
    fn name(&self) -> ActionName {
        ActionName::Eat
    }
    fn positional(&self) -> &'static [&'static str] {
        &["food"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["food"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let food = match params.get("food").and_then(Value::as_str) {
                Some(explicit) => explicit.to_string(),
                None => {
                    let inventory = ctx.adapter.inventory().await?;
                    FOOD_RANK
                        .iter()
                        .find(|f| inventory.iter().any(|s| &s.name == *f && s.count > 0))
                        .map(|f| (*f).to_string())
                        .ok_or_else(|| ActionError::Failed("no food in inventory".into()))?
                }
            };
            ctx.adapter.equip(&food, EquipSlot::Hand).await?;
            ctx.adapter.consume().await?;
            Ok(json!({"ate": food}))
        })
    }
}

fn parse_slot(name: &str) -> Result<EquipSlot, ActionError> {
    match name {
        "hand" => Ok(EquipSlot::Hand),
        "off-hand" | "off_hand" | "offhand" => Ok(EquipSlot::OffHand),
        "head" => Ok(EquipSlot::Head),
        "torso" => Ok(EquipSlot::Torso),
        "legs" => Ok(EquipSlot::Legs),
        "feet" => Ok(EquipSlot::Feet),
        other => Err(ActionError::InvalidParams(format!(
            "unknown equip slot: {other}"
        ))),
    }
}

/// Equip an item into a slot.
pub struct EquipAction;

impl PrimitiveAction for EquipAction {
    fn name(&self) -> ActionName {
        ActionName::Equip
    }
    fn positional(&self) -> &'static [&'static str] {
        &["item", "slot"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["item", "slot"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let item = require_str(params, "item")?;
            let slot = parse_slot(params.get("slot").and_then(Value::as_str).unwrap_or("hand"))?;
            ctx.adapter.equip(item, slot).await?;
            Ok(json!({"equipped": item}))
        })
    }
}

/// Attack an entity by id.
pub struct AttackAction;

impl PrimitiveAction for AttackAction {
    fn name(&self) -> ActionName {
        ActionName::Attack
    }
    fn positional(&self) -> &'static [&'static str] {
        &["targetId"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["targetId"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let id = params
                .get("targetId")
                .and_then(Value::as_u64)
                .ok_or_else(|| ActionError::InvalidParams("missing `targetId`".into()))?;
            ctx.adapter.attack(id).await?;
            Ok(json!({"attacked": id}))
        })
    }
}

/// Craft the first workable candidate recipe.
pub struct CraftFirstAvailableAction;

impl PrimitiveAction for CraftFirstAvailableAction {
    fn name(&self) -> ActionName {
        ActionName::CraftFirstAvailable
    }
    fn positional(&self) -> &'static [&'static str] {
        &["candidates", "count"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["candidates", "count"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let candidates: Vec<String> = params
                .get("candidates")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .ok_or_else(|| ActionError::InvalidParams("missing `candidates`".into()))?;
            let count = opt_u64(params, "count", 1) as u32;
            craft_first_available(ctx, &candidates, count).await
        })
    }
}

/// Guarantee an off-hand item.
pub struct EnsureOffhandAction;

impl PrimitiveAction for EnsureOffhandAction {
    fn name(&self) -> ActionName {
        ActionName::EnsureOffhand
    }
    fn positional(&self) -> &'static [&'static str] {
        &["item"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["item"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let item = require_str(params, "item")?;
            if count_matching(ctx, item).await? == 0 {
                // Best effort: some offhand items are craftable.
                let _ = ctx.adapter.craft(item, 1, true).await;
            }
            if count_matching(ctx, item).await? == 0 {
                return Err(ActionError::Failed(format!("no {item} for the off hand")));
            }
            ctx.adapter.equip(item, EquipSlot::OffHand).await?;
            Ok(json!({"offhand": item}))
        })
    }
}

/// Choose totem or shield for the off hand by health.
pub struct EnforceCombatPostureAction;

impl PrimitiveAction for EnforceCombatPostureAction {
    fn name(&self) -> ActionName {
        ActionName::EnforceCombatPosture
    }
    fn positional(&self) -> &'static [&'static str] {
        &["shield", "totemThreshold"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["shield", "totemThreshold"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let threshold = opt_f64(params, "totemThreshold", 10.0);
            let want_shield = params
                .get("shield")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let health = ctx.adapter.status().await?.health;
            let has_totem = count_matching(ctx, "totem_of_undying").await? > 0;
            let has_shield = count_matching(ctx, "shield").await? > 0;

            if health <= threshold && has_totem {
                ctx.adapter
                    .equip("totem_of_undying", EquipSlot::OffHand)
                    .await?;
                return Ok(json!({"posture": "totem"}));
            }
            if want_shield && has_shield {
                ctx.adapter.equip("shield", EquipSlot::OffHand).await?;
                return Ok(json!({"posture": "shield"}));
            }
            if has_totem {
                ctx.adapter
                    .equip("totem_of_undying", EquipSlot::OffHand)
                    .await?;
                return Ok(json!({"posture": "totem"}));
            }
            Err(ActionError::Failed(
                "no shield or totem for combat posture".into(),
            ))
        })
    }
}

/// Stand still.
pub struct HoldPositionAction;

impl PrimitiveAction for HoldPositionAction {
    fn name(&self) -> ActionName {
        ActionName::HoldPosition
    }
    fn positional(&self) -> &'static [&'static str] {
        &[]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &[]
    }
    fn execute<'a>(
        &'a self,
        _params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            ctx.adapter.clear_control_states().await?;
            Ok(json!({"holding": true}))
        })
    }
}

/// Wander to a random safe spot within the territorial radius.
pub struct SafeWanderAction;

impl PrimitiveAction for SafeWanderAction {
    fn name(&self) -> ActionName {
        ActionName::SafeWander
    }
    fn positional(&self) -> &'static [&'static str] {
        &["radius"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["radius"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let radius = opt_f64(params, "radius", ctx.config.territorial_radius);
            let status = ctx.adapter.status().await?;
            let _lease = lease(ctx, "move").await?;
            for _ in 0..5 {
                let (dx, dz) = {
                    let mut rng = rand::rng();
                    (
                        rng.random_range(-radius..=radius),
                        rng.random_range(-radius..=radius),
                    )
                };
                let target = Vec3::new(
                    status.position.x + dx,
                    status.position.y,
                    status.position.z + dz,
                );
                let ground = ctx
                    .adapter
                    .block_at(Vec3::new(target.x, target.y - 1.0, target.z))
                    .await?;
                if ground.is_some_and(|b| b.solid) {
                    ctx.adapter.goto(target).await?;
                    return Ok(json!({"position": position_json(target)}));
                }
            }
            Err(ActionError::Failed("no safe wander target found".into()))
        })
    }
}

/// Idle head movement.
pub struct HumanLookAction;

impl PrimitiveAction for HumanLookAction {
    fn name(&self) -> ActionName {
        ActionName::HumanLook
    }
    fn positional(&self) -> &'static [&'static str] {
        &[]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &[]
    }
    fn execute<'a>(
        &'a self,
        _params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let status = ctx.adapter.status().await?;
            let _lease = lease(ctx, "look").await?;
            let (dx, dy, dz) = {
                let mut rng = rand::rng();
                (
                    rng.random_range(-4.0..=4.0),
                    rng.random_range(-1.0..=1.0),
                    rng.random_range(-4.0..=4.0),
                )
            };
            ctx.adapter
                .look_at(Vec3::new(
                    status.position.x + dx,
                    status.position.y + 1.6 + dy,
                    status.position.z + dz,
                ))
                .await?;
            Ok(json!({"looked": true}))
        })
    }
}

/// Advance the strategy cursor on the blackboard.
pub struct AdvanceStrategyAction;

impl PrimitiveAction for AdvanceStrategyAction {
    fn name(&self) -> ActionName {
        ActionName::AdvanceStrategy
    }
    fn positional(&self) -> &'static [&'static str] {
        &[]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &[]
    }
    fn execute<'a>(
        &'a self,
        _params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let Some(plan) = ctx
                .blackboard
                .get("strategy.plan")
                .and_then(|v| v.as_array().cloned())
            else {
                return Ok(json!({"done": true}));
            };
            let cursor = ctx
                .blackboard
                .get_f64("strategy.cursor")
                .unwrap_or(0.0) as usize;
            if cursor >= plan.len() {
                return Ok(json!({"done": true}));
            }
            ctx.blackboard.set(
                "strategy.cursor",
                json!(cursor + 1),
                "advance-strategy",
            );
            Ok(json!({"step": plan[cursor], "cursor": cursor}))
        })
    }
}

/// Signal that a missing tool is needed.
pub struct RequestNewToolAction;

impl PrimitiveAction for RequestNewToolAction {
    fn name(&self) -> ActionName {
        ActionName::RequestNewTool
    }
    fn positional(&self) -> &'static [&'static str] {
        &["description"]
    }
    fn keep_top_level(&self) -> &'static [&'static str] {
        &["description"]
    }
    fn execute<'a>(
        &'a self,
        params: &'a Value,
        ctx: &'a ActionContext,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let description = require_str(params, "description")?;
            ctx.bus
                .publish(Signal::ToolNeeded, json!({ "description": description }));
            Ok(json!({"requested": description}))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::AgentConfig;
    use cortex_core::test_utils::{SimAdapter, SimWorld};
    use cortex_kernel::{Blackboard, SignalBus};
    use tokio_util::sync::CancellationToken;

    fn ctx_with(world: SimWorld) -> (Arc<SimAdapter>, ActionContext) {
        let adapter = Arc::new(SimAdapter::new(world));
        let ctx = ActionContext {
            adapter: Arc::clone(&adapter) as Arc<dyn cortex_core::GameAdapter>,
            blackboard: Arc::new(Blackboard::new()),
            locks: LockManager::new(),
            bus: SignalBus::new(),
            config: AgentConfig::default(),
            cancel: CancellationToken::new(),
        };
        (adapter, ctx)
    }

    #[tokio::test]
    async fn ensure_item_crafts_planks_from_logs() {
        let mut world = SimWorld::default();
        world.give("oak_log", 3);
        let (adapter, ctx) = ctx_with(world);

        let data = ensure_item(&ctx, "planks", 4).await.unwrap();
        assert_eq!(data["item"], "planks");
        assert!(data["count"].as_u64().unwrap() >= 4);
        adapter.with_world(|w| {
            assert!(w.count_of("oak_planks") >= 4);
            assert_eq!(w.crafted[0].0, "oak_planks");
        });
    }

    #[tokio::test]
    async fn ensure_item_builds_crafting_table_via_planks() {
        let mut world = SimWorld::default();
        world.give("oak_log", 2);
        let (adapter, ctx) = ctx_with(world);

        ensure_item(&ctx, "crafting_table", 1).await.unwrap();
        adapter.with_world(|w| assert_eq!(w.count_of("crafting_table"), 1));
    }

    #[tokio::test]
    async fn craft_first_available_fast_fails_without_wood() {
        let (_adapter, ctx) = ctx_with(SimWorld::default());
        let err = craft_first_available(&ctx, &plank_candidates(), 4)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no craftable candidate"));
    }

    #[tokio::test]
    async fn craft_first_available_prefers_matching_variant() {
        let mut world = SimWorld::default();
        world.give("birch_log", 1);
        let (_adapter, ctx) = ctx_with(world);
        let data = craft_first_available(&ctx, &plank_candidates(), 4)
            .await
            .unwrap();
        assert_eq!(data["crafted"], "birch_planks");
    }

    #[tokio::test]
    async fn combat_posture_picks_totem_at_low_health() {
        let mut world = SimWorld::default();
        world.status.health = 6.0;
        world.give("totem_of_undying", 1);
        world.give("shield", 1);
        let (adapter, ctx) = ctx_with(world);

        let action = EnforceCombatPostureAction;
        let data = action
            .execute(&json!({"totemThreshold": 10.0}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["posture"], "totem");
        adapter.with_world(|w| {
            assert_eq!(
                w.equips.last().unwrap(),
                &("totem_of_undying".to_string(), EquipSlot::OffHand)
            );
        });
    }

    #[tokio::test]
    async fn combat_posture_prefers_shield_when_healthy() {
        let mut world = SimWorld::default();
        world.give("totem_of_undying", 1);
        world.give("shield", 1);
        let (_adapter, ctx) = ctx_with(world);
        let data = EnforceCombatPostureAction
            .execute(&json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(data["posture"], "shield");
    }

    #[tokio::test]
    async fn eat_picks_best_ranked_food() {
        let mut world = SimWorld::default();
        world.give("bread", 2);
        world.give("golden_apple", 1);
        let (adapter, ctx) = ctx_with(world);
        let data = EatAction.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(data["ate"], "golden_apple");
        adapter.with_world(|w| assert_eq!(w.consumed, 1));
    }

    #[tokio::test]
    async fn movement_backs_off_when_reflex_holds_lock() {
        let (_adapter, ctx) = ctx_with(SimWorld::default());
        assert!(ctx.locks.acquire("move", "combat-reflex", 0).await);
        let err = MoveToAction
            .execute(&json!({"position": {"x": 1.0, "y": 64.0, "z": 1.0}}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("held by a reflex"));
    }
}
