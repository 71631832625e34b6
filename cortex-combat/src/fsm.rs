//! The reflex state machine and its tick body.

use cortex_core::{
    Control, Entity, EquipSlot, GameAdapter, Signal, SharedGeneticParams, Vec3,
};
use cortex_kernel::{Blackboard, LockManager, SignalBus};
use cortex_rules::BehaviorEngine;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Owner id under which the reflex holds actuator locks.
const LOCK_OWNER: &str = "combat-reflex";

/// Errors inside one combat tick. Three in a row open the breaker.
#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    /// The actuator port failed mid-tick.
    #[error("adapter error: {0}")]
    Adapter(#[from] cortex_core::AdapterError),
    /// Anything else.
    #[error("{0}")]
    Failed(String),
}

/// Reflex state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatState {
    /// Not fighting.
    Idle,
    /// Locked onto a target.
    Engage,
    /// Running the retreat protocol.
    Retreat,
}

/// Static tuning for the reflex.
#[derive(Debug, Clone)]
pub struct CombatConfig {
    /// Tick period while engaged.
    pub tick: Duration,
    /// Latency above which the deadman switch trips, milliseconds.
    pub deadman_latency_ms: u64,
    /// Consecutive tick errors that open the breaker.
    pub breaker_threshold: u32,
    /// Health below which the emergency heal runs.
    pub emergency_heal_below: f64,
    /// Minimum gap between emergency heals.
    pub heal_cooldown: Duration,
    /// How long a consume takes.
    pub eat_duration: Duration,
    /// Target distance beyond which the engagement drops.
    pub disengage_distance: f64,
    /// Armor durability below which retreat triggers.
    pub min_armor_durability: u32,
    /// Weaponless grace before retreat triggers.
    pub no_weapon_grace: Duration,
    /// Health above which a clean exit counts as a win.
    pub win_health: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            deadman_latency_ms: 500,
            breaker_threshold: 3,
            emergency_heal_below: 8.0,
            heal_cooldown: Duration::from_secs(3),
            eat_duration: Duration::from_millis(1800),
            disengage_distance: 32.0,
            min_armor_durability: 5,
            no_weapon_grace: Duration::from_secs(2),
            win_health: 10.0,
        }
    }
}

struct FsmState {
    state: CombatState,
    target_id: Option<u64>,
    engaged_at: Option<Instant>,
    last_heal: Option<Instant>,
    consecutive_failures: u32,
    retreated: bool,
    sprint_reenable_at: Option<Instant>,
    dodge_bias_right: bool,
}

impl FsmState {
    fn idle() -> Self {
        Self {
            state: CombatState::Idle,
            target_id: None,
            engaged_at: None,
            last_heal: None,
            consecutive_failures: 0,
            retreated: false,
            sprint_reenable_at: None,
            dodge_bias_right: false,
        }
    }
}

/// The combat reflex. One instance per agent; the tick loop runs on a
/// dedicated scheduled unit while engaged.
pub struct CombatReflex {
    adapter: Arc<dyn GameAdapter>,
    rules: Arc<BehaviorEngine>,
    locks: LockManager,
    bus: SignalBus,
    blackboard: Arc<Blackboard>,
    genetics: SharedGeneticParams,
    config: CombatConfig,
    state: Mutex<FsmState>,
    retreats: AtomicU64,
    wins: AtomicU64,
    losses: AtomicU64,
}

impl CombatReflex {
    /// Assemble a reflex.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn GameAdapter>,
        rules: Arc<BehaviorEngine>,
        locks: LockManager,
        bus: SignalBus,
        blackboard: Arc<Blackboard>,
        genetics: SharedGeneticParams,
        config: CombatConfig,
    ) -> Self {
        Self {
            adapter,
            rules,
            locks,
            bus,
            blackboard,
            genetics,
            config,
            state: Mutex::new(FsmState::idle()),
            retreats: AtomicU64::new(0),
            wins: AtomicU64::new(0),
            losses: AtomicU64::new(0),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CombatState {
        self.state.lock().unwrap().state
    }

    /// How many retreats the reflex has run.
    #[must_use]
    pub fn retreats(&self) -> u64 {
        self.retreats.load(Ordering::Relaxed)
    }

    /// Wins recorded on exit.
    #[must_use]
    pub fn wins(&self) -> u64 {
        self.wins.load(Ordering::Relaxed)
    }

    /// Losses recorded on exit.
    #[must_use]
    pub fn losses(&self) -> u64 {
        self.losses.load(Ordering::Relaxed)
    }

    /// IDLE → ENGAGE. Grabs the look/move locks non-blockingly (the
    /// reflex always outprioritizes deliberative leases, which time out
    /// in 100 ms) and starts tracking the target.
    pub async fn enter_combat(&self, target: &Entity) {
        {
            let mut state = self.state.lock().unwrap();
            if state.state != CombatState::Idle {
                return;
            }
            *state = FsmState::idle();
            state.state = CombatState::Engage;
            state.target_id = Some(target.id);
            state.engaged_at = Some(Instant::now());
        }
        for lock in ["look", "move"] {
            if !self.locks.acquire(lock, LOCK_OWNER, 0).await {
                tracing::warn!(lock, "entering combat without the actuator lock");
            }
        }
        self.blackboard
            .set("combat.engaged", json!(true), LOCK_OWNER);
        self.bus
            .publish(Signal::CombatStarted, json!({"target": target.id, "kind": target.kind}));
        self.bus
            .publish(Signal::EngagedTarget, json!({"target": target.id}));
        tracing::info!(target = target.id, kind = %target.kind, "entering combat");
    }

    /// Exit to IDLE, release locks, record and publish the outcome.
    async fn exit_combat(&self, health: f64) {
        let retreated = {
            let mut state = self.state.lock().unwrap();
            if state.state == CombatState::Idle {
                return;
            }
            let retreated = state.retreated;
            *state = FsmState::idle();
            retreated
        };
        let _ = self.adapter.clear_control_states().await;
        for lock in ["look", "move"] {
            self.locks.release(lock, LOCK_OWNER);
        }
        let win = health > self.config.win_health && !retreated;
        if win {
            self.wins.fetch_add(1, Ordering::Relaxed);
        } else {
            self.losses.fetch_add(1, Ordering::Relaxed);
        }
        self.blackboard
            .set("combat.engaged", json!(false), LOCK_OWNER);
        self.bus.publish(
            Signal::CombatEnded,
            json!({"win": win, "retreated": retreated, "health": health}),
        );
        tracing::info!(win, retreated, health, "combat over");
    }

    /// Abandon combat immediately (emergency-recall).
    pub async fn emergency_exit(&self) {
        let health = self
            .adapter
            .status()
            .await
            .map(|s| s.health)
            .unwrap_or(0.0);
        self.exit_combat(health).await;
    }

    /// Drive the 50 ms tick loop until `shutdown` fires. Ticks are
    /// no-ops while IDLE.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if self.state() != CombatState::Idle {
                        self.tick().await;
                    }
                }
            }
        }
    }

    /// One combat tick, with the circuit breaker around the body.
    /// Public so tests can drive the machine deterministically.
    pub async fn tick(&self) {
        if self.state() == CombatState::Idle {
            return;
        }
        match self.tick_inner().await {
            Ok(()) => {
                self.state.lock().unwrap().consecutive_failures = 0;
            }
            Err(e) => {
                let failures = {
                    let mut state = self.state.lock().unwrap();
                    state.consecutive_failures += 1;
                    state.consecutive_failures
                };
                tracing::warn!(error = %e, failures, "combat tick failed");
                if failures >= self.config.breaker_threshold {
                    self.bus.publish(
                        Signal::SystemError,
                        json!({"source": "combat", "error": e.to_string()}),
                    );
                    self.bus
                        .publish(Signal::EmergencyRecall, json!({"source": "combat"}));
                    self.exit_combat(0.0).await;
                }
            }
        }
    }

    async fn tick_inner(&self) -> Result<(), CombatError> {
        let status = self.adapter.status().await?;
        let policy = self
            .rules
            .combat_policy(&json!({"health": status.health}));
        let genetics = *self.genetics.read().unwrap();

        // A rule override beats the adapted default.
        let rule_retreat = policy
            .get("retreatHealth")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(6.0);
        let retreat_health = if (rule_retreat - 6.0).abs() > f64::EPSILON {
            rule_retreat
        } else {
            genetics.retreat_health
        };
        let totem_threshold = policy
            .get("totemThreshold")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(10.0);

        // 1. Deadman switch: too laggy to fight — stop sending inputs.
        if status.latency_ms > self.config.deadman_latency_ms {
            self.adapter.clear_control_states().await?;
            if let Some(apple) = self.best_of(&["enchanted_golden_apple", "golden_apple"]).await? {
                self.adapter.equip(&apple, EquipSlot::Hand).await?;
                self.adapter.consume().await?;
            }
            tracing::warn!(latency_ms = status.latency_ms, "deadman switch tripped");
            return Ok(());
        }

        let inventory = self.adapter.inventory().await?;

        // 3. Auto-totem.
        if status.health < totem_threshold
            && inventory.iter().any(|s| s.name == "totem_of_undying")
        {
            self.adapter
                .equip("totem_of_undying", EquipSlot::OffHand)
                .await?;
        }

        // 4. Emergency heal.
        let heal_due = {
            let state = self.state.lock().unwrap();
            state
                .last_heal
                .is_none_or(|at| at.elapsed() > self.config.heal_cooldown)
        };
        if status.health < self.config.emergency_heal_below && heal_due {
            if let Some(food) = self.best_food(&inventory) {
                self.adapter.equip(&food, EquipSlot::Hand).await?;
                self.adapter.consume().await?;
                tokio::time::sleep(self.config.eat_duration).await;
                self.state.lock().unwrap().last_heal = Some(Instant::now());
                if let Some(weapon) = self.best_melee(&inventory) {
                    self.adapter.equip(&weapon, EquipSlot::Hand).await?;
                }
            }
        }

        // 5. Defensive needs.
        let entities = self.adapter.nearby_entities(30.0).await?;
        self.defend(&status, &entities).await?;

        // Target validity and transitions.
        let target_id = self.state.lock().unwrap().target_id;
        let target = target_id.and_then(|id| entities.iter().find(|e| e.id == id).cloned());
        let target = match target {
            Some(t)
                if t.alive
                    && t.position.distance_to(&status.position) <= self.config.disengage_distance =>
            {
                t
            }
            _ => {
                // ENGAGE → IDLE: target gone, dead, or out of range.
                self.exit_combat(status.health).await;
                return Ok(());
            }
        };

        let combat_age = self
            .state
            .lock()
            .unwrap()
            .engaged_at
            .map_or(Duration::ZERO, |at| at.elapsed());
        let weaponless = self.best_melee(&inventory).is_none()
            && !inventory
                .iter()
                .any(|s| s.name == "bow" || s.name == "crossbow");
        let armor_broken = inventory
            .iter()
            .filter(|s| {
                ["_helmet", "_chestplate", "_leggings", "_boots"]
                    .iter()
                    .any(|suffix| s.name.ends_with(suffix))
            })
            .filter_map(|s| s.durability)
            .min()
            .is_some_and(|d| d < self.config.min_armor_durability);

        let must_retreat = status.health < retreat_health
            || (weaponless && combat_age > self.config.no_weapon_grace)
            || armor_broken;

        if must_retreat {
            {
                let mut state = self.state.lock().unwrap();
                if state.state != CombatState::Retreat {
                    state.state = CombatState::Retreat;
                    state.retreated = true;
                    self.retreats.fetch_add(1, Ordering::Relaxed);
                }
            }
            tracing::info!(
                health = status.health,
                weaponless,
                armor_broken,
                "retreating"
            );
            self.retreat_protocol(&status, &target, &inventory).await?;
            // RETREAT → IDLE once the protocol completes.
            self.exit_combat(status.health).await;
            return Ok(());
        }

        // 6. Engagement.
        self.engage(&status, &target, &inventory, &genetics).await
    }

    async fn defend(
        &self,
        status: &cortex_core::BotStatus,
        entities: &[Entity],
    ) -> Result<(), CombatError> {
        let mut inbound_projectile = false;
        let mut fused_creeper = false;
        for entity in entities {
            let distance = entity.position.distance_to(&status.position);
            if entity.kind == "creeper" && entity.fused && distance <= 5.0 {
                fused_creeper = true;
            }
            let toward_us = entity
                .position
                .direction_to(&status.position)
                .normalized();
            let heading = entity.velocity.normalized();
            if distance <= 30.0
                && heading.dot(&toward_us) > 0.9
                && matches!(entity.kind.as_str(), "arrow" | "trident" | "fireball")
            {
                inbound_projectile = true;
            }
        }

        if fused_creeper {
            // Dodge-strafe away from the blast, alternating sides.
            let right = {
                let mut state = self.state.lock().unwrap();
                state.dodge_bias_right = !state.dodge_bias_right;
                state.dodge_bias_right
            };
            let control = if right { Control::Right } else { Control::Left };
            self.adapter.set_control_state(Control::Sprint, true).await?;
            self.adapter.set_control_state(control, true).await?;
        } else if inbound_projectile {
            let has_shield = self
                .adapter
                .inventory()
                .await?
                .iter()
                .any(|s| s.name == "shield");
            if has_shield {
                self.adapter.equip("shield", EquipSlot::OffHand).await?;
                self.adapter.activate_item().await?;
            }
        }
        Ok(())
    }

    async fn engage(
        &self,
        status: &cortex_core::BotStatus,
        target: &Entity,
        inventory: &[cortex_core::ItemStack],
        genetics: &cortex_core::GeneticParams,
    ) -> Result<(), CombatError> {
        let distance = target.position.distance_to(&status.position);

        // Re-enable sprint after the W-Tap delay.
        let reenable = {
            let mut state = self.state.lock().unwrap();
            match state.sprint_reenable_at {
                Some(at) if Instant::now() >= at => {
                    state.sprint_reenable_at = None;
                    true
                }
                _ => false,
            }
        };
        if reenable {
            self.adapter.set_control_state(Control::Sprint, true).await?;
        }

        self.adapter.look_at(target.position).await?;

        if distance <= 4.0 {
            if let Some(weapon) = self.best_melee(inventory) {
                self.adapter.equip(&weapon, EquipSlot::Hand).await?;
            }

            // Line of sight before committing to the swing.
            let eye = Vec3::new(status.position.x, status.position.y + 1.6, status.position.z);
            let direction = eye.direction_to(&target.position).normalized();
            if self
                .adapter
                .raycast(eye, direction, distance)
                .await?
                .is_some()
            {
                // Blocked: strafe to reposition.
                self.adapter.set_control_state(Control::Left, true).await?;
                return Ok(());
            }

            // Terrain safety: two solid blocks beneath the predicted
            // landing spot, else step back.
            let landing = orbit_point(&status.position, &target.position, genetics.strafe_distance);
            let mut safe = true;
            for depth in [1.0, 2.0] {
                let probe = Vec3::new(landing.x, landing.y - depth, landing.z);
                if self
                    .adapter
                    .block_at(probe)
                    .await?
                    .is_none_or(|b| !b.solid)
                {
                    safe = false;
                }
            }
            if !safe {
                self.adapter.set_control_state(Control::Back, true).await?;
                return Ok(());
            }

            // Strafe-orbit at the preferred distance; jump occasionally
            // for crits, scaled by attack urgency.
            self.adapter
                .set_control_state(Control::Forward, distance > genetics.strafe_distance)
                .await?;
            self.adapter.set_control_state(Control::Right, true).await?;
            let jump = {
                let mut rng = rand::rng();
                rng.random_bool((genetics.attack_urgency * 0.3).clamp(0.0, 1.0))
            };
            if jump {
                self.adapter.set_control_state(Control::Jump, true).await?;
            }

            self.adapter.attack(target.id).await?;

            // W-Tap: drop sprint right after the hit, re-enable after a
            // human-ish delay.
            self.adapter.set_control_state(Control::Sprint, false).await?;
            let delay_ms = {
                let normal = Normal::new(70.0f64, 15.0).expect("valid distribution");
                let mut rng = rand::rng();
                normal.sample(&mut rng).max(0.0)
            };
            self.state.lock().unwrap().sprint_reenable_at =
                Some(Instant::now() + Duration::from_millis(delay_ms as u64));
        } else if distance <= 8.0 {
            // Close the gap.
            if let Some(weapon) = self.best_melee(inventory) {
                self.adapter.equip(&weapon, EquipSlot::Hand).await?;
            }
            self.adapter.set_control_state(Control::Forward, true).await?;
            self.adapter.set_control_state(Control::Sprint, true).await?;
        } else {
            // Ranged attack.
            if let Some(ranged) = self.best_of(&["crossbow", "bow"]).await? {
                self.adapter.equip(&ranged, EquipSlot::Hand).await?;
                self.adapter.activate_item().await?;
                self.adapter.deactivate_item().await?;
            } else {
                self.adapter.set_control_state(Control::Forward, true).await?;
                self.adapter.set_control_state(Control::Sprint, true).await?;
            }
        }
        Ok(())
    }

    async fn retreat_protocol(
        &self,
        status: &cortex_core::BotStatus,
        target: &Entity,
        inventory: &[cortex_core::ItemStack],
    ) -> Result<(), CombatError> {
        let away = {
            let from_target = target
                .position
                .direction_to(&status.position)
                .normalized();
            Vec3::new(
                status.position.x + from_target.x * 16.0,
                status.position.y,
                status.position.z + from_target.z * 16.0,
            )
        };

        // Pearl-out beats everything.
        if inventory.iter().any(|s| s.name == "ender_pearl") {
            self.adapter.equip("ender_pearl", EquipSlot::Hand).await?;
            self.adapter.look_at(away).await?;
            self.adapter.activate_item().await?;
            return Ok(());
        }

        // Pillar-up when there is block stock.
        if let Some(stock) = self.best_of(&["cobblestone", "dirt", "netherrack"]).await? {
            let feet = Vec3::new(
                status.position.x,
                status.position.y - 1.0,
                status.position.z,
            );
            if let Some(below) = self.adapter.block_at(feet).await? {
                self.adapter.equip(&stock, EquipSlot::Hand).await?;
                self.adapter.set_control_state(Control::Jump, true).await?;
                self.adapter
                    .place_block(&below, Vec3::new(0.0, 1.0, 0.0))
                    .await?;
                return Ok(());
            }
        }

        // Plain run-away.
        self.adapter.clear_control_states().await?;
        self.adapter.goto(away).await?;
        Ok(())
    }

    fn best_melee(&self, inventory: &[cortex_core::ItemStack]) -> Option<String> {
        const MELEE_RANK: &[&str] = &[
            "netherite_sword",
            "diamond_sword",
            "iron_sword",
            "stone_sword",
            "wooden_sword",
            "netherite_axe",
            "diamond_axe",
            "iron_axe",
            "stone_axe",
            "wooden_axe",
        ];
        MELEE_RANK
            .iter()
            .find(|w| inventory.iter().any(|s| &s.name == *w && s.count > 0))
            .map(|w| (*w).to_string())
    }

    fn best_food(&self, inventory: &[cortex_core::ItemStack]) -> Option<String> {
        const FOOD_RANK: &[&str] = &[
            "enchanted_golden_apple",
            "golden_apple",
            "cooked_beef",
            "cooked_porkchop",
            "bread",
        ];
        FOOD_RANK
            .iter()
            .find(|f| inventory.iter().any(|s| &s.name == *f && s.count > 0))
            .map(|f| (*f).to_string())
    }

    async fn best_of(&self, candidates: &[&str]) -> Result<Option<String>, CombatError> {
        let inventory = self.adapter.inventory().await?;
        Ok(candidates
            .iter()
            .find(|c| inventory.iter().any(|s| &s.name == *c && s.count > 0))
            .map(|c| (*c).to_string()))
    }
}

/// The spot on the orbit circle between the avatar and the target.
fn orbit_point(me: &Vec3, target: &Vec3, orbit: f64) -> Vec3 {
    let toward_me = target.direction_to(me).normalized();
    Vec3::new(
        target.x + toward_me.x * orbit,
        target.y,
        target.z + toward_me.z * orbit,
    )
}
