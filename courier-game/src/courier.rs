//! Courier physical model: movement pacing, stamina, income and reputation
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grid::{Cell, CityGrid};
use crate::inventory::{Inventory, SortMode};
use crate::job::{Job, JobId};
use crate::pathfinding::LoadProfile;
use crate::reputation::{
    DeliveryTiming, Reputation, ReputationChange, STARTING_REPUTATION, classify_delivery,
};
use crate::weather::ConditionEffect;

const TIRED_THRESHOLD: f64 = 30.0;
const BASE_STEP_STAMINA: f64 = 0.5;
const HEAVY_LOAD_FREE_WEIGHT: f64 = 3.0;
const HEAVY_LOAD_STAMINA: f64 = 0.2;
const LOAD_SPEED_PENALTY: f64 = 0.03;
const MIN_LOAD_SPEED: f64 = 0.8;
const REPUTATION_SPEED_BONUS: f64 = 1.03;

/// Tunables for a courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default = "CourierConfig::default_max_stamina")]
    pub max_stamina: f64,
    /// Cells per second before any modifier.
    #[serde(default = "CourierConfig::default_base_speed")]
    pub base_speed: f64,
    #[serde(default = "CourierConfig::default_max_weight")]
    pub max_weight: f64,
    #[serde(default = "CourierConfig::default_ai_max_weight")]
    pub ai_max_weight: f64,
    #[serde(default = "CourierConfig::default_rest_rate")]
    pub rest_rate: f64,
    #[serde(default = "CourierConfig::default_recovery_rest_rate")]
    pub recovery_rest_rate: f64,
    #[serde(default = "CourierConfig::default_reputation")]
    pub starting_reputation: i32,
}

impl CourierConfig {
    const fn default_max_stamina() -> f64 {
        100.0
    }

    const fn default_base_speed() -> f64 {
        3.0
    }

    const fn default_max_weight() -> f64 {
        10.0
    }

    const fn default_ai_max_weight() -> f64 {
        6.0
    }

    const fn default_rest_rate() -> f64 {
        5.0
    }

    const fn default_recovery_rest_rate() -> f64 {
        10.0
    }

    const fn default_reputation() -> i32 {
        STARTING_REPUTATION
    }

    /// # Errors
    ///
    /// Returns a message naming the first non-positive tunable.
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("max_stamina", self.max_stamina),
            ("base_speed", self.base_speed),
            ("max_weight", self.max_weight),
            ("ai_max_weight", self.ai_max_weight),
            ("rest_rate", self.rest_rate),
            ("recovery_rest_rate", self.recovery_rest_rate),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("courier {field} must be positive (got {value})"));
            }
        }
        Ok(())
    }
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            max_stamina: Self::default_max_stamina(),
            base_speed: Self::default_base_speed(),
            max_weight: Self::default_max_weight(),
            ai_max_weight: Self::default_ai_max_weight(),
            rest_rate: Self::default_rest_rate(),
            recovery_rest_rate: Self::default_recovery_rest_rate(),
            starting_reputation: Self::default_reputation(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    /// Only the four orthogonal unit moves map to a direction.
    #[must_use]
    pub const fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Self::Up),
            (0, 1) => Some(Self::Down),
            (-1, 0) => Some(Self::Left),
            (1, 0) => Some(Self::Right),
            _ => None,
        }
    }

    #[must_use]
    pub const fn apply(self, cell: Cell) -> Cell {
        let (dx, dy) = self.delta();
        cell.offset(dx, dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaminaState {
    Normal,
    Tired,
    Exhausted,
}

impl StaminaState {
    /// Speed factor applied on top of every other modifier.
    #[must_use]
    pub const fn resistance(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Tired => 0.8,
            Self::Exhausted => 0.0,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Tired => "tired",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for StaminaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of spending a tick's movement budget on one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Moved(Cell),
    /// Not enough accumulated time for a whole tile yet.
    InProgress,
    /// The target is not an adjacent walkable cell.
    Blocked,
    Exhausted,
}

/// Money and reputation credited for a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCredit {
    pub payout: f64,
    pub multiplier: f64,
    pub timing: DeliveryTiming,
    pub reputation: ReputationChange,
}

impl DeliveryCredit {
    #[must_use]
    pub fn credited(&self) -> f64 {
        self.payout * self.multiplier
    }
}

/// Movement state captured for undo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementSnapshot {
    pub position: Cell,
    pub stamina: f64,
    pub exhausted: bool,
}

/// Read-only view of a courier for renderers and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierSnapshot {
    pub position: Cell,
    pub stamina: f64,
    pub max_stamina: f64,
    pub stamina_state: StaminaState,
    pub income: f64,
    pub reputation: i32,
    pub carried_weight: f64,
    pub max_weight: f64,
    pub inventory: Vec<JobId>,
    pub current_job: Option<JobId>,
    pub sort_mode: SortMode,
    pub delivered: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    position: Cell,
    stamina: f64,
    max_stamina: f64,
    exhausted: bool,
    base_speed: f64,
    rest_rate: f64,
    recovery_rest_rate: f64,
    move_progress: f64,
    income: f64,
    delivered: u32,
    reputation: Reputation,
    inventory: Inventory,
}

impl Courier {
    #[must_use]
    pub fn new(position: Cell, config: &CourierConfig) -> Self {
        Self::with_capacity(position, config, config.max_weight)
    }

    /// Autonomous couriers use the smaller AI capacity.
    #[must_use]
    pub fn autonomous(position: Cell, config: &CourierConfig) -> Self {
        Self::with_capacity(position, config, config.ai_max_weight)
    }

    #[must_use]
    pub fn with_capacity(position: Cell, config: &CourierConfig, max_weight: f64) -> Self {
        Self {
            position,
            stamina: config.max_stamina,
            max_stamina: config.max_stamina,
            exhausted: false,
            base_speed: config.base_speed,
            rest_rate: config.rest_rate,
            recovery_rest_rate: config.recovery_rest_rate,
            move_progress: 0.0,
            income: 0.0,
            delivered: 0,
            reputation: Reputation::new(config.starting_reputation),
            inventory: Inventory::new(max_weight),
        }
    }

    #[must_use]
    pub const fn position(&self) -> Cell {
        self.position
    }

    #[must_use]
    pub const fn stamina(&self) -> f64 {
        self.stamina
    }

    #[must_use]
    pub const fn max_stamina(&self) -> f64 {
        self.max_stamina
    }

    #[must_use]
    pub const fn income(&self) -> f64 {
        self.income
    }

    #[must_use]
    pub const fn delivered(&self) -> u32 {
        self.delivered
    }

    #[must_use]
    pub const fn reputation(&self) -> &Reputation {
        &self.reputation
    }

    #[must_use]
    pub const fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted || self.stamina <= 0.0
    }

    #[must_use]
    pub fn stamina_state(&self) -> StaminaState {
        if self.is_exhausted() {
            StaminaState::Exhausted
        } else if self.stamina <= TIRED_THRESHOLD {
            StaminaState::Tired
        } else {
            StaminaState::Normal
        }
    }

    /// Cost profile for path planning with the current load.
    #[must_use]
    pub fn load_profile(&self, weather_speed: f64) -> LoadProfile {
        LoadProfile::new(
            self.inventory.total_weight(),
            self.inventory.max_weight(),
            weather_speed,
        )
    }

    /// Cells per second on a tile of `surface_weight` in the given weather.
    #[must_use]
    pub fn speed(&self, weather_speed: f64, surface_weight: f64) -> f64 {
        let load = (1.0 - LOAD_SPEED_PENALTY * self.inventory.total_weight()).max(MIN_LOAD_SPEED);
        let reputation = if self.reputation.has_bonus() {
            REPUTATION_SPEED_BONUS
        } else {
            1.0
        };
        self.base_speed
            * weather_speed
            * load
            * reputation
            * self.stamina_state().resistance()
            * surface_weight
    }

    /// Seconds needed to cross one tile; `None` while the courier cannot move.
    #[must_use]
    pub fn tile_duration(&self, weather_speed: f64, surface_weight: f64) -> Option<f64> {
        let speed = self.speed(weather_speed, surface_weight);
        (speed > 0.0).then(|| 1.0 / speed)
    }

    /// Stamina spent per step under a weather stamina multiplier.
    #[must_use]
    pub fn step_stamina_cost(&self, stamina_multiplier: f64) -> f64 {
        let extra =
            HEAVY_LOAD_STAMINA * (self.inventory.total_weight() - HEAVY_LOAD_FREE_WEIGHT).max(0.0);
        (BASE_STEP_STAMINA + extra) * stamina_multiplier
    }

    /// Spend `dt` seconds walking toward the adjacent cell `next`.
    ///
    /// At most one tile is crossed per call, however large `dt` is.
    pub fn advance_toward(
        &mut self,
        next: Cell,
        grid: &CityGrid,
        weather: ConditionEffect,
        dt: f64,
    ) -> StepResult {
        if self.position.manhattan(next) != 1 || !grid.is_walkable(next) {
            self.move_progress = 0.0;
            return StepResult::Blocked;
        }
        let surface = grid.surface_weight_at(self.position);
        let Some(duration) = self.tile_duration(weather.speed, surface) else {
            self.move_progress = 0.0;
            return StepResult::Exhausted;
        };
        self.move_progress += dt.max(0.0);
        if self.move_progress < duration {
            return StepResult::InProgress;
        }
        self.move_progress = (self.move_progress - duration).min(duration);
        self.position = next;
        self.spend_stamina(weather.stamina_cost);
        StepResult::Moved(next)
    }

    fn spend_stamina(&mut self, stamina_multiplier: f64) {
        let cost = self.step_stamina_cost(stamina_multiplier);
        self.stamina = (self.stamina - cost).max(0.0);
        if self.stamina <= 0.0 {
            self.exhausted = true;
            self.move_progress = 0.0;
            log::debug!("courier at {} is exhausted", self.position);
        }
    }

    /// Regenerate stamina for a tick spent standing still.
    pub fn rest(&mut self, dt: f64, on_recovery_tile: bool) {
        let rate = if on_recovery_tile {
            self.recovery_rest_rate
        } else {
            self.rest_rate
        };
        self.move_progress = 0.0;
        self.stamina = (self.stamina + rate * dt.max(0.0)).min(self.max_stamina);
        if self.exhausted && self.stamina >= TIRED_THRESHOLD {
            self.exhausted = false;
        }
    }

    /// Credit a delivered job: payout with the reputation bonus, then the reputation change.
    pub fn credit_delivery(&mut self, job: &Job) -> DeliveryCredit {
        let timing = delivery_timing(job);
        let multiplier = self.reputation.payout_multiplier();
        let credit_payout = job.payout();
        self.income += credit_payout * multiplier;
        self.delivered += 1;
        let reputation = self.reputation.record_delivery(timing);
        DeliveryCredit {
            payout: credit_payout,
            multiplier,
            timing,
            reputation,
        }
    }

    /// Overwrite the reputation, e.g. for scripted scenarios.
    pub fn set_reputation(&mut self, reputation: Reputation) {
        self.reputation = reputation;
    }

    pub fn penalize_cancel(&mut self) -> ReputationChange {
        self.reputation.record_cancel()
    }

    pub fn penalize_expiry(&mut self) -> ReputationChange {
        self.reputation.record_expiry()
    }

    #[must_use]
    pub const fn movement(&self) -> MovementSnapshot {
        MovementSnapshot {
            position: self.position,
            stamina: self.stamina,
            exhausted: self.exhausted,
        }
    }

    pub fn restore_movement(&mut self, snapshot: MovementSnapshot) {
        self.position = snapshot.position;
        self.stamina = snapshot.stamina.clamp(0.0, self.max_stamina);
        self.exhausted = snapshot.exhausted;
        self.move_progress = 0.0;
    }

    #[must_use]
    pub fn snapshot(&self) -> CourierSnapshot {
        CourierSnapshot {
            position: self.position,
            stamina: self.stamina,
            max_stamina: self.max_stamina,
            stamina_state: self.stamina_state(),
            income: self.income,
            reputation: self.reputation.value(),
            carried_weight: self.inventory.total_weight(),
            max_weight: self.inventory.max_weight(),
            inventory: self.inventory.iter().map(|item| item.id.clone()).collect(),
            current_job: self.inventory.current().map(|item| item.id.clone()),
            sort_mode: self.inventory.sort_mode(),
            delivered: self.delivered,
        }
    }
}

/// Grade a delivered job against its deadline, or the fixed estimate when it has none.
fn delivery_timing(job: &Job) -> DeliveryTiming {
    match (job.deadline(), job.pickup_time(), job.delivery_time()) {
        (Some(deadline), Some(pickup), Some(delivery)) => {
            classify_delivery(pickup, delivery, deadline).timing
        }
        _ => job.estimated_timing().unwrap_or(DeliveryTiming::OnTime),
    }
}
