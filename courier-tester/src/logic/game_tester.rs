use anyhow::{Context, Result, ensure};
use courier_game::{
    Difficulty, JobStats, MemoryScores, PolicyStats, RunConfig, RunOutcome, ScoreRecord,
    SessionEvent, SessionSnapshot, Simulation, SimulationEngine,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;

use super::assets::TesterAssets;

/// Frame time used by automated runs unless a plan overrides it.
pub const DEFAULT_TICK_SECS: f64 = 0.1;

/// Declarative plan for running a simulation session.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub couriers: Vec<Difficulty>,
    pub config: RunConfig,
    pub tick_secs: f64,
    /// Run the same seed twice and compare fingerprints.
    pub replay_check: bool,
    pub setup: Option<fn(&mut Simulation)>,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(couriers: &[Difficulty]) -> Self {
        Self {
            couriers: couriers.to_vec(),
            config: RunConfig::default_config(),
            tick_secs: DEFAULT_TICK_SECS,
            replay_check: false,
            setup: None,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn with_tick_secs(mut self, tick_secs: f64) -> Self {
        self.tick_secs = tick_secs;
        self
    }

    #[must_use]
    pub const fn with_replay_check(mut self) -> Self {
        self.replay_check = true;
        self
    }

    #[must_use]
    pub fn with_setup(mut self, setup: fn(&mut Simulation)) -> Self {
        self.setup = Some(setup);
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }
}

/// Assertion hook run after a simulation completes.
type SimulationExpectationFn =
    Arc<dyn Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl std::fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    /// # Errors
    ///
    /// Returns the expectation's failure message.
    pub fn evaluate(&self, summary: &SimulationSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

/// Per-courier results of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierSummary {
    pub difficulty: Difficulty,
    pub income: f64,
    pub reputation: i32,
    pub delivered: u32,
    pub policy: PolicyStats,
}

/// Event counts over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTally {
    pub released: u32,
    pub pickups: u32,
    pub deliveries: u32,
    pub expired: u32,
    pub expired_in_transit: u32,
    pub cancelled: u32,
    pub blocked_moves: u32,
    pub rejections: u32,
    pub weather_shifts: u32,
}

impl EventTally {
    fn ingest(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::JobReleased(_) => self.released += 1,
            SessionEvent::PickedUp { .. } => self.pickups += 1,
            SessionEvent::Delivered { .. } => self.deliveries += 1,
            SessionEvent::JobExpired { carrier, .. } => {
                self.expired += 1;
                if carrier.is_some() {
                    self.expired_in_transit += 1;
                }
            }
            SessionEvent::Cancelled { .. } => self.cancelled += 1,
            SessionEvent::MoveBlocked { .. } => self.blocked_moves += 1,
            SessionEvent::PickupRejected { .. }
            | SessionEvent::DeliveryRejected { .. }
            | SessionEvent::CancelRejected { .. } => self.rejections += 1,
            SessionEvent::Weather(_) => self.weather_shifts += 1,
            _ => {}
        }
    }
}

/// Observed extremes checked on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunBounds {
    pub min_speed_multiplier: f64,
    pub max_speed_multiplier: f64,
    pub min_stamina_cost: f64,
    pub min_reputation: i32,
    pub max_reputation: i32,
    /// Highest carried weight as a fraction of capacity.
    pub max_load_ratio: f64,
    pub off_street_positions: u32,
}

impl Default for RunBounds {
    fn default() -> Self {
        Self {
            min_speed_multiplier: f64::INFINITY,
            max_speed_multiplier: f64::NEG_INFINITY,
            min_stamina_cost: f64::INFINITY,
            min_reputation: i32::MAX,
            max_reputation: i32::MIN,
            max_load_ratio: 0.0,
            off_street_positions: 0,
        }
    }
}

impl RunBounds {
    fn observe(&mut self, sim: &Simulation) {
        let weather = sim.weather();
        let speed = weather.speed_multiplier();
        self.min_speed_multiplier = self.min_speed_multiplier.min(speed);
        self.max_speed_multiplier = self.max_speed_multiplier.max(speed);
        self.min_stamina_cost = self.min_stamina_cost.min(weather.stamina_cost_multiplier());
        for unit in sim.units() {
            let courier = &unit.courier;
            let reputation = courier.reputation().value();
            self.min_reputation = self.min_reputation.min(reputation);
            self.max_reputation = self.max_reputation.max(reputation);
            let inventory = courier.inventory();
            if inventory.max_weight() > 0.0 {
                self.max_load_ratio = self
                    .max_load_ratio
                    .max(inventory.total_weight() / inventory.max_weight());
            }
            if !sim.grid().is_walkable(courier.position()) {
                self.off_street_positions += 1;
            }
        }
    }
}

/// Complete record of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub ticks: u64,
    pub elapsed: f64,
    pub outcome: Option<RunOutcome>,
    pub couriers: Vec<CourierSummary>,
    pub events: EventTally,
    pub bounds: RunBounds,
    pub job_stats: JobStats,
    pub min_speed_floor: f64,
    pub score: Option<ScoreRecord>,
    pub final_snapshot: SessionSnapshot,
    /// SHA-256 over the event stream and final snapshot.
    pub fingerprint: String,
    pub replay_fingerprint: Option<String>,
}

impl SimulationSummary {
    #[must_use]
    pub fn total_income(&self) -> f64 {
        self.couriers.iter().map(|c| c.income).sum()
    }

    #[must_use]
    pub fn outcome_label(&self) -> &'static str {
        self.outcome.map_or("unfinished", |outcome| outcome.label())
    }
}

struct RunTrace {
    ticks: u64,
    events: EventTally,
    bounds: RunBounds,
    hasher: Sha256,
}

impl RunTrace {
    fn new() -> Self {
        Self {
            ticks: 0,
            events: EventTally::default(),
            bounds: RunBounds::default(),
            hasher: Sha256::new(),
        }
    }

    fn record(&mut self, events: &[SessionEvent], sim: &Simulation) {
        self.ticks += 1;
        for event in events {
            self.events.ingest(event);
            self.hasher.update(format!("{event:?}").as_bytes());
        }
        self.bounds.observe(sim);
    }

    fn finish(mut self, snapshot: &SessionSnapshot) -> (u64, EventTally, RunBounds, String) {
        if let Ok(json) = serde_json::to_vec(snapshot) {
            self.hasher.update(&json);
        }
        let digest = self.hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        (self.ticks, self.events, self.bounds, hex)
    }
}

/// Drives autonomous couriers through complete runs.
#[derive(Debug, Clone)]
pub struct GameTester {
    verbose: bool,
    assets: Arc<TesterAssets>,
}

impl GameTester {
    pub const fn new(assets: Arc<TesterAssets>, verbose: bool) -> Self {
        Self { verbose, assets }
    }

    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Run a plan to completion for one seed.
    ///
    /// # Errors
    ///
    /// Fails when the feeds or the plan's run configuration are invalid,
    /// or when the run does not end within its time budget.
    pub fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        let mut summary = self.run_once(plan, seed)?;
        if plan.replay_check {
            let replay = self.run_once(plan, seed)?;
            summary.replay_fingerprint = Some(replay.fingerprint);
        }
        Ok(summary)
    }

    fn run_once(&self, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        ensure!(
            plan.tick_secs.is_finite() && plan.tick_secs > 0.0,
            "tick length must be positive (got {})",
            plan.tick_secs
        );
        let mut engine = SimulationEngine::new(self.assets.as_ref().clone(), MemoryScores::new());
        let mut sim = engine
            .create_simulation(plan.config.clone(), seed)
            .with_context(|| format!("failed to create simulation for seed {seed}"))?;
        if let Some(setup) = plan.setup {
            setup(&mut sim);
        }
        for difficulty in &plan.couriers {
            sim.add_autonomous(None, *difficulty);
        }

        if self.verbose {
            println!(
                "   ▶ seed {seed}: {} couriers, {} jobs, {:.0}s",
                sim.units().len(),
                sim.jobs().len(),
                sim.config().max_time
            );
        }

        let tick_budget = tick_budget(sim.config().max_time, plan.tick_secs);
        let mut trace = RunTrace::new();
        while !sim.is_finished() {
            ensure!(
                trace.ticks < tick_budget,
                "run for seed {seed} did not end after {tick_budget} ticks"
            );
            let report = sim.tick(plan.tick_secs, &[]);
            trace.record(&report.events, &sim);
        }

        let score = engine.record_outcome(&sim)?;
        let final_snapshot = sim.snapshot();
        let couriers = sim
            .units()
            .iter()
            .enumerate()
            .filter_map(|(idx, unit)| {
                let autopilot = unit.autopilot.as_ref()?;
                Some(CourierSummary {
                    difficulty: autopilot.difficulty(),
                    income: unit.courier.income(),
                    reputation: unit.courier.reputation().value(),
                    delivered: unit.courier.delivered(),
                    policy: sim.policy_stats(idx).unwrap_or_default(),
                })
            })
            .collect();
        let (ticks, events, bounds, fingerprint) = trace.finish(&final_snapshot);
        log::debug!("seed {seed} finished after {ticks} ticks: {fingerprint}");

        Ok(SimulationSummary {
            seed,
            ticks,
            elapsed: sim.time(),
            outcome: sim.outcome(),
            couriers,
            events,
            bounds,
            job_stats: sim.jobs().stats(),
            min_speed_floor: sim.weather().config().min_speed,
            score,
            final_snapshot,
            fingerprint,
            replay_fingerprint: None,
        })
    }
}

fn tick_budget(max_time: f64, tick_secs: f64) -> u64 {
    let ticks = (max_time / tick_secs).ceil();
    if ticks.is_finite() && ticks >= 0.0 {
        // Truncation is fine: the budget only guards against runaway loops.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ticks = ticks as u64;
        ticks.saturating_add(16)
    } else {
        u64::MAX
    }
}
