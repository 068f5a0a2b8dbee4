//! Simulation session: owns the world and advances it one tick at a time
//!
//! Each tick runs in a fixed order: weather, job release and expiry, courier
//! decisions and movement, then pickups, deliveries and cancellations.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ai::{Autopilot, Decision, DecisionContext, DecisionPolicy, Difficulty, PolicyStats};
use crate::clock::RunClock;
use crate::courier::{
    Courier, CourierSnapshot, DeliveryCredit, Direction, StepResult,
};
use crate::data::{LoadError, RunConfig};
use crate::grid::{Cell, CityGrid, MapFeed};
use crate::inventory::SortMode;
use crate::job::{JobId, JobState};
use crate::jobs::{
    CancelRejection, DeliveryAttempt, DeliveryRejection, JobStats, JobsManager, PickupRejection,
};
use crate::reputation::ReputationChange;
use crate::rng::RngBundle;
use crate::score::ScoreRecord;
use crate::undo::UndoStack;
use crate::weather::{ConditionEffect, WeatherConfig, WeatherProcess, WeatherShift, WeatherSnapshot};

/// Player input consumed within a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Move(Direction),
    /// Pick up the given job, or any available job within reach.
    Pickup(Option<JobId>),
    Deliver,
    /// Cancel the given job, or the selected inventory job.
    Cancel(Option<JobId>),
    Sort(SortMode),
    NextJob,
    PreviousJob,
    Undo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Victory,
    Defeat,
    TimeUp,
}

impl RunOutcome {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Victory => "victory",
            Self::Defeat => "defeat",
            Self::TimeUp => "time_up",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Something that happened during a tick. `courier` is the unit index.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Weather(WeatherShift),
    JobReleased(JobId),
    JobExpired {
        id: JobId,
        carrier: Option<usize>,
        penalty: Option<ReputationChange>,
    },
    Moved {
        courier: usize,
        to: Cell,
    },
    MoveBlocked {
        courier: usize,
        to: Cell,
    },
    Undone {
        courier: usize,
        to: Cell,
    },
    PickedUp {
        courier: usize,
        id: JobId,
    },
    PickupRejected {
        courier: usize,
        reason: PickupRejection,
    },
    NothingInReach {
        courier: usize,
    },
    Delivered {
        courier: usize,
        id: JobId,
        credit: DeliveryCredit,
    },
    DeliveryRejected {
        courier: usize,
        reason: DeliveryRejection,
    },
    Cancelled {
        courier: usize,
        id: JobId,
        penalty: Option<ReputationChange>,
    },
    CancelRejected {
        courier: usize,
        reason: CancelRejection,
    },
    NoPlayer,
    RunEnded(RunOutcome),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub time: f64,
    pub events: Vec<SessionEvent>,
    /// Available jobs near the primary courier, for HUD markers.
    pub nearby: Vec<JobId>,
    pub outcome: Option<RunOutcome>,
}

/// A courier and, for autonomous ones, the policy steering it.
#[derive(Debug, Clone)]
pub struct CourierUnit {
    pub courier: Courier,
    pub autopilot: Option<Autopilot>,
    pending_move: Option<Cell>,
}

impl CourierUnit {
    #[must_use]
    pub const fn is_autonomous(&self) -> bool {
        self.autopilot.is_some()
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.autopilot
            .as_ref()
            .map_or("player", |pilot| pilot.difficulty().label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub state: JobState,
    pub pickup: Cell,
    pub dropoff: Cell,
    pub payout: f64,
    pub weight: f64,
    pub priority: i32,
    pub deadline: Option<f64>,
}

/// Everything a renderer or HUD needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub time: f64,
    pub time_remaining: f64,
    pub goal: f64,
    pub outcome: Option<RunOutcome>,
    pub weather: WeatherSnapshot,
    pub couriers: Vec<CourierSnapshot>,
    pub jobs: Vec<JobView>,
    pub stats: JobStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Interaction {
    Pickup(Option<JobId>),
    Deliver,
    Cancel(Option<JobId>),
}

#[derive(Debug, Clone)]
pub struct Simulation {
    grid: CityGrid,
    weather: WeatherProcess,
    jobs: JobsManager,
    rng: RngBundle,
    clock: RunClock,
    config: RunConfig,
    units: Vec<CourierUnit>,
    player: Option<usize>,
    undo: UndoStack,
    time: f64,
    outcome: Option<RunOutcome>,
    record: Option<ScoreRecord>,
}

impl Simulation {
    /// Assemble a session. An empty job set is filled with synthetic jobs.
    #[must_use]
    pub fn new(
        grid: CityGrid,
        weather: WeatherConfig,
        mut jobs: JobsManager,
        config: RunConfig,
        seed: u64,
    ) -> Self {
        let rng = RngBundle::from_user_seed(seed);
        let weather = WeatherProcess::new(weather, &mut *rng.weather());
        if jobs.is_empty() {
            jobs.generate_random_jobs(&grid, config.random_jobs, 0.0, &mut *rng.jobs());
        }
        let undo = UndoStack::new(config.undo_depth);
        Self {
            grid,
            weather,
            jobs,
            rng,
            clock: RunClock::default(),
            config,
            units: Vec::new(),
            player: None,
            undo,
            time: 0.0,
            outcome: None,
            record: None,
        }
    }

    /// Build a session from raw feeds. Missing job or weather feeds fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the map is unusable or its start time is malformed.
    pub fn from_feeds(
        map: &MapFeed,
        job_records: Option<&[serde_json::Value]>,
        weather: Option<WeatherConfig>,
        config: RunConfig,
        seed: u64,
    ) -> Result<Self, LoadError> {
        let grid = CityGrid::from_feed(map)?;
        let clock = match map.start_time.as_deref().map(str::trim) {
            None | Some("") => RunClock::default(),
            Some(text) => RunClock::parse(text).map_err(|_| LoadError::Clock(text.to_string()))?,
        };
        let jobs = job_records.map_or_else(JobsManager::new, |records| {
            JobsManager::from_feed(records, &clock)
        });
        let weather = match weather {
            Some(weather) => {
                weather.validate()?;
                weather
            }
            None => WeatherConfig::default_config(),
        };
        let config = config.with_map_overrides(map);
        let mut sim = Self::new(grid, weather, jobs, config, seed);
        sim.clock = clock;
        Ok(sim)
    }

    /// First walkable cell in row-major order.
    #[must_use]
    pub fn spawn_point(&self) -> Cell {
        self.grid.walkable_cells().next().unwrap_or_default()
    }

    fn resolve_spawn(&self, position: Option<Cell>) -> Cell {
        position
            .filter(|cell| self.grid.is_walkable(*cell))
            .unwrap_or_else(|| self.spawn_point())
    }

    /// Add the human-controlled courier. Replaces the previous player, if any.
    pub fn add_player(&mut self, position: Option<Cell>) -> usize {
        let position = self.resolve_spawn(position);
        self.units.push(CourierUnit {
            courier: Courier::new(position, &self.config.courier),
            autopilot: None,
            pending_move: None,
        });
        let idx = self.units.len() - 1;
        self.player = Some(idx);
        self.undo.clear();
        idx
    }

    pub fn add_autonomous(&mut self, position: Option<Cell>, difficulty: Difficulty) -> usize {
        let position = self.resolve_spawn(position);
        let interval = self
            .config
            .decision_interval
            .unwrap_or_else(|| difficulty.decision_interval());
        self.units.push(CourierUnit {
            courier: Courier::autonomous(position, &self.config.courier),
            autopilot: Some(Autopilot::with_interval(difficulty, interval)),
            pending_move: None,
        });
        self.units.len() - 1
    }

    #[must_use]
    pub const fn grid(&self) -> &CityGrid {
        &self.grid
    }

    #[must_use]
    pub const fn weather(&self) -> &WeatherProcess {
        &self.weather
    }

    #[must_use]
    pub const fn jobs(&self) -> &JobsManager {
        &self.jobs
    }

    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub const fn rng(&self) -> &RngBundle {
        &self.rng
    }

    #[must_use]
    pub fn units(&self) -> &[CourierUnit] {
        &self.units
    }

    #[must_use]
    pub fn courier(&self, idx: usize) -> Option<&Courier> {
        self.units.get(idx).map(|unit| &unit.courier)
    }

    /// Mutable access for scripted setups.
    pub fn courier_mut(&mut self, idx: usize) -> Option<&mut Courier> {
        self.units.get_mut(idx).map(|unit| &mut unit.courier)
    }

    #[must_use]
    pub const fn player(&self) -> Option<usize> {
        self.player
    }

    /// The courier whose results decide the run: the player, else the first unit.
    #[must_use]
    pub fn primary(&self) -> Option<usize> {
        self.player.or_else(|| (!self.units.is_empty()).then_some(0))
    }

    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn time_remaining(&self) -> f64 {
        (self.config.max_time - self.time).max(0.0)
    }

    #[must_use]
    pub const fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    #[must_use]
    pub const fn score_record(&self) -> Option<&ScoreRecord> {
        self.record.as_ref()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Decision counters for an autonomous unit.
    #[must_use]
    pub fn policy_stats(&self, idx: usize) -> Option<PolicyStats> {
        self.units
            .get(idx)
            .and_then(|unit| unit.autopilot.as_ref())
            .map(|pilot| pilot.policy().stats())
    }

    fn weather_effect(&self) -> ConditionEffect {
        ConditionEffect::new(
            self.weather.speed_multiplier(),
            self.weather.stamina_cost_multiplier(),
        )
    }

    /// Advance the world by `dt` seconds, applying `commands` to the player.
    pub fn tick(&mut self, dt: f64, commands: &[Command]) -> TickReport {
        let mut report = TickReport {
            time: self.time,
            outcome: self.outcome,
            ..TickReport::default()
        };
        if self.outcome.is_some() {
            return report;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.time += dt;
        report.time = self.time;

        if let Some(shift) = self.weather.update(dt, &mut *self.rng.weather()) {
            report.events.push(SessionEvent::Weather(shift));
        }

        self.reconcile_jobs(&mut report);
        if self.check_defeat(&mut report) {
            return report;
        }

        let mut interactions = Vec::new();
        if let Some(player) = self.player {
            self.apply_player_commands(player, commands, &mut interactions, &mut report);
        } else if !commands.is_empty() {
            report.events.push(SessionEvent::NoPlayer);
        }
        self.drive_autopilots(dt, &mut interactions);
        self.move_couriers(dt, &mut report);

        for (idx, interaction) in interactions {
            self.interact(idx, interaction, &mut report);
            if self.check_defeat(&mut report) {
                return report;
            }
        }

        self.check_run_end(&mut report);
        report
    }

    fn reconcile_jobs(&mut self, report: &mut TickReport) {
        let anchor = self
            .primary()
            .and_then(|idx| self.units.get(idx))
            .map_or_else(|| self.spawn_point(), |unit| unit.courier.position());
        let update = self.jobs.update(self.time, anchor);
        report
            .events
            .extend(update.released.into_iter().map(SessionEvent::JobReleased));
        report.nearby = update.nearby;

        for expired in update.expired {
            let carrier = if expired.was_carried {
                self.units
                    .iter()
                    .position(|unit| unit.courier.inventory().contains(&expired.id))
            } else {
                None
            };
            let penalty = carrier.and_then(|idx| {
                let courier = &mut self.units[idx].courier;
                courier.inventory_mut().remove(&expired.id)?;
                Some(courier.penalize_expiry())
            });
            log::debug!("job {} expired (carrier {carrier:?})", expired.id);
            report.events.push(SessionEvent::JobExpired {
                id: expired.id,
                carrier,
                penalty,
            });
        }
    }

    fn apply_player_commands(
        &mut self,
        player: usize,
        commands: &[Command],
        interactions: &mut Vec<(usize, Interaction)>,
        report: &mut TickReport,
    ) {
        let now = self.time;
        for command in commands {
            let Some(unit) = self.units.get_mut(player) else {
                return;
            };
            match command {
                Command::Move(direction) => {
                    let to = direction.apply(unit.courier.position());
                    if self.grid.is_walkable(to) {
                        unit.pending_move = Some(to);
                    } else {
                        report.events.push(SessionEvent::MoveBlocked {
                            courier: player,
                            to,
                        });
                    }
                }
                Command::Pickup(id) => interactions.push((player, Interaction::Pickup(id.clone()))),
                Command::Deliver => interactions.push((player, Interaction::Deliver)),
                Command::Cancel(id) => interactions.push((player, Interaction::Cancel(id.clone()))),
                Command::Sort(mode) => unit.courier.inventory_mut().apply_sort(*mode, now),
                Command::NextJob => {
                    unit.courier.inventory_mut().next();
                }
                Command::PreviousJob => {
                    unit.courier.inventory_mut().previous();
                }
                Command::Undo => {
                    if let Some(snapshot) = self.undo.pop() {
                        unit.courier.restore_movement(snapshot);
                        unit.pending_move = None;
                        report.events.push(SessionEvent::Undone {
                            courier: player,
                            to: snapshot.position,
                        });
                    }
                }
            }
        }
    }

    fn drive_autopilots(&mut self, dt: f64, interactions: &mut Vec<(usize, Interaction)>) {
        let weather_speed = self.weather.speed_multiplier();
        for (idx, unit) in self.units.iter_mut().enumerate() {
            let CourierUnit {
                courier, autopilot, ..
            } = unit;
            let Some(pilot) = autopilot.as_mut() else {
                continue;
            };
            let ctx = DecisionContext {
                grid: &self.grid,
                jobs: &self.jobs,
                courier,
                weather_condition: self.weather.condition(),
                weather_speed,
                now: self.time,
            };
            let mut rng = self.rng.policy();
            match pilot.poll(dt, &ctx, &mut *rng) {
                Some(Decision::Pickup(id)) => {
                    interactions.push((idx, Interaction::Pickup(Some(id))));
                }
                Some(Decision::Deliver) => interactions.push((idx, Interaction::Deliver)),
                _ => {}
            }
        }
    }

    fn move_couriers(&mut self, dt: f64, report: &mut TickReport) {
        let effect = self.weather_effect();
        for (idx, unit) in self.units.iter_mut().enumerate() {
            let next = match unit.autopilot.as_ref() {
                Some(pilot) => pilot.next_step(),
                None => unit.pending_move,
            };
            let Some(next) = next else {
                let on_recovery = self.grid.is_recovery_tile(unit.courier.position());
                unit.courier.rest(dt, on_recovery);
                continue;
            };

            let before = unit.courier.movement();
            match unit.courier.advance_toward(next, &self.grid, effect, dt) {
                StepResult::Moved(to) => {
                    match unit.autopilot.as_mut() {
                        Some(pilot) => pilot.step_taken(),
                        None => {
                            unit.pending_move = None;
                            self.undo.push(before);
                        }
                    }
                    report.events.push(SessionEvent::Moved { courier: idx, to });
                }
                StepResult::InProgress => {}
                StepResult::Blocked => {
                    if let Some(pilot) = unit.autopilot.as_mut() {
                        pilot.clear_steps();
                    }
                    unit.pending_move = None;
                    report
                        .events
                        .push(SessionEvent::MoveBlocked { courier: idx, to: next });
                }
                StepResult::Exhausted => {
                    if let Some(pilot) = unit.autopilot.as_mut() {
                        pilot.clear_steps();
                    }
                    unit.pending_move = None;
                    let on_recovery = self.grid.is_recovery_tile(unit.courier.position());
                    unit.courier.rest(dt, on_recovery);
                }
            }
        }
    }

    fn interact(&mut self, idx: usize, interaction: Interaction, report: &mut TickReport) {
        let now = self.time;
        let Some(unit) = self.units.get_mut(idx) else {
            return;
        };
        let courier = &mut unit.courier;
        let position = courier.position();
        match interaction {
            Interaction::Pickup(id) => {
                let id = id.or_else(|| {
                    self.jobs
                        .available()
                        .find(|job| job.is_at_pickup(position))
                        .map(|job| job.id().to_string())
                });
                let Some(id) = id else {
                    report.events.push(SessionEvent::NothingInReach { courier: idx });
                    return;
                };
                match self
                    .jobs
                    .try_pickup(&id, position, courier.inventory_mut(), now)
                {
                    Ok(()) => report.events.push(SessionEvent::PickedUp { courier: idx, id }),
                    Err(reason) => {
                        log::debug!("courier {idx} pickup rejected: {reason}");
                        report
                            .events
                            .push(SessionEvent::PickupRejected { courier: idx, reason });
                    }
                }
            }
            Interaction::Deliver => {
                match self.jobs.try_deliver(courier.inventory_mut(), position, now) {
                    DeliveryAttempt::Delivered(job) => {
                        let credit = courier.credit_delivery(&job);
                        log::debug!(
                            "courier {idx} delivered {} ({}, {:+} reputation)",
                            job.id(),
                            credit.timing,
                            credit.reputation.total()
                        );
                        report.events.push(SessionEvent::Delivered {
                            courier: idx,
                            id: job.id().to_string(),
                            credit,
                        });
                    }
                    DeliveryAttempt::ExpiredInTransit(id) => {
                        let penalty = courier.penalize_expiry();
                        report.events.push(SessionEvent::JobExpired {
                            id,
                            carrier: Some(idx),
                            penalty: Some(penalty),
                        });
                    }
                    DeliveryAttempt::Rejected(reason) => {
                        log::debug!("courier {idx} delivery rejected: {reason}");
                        report
                            .events
                            .push(SessionEvent::DeliveryRejected { courier: idx, reason });
                    }
                }
            }
            Interaction::Cancel(id) => match self
                .jobs
                .cancel(id.as_deref(), courier.inventory_mut())
            {
                Ok(cancellation) => {
                    let penalty = cancellation
                        .was_carried
                        .then(|| courier.penalize_cancel());
                    report.events.push(SessionEvent::Cancelled {
                        courier: idx,
                        id: cancellation.id,
                        penalty,
                    });
                }
                Err(reason) => report
                    .events
                    .push(SessionEvent::CancelRejected { courier: idx, reason }),
            },
        }
    }

    fn check_defeat(&mut self, report: &mut TickReport) -> bool {
        let losing = self
            .primary()
            .and_then(|idx| self.units.get(idx))
            .is_some_and(|unit| unit.courier.reputation().is_losing());
        if losing {
            self.finish(RunOutcome::Defeat, report);
        }
        losing
    }

    fn check_run_end(&mut self, report: &mut TickReport) {
        let income = self
            .primary()
            .and_then(|idx| self.units.get(idx))
            .map_or(0.0, |unit| unit.courier.income());
        if self.config.goal > 0.0 && income >= self.config.goal {
            self.finish(RunOutcome::Victory, report);
        } else if self.time >= self.config.max_time {
            self.finish(RunOutcome::TimeUp, report);
        }
    }

    fn finish(&mut self, outcome: RunOutcome, report: &mut TickReport) {
        let (income, reputation) = self
            .primary()
            .and_then(|idx| self.units.get(idx))
            .map_or((0.0, 0), |unit| {
                (unit.courier.income(), unit.courier.reputation().value())
            });
        let time = self.time.min(self.config.max_time);
        let record = ScoreRecord::new(income, time, reputation, self.timestamp_at(time));
        log::info!(
            "run ended in {outcome} after {time:.1}s: income {income:.0}, \
             reputation {reputation}, score {:.0}",
            record.score
        );
        self.outcome = Some(outcome);
        self.record = Some(record);
        report.outcome = Some(outcome);
        report.events.push(SessionEvent::RunEnded(outcome));
    }

    fn timestamp_at(&self, seconds: f64) -> DateTime<Utc> {
        #[allow(clippy::cast_possible_truncation)]
        let millis = (seconds * 1000.0).round() as i64;
        self.clock.start().with_timezone(&Utc) + Duration::milliseconds(millis)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            time: self.time,
            time_remaining: self.time_remaining(),
            goal: self.config.goal,
            outcome: self.outcome,
            weather: self.weather.snapshot(),
            couriers: self.units.iter().map(|unit| unit.courier.snapshot()).collect(),
            jobs: self
                .jobs
                .all()
                .iter()
                .map(|job| JobView {
                    id: job.id().to_string(),
                    state: job.state(),
                    pickup: job.pickup(),
                    dropoff: job.dropoff(),
                    payout: job.payout(),
                    weight: job.weight(),
                    priority: job.priority(),
                    deadline: job.deadline(),
                })
                .collect(),
            stats: self.jobs.stats(),
        }
    }
}
