//! Autonomous courier decision making
//!
//! A policy looks at the world through a [`DecisionContext`] and answers with a
//! single [`Decision`]. The [`Autopilot`] throttles how often that happens and
//! keeps the resulting step queue between decisions.
mod greedy;
mod optimal;
mod reactive;

pub use greedy::GreedyPolicy;
pub use optimal::OptimalPolicy;
pub use reactive::ReactivePolicy;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::courier::Courier;
use crate::grid::{Cell, CityGrid};
use crate::job::{Job, JobId};
use crate::jobs::JobsManager;
use crate::pathfinding::find_path_within_reach;

/// A target chased this long without getting closer is dropped.
pub const TARGET_TIMEOUT_SECS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Self; 3] = [Self::Easy, Self::Medium, Self::Hard];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    /// Seconds between decisions unless overridden by the run configuration.
    #[must_use]
    pub const fn decision_interval(self) -> f64 {
        match self {
            Self::Easy => 0.35,
            Self::Medium => 0.22,
            Self::Hard => 0.16,
        }
    }

    #[must_use]
    pub fn create_policy(self) -> Policy {
        match self {
            Self::Easy => Policy::Reactive(ReactivePolicy::default()),
            Self::Medium => Policy::Greedy(GreedyPolicy::default()),
            Self::Hard => Policy::Optimal(OptimalPolicy::default()),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown difficulty {0:?} (expected easy, medium or hard)")]
pub struct UnknownDifficulty(pub String);

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownDifficulty(s.to_string()))
    }
}

/// Where an autonomous courier is in its delivery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AiPhase {
    #[default]
    Idle,
    SeekingPickup,
    MovingToPickup,
    SeekingDropoff,
    MovingToDropoff,
}

/// What a policy wants done this decision tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Wait,
    Step(Cell),
    /// Cells to walk in order, current position excluded.
    Route(Vec<Cell>),
    Pickup(JobId),
    Deliver,
}

/// Read-only world state a policy decides from.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub grid: &'a CityGrid,
    pub jobs: &'a JobsManager,
    pub courier: &'a Courier,
    pub weather_condition: &'a str,
    pub weather_speed: f64,
    pub now: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub decisions: u64,
    pub replans: u64,
    pub job_selections: u64,
    pub cells_evaluated: u64,
}

/// Target and progress bookkeeping shared by every policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMemory {
    pub phase: AiPhase,
    pub target_job: Option<JobId>,
    pub target: Option<Cell>,
    pub path: VecDeque<Cell>,
    target_since: f64,
    best_distance: u32,
    abandoned: Option<JobId>,
}

impl PlanMemory {
    fn set_target(&mut self, target: Cell, from: Cell, now: f64) {
        if self.target != Some(target) {
            self.target = Some(target);
            self.path.clear();
            self.target_since = now;
            self.best_distance = from.manhattan(target);
        }
    }

    fn clear_target(&mut self) {
        self.target_job = None;
        self.target = None;
        self.path.clear();
        self.phase = AiPhase::Idle;
    }

    /// True once the target has gone [`TARGET_TIMEOUT_SECS`] without the courier getting closer.
    fn timed_out(&mut self, position: Cell, now: f64) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let distance = position.manhattan(target);
        if distance < self.best_distance {
            self.best_distance = distance;
            self.target_since = now;
            return false;
        }
        now - self.target_since >= TARGET_TIMEOUT_SECS
    }

    /// Drop consumed or stale cells from the front of the planned path.
    fn trim_path(&mut self, position: Cell) {
        if let Some(idx) = self.path.iter().position(|cell| *cell == position) {
            self.path.drain(..=idx);
        }
        if self
            .path
            .front()
            .is_some_and(|next| next.manhattan(position) != 1)
        {
            self.path.clear();
        }
    }
}

/// One decision algorithm.
pub trait DecisionPolicy {
    fn name(&self) -> &'static str;

    fn decide(&mut self, ctx: &DecisionContext<'_>, rng: &mut dyn RngCore) -> Decision;

    fn memory(&self) -> &PlanMemory;

    fn stats(&self) -> PolicyStats;
}

/// The built-in policies, one per difficulty.
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    Reactive(ReactivePolicy),
    Greedy(GreedyPolicy),
    Optimal(OptimalPolicy),
}

impl Policy {
    fn inner(&self) -> &dyn DecisionPolicy {
        match self {
            Self::Reactive(policy) => policy,
            Self::Greedy(policy) => policy,
            Self::Optimal(policy) => policy,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn DecisionPolicy {
        match self {
            Self::Reactive(policy) => policy,
            Self::Greedy(policy) => policy,
            Self::Optimal(policy) => policy,
        }
    }
}

impl DecisionPolicy for Policy {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn decide(&mut self, ctx: &DecisionContext<'_>, rng: &mut dyn RngCore) -> Decision {
        self.inner_mut().decide(ctx, rng)
    }

    fn memory(&self) -> &PlanMemory {
        self.inner().memory()
    }

    fn stats(&self) -> PolicyStats {
        self.inner().stats()
    }
}

/// Jobs a policy may consider: available and light enough for the remaining capacity.
fn candidate_jobs<'a>(
    ctx: &'a DecisionContext<'a>,
    memory: &'a PlanMemory,
) -> impl Iterator<Item = &'a Job> + 'a {
    let inventory = ctx.courier.inventory();
    ctx.jobs.available().filter(move |job| {
        inventory.can_add(job.weight()) && memory.abandoned.as_deref() != Some(job.id())
    })
}

/// Pickup/delivery bookkeeping shared by every policy.
///
/// Returns the interaction to perform when the courier is at its target, or
/// `None` when it needs to move toward `memory.target` (if any).
fn manage_target<F>(
    memory: &mut PlanMemory,
    stats: &mut PolicyStats,
    ctx: &DecisionContext<'_>,
    choose: F,
) -> Option<Decision>
where
    F: FnOnce(&DecisionContext<'_>, &PlanMemory, &mut PolicyStats) -> Option<(JobId, Cell)>,
{
    let position = ctx.courier.position();

    if let Some(carried) = ctx.courier.inventory().current() {
        if memory.phase != AiPhase::MovingToDropoff {
            memory.phase = AiPhase::SeekingDropoff;
        }
        memory.target_job = Some(carried.id.clone());
        memory.set_target(carried.dropoff, position, ctx.now);
        if carried.dropoff.within_reach(position) {
            memory.clear_target();
            return Some(Decision::Deliver);
        }
        if memory.timed_out(position, ctx.now) {
            log::debug!("replanning stalled dropoff for {}", carried.id);
            let profile = ctx.courier.load_profile(ctx.weather_speed);
            memory.path = find_path_within_reach(ctx.grid, position, carried.dropoff, &profile)
                .map(|route| route.into_steps().into())
                .unwrap_or_default();
            memory.target_since = ctx.now;
            stats.replans += 1;
        }
        memory.phase = AiPhase::MovingToDropoff;
        return None;
    }

    if let Some(id) = memory.target_job.clone() {
        let still_valid = ctx.jobs.get(&id).is_some_and(|job| {
            ctx.jobs.is_available(&id) && ctx.courier.inventory().can_add(job.weight())
        });
        if !still_valid {
            memory.clear_target();
        } else if memory.timed_out(position, ctx.now) {
            log::debug!("abandoning job {id} after {TARGET_TIMEOUT_SECS}s without progress");
            memory.abandoned = Some(id);
            memory.clear_target();
        }
    }

    if memory.target_job.is_none() {
        memory.phase = AiPhase::SeekingPickup;
        let Some((id, pickup)) = choose(ctx, memory, stats) else {
            memory.clear_target();
            return None;
        };
        stats.job_selections += 1;
        memory.target_job = Some(id);
        memory.set_target(pickup, position, ctx.now);
    }

    memory.phase = AiPhase::MovingToPickup;
    let id = memory.target_job.clone()?;
    let at_pickup = ctx.jobs.get(&id).is_some_and(|job| job.is_at_pickup(position));
    if at_pickup {
        memory.clear_target();
        memory.abandoned = None;
        return Some(Decision::Pickup(id));
    }
    None
}

/// The rest of a planned route, when one is being followed.
fn follow_path(memory: &mut PlanMemory, position: Cell) -> Option<Decision> {
    memory.trim_path(position);
    if memory.path.is_empty() {
        None
    } else {
        Some(Decision::Route(memory.path.iter().copied().collect()))
    }
}

/// A policy plus its decision throttle and the steps it is walking.
#[derive(Debug, Clone, PartialEq)]
pub struct Autopilot {
    difficulty: Difficulty,
    policy: Policy,
    interval: f64,
    since_decision: f64,
    queue: VecDeque<Cell>,
}

impl Autopilot {
    #[must_use]
    pub fn new(difficulty: Difficulty) -> Self {
        Self::with_interval(difficulty, difficulty.decision_interval())
    }

    #[must_use]
    pub fn with_interval(difficulty: Difficulty, interval: f64) -> Self {
        let interval = if interval.is_finite() && interval > 0.0 {
            interval
        } else {
            difficulty.decision_interval()
        };
        Self {
            difficulty,
            policy: difficulty.create_policy(),
            interval,
            since_decision: interval,
            queue: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }

    #[must_use]
    pub const fn interval(&self) -> f64 {
        self.interval
    }

    #[must_use]
    pub fn next_step(&self) -> Option<Cell> {
        self.queue.front().copied()
    }

    pub fn queued_steps(&self) -> impl Iterator<Item = &Cell> {
        self.queue.iter()
    }

    /// The courier reached the head of the queue.
    pub fn step_taken(&mut self) {
        self.queue.pop_front();
    }

    pub fn clear_steps(&mut self) {
        self.queue.clear();
    }

    /// Advance the throttle by `dt` and decide when an interval has elapsed.
    pub fn poll(
        &mut self,
        dt: f64,
        ctx: &DecisionContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<Decision> {
        self.since_decision += dt.max(0.0);
        if self.since_decision < self.interval {
            return None;
        }
        self.since_decision = 0.0;
        let decision = self.policy.decide(ctx, rng);
        match &decision {
            Decision::Step(cell) => {
                self.queue.clear();
                self.queue.push_back(*cell);
            }
            Decision::Route(cells) => {
                self.queue = cells.iter().copied().collect();
            }
            Decision::Wait | Decision::Pickup(_) | Decision::Deliver => self.queue.clear(),
        }
        Some(decision)
    }
}
