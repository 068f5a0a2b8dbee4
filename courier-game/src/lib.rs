//! Courier Game Engine
//!
//! Platform-agnostic core of the courier delivery simulation: city grid, weather,
//! jobs, couriers, autonomous policies and the tick-driven session.
//! This crate has no UI or platform-specific dependencies.

pub mod ai;
pub mod clock;
pub mod courier;
pub mod data;
pub mod grid;
pub mod inventory;
pub mod job;
pub mod jobs;
pub mod pathfinding;
pub mod reputation;
pub mod rng;
pub mod score;
pub mod session;
pub mod undo;
pub mod weather;

// Re-export commonly used types
pub use ai::{
    AiPhase, Autopilot, Decision, DecisionContext, DecisionPolicy, Difficulty, GreedyPolicy,
    OptimalPolicy, Policy, PolicyStats, ReactivePolicy,
};
pub use clock::RunClock;
pub use courier::{Courier, CourierConfig, CourierSnapshot, DeliveryCredit, Direction, StaminaState};
pub use data::{LoadError, RunConfig, parse_feed, parse_job_feed};
pub use grid::{Cell, CityGrid, GridError, MapFeed, Terrain};
pub use inventory::{CarriedJob, Inventory, SortMode};
pub use job::{Job, JobError, JobId, JobRecord, JobState};
pub use jobs::{DeliveryAttempt, JobStats, JobsManager};
pub use pathfinding::{LoadProfile, Route, find_path, find_path_within_reach};
pub use reputation::{DeliveryTiming, Reputation, ReputationChange};
pub use rng::RngBundle;
pub use score::{MemoryScores, ScoreRecord, ScoreStore};
pub use session::{Command, RunOutcome, SessionEvent, SessionSnapshot, Simulation, TickReport};
pub use undo::UndoStack;
pub use weather::{WeatherConfig, WeatherProcess, WeatherSnapshot};

/// Trait for abstracting data loading operations
/// Platform-specific implementations should provide this
pub trait DataLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the city map, or `None` when no map source exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the map source exists but cannot be read or parsed.
    fn load_map(&self) -> Result<Option<MapFeed>, Self::Error>;

    /// Load raw job records. `None` means the run uses synthetic jobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the job source exists but cannot be read or parsed.
    fn load_jobs(&self) -> Result<Option<Vec<serde_json::Value>>, Self::Error>;

    /// Load the weather configuration. `None` falls back to the built-in one.
    ///
    /// # Errors
    ///
    /// Returns an error if the weather source exists but cannot be read or parsed.
    fn load_weather(&self) -> Result<Option<WeatherConfig>, Self::Error>;
}

/// Main engine for creating simulations and recording their results
pub struct SimulationEngine<L, S>
where
    L: DataLoader,
    S: ScoreStore,
{
    data_loader: L,
    scores: S,
}

impl<L, S> SimulationEngine<L, S>
where
    L: DataLoader,
    S: ScoreStore,
{
    /// Create a new engine with the provided data loader and score store
    pub const fn new(data_loader: L, scores: S) -> Self {
        Self {
            data_loader,
            scores,
        }
    }

    #[must_use]
    pub const fn scores(&self) -> &S {
        &self.scores
    }

    /// Build a simulation from the loader's feeds.
    ///
    /// # Errors
    ///
    /// Fails when the loader fails, no map is available, or the feeds are invalid.
    pub fn create_simulation(&self, config: RunConfig, seed: u64) -> anyhow::Result<Simulation>
    where
        L::Error: Into<anyhow::Error>,
    {
        let map = self
            .data_loader
            .load_map()
            .map_err(Into::into)?
            .ok_or(LoadError::MissingMap)?;
        let jobs = self.data_loader.load_jobs().map_err(Into::into)?;
        let weather = self.data_loader.load_weather().map_err(Into::into)?;
        config.validate().map_err(anyhow::Error::msg)?;
        let sim = Simulation::from_feeds(&map, jobs.as_deref(), weather, config, seed)?;
        Ok(sim)
    }

    /// Store the score of a finished simulation. Returns `None` if it has not ended.
    ///
    /// # Errors
    ///
    /// Returns an error if the score store rejects the record.
    pub fn record_outcome(&mut self, sim: &Simulation) -> anyhow::Result<Option<ScoreRecord>>
    where
        S::Error: Into<anyhow::Error>,
    {
        let Some(record) = sim.score_record().cloned() else {
            return Ok(None);
        };
        self.scores.record(record.clone()).map_err(Into::into)?;
        Ok(Some(record))
    }

    /// Best stored runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the score store cannot be read.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<ScoreRecord>, S::Error> {
        self.scores.top(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[derive(Clone, Default)]
    struct FixtureLoader {
        map: Option<MapFeed>,
    }

    impl FixtureLoader {
        fn with_demo_city() -> Self {
            Self {
                map: Some(MapFeed::demo_city().unwrap()),
            }
        }
    }

    impl DataLoader for FixtureLoader {
        type Error = Infallible;

        fn load_map(&self) -> Result<Option<MapFeed>, Self::Error> {
            Ok(self.map.clone())
        }

        fn load_jobs(&self) -> Result<Option<Vec<serde_json::Value>>, Self::Error> {
            Ok(None)
        }

        fn load_weather(&self) -> Result<Option<WeatherConfig>, Self::Error> {
            Ok(None)
        }
    }

    #[test]
    fn engine_creates_and_records_runs() {
        let mut engine =
            SimulationEngine::new(FixtureLoader::with_demo_city(), MemoryScores::new());
        let mut sim = engine
            .create_simulation(RunConfig::default(), 0xABCD)
            .unwrap();
        // The demo city declares its own run length.
        assert!((sim.config().max_time - 900.0).abs() < f64::EPSILON);
        sim.add_player(None);
        assert!(!sim.jobs().is_empty());
        assert!(engine.record_outcome(&sim).unwrap().is_none());

        while !sim.is_finished() {
            sim.tick(5.0, &[]);
        }
        let record = engine.record_outcome(&sim).unwrap().expect("run finished");
        assert_eq!(sim.outcome(), Some(RunOutcome::TimeUp));
        assert_eq!(engine.leaderboard(5).unwrap(), vec![record]);
    }

    #[test]
    fn missing_map_is_an_error() {
        let engine = SimulationEngine::new(FixtureLoader::default(), MemoryScores::new());
        let err = engine
            .create_simulation(RunConfig::default(), 1)
            .err()
            .expect("no map");
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::MissingMap)
        ));
    }
}
