pub mod assets;
pub mod game_tester;
pub mod playability;
pub mod reports;
pub mod scores;
pub mod seeds;
pub mod tester;

pub use assets::{FeedFiles, TesterAssets};
pub use game_tester::{GameTester, SimulationPlan, SimulationSummary};
pub use playability::{
    PlayabilityAggregate, PlayabilityRecord, aggregate_playability, run_playability_analysis,
    validate_playability_targets,
};
pub use scores::JsonScoreFile;
pub use seeds::{SeedInfo, resolve_seed_inputs};
pub use tester::*;
