use anyhow::{Context, Result, ensure};
use courier_game::{Difficulty, RunOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::logic::game_tester::{GameTester, SimulationPlan, SimulationSummary};
use crate::logic::seeds::SeedInfo;

/// Lowest reputation a run may finish at without ending in defeat.
const DEFEAT_THRESHOLD: i32 = 20;

/// Per-run numbers for one solo autonomous courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub outcome: String,
    pub elapsed: f64,
    pub income: f64,
    pub score: f64,
    pub reputation: i32,
    pub min_reputation: i32,
    pub deliveries: u32,
    pub expired: u32,
    pub expired_in_transit: u32,
    pub weather_shifts: u32,
    pub decisions: u64,
    pub replans: u64,
}

impl RunMetrics {
    fn from_summary(summary: &SimulationSummary) -> Result<Self> {
        let courier = summary
            .couriers
            .first()
            .context("playability run has no autonomous courier")?;
        Ok(Self {
            outcome: summary.outcome_label().to_string(),
            elapsed: summary.elapsed,
            income: courier.income,
            score: summary.score.as_ref().map_or(0.0, |record| record.score),
            reputation: courier.reputation,
            min_reputation: summary.bounds.min_reputation,
            deliveries: summary.events.deliveries,
            expired: summary.events.expired,
            expired_in_transit: summary.events.expired_in_transit,
            weather_shifts: summary.events.weather_shifts,
            decisions: courier.policy.decisions,
            replans: courier.policy.replans,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayabilityRecord {
    pub scenario_name: String,
    pub difficulty: Difficulty,
    pub seed_code: String,
    pub seed_value: u64,
    pub metrics: RunMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayabilityAggregate {
    pub scenario_name: String,
    pub difficulty: Difficulty,
    pub iterations: usize,
    pub mean_income: f64,
    pub std_income: f64,
    pub mean_score: f64,
    pub mean_deliveries: f64,
    pub mean_expired: f64,
    pub mean_reputation: f64,
    pub min_reputation: i32,
    pub victory_pct: f64,
    pub defeat_pct: f64,
    pub mean_replans: f64,
}

/// Run every difficulty solo on each seed.
///
/// # Errors
///
/// Fails when a run cannot be created or does not finish.
pub fn run_playability_analysis(
    tester: &GameTester,
    seeds: &[SeedInfo],
    iterations: usize,
) -> Result<Vec<PlayabilityRecord>> {
    let iterations = iterations.max(1);
    let mut records = Vec::with_capacity(seeds.len() * Difficulty::ALL.len() * iterations);

    for difficulty in Difficulty::ALL {
        let plan = SimulationPlan::new(&[difficulty]);
        for seed in seeds {
            for iteration in 0..iterations {
                let iteration_offset = u64::try_from(iteration).unwrap_or(0);
                let iteration_seed = seed.seed.wrapping_add(iteration_offset);
                let summary = tester.run_plan(&plan, iteration_seed).with_context(|| {
                    format!(
                        "playability run failed for {difficulty}, seed {} (iteration {})",
                        seed.code(),
                        iteration + 1
                    )
                })?;
                records.push(PlayabilityRecord {
                    scenario_name: format!("Solo - {difficulty}"),
                    difficulty,
                    seed_code: seed.code(),
                    seed_value: iteration_seed,
                    metrics: RunMetrics::from_summary(&summary)?,
                });
            }
        }
    }

    Ok(records)
}

#[must_use]
pub fn aggregate_playability(records: &[PlayabilityRecord]) -> Vec<PlayabilityAggregate> {
    let mut aggregates: BTreeMap<String, AggregateBuilder> = BTreeMap::new();

    for record in records {
        aggregates
            .entry(record.scenario_name.clone())
            .or_insert_with(|| AggregateBuilder::new(record))
            .ingest(&record.metrics);
        if record.metrics.expired_in_transit > 0 {
            log::warn!(
                "{} seed {} let {} carried jobs expire",
                record.scenario_name,
                record.seed_code,
                record.metrics.expired_in_transit
            );
        }
    }

    aggregates
        .into_values()
        .map(AggregateBuilder::finish)
        .collect()
}

/// Check invariants every run must satisfy, whatever the seed.
///
/// # Errors
///
/// Names the first record that breaks an invariant.
pub fn validate_playability_targets(records: &[PlayabilityRecord]) -> Result<()> {
    for record in records {
        let metrics = &record.metrics;
        let context = || format!("{} seed {}", record.scenario_name, record.seed_code);
        ensure!(
            (0..=100).contains(&metrics.min_reputation) && (0..=100).contains(&metrics.reputation),
            "reputation left [0, 100] in {}",
            context()
        );
        ensure!(
            metrics.income.is_finite() && metrics.income >= 0.0,
            "income {} is not a valid total in {}",
            metrics.income,
            context()
        );
        let defeated = metrics.outcome == RunOutcome::Defeat.label();
        ensure!(
            defeated == (metrics.reputation < DEFEAT_THRESHOLD),
            "outcome {} disagrees with final reputation {} in {}",
            metrics.outcome,
            metrics.reputation,
            context()
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct AggregateBuilder {
    scenario_name: String,
    difficulty: Difficulty,
    iterations: u32,
    income: RunningStats,
    score_sum: f64,
    deliveries_sum: u64,
    expired_sum: u64,
    reputation_sum: i64,
    min_reputation: i32,
    victories: u32,
    defeats: u32,
    replans_sum: u64,
}

impl AggregateBuilder {
    fn new(record: &PlayabilityRecord) -> Self {
        Self {
            scenario_name: record.scenario_name.clone(),
            difficulty: record.difficulty,
            iterations: 0,
            income: RunningStats::default(),
            score_sum: 0.0,
            deliveries_sum: 0,
            expired_sum: 0,
            reputation_sum: 0,
            min_reputation: i32::MAX,
            victories: 0,
            defeats: 0,
            replans_sum: 0,
        }
    }

    fn ingest(&mut self, metrics: &RunMetrics) {
        self.iterations += 1;
        self.income.add(metrics.income);
        self.score_sum += metrics.score;
        self.deliveries_sum += u64::from(metrics.deliveries);
        self.expired_sum += u64::from(metrics.expired);
        self.reputation_sum += i64::from(metrics.reputation);
        self.min_reputation = self.min_reputation.min(metrics.min_reputation);
        if metrics.outcome == RunOutcome::Victory.label() {
            self.victories += 1;
        } else if metrics.outcome == RunOutcome::Defeat.label() {
            self.defeats += 1;
        }
        self.replans_sum += metrics.replans;
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> PlayabilityAggregate {
        let denom = f64::from(self.iterations.max(1));
        PlayabilityAggregate {
            scenario_name: self.scenario_name,
            difficulty: self.difficulty,
            iterations: usize::try_from(self.iterations).unwrap_or(usize::MAX),
            mean_income: self.income.mean(),
            std_income: self.income.std_dev(),
            mean_score: self.score_sum / denom,
            mean_deliveries: self.deliveries_sum as f64 / denom,
            mean_expired: self.expired_sum as f64 / denom,
            mean_reputation: self.reputation_sum as f64 / denom,
            min_reputation: if self.min_reputation == i32::MAX {
                0
            } else {
                self.min_reputation
            },
            victory_pct: f64::from(self.victories) / denom,
            defeat_pct: f64::from(self.defeats) / denom,
            mean_replans: self.replans_sum as f64 / denom,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct RunningStats {
    count: u32,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let count = f64::from(self.count);
        let delta = value - self.mean;
        self.mean += delta / count;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    const fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / f64::from(self.count - 1)
        } else {
            0.0
        }
    }

    fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
