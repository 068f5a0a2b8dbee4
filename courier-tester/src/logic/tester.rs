use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::common::scenario::TestScenario;
use crate::logic::game_tester::{GameTester, SimulationPlan, SimulationSummary};
use crate::logic::seeds::SeedInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
    /// Score records of every finished iteration.
    #[serde(skip)]
    pub scores: Vec<courier_game::ScoreRecord>,
}

pub struct LogicTester {
    tester: GameTester,
}

impl LogicTester {
    pub const fn new(tester: GameTester) -> Self {
        Self { tester }
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[SeedInfo],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for seed in seeds {
            if self.tester.verbose() {
                let couriers: Vec<&str> = scenario
                    .plan
                    .couriers
                    .iter()
                    .map(|d| d.label())
                    .collect();
                println!(
                    "🧪 Testing scenario: {} (couriers: {} seed: {})",
                    scenario.name.bright_white(),
                    couriers.join("+"),
                    seed.code()
                );
            }

            results.push(self.run_single_scenario(scenario, seed, iterations));
        }

        results
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: &SeedInfo,
        iterations: usize,
    ) -> ScenarioResult {
        let outcome = self.run_simulation_iterations(&scenario.plan, seed.seed, iterations);

        let avg_duration = if outcome.performance_data.is_empty() {
            Duration::ZERO
        } else {
            outcome.performance_data.iter().sum::<Duration>()
                / u32::try_from(outcome.performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            seed: seed.code(),
            passed: outcome.failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: outcome.successes,
            failures: outcome.failures,
            average_duration: avg_duration,
            performance_data: outcome.performance_data,
            scores: outcome.scores,
        }
    }

    fn run_simulation_iterations(
        &self,
        plan: &SimulationPlan,
        seed: u64,
        iterations: usize,
    ) -> IterationOutcome {
        let mut outcome = IterationOutcome::default();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            let summary = match self.tester.run_plan(plan, iteration_seed) {
                Ok(summary) => summary,
                Err(err) => {
                    outcome.failures.push(format!(
                        "Iteration {} (seed {iteration_seed}): run aborted: {err:#}",
                        i + 1
                    ));
                    continue;
                }
            };
            if let Some(score) = &summary.score {
                outcome.scores.push(score.clone());
            }

            if let Some(err) = evaluate_expectations(plan, &summary) {
                let context = summarize_couriers(&summary);
                outcome.failures.push(format!(
                    "Iteration {} (seed {}, ticks {}, outcome {}): {} | {}",
                    i + 1,
                    summary.seed,
                    summary.ticks,
                    summary.outcome_label(),
                    err,
                    context
                ));

                if self.tester.verbose() {
                    println!(
                        "  ❌ Iteration {}/{} failed: {}",
                        i + 1,
                        iterations,
                        err.clone().red()
                    );
                    println!("     ↳ Seed {} | {}", summary.seed, context);
                }
            } else {
                outcome.successes += 1;
                let duration = start_time.elapsed();
                outcome.performance_data.push(duration);

                if self.tester.verbose() {
                    println!(
                        "  ✅ Iteration {}/{} passed ({duration:?}) \
                         deliveries:{} income:{:.0} outcome:{}",
                        i + 1,
                        iterations,
                        summary.events.deliveries,
                        summary.total_income(),
                        summary.outcome_label()
                    );
                }
            }
        }

        outcome
    }
}

#[derive(Debug, Default)]
struct IterationOutcome {
    successes: usize,
    failures: Vec<String>,
    performance_data: Vec<Duration>,
    scores: Vec<courier_game::ScoreRecord>,
}

fn evaluate_expectations(plan: &SimulationPlan, summary: &SimulationSummary) -> Option<String> {
    for expectation in &plan.expectations {
        if let Err(err) = expectation.evaluate(summary) {
            return Some(format!("{err:#}"));
        }
    }
    None
}

fn summarize_couriers(summary: &SimulationSummary) -> String {
    if summary.couriers.is_empty() {
        return "no autonomous couriers".to_string();
    }

    summary
        .couriers
        .iter()
        .map(|courier| {
            format!(
                "{}: income {:.0} rep {} delivered {} replans {}",
                courier.difficulty,
                courier.income,
                courier.reputation,
                courier.delivered,
                courier.policy.replans
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::assets::TesterAssets;
    use courier_game::{Difficulty, RunOutcome};
    use std::sync::Arc;

    fn short_tester() -> GameTester {
        let assets = TesterAssets::load_default()
            .unwrap()
            .with_max_time(Some(30.0));
        GameTester::new(Arc::new(assets), false)
    }

    #[test]
    fn passing_and_failing_expectations_are_counted() {
        let tester = LogicTester::new(short_tester());
        let passing = TestScenario::simulation(
            "ends",
            SimulationPlan::new(&[Difficulty::Easy]).with_expectation(
                |summary: &SimulationSummary| {
                    anyhow::ensure!(summary.outcome == Some(RunOutcome::TimeUp), "not over");
                    Ok(())
                },
            ),
        );
        let failing = TestScenario::simulation(
            "never",
            SimulationPlan::new(&[Difficulty::Easy])
                .with_expectation(|_: &SimulationSummary| anyhow::bail!("always fails")),
        );
        let seeds = [SeedInfo::from_numeric(11)];

        let ok = tester.run_scenario(&passing, &seeds, 2);
        assert_eq!(ok.len(), 1);
        assert!(ok[0].passed);
        assert_eq!(ok[0].successful_iterations, 2);
        assert_eq!(ok[0].scores.len(), 2);

        let bad = tester.run_scenario(&failing, &seeds, 1);
        assert!(!bad[0].passed);
        assert!(bad[0].failures[0].contains("always fails"));
        assert_eq!(bad[0].average_duration, Duration::ZERO);
    }

    #[test]
    fn results_serialize_durations_as_millis() {
        let result = ScenarioResult {
            scenario_name: "x".into(),
            seed: "1".into(),
            passed: true,
            iterations_run: 1,
            successful_iterations: 1,
            failures: Vec::new(),
            average_duration: Duration::from_millis(12),
            performance_data: vec![Duration::from_millis(12)],
            scores: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 12);
        assert_eq!(json["performance_data"][0], 12);
        assert!(json.get("scores").is_none());
    }
}
