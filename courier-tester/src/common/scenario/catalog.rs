use anyhow::{Result, ensure};
use courier_game::{Difficulty, RunConfig, RunOutcome, Simulation};

use crate::common::scenario::SimulationScenario;
use crate::logic::{SimulationPlan, SimulationSummary};

pub fn catalog_scenarios() -> Vec<SimulationScenario> {
    vec![
        SimulationScenario::new(
            "smoke",
            "Smoke Run",
            "One courier per difficulty runs a full shift",
            all_difficulties()
                .with_expectation(run_finished_expectation)
                .with_expectation(streets_only_expectation),
        ),
        SimulationScenario::new(
            "deterministic-replay",
            "Deterministic Replay",
            "Replaying a seed reproduces every event",
            all_difficulties()
                .with_tick_secs(1.0 / 30.0)
                .with_replay_check()
                .with_expectation(replay_expectation),
        ),
        SimulationScenario::new(
            "weather-bounds",
            "Weather Multiplier Bounds",
            "Blended speed and stamina multipliers stay in range",
            all_difficulties().with_expectation(weather_bounds_expectation),
        ),
        SimulationScenario::new(
            "reputation-bounds",
            "Reputation Bounds",
            "Reputation stays in [0, 100] and defeat matches the threshold",
            all_difficulties().with_expectation(reputation_expectation),
        ),
        SimulationScenario::new(
            "capacity-limits",
            "Capacity Limits",
            "No courier ever carries more than its capacity",
            all_difficulties().with_expectation(capacity_expectation),
        ),
        SimulationScenario::new(
            "job-accounting",
            "Job Accounting",
            "Job state counts add up and match the delivery events",
            all_difficulties().with_expectation(job_accounting_expectation),
        ),
        SimulationScenario::new(
            "optimal-delivers",
            "Optimal Courier Delivers",
            "A hard courier completes deliveries and earns income",
            SimulationPlan::new(&[Difficulty::Hard])
                .with_config(RunConfig {
                    decision_interval: Some(0.2),
                    ..RunConfig::default_config()
                })
                .with_expectation(optimal_expectation),
        ),
        SimulationScenario::new(
            "income-goal",
            "Income Goal",
            "Victory is declared exactly when the primary courier reaches the goal",
            SimulationPlan::new(&[Difficulty::Hard]).with_expectation(income_goal_expectation),
        ),
        SimulationScenario::new(
            "idle-player",
            "Idle Player Among AI",
            "An idle human courier keeps the run score while AI couriers work",
            all_difficulties()
                .with_setup(add_idle_player)
                .with_expectation(idle_player_expectation),
        ),
    ]
}

fn all_difficulties() -> SimulationPlan {
    SimulationPlan::new(&Difficulty::ALL)
}

fn add_idle_player(sim: &mut Simulation) {
    sim.add_player(None);
}

fn run_finished_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(summary.outcome.is_some(), "run did not finish");
    ensure!(summary.score.is_some(), "finished run has no score record");
    ensure!(
        summary.couriers.len() == Difficulty::ALL.len(),
        "expected {} autonomous couriers, found {}",
        Difficulty::ALL.len(),
        summary.couriers.len()
    );
    Ok(())
}

fn streets_only_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.bounds.off_street_positions == 0,
        "couriers stood on buildings {} times",
        summary.bounds.off_street_positions
    );
    Ok(())
}

fn replay_expectation(summary: &SimulationSummary) -> Result<()> {
    let replay = summary
        .replay_fingerprint
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("replay was not run"))?;
    ensure!(
        replay == summary.fingerprint,
        "replay diverged: {} vs {}",
        summary.fingerprint,
        replay
    );
    Ok(())
}

fn weather_bounds_expectation(summary: &SimulationSummary) -> Result<()> {
    let bounds = &summary.bounds;
    ensure!(
        bounds.min_speed_multiplier >= summary.min_speed_floor - 1e-9,
        "speed multiplier {} fell below the floor {}",
        bounds.min_speed_multiplier,
        summary.min_speed_floor
    );
    ensure!(
        bounds.max_speed_multiplier <= 1.0 + 1e-9,
        "speed multiplier {} exceeded 1.0",
        bounds.max_speed_multiplier
    );
    ensure!(
        bounds.min_stamina_cost >= 1.0 - 1e-9,
        "stamina cost multiplier {} fell below 1.0",
        bounds.min_stamina_cost
    );
    Ok(())
}

fn reputation_expectation(summary: &SimulationSummary) -> Result<()> {
    let bounds = &summary.bounds;
    ensure!(
        bounds.min_reputation >= 0 && bounds.max_reputation <= 100,
        "reputation ranged over [{}, {}]",
        bounds.min_reputation,
        bounds.max_reputation
    );
    let primary_reputation = summary
        .couriers
        .first()
        .map_or(70, |courier| courier.reputation);
    let defeated = summary.outcome == Some(RunOutcome::Defeat);
    ensure!(
        defeated == (primary_reputation < 20),
        "outcome {} with primary reputation {}",
        summary.outcome_label(),
        primary_reputation
    );
    Ok(())
}

fn capacity_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.bounds.max_load_ratio <= 1.0 + 1e-9,
        "a courier carried {:.0}% of its capacity",
        summary.bounds.max_load_ratio * 100.0
    );
    Ok(())
}

fn job_accounting_expectation(summary: &SimulationSummary) -> Result<()> {
    let stats = &summary.job_stats;
    let counted = stats.pending
        + stats.available
        + stats.in_progress
        + stats.completed
        + stats.expired
        + stats.cancelled;
    ensure!(
        counted == stats.total,
        "job states add up to {counted}, expected {}",
        stats.total
    );
    ensure!(
        u64::try_from(stats.completed).unwrap_or(u64::MAX) == u64::from(summary.events.deliveries),
        "{} completed jobs but {} delivery events",
        stats.completed,
        summary.events.deliveries
    );
    let delivered: u32 = summary.couriers.iter().map(|c| c.delivered).sum();
    ensure!(
        delivered == summary.events.deliveries,
        "couriers report {delivered} deliveries, events show {}",
        summary.events.deliveries
    );
    Ok(())
}

fn optimal_expectation(summary: &SimulationSummary) -> Result<()> {
    let courier = summary
        .couriers
        .first()
        .ok_or_else(|| anyhow::anyhow!("no hard courier"))?;
    ensure!(courier.delivered > 0, "hard courier delivered nothing");
    ensure!(courier.income > 0.0, "hard courier earned nothing");
    ensure!(courier.policy.job_selections > 0, "no job was ever selected");
    Ok(())
}

fn income_goal_expectation(summary: &SimulationSummary) -> Result<()> {
    let goal = summary.final_snapshot.goal;
    let income = summary.couriers.first().map_or(0.0, |c| c.income);
    match summary.outcome {
        Some(RunOutcome::Victory) => ensure!(
            goal > 0.0 && income >= goal,
            "victory with income {income:.0} against goal {goal:.0}"
        ),
        Some(RunOutcome::TimeUp) => ensure!(
            goal <= 0.0 || income < goal,
            "time ran out although income {income:.0} met goal {goal:.0}"
        ),
        Some(RunOutcome::Defeat) => {}
        None => anyhow::bail!("run did not finish"),
    }
    Ok(())
}

fn idle_player_expectation(summary: &SimulationSummary) -> Result<()> {
    let score = summary
        .score
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no score record"))?;
    ensure!(
        summary.outcome == Some(RunOutcome::TimeUp),
        "idle player run ended in {}",
        summary.outcome_label()
    );
    ensure!(
        score.income.abs() < f64::EPSILON,
        "score credited {:.0} income to the idle player",
        score.income
    );
    ensure!(
        summary.final_snapshot.couriers.len() == summary.couriers.len() + 1,
        "player courier missing from the snapshot"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{GameTester, TesterAssets};
    use std::sync::Arc;

    fn tester() -> GameTester {
        let assets = TesterAssets::load_default()
            .unwrap()
            .with_max_time(Some(45.0));
        GameTester::new(Arc::new(assets), false)
    }

    fn run(key: &str, seed: u64) -> Result<()> {
        let scenario = crate::common::scenario::get_scenario(key).unwrap();
        let plan = scenario.as_logic_scenario().plan;
        let summary = tester().run_plan(&plan, seed)?;
        for expectation in &plan.expectations {
            expectation.evaluate(&summary)?;
        }
        Ok(())
    }

    #[test]
    fn invariant_scenarios_hold_on_short_runs() {
        for key in [
            "smoke",
            "deterministic-replay",
            "weather-bounds",
            "reputation-bounds",
            "capacity-limits",
            "job-accounting",
            "income-goal",
            "idle-player",
        ] {
            run(key, 2024).unwrap_or_else(|err| panic!("{key}: {err:#}"));
        }
    }

    #[test]
    fn replay_expectation_flags_divergence() {
        let plan = SimulationPlan::new(&[Difficulty::Easy]);
        let mut summary = tester().run_plan(&plan, 5).unwrap();
        assert!(replay_expectation(&summary).is_err());
        summary.replay_fingerprint = Some("different".into());
        assert!(replay_expectation(&summary).is_err());
        summary.replay_fingerprint = Some(summary.fingerprint.clone());
        assert!(replay_expectation(&summary).is_ok());
    }
}
