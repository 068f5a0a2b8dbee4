//! Optimal policy: most profitable reachable job, full A* routes
use rand::RngCore;

use super::{Decision, DecisionContext, DecisionPolicy, PlanMemory, PolicyStats};
use super::{candidate_jobs, manage_target};
use crate::grid::Cell;
use crate::job::{Job, JobId};
use crate::pathfinding::find_path_within_reach;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimalPolicy {
    memory: PlanMemory,
    stats: PolicyStats,
    planned_weather: Option<String>,
}

/// Highest `payout / max(1, path cost)` among jobs with a reachable pickup.
fn most_profitable(
    ctx: &DecisionContext<'_>,
    memory: &PlanMemory,
    stats: &mut PolicyStats,
) -> Option<(JobId, Cell)> {
    let position = ctx.courier.position();
    let profile = ctx.courier.load_profile(ctx.weather_speed);
    let mut best: Option<(f64, &Job)> = None;
    for job in candidate_jobs(ctx, memory) {
        let Some(route) = find_path_within_reach(ctx.grid, position, job.pickup(), &profile)
        else {
            log::debug!("job {} has no route from {position}", job.id());
            continue;
        };
        stats.cells_evaluated += route.len() as u64;
        let profitability = job.payout() / route.cost.max(1.0);
        if best.is_none_or(|(score, _)| profitability > score) {
            best = Some((profitability, job));
        }
    }
    best.map(|(_, job)| (job.id().to_string(), job.pickup()))
}

impl DecisionPolicy for OptimalPolicy {
    fn name(&self) -> &'static str {
        "optimal"
    }

    fn decide(&mut self, ctx: &DecisionContext<'_>, _rng: &mut dyn RngCore) -> Decision {
        self.stats.decisions += 1;
        if ctx.courier.is_exhausted() {
            return Decision::Wait;
        }

        let action = manage_target(&mut self.memory, &mut self.stats, ctx, most_profitable);
        if let Some(action) = action {
            return action;
        }
        let Some(target) = self.memory.target else {
            return Decision::Wait;
        };

        let position = ctx.courier.position();
        self.memory.trim_path(position);
        let weather_changed = self
            .planned_weather
            .as_deref()
            .is_some_and(|planned| planned != ctx.weather_condition);
        let stale = !self
            .memory
            .path
            .back()
            .is_some_and(|end| end.within_reach(target));
        if self.memory.path.is_empty() || stale || weather_changed {
            self.stats.replans += 1;
            self.planned_weather = Some(ctx.weather_condition.to_string());
            let profile = ctx.courier.load_profile(ctx.weather_speed);
            match find_path_within_reach(ctx.grid, position, target, &profile) {
                Some(route) => {
                    self.stats.cells_evaluated += route.len() as u64;
                    log::debug!(
                        "planned {} steps to {target} (cost {:.2})",
                        route.steps().len(),
                        route.cost
                    );
                    self.memory.path = route.into_steps().into();
                }
                None => {
                    log::debug!("no route from {position} to {target}; retrying next tick");
                    self.memory.path.clear();
                }
            }
        }

        if self.memory.path.is_empty() {
            Decision::Wait
        } else {
            Decision::Route(self.memory.path.iter().copied().collect())
        }
    }

    fn memory(&self) -> &PlanMemory {
        &self.memory
    }

    fn stats(&self) -> PolicyStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn ranks_jobs_by_profitability() {
        let grid = world(&["CCCCCCCC"]);
        let manager = jobs(vec![
            Job::new("close-cheap", Cell::new(2, 0), Cell::new(0, 0), 20.0, 1.0),
            Job::new("far-rich", Cell::new(7, 0), Cell::new(0, 0), 200.0, 1.0),
            Job::new("too-heavy", Cell::new(1, 0), Cell::new(0, 0), 999.0, 9.0),
        ]);
        let courier = courier_at(0, 0);
        let mut policy = OptimalPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let decision = policy.decide(&ctx(&grid, &manager, &courier, 0.0), &mut rng);
        // 20 / 2 = 10 against 200 / 7 ≈ 28.6
        assert_eq!(policy.memory().target_job.as_deref(), Some("far-rich"));
        let expected: Vec<Cell> = (1..=7).map(|x| Cell::new(x, 0)).collect();
        assert_eq!(decision, Decision::Route(expected));
    }

    #[test]
    fn unreachable_jobs_are_excluded() {
        let grid = world(&["CCBCC"]);
        let manager = jobs(vec![
            Job::new("walled", Cell::new(4, 0), Cell::new(3, 0), 500.0, 1.0),
            Job::new("open", Cell::new(1, 0), Cell::new(0, 0), 5.0, 1.0),
        ]);
        let courier = courier_at(0, 0);
        let mut policy = OptimalPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let decision = policy.decide(&ctx(&grid, &manager, &courier, 0.0), &mut rng);
        assert_eq!(decision, Decision::Pickup("open".into()));
    }

    #[test]
    fn keeps_route_until_stale_then_replans_on_weather() {
        let grid = world(&["CCCCCC"]);
        let manager = jobs(vec![Job::new("A", Cell::new(5, 0), Cell::new(0, 0), 50.0, 1.0)]);
        let mut courier = courier_at(0, 0);
        let mut policy = OptimalPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);

        policy.decide(&ctx(&grid, &manager, &courier, 0.0), &mut rng);
        assert_eq!(policy.stats().replans, 1);

        let mut snap = courier.movement();
        snap.position = Cell::new(1, 0);
        courier.restore_movement(snap);
        let decision = policy.decide(&ctx(&grid, &manager, &courier, 0.5), &mut rng);
        assert_eq!(policy.stats().replans, 1);
        assert_eq!(
            decision,
            Decision::Route((2..=5).map(|x| Cell::new(x, 0)).collect())
        );

        let mut rainy = ctx(&grid, &manager, &courier, 1.0);
        rainy.weather_condition = "rain";
        rainy.weather_speed = 0.85;
        policy.decide(&rainy, &mut rng);
        assert_eq!(policy.stats().replans, 2);
    }

    #[test]
    fn no_route_means_wait() {
        let grid = world(&["CBC"]);
        let mut manager = jobs(vec![Job::new("A", Cell::new(0, 0), Cell::new(2, 0), 50.0, 1.0)]);
        let mut courier = courier_at(0, 0);
        manager
            .try_pickup("A", courier.position(), courier.inventory_mut(), 0.0)
            .unwrap();
        let mut policy = OptimalPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            policy.decide(&ctx(&grid, &manager, &courier, 1.0), &mut rng),
            Decision::Wait
        );
    }

    #[test]
    fn pickup_on_a_building_is_reached_from_the_street() {
        let grid = world(&["CCCCCC", "BBBBBB"]);
        let manager = jobs(vec![Job::new("roof", Cell::new(3, 1), Cell::new(5, 0), 80.0, 1.0)]);
        let mut courier = courier_at(0, 0);
        let mut policy = OptimalPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);

        let decision = policy.decide(&ctx(&grid, &manager, &courier, 0.0), &mut rng);
        assert_eq!(policy.memory().target_job.as_deref(), Some("roof"));
        assert_eq!(
            decision,
            Decision::Route((1..=3).map(|x| Cell::new(x, 0)).collect())
        );

        let mut snap = courier.movement();
        snap.position = Cell::new(3, 0);
        courier.restore_movement(snap);
        let decision = policy.decide(&ctx(&grid, &manager, &courier, 1.0), &mut rng);
        assert_eq!(decision, Decision::Pickup("roof".into()));
    }

    #[test]
    fn dropoff_on_a_building_keeps_one_route() {
        let grid = world(&["CCCCCC", "BBBBBB"]);
        let mut manager = jobs(vec![Job::new("A", Cell::new(0, 0), Cell::new(5, 1), 80.0, 1.0)]);
        let mut courier = courier_at(0, 0);
        manager
            .try_pickup("A", courier.position(), courier.inventory_mut(), 0.0)
            .unwrap();
        let mut policy = OptimalPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);

        let decision = policy.decide(&ctx(&grid, &manager, &courier, 0.0), &mut rng);
        assert_eq!(
            decision,
            Decision::Route((1..=5).map(|x| Cell::new(x, 0)).collect())
        );

        let mut snap = courier.movement();
        snap.position = Cell::new(1, 0);
        courier.restore_movement(snap);
        let decision = policy.decide(&ctx(&grid, &manager, &courier, 0.5), &mut rng);
        assert_eq!(
            decision,
            Decision::Route((2..=5).map(|x| Cell::new(x, 0)).collect())
        );
        assert_eq!(policy.stats().replans, 1);

        let mut snap = courier.movement();
        snap.position = Cell::new(5, 0);
        courier.restore_movement(snap);
        let decision = policy.decide(&ctx(&grid, &manager, &courier, 1.0), &mut rng);
        assert_eq!(decision, Decision::Deliver);
    }
}
