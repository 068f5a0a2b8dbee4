//! Greedy policy: nearest job, then a short lookahead over cost-plus-distance scores
use rand::RngCore;
use std::collections::VecDeque;

use super::{Decision, DecisionContext, DecisionPolicy, PlanMemory, PolicyStats};
use super::{candidate_jobs, follow_path, manage_target};
use crate::grid::{Cell, CityGrid};
use crate::pathfinding::{LoadProfile, edge_cost};

/// Weight of remaining distance against the cost of the steps taken.
pub const HEURISTIC_WEIGHT: f64 = 2.0;
/// Steps explored ahead of each move, the move itself included.
pub const LOOKAHEAD_DEPTH: u32 = 3;
/// Positions remembered for the revisit penalty.
pub const RECENT_WINDOW: usize = 8;
const REVISIT_PENALTY: f64 = 1.5;
const BACKTRACK_PENALTY: f64 = 2.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GreedyPolicy {
    memory: PlanMemory,
    stats: PolicyStats,
    recent: VecDeque<Cell>,
}

impl GreedyPolicy {
    fn remember(&mut self, position: Cell) {
        if self.recent.back() == Some(&position) {
            return;
        }
        self.recent.push_back(position);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    /// Tile the courier stood on before its current one.
    fn previous(&self) -> Option<Cell> {
        self.recent.iter().rev().nth(1).copied()
    }
}

struct Lookahead<'a> {
    grid: &'a CityGrid,
    profile: LoadProfile,
    target: Cell,
    recent: &'a VecDeque<Cell>,
    evaluated: u64,
}

impl Lookahead<'_> {
    fn revisits(&self, cell: Cell) -> f64 {
        let seen = self.recent.iter().filter(|c| **c == cell).count();
        REVISIT_PENALTY * f64::from(u32::try_from(seen).unwrap_or(u32::MAX))
    }

    fn distance(&self, cell: Cell) -> f64 {
        HEURISTIC_WEIGHT * f64::from(cell.manhattan(self.target))
    }

    /// Best score of any walk of up to `depth` more steps that starts by entering `cell`.
    fn score(&mut self, cell: Cell, depth: u32) -> f64 {
        self.evaluated += 1;
        let step = edge_cost(self.grid, cell, &self.profile) + self.revisits(cell);
        if depth <= 1 || cell.within_reach(self.target) {
            return step + self.distance(cell);
        }
        let rest = self
            .grid
            .walkable_neighbors(cell)
            .into_iter()
            .map(|next| self.score(next, depth - 1))
            .fold(f64::INFINITY, f64::min);
        if rest.is_finite() {
            step + rest
        } else {
            step + self.distance(cell)
        }
    }
}

impl DecisionPolicy for GreedyPolicy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn decide(&mut self, ctx: &DecisionContext<'_>, _rng: &mut dyn RngCore) -> Decision {
        self.stats.decisions += 1;
        let position = ctx.courier.position();
        self.remember(position);
        if ctx.courier.is_exhausted() {
            return Decision::Wait;
        }

        let choose = |ctx: &DecisionContext<'_>, memory: &PlanMemory, _: &mut PolicyStats| {
            candidate_jobs(ctx, memory)
                .min_by(|a, b| {
                    a.pickup()
                        .manhattan(position)
                        .cmp(&b.pickup().manhattan(position))
                        .then_with(|| a.id().cmp(b.id()))
                })
                .map(|job| (job.id().to_string(), job.pickup()))
        };
        if let Some(action) = manage_target(&mut self.memory, &mut self.stats, ctx, choose) {
            return action;
        }
        let Some(target) = self.memory.target else {
            return Decision::Wait;
        };
        if let Some(detour) = follow_path(&mut self.memory, position) {
            return detour;
        }

        let previous = self.previous();
        let mut search = Lookahead {
            grid: ctx.grid,
            profile: ctx.courier.load_profile(ctx.weather_speed),
            target,
            recent: &self.recent,
            evaluated: 0,
        };
        let mut best: Option<(f64, Cell)> = None;
        for next in ctx.grid.walkable_neighbors(position) {
            let mut score = search.score(next, LOOKAHEAD_DEPTH);
            if previous == Some(next) {
                score += BACKTRACK_PENALTY;
            }
            if score.is_finite() && best.is_none_or(|(best_score, _)| score < best_score) {
                best = Some((score, next));
            }
        }
        self.stats.cells_evaluated += search.evaluated;
        best.map_or(Decision::Wait, |(_, cell)| Decision::Step(cell))
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
    use crate::job::Job;
    use std::collections::HashSet;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn heads_for_the_nearest_job() {
        let grid = world(&["CCCCC", "CCCCC", "CCCCC"]);
        let manager = jobs(vec![
            Job::new("far", Cell::new(4, 2), Cell::new(0, 0), 900.0, 1.0),
            Job::new("near", Cell::new(0, 2), Cell::new(4, 0), 10.0, 1.0),
        ]);
        let courier = courier_at(2, 0);
        let mut policy = GreedyPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let decision = policy.decide(&ctx(&grid, &manager, &courier, 0.0), &mut rng);
        // Both are four cells away; ids break the tie.
        assert_eq!(policy.memory().target_job.as_deref(), Some("far"));
        assert!(matches!(decision, Decision::Step(cell) if cell.manhattan(Cell::new(4, 2)) == 3));
    }

    #[test]
    fn steps_reduce_distance_to_target() {
        let grid = world(&["CCCCC", "CBBBC", "CCCCC"]);
        let manager = jobs(vec![Job::new("A", Cell::new(4, 2), Cell::new(0, 0), 10.0, 1.0)]);
        let mut courier = courier_at(0, 0);
        let mut policy = GreedyPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let mut visited = vec![courier.position()];
        for t in 0..8 {
            match policy.decide(&ctx(&grid, &manager, &courier, f64::from(t)), &mut rng) {
                Decision::Step(cell) => {
                    let mut snap = courier.movement();
                    snap.position = cell;
                    courier.restore_movement(snap);
                    visited.push(cell);
                }
                Decision::Pickup(id) => {
                    assert_eq!(id, "A");
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(courier.position().manhattan(Cell::new(4, 2)) <= 1);
        assert!(visited.iter().all(|cell| grid.is_walkable(*cell)));
        assert!(policy.stats().cells_evaluated > 0);
    }

    #[test]
    fn boxed_in_courier_waits() {
        let grid = world(&["BBB", "BCB", "BBB", "CCC"]);
        let manager = jobs(vec![Job::new("A", Cell::new(0, 3), Cell::new(2, 3), 10.0, 1.0)]);
        let courier = courier_at(1, 1);
        let mut policy = GreedyPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(
            policy.decide(&ctx(&grid, &manager, &courier, 0.0), &mut rng),
            Decision::Wait
        );
    }

    #[test]
    fn escapes_a_pocket_around_the_dropoff() {
        let grid = world(&["CCCCCCC", "CBBBBBC", "CBCCCBC", "CCCCCCC"]);
        let mut manager = jobs(vec![Job::new("A", Cell::new(3, 2), Cell::new(3, 0), 80.0, 1.0)]);
        let mut courier = courier_at(3, 2);
        manager
            .try_pickup("A", courier.position(), courier.inventory_mut(), 0.0)
            .unwrap();
        let mut policy = GreedyPolicy::default();
        let mut rng = SmallRng::seed_from_u64(0);
        let mut visited = HashSet::from([courier.position()]);
        let mut delivered_at = None;

        for tick in 0..400 {
            let now = f64::from(tick) * 0.22;
            let next = match policy.decide(&ctx(&grid, &manager, &courier, now), &mut rng) {
                Decision::Deliver => {
                    delivered_at = Some(now);
                    break;
                }
                Decision::Step(cell) => cell,
                Decision::Route(cells) => cells[0],
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(next.manhattan(courier.position()), 1);
            let mut snap = courier.movement();
            snap.position = next;
            courier.restore_movement(snap);
            visited.insert(next);
        }

        let delivered_at = delivered_at.expect("dropoff reached");
        assert!(delivered_at < 30.0, "took {delivered_at}s");
        assert!(visited.len() > 2);
        assert!(courier.position().within_reach(Cell::new(3, 0)));
    }

    #[test]
    fn recent_cells_are_penalised() {
        let grid = world(&["CCC"]);
        let manager = jobs(vec![Job::new("A", Cell::new(2, 0), Cell::new(0, 0), 10.0, 1.0)]);
        let courier = courier_at(1, 0);
        let mut policy = GreedyPolicy::default();
        for _ in 0..3 {
            policy.remember(Cell::new(0, 0));
            policy.remember(Cell::new(1, 0));
        }
        assert_eq!(policy.recent.len(), 6);
        assert_eq!(policy.previous(), Some(Cell::new(0, 0)));

        let recent = policy.recent.clone();
        let mut search = Lookahead {
            grid: &grid,
            profile: courier.load_profile(1.0),
            target: Cell::new(2, 0),
            recent: &recent,
            evaluated: 0,
        };
        let fresh = search.score(Cell::new(2, 0), 1);
        let stale = search.score(Cell::new(0, 0), 1);
        assert!((fresh - 1.0).abs() < 1e-9);
        assert!(stale > fresh + 3.0 * REVISIT_PENALTY);
        assert_eq!(search.evaluated, 2);
    }
}
