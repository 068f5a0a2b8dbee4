//! Reactive policy: first job that fits, random walk toward nothing in particular
use rand::{Rng, RngCore};

use super::{Decision, DecisionContext, DecisionPolicy, PlanMemory, PolicyStats};
use super::{candidate_jobs, follow_path, manage_target};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactivePolicy {
    memory: PlanMemory,
    stats: PolicyStats,
}

impl DecisionPolicy for ReactivePolicy {
    fn name(&self) -> &'static str {
        "reactive"
    }

    fn decide(&mut self, ctx: &DecisionContext<'_>, rng: &mut dyn RngCore) -> Decision {
        self.stats.decisions += 1;
        if ctx.courier.is_exhausted() {
            return Decision::Wait;
        }

        let choose = |ctx: &DecisionContext<'_>, memory: &PlanMemory, _: &mut PolicyStats| {
            candidate_jobs(ctx, memory)
                .next()
                .map(|job| (job.id().to_string(), job.pickup()))
        };
        if let Some(action) = manage_target(&mut self.memory, &mut self.stats, ctx, choose) {
            return action;
        }
        if self.memory.target.is_none() {
            return Decision::Wait;
        }
        if let Some(detour) = follow_path(&mut self.memory, ctx.courier.position()) {
            return detour;
        }

        let neighbors = ctx.grid.walkable_neighbors(ctx.courier.position());
        self.stats.cells_evaluated += neighbors.len() as u64;
        if neighbors.is_empty() {
            return Decision::Wait;
        }
        Decision::Step(neighbors[rng.gen_range(0..neighbors.len())])
    }

    fn memory(&self) -> &PlanMemory {
        &self.memory
    }

    fn stats(&self) -> PolicyStats {
        self.stats
    }
}
