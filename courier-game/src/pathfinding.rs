//! Cost-aware A* over the 4-connected city grid
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::grid::{Cell, CityGrid};

const MIN_STEP_COST: f64 = 0.1;
const MIN_WEATHER_SPEED: f64 = 0.1;

/// What the courier carries and the weather it moves through; both scale edge cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadProfile {
    pub carried_weight: f64,
    pub max_weight: f64,
    pub weather_speed: f64,
}

impl LoadProfile {
    #[must_use]
    pub const fn new(carried_weight: f64, max_weight: f64, weather_speed: f64) -> Self {
        Self {
            carried_weight,
            max_weight,
            weather_speed,
        }
    }

    /// Empty-handed in clear weather.
    #[must_use]
    pub const fn unloaded() -> Self {
        Self::new(0.0, 1.0, 1.0)
    }

    fn load_factor(&self) -> f64 {
        if self.max_weight > 0.0 {
            1.0 + 0.5 * (self.carried_weight.max(0.0) / self.max_weight)
        } else {
            1.0
        }
    }

    fn step_cost(&self, surface_weight: f64) -> f64 {
        let base = (self.load_factor() / surface_weight).max(MIN_STEP_COST);
        base / self.weather_speed.max(MIN_WEATHER_SPEED)
    }
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self::unloaded()
    }
}

/// Cost of stepping into `cell`; infinite when it cannot be entered.
#[must_use]
pub fn edge_cost(grid: &CityGrid, cell: Cell, profile: &LoadProfile) -> f64 {
    if grid.is_walkable(cell) {
        profile.step_cost(grid.surface_weight_at(cell))
    } else {
        f64::INFINITY
    }
}

/// Total cost of walking `cells` in order, excluding the first cell.
#[must_use]
pub fn path_cost(grid: &CityGrid, cells: &[Cell], profile: &LoadProfile) -> f64 {
    cells
        .iter()
        .skip(1)
        .map(|cell| edge_cost(grid, *cell, profile))
        .sum()
}

/// A found path. `cells` starts at the origin and ends at the goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub cells: Vec<Cell>,
    pub cost: f64,
}

impl Route {
    /// Cells still to be walked, origin removed.
    #[must_use]
    pub fn steps(&self) -> &[Cell] {
        self.cells.get(1..).unwrap_or(&[])
    }

    #[must_use]
    pub fn into_steps(mut self) -> Vec<Cell> {
        if self.cells.is_empty() {
            return self.cells;
        }
        self.cells.remove(0);
        self.cells
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    f: f64,
    g: f64,
    seq: u64,
    cell: Cell,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // BinaryHeap pops the maximum, so every key is reversed: lowest f, then g, then oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cheapest path from `start` to `goal` for a courier with `profile`.
///
/// Returns `None` when either end is blocked or the goal cannot be reached.
#[must_use]
pub fn find_path(grid: &CityGrid, start: Cell, goal: Cell, profile: &LoadProfile) -> Option<Route> {
    if !grid.is_walkable(start) || !grid.is_walkable(goal) {
        return None;
    }
    if start == goal {
        return Some(Route {
            cells: vec![start],
            cost: 0.0,
        });
    }

    let cheapest_step = profile.step_cost(grid.max_surface_weight());
    let heuristic = |cell: Cell| f64::from(cell.manhattan(goal)) * cheapest_step;

    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut best_g: HashMap<Cell, f64> = HashMap::new();
    let mut seq = 0_u64;

    best_g.insert(start, 0.0);
    open.push(Frontier {
        f: heuristic(start),
        g: 0.0,
        seq,
        cell: start,
    });

    while let Some(node) = open.pop() {
        if node.cell == goal {
            return Some(Route {
                cells: rebuild(&came_from, goal),
                cost: node.g,
            });
        }
        if best_g.get(&node.cell).is_some_and(|g| node.g > *g) {
            continue;
        }
        for next in grid.walkable_neighbors(node.cell) {
            let tentative = node.g + edge_cost(grid, next, profile);
            if best_g.get(&next).is_some_and(|g| tentative >= *g) {
                continue;
            }
            best_g.insert(next, tentative);
            came_from.insert(next, node.cell);
            seq += 1;
            open.push(Frontier {
                f: tentative + heuristic(next),
                g: tentative,
                seq,
                cell: next,
            });
        }
    }
    None
}

/// Cheapest path from `start` to a cell where `target` is within reach.
///
/// Pickups and deliveries only need adjacency, so a building target is approached
/// through whichever walkable neighbour is cheapest. Walkable targets are routed to directly.
#[must_use]
pub fn find_path_within_reach(
    grid: &CityGrid,
    start: Cell,
    target: Cell,
    profile: &LoadProfile,
) -> Option<Route> {
    if grid.is_walkable(target) {
        return find_path(grid, start, target, profile);
    }
    if !grid.is_walkable(start) {
        return None;
    }
    if start.within_reach(target) {
        return Some(Route {
            cells: vec![start],
            cost: 0.0,
        });
    }
    grid.walkable_neighbors(target)
        .into_iter()
        .filter_map(|end| find_path(grid, start, end, profile))
        .min_by(|a, b| a.cost.total_cmp(&b.cost))
}

fn rebuild(came_from: &HashMap<Cell, Cell>, goal: Cell) -> Vec<Cell> {
    let mut cells = vec![goal];
    let mut node = goal;
    while let Some(prev) = came_from.get(&node) {
        cells.push(*prev);
        node = *prev;
    }
    cells.reverse();
    cells
}
