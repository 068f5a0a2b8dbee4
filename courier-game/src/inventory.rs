//! Courier inventory: weight-capped, cursor-navigable, reorderable
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::grid::Cell;
use crate::job::{Job, JobId};

const WEIGHT_EPSILON: f64 = 1e-9;

/// Ordering applied to the inventory sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    Priority,
    Deadline,
    Payout,
    #[default]
    Original,
}

impl SortMode {
    pub const ALL: [Self; 4] = [Self::Priority, Self::Deadline, Self::Payout, Self::Original];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Deadline => "deadline",
            Self::Payout => "payout",
            Self::Original => "original",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sort mode {0:?} (expected priority, deadline, payout or original)")]
pub struct UnknownSortMode(pub String);

impl FromStr for SortMode {
    type Err = UnknownSortMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSortMode(s.to_string()))
    }
}

/// Immutable facts about a carried job, plus its insertion sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarriedJob {
    pub id: JobId,
    pub dropoff: Cell,
    pub payout: f64,
    pub weight: f64,
    pub priority: i32,
    pub deadline: Option<f64>,
    pub seq: u64,
}

impl CarriedJob {
    #[must_use]
    pub fn time_until_deadline(&self, now: f64) -> f64 {
        self.deadline
            .map_or(f64::INFINITY, |deadline| (deadline - now).max(0.0))
    }
}

/// Ordered, weight-capped job container with a selection cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    max_weight: f64,
    items: Vec<CarriedJob>,
    current: usize,
    next_seq: u64,
    sort_mode: SortMode,
}

impl Inventory {
    #[must_use]
    pub const fn new(max_weight: f64) -> Self {
        Self {
            max_weight,
            items: Vec::new(),
            current: 0,
            next_seq: 0,
            sort_mode: SortMode::Original,
        }
    }

    #[must_use]
    pub const fn max_weight(&self) -> f64 {
        self.max_weight
    }

    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.items.iter().map(|item| item.weight).sum()
    }

    #[must_use]
    pub fn remaining_capacity(&self) -> f64 {
        (self.max_weight - self.total_weight()).max(0.0)
    }

    #[must_use]
    pub fn can_add(&self, weight: f64) -> bool {
        self.total_weight() + weight <= self.max_weight + WEIGHT_EPSILON
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CarriedJob> {
        self.items.iter()
    }

    #[must_use]
    pub const fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    /// Append a job if it fits. Returns `false` and leaves the inventory untouched otherwise.
    pub fn add(&mut self, job: &Job) -> bool {
        if !self.can_add(job.weight()) || self.contains(job.id()) {
            return false;
        }
        self.items.push(CarriedJob {
            id: job.id().to_string(),
            dropoff: job.dropoff(),
            payout: job.payout(),
            weight: job.weight(),
            priority: job.priority(),
            deadline: job.deadline(),
            seq: self.next_seq,
        });
        self.next_seq += 1;
        true
    }

    #[must_use]
    pub fn current(&self) -> Option<&CarriedJob> {
        self.items.get(self.current)
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.current)
    }

    /// Move the cursor onto `id`.
    pub fn select(&mut self, id: &str) -> bool {
        match self.items.iter().position(|item| item.id == id) {
            Some(idx) => {
                self.current = idx;
                true
            }
            None => false,
        }
    }

    /// Advance the cursor, wrapping to the first job.
    pub fn next(&mut self) -> Option<&CarriedJob> {
        if !self.items.is_empty() {
            self.current = (self.current + 1) % self.items.len();
        }
        self.current()
    }

    /// Step the cursor back, wrapping to the last job.
    pub fn previous(&mut self) -> Option<&CarriedJob> {
        if !self.items.is_empty() {
            self.current = self
                .current
                .checked_sub(1)
                .unwrap_or(self.items.len() - 1);
        }
        self.current()
    }

    pub fn remove_current(&mut self) -> Option<CarriedJob> {
        if self.items.is_empty() {
            return None;
        }
        let removed = self.items.remove(self.current);
        self.clamp_cursor();
        Some(removed)
    }

    /// Remove a job by id, keeping the cursor on the same job when possible.
    pub fn remove(&mut self, id: &str) -> Option<CarriedJob> {
        let idx = self.items.iter().position(|item| item.id == id)?;
        let removed = self.items.remove(idx);
        if idx < self.current {
            self.current -= 1;
        }
        self.clamp_cursor();
        Some(removed)
    }

    fn clamp_cursor(&mut self) {
        if self.current >= self.items.len() {
            self.current = self.items.len().saturating_sub(1);
        }
    }

    /// Reorder the backing sequence. The cursor stays on the job it pointed at.
    pub fn apply_sort(&mut self, mode: SortMode, now: f64) {
        let focused = self.current().map(|item| item.id.clone());
        self.items.sort_by(|a, b| compare(mode, now, a, b));
        self.sort_mode = mode;
        if let Some(id) = focused {
            self.select(&id);
        }
    }

    /// Sorted view that leaves the backing sequence alone.
    #[must_use]
    pub fn sorted_view(&self, mode: SortMode, now: f64) -> Vec<&CarriedJob> {
        let mut view: Vec<&CarriedJob> = self.items.iter().collect();
        view.sort_by(|a, b| compare(mode, now, a, b));
        view
    }
}

fn compare(mode: SortMode, now: f64, a: &CarriedJob, b: &CarriedJob) -> Ordering {
    match mode {
        SortMode::Priority => b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)),
        SortMode::Deadline => a
            .time_until_deadline(now)
            .total_cmp(&b.time_until_deadline(now)),
        SortMode::Payout => b.payout.total_cmp(&a.payout).then_with(|| a.id.cmp(&b.id)),
        SortMode::Original => a.seq.cmp(&b.seq),
    }
}
