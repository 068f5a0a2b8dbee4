//! Bounded history of courier movement for undo
use std::collections::VecDeque;

use crate::courier::MovementSnapshot;

pub const DEFAULT_UNDO_DEPTH: usize = 20;

/// Most recent movement snapshots, oldest dropped first once full.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoStack {
    depth: usize,
    entries: VecDeque<MovementSnapshot>,
}

impl UndoStack {
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            entries: VecDeque::with_capacity(depth),
        }
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, snapshot: MovementSnapshot) {
        if self.depth == 0 {
            return;
        }
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<MovementSnapshot> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}
