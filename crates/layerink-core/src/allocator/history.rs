//! Bounded undo/redo of full allocator snapshots.

use super::{RankAllocator, RankState};
use std::collections::VecDeque;

/// Undo and redo stacks of [`RankState`] snapshots.
#[derive(Debug, Clone)]
pub(super) struct History {
    undo: VecDeque<RankState>,
    redo: Vec<RankState>,
    limit: usize,
}

impl History {
    pub(super) fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    pub(super) fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub(super) fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    fn push_undo(&mut self, snapshot: RankState) {
        if self.limit == 0 {
            return;
        }
        self.undo.push_back(snapshot);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    fn push_redo(&mut self, snapshot: RankState) {
        if self.limit == 0 {
            return;
        }
        self.redo.push(snapshot);
        if self.redo.len() > self.limit {
            self.redo.remove(0);
        }
    }
}

impl RankAllocator {
    /// Record the current state (call before making changes).
    ///
    /// Clears the redo stack. The oldest snapshot is dropped once the history
    /// is full.
    pub fn create_undo_point(&mut self) {
        let snapshot = self.state.clone();
        self.history.push_undo(snapshot);
        self.history.redo.clear();
    }

    /// Restore the most recent undo point.
    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.state, snapshot);
        self.history.push_redo(current);
        self.after_restore();
        log::debug!("Undo restored {} ranks", self.state.len());
        true
    }

    /// Re-apply the last undone state.
    /// Returns true if redo was performed, false if nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.state, snapshot);
        self.history.push_undo(current);
        self.after_restore();
        log::debug!("Redo restored {} ranks", self.state.len());
        true
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.history.undo.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.history.redo.is_empty()
    }

    fn after_restore(&mut self) {
        let state = &self.state;
        self.failed_sync_counts
            .retain(|id, _| state.forward.contains_key(id.as_str()));
        self.notify_all();
    }
}
