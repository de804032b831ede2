//! Compaction and relayout.
//!
//! Compaction rewrites every rank to `min_rank + i * step_size` in the current
//! order, which frees the headroom above the top object. If the live set does
//! not fit at full spacing the spacing shrinks, down to one.

use super::{RankAllocator, RankState};
use crate::error::{AllocatorError, AllocatorResult};
use crate::id::{ObjectId, Rank};

impl RankAllocator {
    /// Reassign every rank densely, preserving order.
    ///
    /// Returns false (and does nothing) if there are no objects. Every object is
    /// reported to the observer afterwards.
    pub fn compact(&mut self) -> bool {
        if self.state.forward.is_empty() {
            return false;
        }
        let order: Vec<ObjectId> = self.ordered_ids().cloned().collect();
        self.relayout(&order);
        true
    }

    /// Compact leaving room for `reserve` more fresh ranks.
    pub(super) fn compact_with_reserve(&mut self, reserve: usize) -> AllocatorResult<bool> {
        if self.state.forward.is_empty() {
            return Ok(false);
        }
        let order: Vec<ObjectId> = self.ordered_ids().cloned().collect();
        let spacing = self.spacing_for(order.len() + reserve).ok_or_else(|| {
            AllocatorError::CapacityExhausted {
                live: order.len(),
                capacity: self.config.range_size(),
            }
        })?;
        self.relayout_with_spacing(&order, spacing);
        Ok(true)
    }

    /// Whether compacting (leaving room for `reserve` fresh ranks) would move
    /// the assignment cursor down.
    pub(super) fn compaction_gains_headroom(&self, reserve: usize) -> bool {
        let live = self.state.len();
        if live == 0 {
            return false;
        }
        match self.spacing_for(live + reserve) {
            Some(spacing) => {
                let cursor = self.config.min_rank as i128 + live as i128 * spacing as i128;
                cursor < self.state.next_available as i128
            }
            // Nothing fits; let the caller report exhaustion.
            None => true,
        }
    }

    /// Lay out `order` bottom to top from `min_rank`. `order` must hold every live id.
    pub(super) fn relayout(&mut self, order: &[ObjectId]) {
        // Live ranks are unique and in range, so spacing one always fits.
        let spacing = self.spacing_for(order.len()).unwrap_or(1);
        self.relayout_with_spacing(order, spacing);
    }

    /// Largest spacing up to `step_size` that fits `slots` ranks in the range.
    fn spacing_for(&self, slots: usize) -> Option<Rank> {
        let step = self.config.step_size as u64;
        if slots <= 1 {
            return Some(step as Rank);
        }
        let fit = (self.config.range_size() - 1) / (slots as u64 - 1);
        (fit > 0).then(|| fit.min(step) as Rank)
    }

    fn relayout_with_spacing(&mut self, order: &[ObjectId], spacing: Rank) {
        debug_assert_eq!(order.len(), self.state.len());
        let min = self.config.min_rank;

        let mut state = RankState::new(min);
        let mut rank = min;
        for id in order {
            state.forward.insert(id.clone(), rank);
            state.reverse.insert(rank, id.clone());
            rank = rank.saturating_add(spacing);
        }
        state.next_available = rank;
        self.state = state;
        self.compactions += 1;

        log::info!(
            "Compacted {} ranks (spacing {}), next available {}",
            order.len(),
            spacing,
            self.state.next_available
        );
        self.notify_all();
    }
}
