//! Rank allocator: owns the id/rank mapping for every layered object.
//!
//! The allocator hands out spaced ranks, moves objects relative to their
//! neighbours, compacts the range when headroom runs low and keeps a bounded
//! undo history. Every committed change is reported to the [`SyncObserver`].
//!
//! Multi-id changes are applied as a plan: every moving id is lifted out of the
//! maps before any of them is put back, so no two ids ever share a rank, and
//! the observer only sees the final ranks (displaced ids first).

mod compact;
mod history;
mod moves;

pub use moves::{MoveReason, MoveResult, SwapInfo};

use crate::config::AllocatorConfig;
use crate::error::{AllocatorError, AllocatorResult};
use crate::id::{ObjectId, Rank};
use crate::layout::{LayoutEntry, RankLayout};
use crate::observer::{NoopObserver, SyncFailureHandler, SyncObserver, SyncOutcome};
use crate::stats::{AllocatorStats, SyncHealth};
use history::History;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The id/rank maps plus the fresh-assignment cursor.
///
/// This is exactly what an undo snapshot captures.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RankState {
    /// Object id to rank.
    forward: HashMap<ObjectId, Rank>,
    /// Rank to object id, ordered for neighbour lookups.
    reverse: BTreeMap<Rank, ObjectId>,
    /// Next rank `assign` hands out.
    next_available: Rank,
}

impl RankState {
    fn new(next_available: Rank) -> Self {
        Self {
            forward: HashMap::new(),
            reverse: BTreeMap::new(),
            next_available,
        }
    }

    fn len(&self) -> usize {
        self.forward.len()
    }

    fn rank_of(&self, id: &str) -> Option<Rank> {
        self.forward.get(id).copied()
    }

    fn occupant(&self, rank: Rank) -> Option<&ObjectId> {
        self.reverse.get(&rank)
    }

    fn lowest(&self) -> Option<Rank> {
        self.reverse.keys().next().copied()
    }

    fn highest(&self) -> Option<Rank> {
        self.reverse.keys().next_back().copied()
    }

    /// Nearest occupied rank strictly above `rank`.
    fn above(&self, rank: Rank) -> Option<(Rank, &ObjectId)> {
        let start = rank.checked_add(1)?;
        self.reverse.range(start..).next().map(|(&r, id)| (r, id))
    }

    /// Nearest occupied rank strictly below `rank`.
    fn below(&self, rank: Rank) -> Option<(Rank, &ObjectId)> {
        self.reverse.range(..rank).next_back().map(|(&r, id)| (r, id))
    }

    /// Ids from bottom to top.
    fn ordered(&self) -> impl Iterator<Item = (&ObjectId, Rank)> {
        self.reverse.iter().map(|(&rank, id)| (id, rank))
    }

    fn remove(&mut self, id: &str) -> Option<Rank> {
        let rank = self.forward.remove(id)?;
        self.reverse.remove(&rank);
        Some(rank)
    }

    /// Insert `id` at a rank that must be free.
    fn insert(&mut self, id: ObjectId, rank: Rank, step: Rank) {
        debug_assert!(!self.reverse.contains_key(&rank), "rank {rank} already occupied");
        self.forward.insert(id.clone(), rank);
        self.reverse.insert(rank, id);
        self.next_available = self.next_available.max(rank.saturating_add(step));
    }

    /// Apply a plan of final ranks: lift every planned id out, then place them all.
    fn apply(&mut self, plan: &[(ObjectId, Rank)], step: Rank) {
        for (id, _) in plan {
            self.remove(id.as_str());
        }
        for (id, rank) in plan {
            self.insert(id.clone(), *rank, step);
        }
    }

    /// Nearest free rank to `rank` within `[min, max]`, searching upward first.
    fn nearest_free(&self, rank: Rank, min: Rank, max: Rank) -> Option<Rank> {
        if !self.reverse.contains_key(&rank) {
            return Some(rank);
        }

        let mut up = Some(rank);
        for &occupied in self.reverse.range(rank..).map(|(r, _)| r) {
            match up {
                Some(candidate) if candidate == occupied => {
                    up = candidate.checked_add(1).filter(|&next| next <= max);
                }
                _ => break,
            }
        }
        if up.is_some() {
            return up;
        }

        let mut down = Some(rank);
        for &occupied in self.reverse.range(..=rank).rev().map(|(r, _)| r) {
            match down {
                Some(candidate) if candidate == occupied => {
                    down = candidate.checked_sub(1).filter(|&next| next >= min);
                }
                _ => break,
            }
        }
        down
    }

    fn recompute_next_available(&mut self, min: Rank, step: Rank) {
        self.next_available = match self.highest() {
            Some(top) => top.saturating_add(step),
            None => min,
        };
    }

    /// Fraction of empty step slots between the lowest and highest rank.
    fn sparseness(&self, step: Rank) -> f64 {
        let (Some(low), Some(high)) = (self.lowest(), self.highest()) else {
            return 0.0;
        };
        let slots = ((high as i128 - low as i128) / step as i128 + 1) as f64;
        (1.0 - self.len() as f64 / slots).max(0.0)
    }
}

/// Assigns and reorders integer ranks for layered objects.
pub struct RankAllocator {
    config: AllocatorConfig,
    state: RankState,
    history: History,
    observer: Box<dyn SyncObserver>,
    on_sync_failed: Option<SyncFailureHandler>,
    /// Consecutive observer failures per id.
    failed_sync_counts: HashMap<ObjectId, u32>,
    total_sync_failures: u64,
    auto_removed: u64,
    compactions: u64,
    /// Set while a group operation is in flight; suppresses automatic compaction.
    compaction_suspended: bool,
}

impl fmt::Debug for RankAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankAllocator")
            .field("config", &self.config)
            .field("objects", &self.state.len())
            .field("next_available", &self.state.next_available)
            .field("undo_depth", &self.history.undo_depth())
            .field("compaction_suspended", &self.compaction_suspended)
            .finish_non_exhaustive()
    }
}

impl Default for RankAllocator {
    fn default() -> Self {
        Self::from_valid_config(AllocatorConfig::default())
    }
}

impl RankAllocator {
    /// Create an allocator that reports to no one.
    ///
    /// Fails if the config is invalid (e.g. `max_rank <= min_rank`).
    pub fn new(config: AllocatorConfig) -> AllocatorResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// Create an allocator that reports every committed change to `observer`.
    pub fn with_observer(
        config: AllocatorConfig,
        observer: impl SyncObserver + 'static,
    ) -> AllocatorResult<Self> {
        let mut allocator = Self::new(config)?;
        allocator.observer = Box::new(observer);
        Ok(allocator)
    }

    fn from_valid_config(config: AllocatorConfig) -> Self {
        Self {
            state: RankState::new(config.min_rank),
            history: History::new(config.max_undo_history),
            observer: Box::new(NoopObserver),
            on_sync_failed: None,
            failed_sync_counts: HashMap::new(),
            total_sync_failures: 0,
            auto_removed: 0,
            compactions: 0,
            compaction_suspended: false,
            config,
        }
    }

    /// Replace the sync observer.
    pub fn set_observer(&mut self, observer: impl SyncObserver + 'static) {
        self.observer = Box::new(observer);
    }

    /// Register a callback told about every observer failure.
    pub fn set_sync_failure_handler(&mut self, handler: impl FnMut(&ObjectId, u32) + 'static) {
        self.on_sync_failed = Some(Box::new(handler));
    }

    /// The allocator's configuration.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    // --- Lookups ---

    /// Rank of `id`, or `min_rank` if the id is unknown.
    pub fn get(&self, id: &str) -> Rank {
        self.state.rank_of(id).unwrap_or(self.config.min_rank)
    }

    /// Rank of `id`, if it has one.
    pub fn rank_of(&self, id: &str) -> Option<Rank> {
        self.state.rank_of(id)
    }

    /// Whether `id` currently has a rank.
    pub fn contains(&self, id: &str) -> bool {
        self.state.forward.contains_key(id)
    }

    /// The id holding `rank`, if any.
    pub fn id_at(&self, rank: Rank) -> Option<&ObjectId> {
        self.state.occupant(rank)
    }

    /// Number of ranked objects.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Check if no object has a rank.
    pub fn is_empty(&self) -> bool {
        self.state.forward.is_empty()
    }

    /// Ids with their ranks, bottom to top.
    pub fn ordered(&self) -> impl Iterator<Item = (&ObjectId, Rank)> {
        self.state.ordered()
    }

    /// Ids bottom to top.
    pub fn ordered_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.state.reverse.values()
    }

    /// The rank the next `assign` would hand out, barring compaction.
    pub fn next_available(&self) -> Rank {
        self.state.next_available
    }

    // --- Allocation ---

    /// Give `id` a fresh rank above every rank handed out so far.
    ///
    /// Compacts first when the headroom below `max_rank` drops under the
    /// low-water mark. An id that already has a rank loses its old one.
    pub fn assign(&mut self, id: impl Into<ObjectId>) -> AllocatorResult<Rank> {
        let id = id.into();
        self.ensure_capacity()?;
        self.state.remove(id.as_str());

        let rank = self.state.next_available;
        self.state.insert(id.clone(), rank, self.config.step_size);
        log::debug!("Assigned rank {} to {}", rank, id);
        self.notify(&[(id, rank)]);
        Ok(rank)
    }

    /// Place `id` at `rank` directly and return where it actually landed.
    ///
    /// The rank is clamped into `[min_rank, max_rank]`. If another id holds the
    /// clamped rank, the nearest free rank is used instead (above first).
    pub fn set(&mut self, id: impl Into<ObjectId>, rank: Rank) -> Rank {
        let id = id.into();
        let clamped = rank.clamp(self.config.min_rank, self.config.max_rank);
        if clamped != rank {
            log::debug!("Clamped rank {} to {} for {}", rank, clamped, id);
        }

        let prior = self.state.remove(id.as_str());
        let Some(actual) = self
            .state
            .nearest_free(clamped, self.config.min_rank, self.config.max_rank)
        else {
            // Only reachable when every rank in the range is taken by others.
            log::warn!("No free rank for {} near {}", id, clamped);
            if let Some(prior) = prior {
                self.state.insert(id, prior, self.config.step_size);
                return prior;
            }
            return self.config.min_rank;
        };

        self.state.insert(id.clone(), actual, self.config.step_size);
        self.notify(&[(id, actual)]);
        actual
    }

    /// Drop `id`. Returns false (and changes nothing) if the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(rank) = self.state.remove(id) else {
            return false;
        };
        self.failed_sync_counts.remove(id);
        log::debug!("Removed {} from rank {}", id, rank);

        if self.config.compact_on_remove
            && !self.compaction_suspended
            && self.state.sparseness(self.config.step_size) > self.config.sparseness_threshold
        {
            log::info!("Range sparse after removing {}, compacting", id);
            self.compact();
        }
        true
    }

    /// Drop every object. Undo history is kept.
    pub fn clear(&mut self) {
        self.state = RankState::new(self.config.min_rank);
        self.failed_sync_counts.clear();
    }

    // --- Bulk load / export ---

    /// Import `(id, rank)` pairs in one pass.
    ///
    /// Ranks are clamped and collisions are resolved like [`Self::set`], but no
    /// compaction checks run per item; the assignment cursor is recomputed once
    /// at the end. Existing objects not in `entries` keep their ranks.
    pub fn load<I, T>(&mut self, entries: I) -> Vec<(ObjectId, Rank)>
    where
        I: IntoIterator<Item = (T, Rank)>,
        T: Into<ObjectId>,
    {
        let (min, max) = (self.config.min_rank, self.config.max_rank);
        let mut loaded: Vec<(ObjectId, Rank)> = Vec::new();

        for (id, rank) in entries {
            let id = id.into();
            self.state.remove(id.as_str());
            loaded.retain(|(existing, _)| *existing != id);

            let Some(actual) = self.state.nearest_free(rank.clamp(min, max), min, max) else {
                log::warn!("Dropping {} from bulk load: no free rank near {}", id, rank);
                continue;
            };
            self.state.forward.insert(id.clone(), actual);
            self.state.reverse.insert(actual, id.clone());
            loaded.push((id, actual));
        }

        let cursor = self.state.next_available;
        self.state.recompute_next_available(min, self.config.step_size);
        self.state.next_available = self.state.next_available.max(cursor);
        log::info!("Loaded {} ranks", loaded.len());

        loaded.sort_by_key(|(_, rank)| *rank);
        self.notify(&loaded);
        loaded
    }

    /// Import a persisted layout. See [`Self::load`].
    pub fn load_layout(&mut self, layout: &RankLayout) -> Vec<(ObjectId, Rank)> {
        self.load(layout.entries.iter().map(|e| (e.id.clone(), e.rank)))
    }

    /// Export the current order.
    pub fn layout(&self) -> RankLayout {
        RankLayout {
            entries: self
                .state
                .ordered()
                .map(|(id, rank)| LayoutEntry { id: id.clone(), rank })
                .collect(),
        }
    }

    // --- Diagnostics ---

    /// Read-only diagnostics.
    pub fn stats(&self) -> AllocatorStats {
        let range_size = self.config.range_size();
        let used = (self.state.next_available as i128 - self.config.min_rank as i128)
            .clamp(0, range_size as i128) as u64;
        let remaining_capacity =
            (self.config.max_rank as i128 - self.state.next_available as i128 + 1).max(0) as u64;
        let sparseness = self.state.sparseness(self.config.step_size);

        AllocatorStats {
            total_objects: self.state.len(),
            min_rank: self.config.min_rank,
            max_rank: self.config.max_rank,
            lowest_rank: self.state.lowest(),
            highest_rank: self.state.highest(),
            next_available: self.state.next_available,
            range_size,
            utilization: used as f64 / range_size as f64,
            remaining_capacity,
            sparseness,
            compaction_advised: (self.capacity_low() && self.compaction_gains_headroom(1))
                || (self.state.len() > 1 && sparseness > self.config.sparseness_threshold),
            compactions: self.compactions,
            undo_depth: self.history.undo_depth(),
            redo_depth: self.history.redo_depth(),
            sync: SyncHealth {
                total_failures: self.total_sync_failures,
                failing_ids: self.failed_sync_counts.len(),
                max_consecutive_failures: self
                    .failed_sync_counts
                    .values()
                    .copied()
                    .max()
                    .unwrap_or(0),
                auto_removed: self.auto_removed,
            },
        }
    }

    /// Consecutive observer failures recorded for `id`.
    pub fn sync_failures(&self, id: &str) -> u32 {
        self.failed_sync_counts.get(id).copied().unwrap_or(0)
    }

    // --- Internals ---

    /// Whether the headroom below `max_rank` is under the low-water mark.
    fn capacity_low(&self) -> bool {
        let remaining = self.config.max_rank as i128 - self.state.next_available as i128;
        remaining < self.config.effective_low_water_mark() as i128
    }

    /// Make room for one more fresh rank, compacting if headroom is low and
    /// compaction would actually lower the cursor.
    fn ensure_capacity(&mut self) -> AllocatorResult<()> {
        if self.state.forward.is_empty() {
            self.state.next_available = self.config.min_rank;
        } else if self.capacity_low()
            && !self.compaction_suspended
            && self.compaction_gains_headroom(1)
        {
            log::info!(
                "Rank headroom low (next {} of max {}), compacting",
                self.state.next_available,
                self.config.max_rank
            );
            self.compact_with_reserve(1)?;
        }

        if self.state.next_available > self.config.max_rank {
            return Err(AllocatorError::CapacityExhausted {
                live: self.state.len(),
                capacity: self.config.range_size(),
            });
        }
        Ok(())
    }

    /// Commit a plan of final ranks and report it to the observer.
    fn commit(&mut self, plan: &[(ObjectId, Rank)]) {
        self.state.apply(plan, self.config.step_size);
        self.notify(plan);
    }

    /// Report committed ranks to the observer and track desync.
    fn notify(&mut self, changes: &[(ObjectId, Rank)]) {
        let mut stale = Vec::new();

        for (id, rank) in changes {
            match self.observer.on_rank_changed(id, *rank) {
                SyncOutcome::Applied => {
                    self.failed_sync_counts.remove(id.as_str());
                }
                SyncOutcome::NotFound => {
                    let count = self.failed_sync_counts.entry(id.clone()).or_insert(0);
                    *count += 1;
                    let count = *count;
                    self.total_sync_failures += 1;
                    log::warn!("Sync observer has no object for {} (failure {})", id, count);

                    if let Some(handler) = self.on_sync_failed.as_mut() {
                        handler(id, count);
                    }
                    if self.config.auto_cleanup_on_repeated_sync_failure
                        && count >= self.config.sync_failure_threshold
                    {
                        stale.push(id.clone());
                    }
                }
            }
        }

        for id in stale {
            if self.state.remove(id.as_str()).is_some() {
                log::warn!("Removing {} after repeated sync failures", id);
                self.failed_sync_counts.remove(id.as_str());
                self.auto_removed += 1;
            }
        }
    }

    /// Report every live rank, bottom to top.
    fn notify_all(&mut self) {
        let all: Vec<(ObjectId, Rank)> = self
            .state
            .ordered()
            .map(|(id, rank)| (id.clone(), rank))
            .collect();
        self.notify(&all);
    }
}
