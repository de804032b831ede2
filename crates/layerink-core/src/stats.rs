//! Allocator diagnostics.

use crate::id::Rank;
use serde::{Deserialize, Serialize};

/// Health of the link between the allocator and its sync observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncHealth {
    /// Observer failures since construction.
    pub total_failures: u64,
    /// Ids whose most recent notification failed.
    pub failing_ids: usize,
    /// Longest current run of consecutive failures for any id.
    pub max_consecutive_failures: u32,
    /// Ids removed by auto-cleanup.
    pub auto_removed: u64,
}

/// Point-in-time view of an allocator, from [`crate::RankAllocator::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub total_objects: usize,
    pub min_rank: Rank,
    pub max_rank: Rank,
    pub lowest_rank: Option<Rank>,
    pub highest_rank: Option<Rank>,
    pub next_available: Rank,
    /// Number of addressable ranks.
    pub range_size: u64,
    /// Share of the range consumed by the assignment cursor (0 to 1).
    pub utilization: f64,
    /// Ranks left between the cursor and `max_rank`.
    pub remaining_capacity: u64,
    /// Share of empty step slots between the lowest and highest rank.
    pub sparseness: f64,
    /// Headroom is under the low-water mark, or the used span is sparse.
    pub compaction_advised: bool,
    pub compactions: u64,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub sync: SyncHealth,
}
