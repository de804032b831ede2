//! Allocator configuration.

use crate::error::{AllocatorError, AllocatorResult};
use crate::id::Rank;
use serde::{Deserialize, Serialize};

/// Default lowest rank handed out.
pub const DEFAULT_MIN_RANK: Rank = 100;

/// Default highest rank (the largest CSS z-index).
pub const DEFAULT_MAX_RANK: Rank = 2_147_483_647;

/// Default spacing between freshly assigned ranks.
pub const DEFAULT_STEP_SIZE: Rank = 50;

/// Maximum number of undo states to keep.
pub const DEFAULT_MAX_UNDO_HISTORY: usize = 50;

/// Consecutive observer failures before an id counts as desynced.
pub const DEFAULT_SYNC_FAILURE_THRESHOLD: u32 = 3;

/// Configuration for a [`crate::RankAllocator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Lowest addressable rank.
    pub min_rank: Rank,
    /// Highest addressable rank.
    pub max_rank: Rank,
    /// Spacing between freshly assigned ranks.
    pub step_size: Rank,
    /// Spacing between members of a group placed as a block.
    pub group_sub_step: Rank,
    /// Remaining headroom below which `assign` compacts first.
    /// `None` means ten steps.
    pub low_water_mark: Option<Rank>,
    /// Maximum number of undo (and redo) snapshots.
    pub max_undo_history: usize,
    /// Whether `remove` compacts once the used span gets too sparse.
    pub compact_on_remove: bool,
    /// Fraction of empty slots in the used span that counts as sparse.
    pub sparseness_threshold: f64,
    /// Whether ids the observer repeatedly cannot find are removed.
    pub auto_cleanup_on_repeated_sync_failure: bool,
    /// Consecutive observer failures that trigger auto-cleanup.
    pub sync_failure_threshold: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            min_rank: DEFAULT_MIN_RANK,
            max_rank: DEFAULT_MAX_RANK,
            step_size: DEFAULT_STEP_SIZE,
            group_sub_step: 1,
            low_water_mark: None,
            max_undo_history: DEFAULT_MAX_UNDO_HISTORY,
            compact_on_remove: false,
            sparseness_threshold: 0.5,
            auto_cleanup_on_repeated_sync_failure: false,
            sync_failure_threshold: DEFAULT_SYNC_FAILURE_THRESHOLD,
        }
    }
}

impl AllocatorConfig {
    /// Create a config for the given range, other fields at their defaults.
    pub fn with_range(min_rank: Rank, max_rank: Rank) -> Self {
        Self {
            min_rank,
            max_rank,
            ..Self::default()
        }
    }

    /// Set the step size.
    pub fn step_size(mut self, step_size: Rank) -> Self {
        self.step_size = step_size;
        self
    }

    /// Set the low-water mark.
    pub fn low_water_mark(mut self, mark: Rank) -> Self {
        self.low_water_mark = Some(mark);
        self
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> AllocatorResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to JSON.
    pub fn to_json(&self) -> AllocatorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Effective low-water mark.
    pub fn effective_low_water_mark(&self) -> Rank {
        self.low_water_mark
            .unwrap_or_else(|| self.step_size.saturating_mul(10))
    }

    /// Number of addressable ranks.
    pub fn range_size(&self) -> u64 {
        (self.max_rank as i128 - self.min_rank as i128 + 1).max(0) as u64
    }

    /// Check the config for values the allocator cannot work with.
    pub fn validate(&self) -> AllocatorResult<()> {
        if self.max_rank <= self.min_rank {
            return Err(AllocatorError::InvalidRange {
                min: self.min_rank,
                max: self.max_rank,
            });
        }
        if self.max_rank as i128 - self.min_rank as i128 >= u64::MAX as i128 {
            return Err(AllocatorError::InvalidThreshold(format!(
                "rank range {}..={} is too wide (at most {} ranks)",
                self.min_rank,
                self.max_rank,
                u64::MAX
            )));
        }
        if self.step_size <= 0 {
            return Err(AllocatorError::InvalidStepSize(self.step_size));
        }
        if self.group_sub_step <= 0 {
            return Err(AllocatorError::InvalidSubStep(self.group_sub_step));
        }
        if !(self.sparseness_threshold > 0.0 && self.sparseness_threshold <= 1.0) {
            return Err(AllocatorError::InvalidThreshold(format!(
                "sparseness_threshold must be in (0, 1], got {}",
                self.sparseness_threshold
            )));
        }
        if self.sync_failure_threshold == 0 {
            return Err(AllocatorError::InvalidThreshold(
                "sync_failure_threshold must be at least 1".to_string(),
            ));
        }
        if matches!(self.low_water_mark, Some(mark) if mark < 0) {
            return Err(AllocatorError::InvalidThreshold(
                "low_water_mark must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
