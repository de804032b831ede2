//! Render sync observer contract.
//!
//! The allocator never touches a presentation layer directly. After every
//! committed rank change it calls the registered [`SyncObserver`] once per
//! changed id, and the observer reflects the new order however it likes.

use crate::id::{ObjectId, Rank};

/// What the presentation layer reports back for a rank change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncOutcome {
    /// The change was applied (or the observer does not track targets).
    #[default]
    Applied,
    /// The presentation layer has no live object for this id.
    NotFound,
}

impl SyncOutcome {
    /// Build an outcome from a "target found" flag.
    pub fn from_found(found: bool) -> Self {
        if found {
            SyncOutcome::Applied
        } else {
            SyncOutcome::NotFound
        }
    }
}

/// Receives every committed rank change.
pub trait SyncObserver {
    /// Called once per id whose rank was committed, with the actual rank.
    fn on_rank_changed(&mut self, id: &ObjectId, rank: Rank) -> SyncOutcome;
}

impl<F> SyncObserver for F
where
    F: FnMut(&ObjectId, Rank) -> SyncOutcome,
{
    fn on_rank_changed(&mut self, id: &ObjectId, rank: Rank) -> SyncOutcome {
        self(id, rank)
    }
}

/// Observer that accepts every change and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn on_rank_changed(&mut self, _id: &ObjectId, _rank: Rank) -> SyncOutcome {
        SyncOutcome::Applied
    }
}

/// Callback told about every observer failure, with the id's consecutive failure count.
pub type SyncFailureHandler = Box<dyn FnMut(&ObjectId, u32)>;
