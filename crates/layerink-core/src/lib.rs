//! LayerInk Core Library
//!
//! Rank allocation and reordering for layered objects on a shared board.
//!
//! Every object on a board (a text note, an image) carries an integer rank that
//! decides its stacking order. [`RankAllocator`] owns the mapping between object
//! ids and ranks, moves objects relative to their neighbours without ever
//! producing duplicate or out-of-range ranks, and reclaims unused space before
//! the range runs out. Presentation layers learn about rank changes through a
//! [`SyncObserver`].

pub mod allocator;
pub mod config;
pub mod error;
pub mod id;
pub mod layout;
pub mod observer;
pub mod stats;

pub use allocator::{MoveReason, MoveResult, RankAllocator, SwapInfo};
pub use config::AllocatorConfig;
pub use error::{AllocatorError, AllocatorResult};
pub use id::{ObjectId, Rank};
pub use layout::{LayoutEntry, RankLayout};
pub use observer::{NoopObserver, SyncFailureHandler, SyncObserver, SyncOutcome};
pub use stats::{AllocatorStats, SyncHealth};
