// SPDX-License-Identifier: MPL-2.0

mod changes;
mod gaps;
mod index;
mod local;
pub mod overlap;
mod page;
mod post;
mod store;

pub use changes::{ChangeNotifier, FeedChange, PostField};
pub use gaps::GapRegistry;
pub use index::PositionIndex;
pub use local::{LocalEdit, LocalPostChange, LocalPostChanges, PostView};
pub use page::{Page, RawPage};
pub use post::{GapId, Post};
pub use store::FeedStore;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("unsupported record type {record_type:?} for {uri}")]
    UnsupportedEntry { uri: String, record_type: String },
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("gap does not exist: {0}")]
    GapNotFound(GapId),
    #[error("gap {gap_id} expected at position {position}, found another row")]
    GapMismatch { gap_id: GapId, position: usize },
}
