// SPDX-License-Identifier: MPL-2.0

//! Timeline reconciliation and paging for Bluesky feeds.
//!
//! A [`PagingController`] fetches pages through a [`FeedSource`] and merges
//! them into a [`FeedStore`], which keeps the rows in display order along
//! with the cursors, raw responses and gap placeholders needed to page
//! further. Observers follow the store through [`FeedChange`] messages.

pub mod atproto;
pub mod config;
pub mod feed;
pub mod paging;
pub mod runtime;
pub mod state;

#[cfg(test)]
mod testing;

pub use atproto::{AtprotoFeedSource, ClientError, FeedEntry, FeedKind, Session};
pub use feed::{FeedChange, FeedError, FeedStore, GapId, Page, Post, RawPage};
pub use paging::{FeedSource, PagingController, PagingError, PagingEvent};
pub use state::{PagingSettings, SettingsError};
