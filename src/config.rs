// SPDX-License-Identifier: MPL-2.0

pub const APP_ID: &str = "io.github.sethcottle.Skyline";

pub const DEFAULT_PDS: &str = "https://bsky.social";

/// Upper bound on the number of rows kept in a timeline.
pub const MAX_TIMELINE_SIZE: usize = 5000;

/// Page size when paging forward (older posts).
pub const TIMELINE_ADD_PAGE_SIZE: usize = 50;

/// Page size when checking for newer posts.
pub const TIMELINE_PREPEND_PAGE_SIZE: usize = 20;

/// Page size when syncing towards a saved timestamp.
pub const TIMELINE_SYNC_PAGE_SIZE: usize = 100;

/// Rows evicted from the tail at once. Must not be smaller than the add/sync page sizes.
pub const TIMELINE_DELETE_SIZE: usize = 100;

/// Rows from the end at which scrolling triggers loading the next page.
pub const TIMELINE_NEXT_PAGE_THRESHOLD: usize = 5;
