// SPDX-License-Identifier: MPL-2.0

use crate::atproto::FeedEntry;
use crate::feed::Post;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Response data a page was built from. Kept alive alongside the rows it
/// produced so a timeline position can be traced back to its response.
#[derive(Debug)]
pub struct RawPage {
    pub data: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
        }
    }
}

/// One page of a feed as returned by a single request
#[derive(Debug, Clone)]
pub struct Page {
    posts: Vec<Post>,
    cursor: Option<String>,
    raw: Arc<RawPage>,
}

impl Page {
    /// Build a page from network entries. Entries that cannot be shown are
    /// skipped with a warning; they never fail the page.
    pub fn from_entries(
        entries: Vec<FeedEntry>,
        cursor: Option<String>,
        raw: RawPage,
    ) -> Self {
        let mut posts = Vec::with_capacity(entries.len());

        for entry in entries {
            match Post::from_entry(entry) {
                Ok(post) => posts.push(post),
                Err(e) => tracing::warn!("skipping feed entry: {e}"),
            }
        }

        Self {
            posts,
            cursor: cursor.filter(|c| !c.is_empty()),
            raw: Arc::new(raw),
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Cursor for the content following this page. `None` means the server
    /// has nothing older.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn raw(&self) -> &Arc<RawPage> {
        &self.raw
    }

    pub(crate) fn into_parts(self) -> (Vec<Post>, Option<String>, Arc<RawPage>) {
        (self.posts, self.cursor, self.raw)
    }
}
