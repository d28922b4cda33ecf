// SPDX-License-Identifier: MPL-2.0

//! Local edits (likes, reposts, deletions) made by the user while the
//! server copy of a post is still the one stored in the timeline.
//!
//! Rows are never rewritten; the overlay is keyed by cid and applied when a
//! row is read, so every repost of the same content picks it up.

use crate::feed::{Post, PostField};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalPostChange {
    pub like_count_delta: i64,
    pub repost_count_delta: i64,
    pub reply_count_delta: i64,
    /// `Some(None)` when the like was withdrawn locally
    pub like_uri: Option<Option<String>>,
    /// `Some(None)` when the repost was withdrawn locally
    pub repost_uri: Option<Option<String>>,
    pub deleted: bool,
}

/// A single edit made by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEdit {
    LikeCount(i64),
    LikeUri(Option<String>),
    RepostCount(i64),
    RepostUri(Option<String>),
    ReplyCount(i64),
    Deleted,
}

#[derive(Debug, Default)]
pub struct LocalPostChanges {
    changes: HashMap<String, LocalPostChange>,
}

impl LocalPostChanges {
    pub fn get(&self, cid: &str) -> Option<&LocalPostChange> {
        self.changes.get(cid)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Record an edit, returning the field observers should refresh
    pub fn apply(&mut self, cid: &str, edit: LocalEdit) -> PostField {
        let change = self.changes.entry(cid.to_string()).or_default();

        match edit {
            LocalEdit::LikeCount(delta) => {
                change.like_count_delta += delta;
                PostField::LikeCount
            }
            LocalEdit::LikeUri(uri) => {
                change.like_uri = Some(uri);
                PostField::LikeUri
            }
            LocalEdit::RepostCount(delta) => {
                change.repost_count_delta += delta;
                PostField::RepostCount
            }
            LocalEdit::RepostUri(uri) => {
                change.repost_uri = Some(uri);
                PostField::RepostUri
            }
            LocalEdit::ReplyCount(delta) => {
                change.reply_count_delta += delta;
                PostField::ReplyCount
            }
            LocalEdit::Deleted => {
                change.deleted = true;
                PostField::Deleted
            }
        }
    }
}

fn apply_delta(count: u32, delta: i64) -> u32 {
    (i64::from(count) + delta).clamp(0, i64::from(u32::MAX)) as u32
}

/// A row as the user should see it: server data with local edits on top
#[derive(Debug, Clone, Copy)]
pub struct PostView<'a> {
    post: &'a Post,
    change: Option<&'a LocalPostChange>,
}

impl<'a> PostView<'a> {
    pub fn new(post: &'a Post, change: Option<&'a LocalPostChange>) -> Self {
        Self { post, change }
    }

    pub fn post(&self) -> &'a Post {
        self.post
    }

    pub fn like_count(&self) -> u32 {
        apply_delta(
            self.post.like_count(),
            self.change.map_or(0, |c| c.like_count_delta),
        )
    }

    pub fn repost_count(&self) -> u32 {
        apply_delta(
            self.post.repost_count(),
            self.change.map_or(0, |c| c.repost_count_delta),
        )
    }

    pub fn reply_count(&self) -> u32 {
        apply_delta(
            self.post.reply_count(),
            self.change.map_or(0, |c| c.reply_count_delta),
        )
    }

    pub fn like_uri(&self) -> Option<&'a str> {
        match self.change.and_then(|c| c.like_uri.as_ref()) {
            Some(overridden) => overridden.as_deref(),
            None => self.post.viewer_like(),
        }
    }

    pub fn repost_uri(&self) -> Option<&'a str> {
        match self.change.and_then(|c| c.repost_uri.as_ref()) {
            Some(overridden) => overridden.as_deref(),
            None => self.post.viewer_repost(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.change.is_some_and(|c| c.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::entry;

    #[test]
    fn test_view_without_changes_mirrors_post() {
        let mut e = entry("a", "2024-01-01T10:00:00Z");
        e.viewer_like = Some("at://like/1".to_string());
        let post = Post::from_entry(e).unwrap();
        let view = PostView::new(&post, None);
        assert_eq!(view.like_count(), 3);
        assert_eq!(view.like_uri(), Some("at://like/1"));
        assert!(!view.is_deleted());
    }

    #[test]
    fn test_local_unlike() {
        let mut e = entry("a", "2024-01-01T10:00:00Z");
        e.viewer_like = Some("at://like/1".to_string());
        let post = Post::from_entry(e).unwrap();

        let mut changes = LocalPostChanges::default();
        assert_eq!(
            changes.apply("a", LocalEdit::LikeCount(-1)),
            PostField::LikeCount
        );
        assert_eq!(changes.apply("a", LocalEdit::LikeUri(None)), PostField::LikeUri);

        let view = PostView::new(&post, changes.get("a"));
        assert_eq!(view.like_count(), 2);
        assert_eq!(view.like_uri(), None);
    }

    #[test]
    fn test_counts_never_go_negative() {
        let post = Post::from_entry(entry("a", "2024-01-01T10:00:00Z")).unwrap();
        let mut changes = LocalPostChanges::default();
        changes.apply("a", LocalEdit::RepostCount(-5));
        changes.apply("a", LocalEdit::Deleted);

        let view = PostView::new(&post, changes.get("a"));
        assert_eq!(view.repost_count(), 0);
        assert!(view.is_deleted());
    }
}
