// SPDX-License-Identifier: MPL-2.0

//! Locating where a freshly fetched page meets content already in the
//! timeline.
//!
//! Two rows denote the same logical entry when both the content id and the
//! timeline timestamp match; a repost shares the original's cid but has its
//! own timestamp. There is no dense ordering key in a feed, so when no row
//! of the page reaches the stored content it cannot be decided whether the
//! page ends right before it or whether posts are missing in between. That
//! case is always reported as "no overlap" and becomes a gap.

use crate::feed::Post;

/// Where the end of a page lands in the stored timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapEnd {
    /// The stored row at this position is the page's last entry
    Exact(usize),
    /// The stored row at this position is the first one older than the
    /// page's last entry
    Before(usize),
}

impl OverlapEnd {
    pub fn position(self) -> usize {
        match self {
            OverlapEnd::Exact(pos) | OverlapEnd::Before(pos) => pos,
        }
    }
}

fn is_same_entry(lhs: &Post, rhs: &Post) -> bool {
    lhs.cid() == rhs.cid() && lhs.timeline_timestamp() == rhs.timeline_timestamp()
}

/// First non-placeholder position at or after `from`
pub fn anchor_position(feed: &[Post], from: usize) -> Option<usize> {
    feed.iter()
        .enumerate()
        .skip(from)
        .find(|(_, post)| !post.is_placeholder())
        .map(|(pos, _)| pos)
}

/// Index in `page` from which its content is already stored, scanning the
/// page against the stored row at `anchor`.
///
/// Returns `None` when the whole page is newer than the anchor.
pub fn find_overlap_start(page: &[Post], feed: &[Post], anchor: usize) -> Option<usize> {
    let Some(anchor_post) = feed.get(anchor) else {
        tracing::warn!("overlap anchor {anchor} beyond feed size {}", feed.len());
        return None;
    };
    let anchor_timestamp = anchor_post.timeline_timestamp()?;

    for (i, post) in page.iter().enumerate() {
        if post.is_placeholder() {
            continue;
        }

        if is_same_entry(post, anchor_post) {
            tracing::debug!("overlap start at page index {i}: exact match");
            return Some(i);
        }

        if let Some(timestamp) = post.timeline_timestamp()
            && anchor_timestamp > timestamp
        {
            tracing::debug!("overlap start at page index {i}: stepped past anchor");
            return Some(i);
        }
    }

    None
}

/// Position in `feed` where the page's last entry lands, scanning stored
/// rows from `anchor` onwards. `None` when the page reaches beyond all
/// stored content.
pub fn find_overlap_end(page: &[Post], feed: &[Post], anchor: usize) -> Option<OverlapEnd> {
    let last = page.iter().rev().find(|post| !post.is_placeholder())?;
    let last_timestamp = last.timeline_timestamp()?;

    for (pos, post) in feed.iter().enumerate().skip(anchor) {
        if post.is_placeholder() {
            continue;
        }

        if is_same_entry(post, last) {
            return Some(OverlapEnd::Exact(pos));
        }

        if let Some(timestamp) = post.timeline_timestamp()
            && last_timestamp > timestamp
        {
            return Some(OverlapEnd::Before(pos));
        }
    }

    tracing::warn!("end of page not found in stored feed from position {anchor}");
    None
}
