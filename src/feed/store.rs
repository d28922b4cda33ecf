// SPDX-License-Identifier: MPL-2.0

use crate::config::MAX_TIMELINE_SIZE;
use crate::feed::overlap::{self, OverlapEnd};
use crate::feed::{
    ChangeNotifier, FeedChange, FeedError, GapId, GapRegistry, LocalEdit, LocalPostChanges,
    Page, PositionIndex, Post, PostView, RawPage,
};
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// Ordered timeline rows plus the bookkeeping needed to page through it.
///
/// Row 0 is the newest entry. Next to the rows the store keeps three
/// position keyed indices:
///
/// - cursors: the cursor fetching content older than the row, set on the
///   last row of merged pages
/// - raw pages: the response that produced the page ending at the row
/// - gaps: where each live gap placeholder sits
///
/// Every structural edit re-keys all three before observers are notified.
pub struct FeedStore {
    feed: Vec<Post>,
    cursors: PositionIndex<String>,
    raw_pages: PositionIndex<Arc<RawPage>>,
    gaps: GapRegistry,
    end_of_feed: bool,
    max_size: usize,
    local: LocalPostChanges,
    notifier: ChangeNotifier,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new(MAX_TIMELINE_SIZE)
    }
}

impl FeedStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            feed: Vec::new(),
            cursors: PositionIndex::new(),
            raw_pages: PositionIndex::new(),
            gaps: GapRegistry::new(),
            end_of_feed: false,
            max_size,
            local: LocalPostChanges::default(),
            notifier: ChangeNotifier::default(),
        }
    }

    /// Receive every change applied from now on
    pub fn subscribe(&mut self) -> Receiver<FeedChange> {
        self.notifier.subscribe()
    }

    pub fn len(&self) -> usize {
        self.feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_full(&self) -> bool {
        self.feed.len() >= self.max_size
    }

    pub fn get(&self, position: usize) -> Option<&Post> {
        self.feed.get(position)
    }

    pub fn posts(&self) -> &[Post] {
        &self.feed
    }

    /// Row at `position` with local edits applied
    pub fn view(&self, position: usize) -> Option<PostView<'_>> {
        let post = self.feed.get(position)?;
        let change = post.cid().and_then(|cid| self.local.get(cid));
        Some(PostView::new(post, change))
    }

    pub fn is_end_of_feed(&self) -> bool {
        self.end_of_feed
    }

    /// Cursor for the next page of older content. `None` once the end of
    /// the feed was reached, or when nothing was loaded yet.
    pub fn last_cursor(&self) -> Option<&str> {
        if self.end_of_feed {
            return None;
        }

        let (position, cursor) = self.cursors.last()?;
        if position + 1 != self.feed.len() {
            tracing::warn!(
                "last cursor at {position} is not at the tail, feed size {}",
                self.feed.len()
            );
        }

        Some(cursor.as_str())
    }

    pub fn cursor_at(&self, position: usize) -> Option<&str> {
        self.cursors.get(position).map(String::as_str)
    }

    pub fn raw_page_at(&self, position: usize) -> Option<&Arc<RawPage>> {
        self.raw_pages.get(position)
    }

    pub fn cursor_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.cursors.keys()
    }

    pub fn raw_page_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.raw_pages.keys()
    }

    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }

    pub fn gap_position(&self, gap_id: GapId) -> Option<usize> {
        self.gaps.position(gap_id)
    }

    pub fn gap_placeholder(&self, gap_id: GapId) -> Option<&Post> {
        let position = self.gaps.position(gap_id)?;
        let post = self.feed.get(position)?;

        if post.gap_id() != Some(gap_id) {
            tracing::warn!("gap {gap_id} registered at {position} but row holds no such gap");
            debug_assert!(false, "gap index out of sync");
            return None;
        }

        Some(post)
    }

    /// Timeline timestamp of the oldest loaded post
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.feed.iter().rev().find_map(Post::timeline_timestamp)
    }

    /// Position of the first post at or before `timestamp`
    pub fn find_timestamp(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        self.feed.iter().position(|post| {
            post.timeline_timestamp()
                .is_some_and(|ts| ts <= timestamp)
        })
    }

    /// Replace the whole timeline with a freshly loaded first page
    pub fn set_feed(&mut self, page: Page) -> usize {
        if !self.feed.is_empty() {
            self.clear();
        }

        self.append_feed(page)
    }

    /// Add a page of older content at the tail. Returns the number of rows
    /// inserted. Once a page without cursor was added this is a no-op until
    /// the store is cleared or its tail evicted.
    pub fn append_feed(&mut self, page: Page) -> usize {
        if self.end_of_feed {
            tracing::debug!("end of feed reached, ignoring page of {}", page.len());
            return 0;
        }

        let (posts, cursor, raw) = page.into_parts();
        let at = self.feed.len();
        self.append_rows(at, posts, cursor, raw)
    }

    /// Merge a page of the newest content at the head.
    ///
    /// Returns the id of the gap placeholder inserted when the page could
    /// not be connected to the stored content.
    pub fn prepend_feed(&mut self, page: Page) -> Option<GapId> {
        self.insert_page(page, 0)
    }

    /// Resolve a gap with a page fetched from the gap's cursor. The
    /// placeholder is replaced by the new content; if that content still
    /// does not connect, a new gap is returned.
    pub fn gap_fill_feed(&mut self, page: Page, gap_id: GapId) -> Result<Option<GapId>, FeedError> {
        let Some(position) = self.gaps.position(gap_id) else {
            tracing::warn!("gap does not exist: {gap_id}");
            return Err(FeedError::GapNotFound(gap_id));
        };

        if self.feed.get(position).and_then(Post::gap_id) != Some(gap_id) {
            tracing::warn!("gap {gap_id} not found at position {position}");
            debug_assert!(false, "gap index out of sync");
            return Err(FeedError::GapMismatch { gap_id, position });
        }

        if let Some(change) = self.remove_rows(position..position + 1) {
            self.notifier.emit(change);
        }

        Ok(self.insert_page(page, position))
    }

    /// Evict up to `count` of the newest rows
    pub fn remove_head_posts(&mut self, count: usize) -> usize {
        let count = count.min(self.feed.len());
        if count == 0 {
            return 0;
        }

        tracing::debug!("removing {count} head posts");
        if count == self.feed.len() {
            self.end_of_feed = false;
        }

        if let Some(change) = self.remove_rows(0..count) {
            self.notifier.emit(change);
        }

        count
    }

    /// Evict about `count` of the oldest rows.
    ///
    /// The cut is moved to a page boundary so the new tail carries a cursor
    /// to load the evicted content again. Returns the number of rows
    /// removed, which can differ from `count`.
    pub fn remove_tail_posts(&mut self, count: usize) -> usize {
        let len = self.feed.len();
        if count == 0 || len == 0 {
            return 0;
        }

        let remove_from = if count >= len {
            0
        } else {
            let wanted_last = len - count - 1;
            let boundary = self
                .cursors
                .first_at_or_after(wanted_last)
                .map(|(pos, _)| pos)
                .filter(|pos| pos + 1 < len)
                .or_else(|| self.cursors.last_before(wanted_last).map(|(pos, _)| pos));

            let Some(boundary) = boundary else {
                tracing::warn!("no page boundary to remove {count} tail posts at");
                return 0;
            };

            boundary + 1
        };

        let removed = len - remove_from;
        tracing::debug!("removing {removed} tail posts, requested {count}");
        self.end_of_feed = false;

        if let Some(change) = self.remove_rows(remove_from..len) {
            self.notifier.emit(change);
        }

        removed
    }

    /// Evict head rows so that `incoming` more rows fit within the size
    /// bound. Returns the number of rows evicted.
    pub fn make_room(&mut self, incoming: usize) -> usize {
        let wanted = self.feed.len() + incoming;
        if wanted <= self.max_size {
            return 0;
        }

        self.remove_head_posts(wanted - self.max_size)
    }

    /// Evict the rows beyond the size bound.
    ///
    /// The tail is cut at the last page boundary or cursor-carrying gap
    /// that leaves the store within bounds; a gap's cursor then continues
    /// the new tail. Without such a cut the excess is evicted from the
    /// head. Returns the number of rows evicted.
    pub fn enforce_max_size(&mut self) -> usize {
        let len = self.feed.len();
        if len <= self.max_size {
            return 0;
        }

        let limit = self.max_size;
        let after_cursor = self.cursors.last_before(limit).map(|(pos, _)| pos + 1);
        let at_gap = self
            .gaps
            .iter()
            .map(|(_, pos)| pos)
            .filter(|&pos| pos > 0 && pos <= limit)
            .filter(|&pos| self.feed[pos].gap_cursor().is_some())
            .max();

        let Some(cut) = after_cursor.max(at_gap) else {
            tracing::debug!("no tail cut within {limit} rows, evicting head");
            return self.remove_head_posts(len - limit);
        };

        let continuation = self.feed[cut].gap_cursor().map(String::from);
        tracing::debug!("evicting {} tail posts from {cut}", len - cut);
        self.end_of_feed = false;

        let change = self.remove_rows(cut..len);
        if let Some(cursor) = continuation
            && !self.cursors.contains(cut - 1)
        {
            self.cursors.insert(cut - 1, cursor);
        }

        if let Some(change) = change {
            self.notifier.emit(change);
        }

        len - cut
    }

    pub fn clear(&mut self) {
        self.feed.clear();
        self.cursors.clear();
        self.raw_pages.clear();
        self.gaps.clear();
        self.local.clear();
        self.end_of_feed = false;
        self.notifier.emit(FeedChange::Reset);
    }

    /// Record a local edit of the post with content id `cid`. One cid can
    /// be shown in several rows, so all rows are reported changed.
    pub fn apply_local_edit(&mut self, cid: &str, edit: LocalEdit) {
        let field = self.local.apply(cid, edit);

        if !self.feed.is_empty() {
            self.notifier.emit(FeedChange::Changed {
                first: 0,
                last: self.feed.len() - 1,
                fields: vec![field],
            });
        }
    }

    fn remove_end_of_feed_marker(&mut self) {
        self.end_of_feed = false;

        let len = self.feed.len();
        if self.feed.last().is_some_and(Post::is_end_of_feed)
            && let Some(change) = self.remove_rows(len - 1..len)
        {
            self.notifier.emit(change);
        }
    }

    fn insert_page(&mut self, page: Page, at: usize) -> Option<GapId> {
        let (mut posts, cursor, raw) = page.into_parts();
        if posts.is_empty() {
            tracing::debug!("empty page, nothing to insert at {at}");
            return None;
        }

        let Some(anchor) = overlap::anchor_position(&self.feed, at) else {
            // Nothing stored below the insert point to connect to
            if cursor.is_some() && self.end_of_feed {
                self.remove_end_of_feed_marker();
            }
            self.append_rows(at.min(self.feed.len()), posts, cursor, raw);
            return None;
        };

        match overlap::find_overlap_start(&posts, &self.feed, anchor) {
            None => {
                let gap_id = self.gaps.allocate();
                let count = posts.len();
                posts.push(Post::gap_placeholder(gap_id, cursor));

                let change = self.insert_rows(at, posts);
                self.raw_pages.insert(at + count - 1, raw);
                tracing::info!("gap {gap_id} created at {}", at + count);

                if let Some(change) = change {
                    self.notifier.emit(change);
                }

                Some(gap_id)
            }
            Some(0) => {
                tracing::debug!("full overlap at {at}, no new posts");
                None
            }
            Some(overlap_start) => {
                let overlap_end = overlap::find_overlap_end(&posts, &self.feed, anchor);
                posts.truncate(overlap_start);

                let change = self.insert_rows(at, posts);
                self.raw_pages.insert(at + overlap_start - 1, raw);

                if let (Some(OverlapEnd::Exact(end)), Some(cursor)) = (overlap_end, cursor) {
                    let join = end + overlap_start;
                    if !self.cursors.contains(join) {
                        self.cursors.insert(join, cursor);
                    }
                }

                tracing::debug!("inserted {overlap_start} new posts at {at}");
                if let Some(change) = change {
                    self.notifier.emit(change);
                }

                None
            }
        }
    }

    /// Insert connected rows at `at`, recording the page cursor on the last
    /// of them, or the end-of-feed marker when inserting at the tail without
    /// a cursor.
    fn append_rows(
        &mut self,
        at: usize,
        mut posts: Vec<Post>,
        cursor: Option<String>,
        raw: Arc<RawPage>,
    ) -> usize {
        let count = posts.len();
        let at_tail = at == self.feed.len();

        if at_tail && cursor.is_none() {
            tracing::info!("end of feed reached");
            self.end_of_feed = true;
            posts.push(Post::end_of_feed());
        }

        let change = self.insert_rows(at, posts);

        if count > 0 {
            let last = at + count - 1;
            self.raw_pages.insert(last, raw);
            if let Some(cursor) = cursor {
                self.cursors.insert(last, cursor);
            }
        } else if let Some(cursor) = cursor {
            match at.checked_sub(1) {
                Some(last) => {
                    self.cursors.insert(last, cursor);
                }
                None => tracing::warn!("empty page with cursor and nothing stored, dropping cursor"),
            }
        }

        if let Some(change) = change {
            self.notifier.emit(change);
        }

        count
    }

    /// Splice rows in and re-key every index. Gap placeholders among the
    /// new rows are registered. The caller emits the returned change once
    /// its own bookkeeping is done.
    fn insert_rows(&mut self, at: usize, rows: Vec<Post>) -> Option<FeedChange> {
        let count = rows.len();
        if count == 0 {
            return None;
        }

        self.cursors.insert_positions(at, count);
        self.raw_pages.insert_positions(at, count);
        self.gaps.insert_positions(at, count);

        for (offset, row) in rows.iter().enumerate() {
            if let Some(gap_id) = row.gap_id() {
                self.gaps.register(gap_id, at + offset);
            }
        }

        self.feed.splice(at..at, rows);
        FeedChange::inserted(at, count)
    }

    /// Drain rows and re-key every index, dropping entries of the removed
    /// positions.
    fn remove_rows(&mut self, range: Range<usize>) -> Option<FeedChange> {
        let range = range.start.min(self.feed.len())..range.end.min(self.feed.len());
        if range.is_empty() {
            return None;
        }

        let count = range.end - range.start;
        self.feed.drain(range.clone());
        self.cursors.remove_positions(range.clone());
        self.raw_pages.remove_positions(range.clone());

        for gap_id in self.gaps.remove_positions(range.clone()) {
            tracing::debug!("gap {gap_id} removed");
        }

        FeedChange::removed(range.start, count)
    }
}
