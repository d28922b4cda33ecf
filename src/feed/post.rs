// SPDX-License-Identifier: MPL-2.0

use crate::atproto::{Embed, ExternalEmbed, FeedEntry, ImageEmbed, Profile, ReplyContext};
use crate::feed::FeedError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Handle of a gap placeholder. Ids are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GapId(pub(crate) u64);

impl GapId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single row of a timeline.
///
/// A row is either a real post, a gap placeholder standing in for content
/// that has not been fetched, or the marker appended once the server
/// reports there is nothing older. Rows never change after construction.
#[derive(Debug, Clone)]
pub struct Post {
    kind: PostKind,
}

#[derive(Debug, Clone)]
enum PostKind {
    Content(Arc<PostContent>),
    Gap { id: GapId, cursor: Option<String> },
    EndOfFeed,
}

#[derive(Debug)]
struct PostContent {
    entry: FeedEntry,
    indexed_at: DateTime<Utc>,
    created_at: Option<DateTime<Utc>>,
    reposted_at: Option<DateTime<Utc>>,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, FeedError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| FeedError::InvalidTimestamp(value.to_string()))
}

impl Post {
    /// Admit a network entry. Fails for records that are not posts and for
    /// entries without a usable ordering timestamp.
    pub fn from_entry(entry: FeedEntry) -> Result<Self, FeedError> {
        if !entry.is_post_record() {
            return Err(FeedError::UnsupportedEntry {
                uri: entry.uri,
                record_type: entry.record_type.unwrap_or_default(),
            });
        }

        let indexed_at = parse_timestamp(&entry.indexed_at)?;
        let reposted_at = entry
            .repost_reason
            .as_ref()
            .map(|r| parse_timestamp(&r.indexed_at))
            .transpose()?;
        // createdAt is client supplied and only used for display
        let created_at = parse_timestamp(&entry.created_at).ok();

        Ok(Self {
            kind: PostKind::Content(Arc::new(PostContent {
                entry,
                indexed_at,
                created_at,
                reposted_at,
            })),
        })
    }

    pub(crate) fn gap_placeholder(id: GapId, cursor: Option<String>) -> Self {
        Self {
            kind: PostKind::Gap { id, cursor },
        }
    }

    pub(crate) fn end_of_feed() -> Self {
        Self {
            kind: PostKind::EndOfFeed,
        }
    }

    fn content(&self) -> Option<&PostContent> {
        match &self.kind {
            PostKind::Content(content) => Some(content),
            _ => None,
        }
    }

    fn entry(&self) -> Option<&FeedEntry> {
        self.content().map(|c| &c.entry)
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self.kind, PostKind::Content(_))
    }

    pub fn is_gap(&self) -> bool {
        matches!(self.kind, PostKind::Gap { .. })
    }

    pub fn is_end_of_feed(&self) -> bool {
        matches!(self.kind, PostKind::EndOfFeed)
    }

    pub fn gap_id(&self) -> Option<GapId> {
        match &self.kind {
            PostKind::Gap { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Cursor that fetches the content missing at this gap
    pub fn gap_cursor(&self) -> Option<&str> {
        match &self.kind {
            PostKind::Gap { cursor, .. } => cursor.as_deref(),
            _ => None,
        }
    }

    /// Content identity, shared by a post and all of its reposts
    pub fn cid(&self) -> Option<&str> {
        self.entry().map(|e| e.cid.as_str())
    }

    pub fn uri(&self) -> Option<&str> {
        self.entry().map(|e| e.uri.as_str())
    }

    /// The time this row is ordered by: the repost time for reposts,
    /// otherwise the time the post was indexed.
    pub fn timeline_timestamp(&self) -> Option<DateTime<Utc>> {
        self.content()
            .map(|c| c.reposted_at.unwrap_or(c.indexed_at))
    }

    pub fn indexed_at(&self) -> Option<DateTime<Utc>> {
        self.content().map(|c| c.indexed_at)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.content().and_then(|c| c.created_at)
    }

    pub fn author(&self) -> Option<&Profile> {
        self.entry().map(|e| &e.author)
    }

    pub fn text(&self) -> &str {
        self.entry().map(|e| e.text.as_str()).unwrap_or_default()
    }

    pub fn reposted_by(&self) -> Option<&Profile> {
        self.entry()
            .and_then(|e| e.repost_reason.as_ref())
            .map(|r| &r.by)
    }

    pub fn is_repost(&self) -> bool {
        self.reposted_by().is_some()
    }

    pub fn reply_context(&self) -> Option<&ReplyContext> {
        self.entry().and_then(|e| e.reply_context.as_ref())
    }

    pub fn is_reply(&self) -> bool {
        self.reply_context().is_some()
    }

    pub fn embed(&self) -> Option<&Embed> {
        self.entry().and_then(|e| e.embed.as_ref())
    }

    /// Images of the post itself, or the media half of a quote-with-media
    pub fn images(&self) -> &[ImageEmbed] {
        match self.embed() {
            Some(Embed::Images(images)) => images,
            Some(Embed::QuoteWithMedia { media, .. }) => match media.as_ref() {
                Embed::Images(images) => images,
                _ => &[],
            },
            _ => &[],
        }
    }

    pub fn external(&self) -> Option<&ExternalEmbed> {
        match self.embed() {
            Some(Embed::External(external)) => Some(external),
            _ => None,
        }
    }

    pub fn like_count(&self) -> u32 {
        self.entry().and_then(|e| e.like_count).unwrap_or(0)
    }

    pub fn repost_count(&self) -> u32 {
        self.entry().and_then(|e| e.repost_count).unwrap_or(0)
    }

    pub fn reply_count(&self) -> u32 {
        self.entry().and_then(|e| e.reply_count).unwrap_or(0)
    }

    pub fn viewer_like(&self) -> Option<&str> {
        self.entry().and_then(|e| e.viewer_like.as_deref())
    }

    pub fn viewer_repost(&self) -> Option<&str> {
        self.entry().and_then(|e| e.viewer_repost.as_deref())
    }
}
