// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

/// Decoupled from atrium's internal representation so we own the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

impl Profile {
    pub fn minimal(
        did: String,
        handle: String,
        display_name: Option<String>,
        avatar: Option<String>,
    ) -> Self {
        Self {
            did,
            handle,
            display_name,
            avatar,
        }
    }

    /// Display name if set, otherwise the handle
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.handle,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEmbed {
    pub thumb: String,
    pub fullsize: String,
    pub alt: String,
    pub aspect_ratio: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEmbed {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoEmbed {
    pub playlist: String,
    pub thumbnail: Option<String>,
    pub alt: Option<String>,
    pub aspect_ratio: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteEmbed {
    pub uri: String,
    pub cid: String,
    pub author: Profile,
    pub text: String,
    pub indexed_at: String,
    pub embed: Option<Box<Embed>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Embed {
    Images(Vec<ImageEmbed>),
    External(ExternalEmbed),
    Video(VideoEmbed),
    Quote(QuoteEmbed),
    QuoteWithMedia {
        quote: QuoteEmbed,
        media: Box<Embed>,
    },
}

/// Who reposted an entry into the feed, and when
#[derive(Debug, Clone, PartialEq)]
pub struct RepostReason {
    pub by: Profile,
    pub indexed_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyContext {
    pub parent_author: Profile,
    pub root_author: Profile,
    pub root_uri: String,
    pub root_cid: String,
}

/// Record collection of a regular post
pub const POST_RECORD_TYPE: &str = "app.bsky.feed.post";

/// One entry of a feed response, as delivered by the network.
///
/// Nothing is validated here; admitting an entry into a page decides
/// whether it can be shown.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub uri: String,
    pub cid: String,
    pub author: Profile,
    /// `$type` of the embedded record, if the record carried one
    pub record_type: Option<String>,
    pub text: String,
    pub created_at: String,
    pub indexed_at: String,
    pub like_count: Option<u32>,
    pub repost_count: Option<u32>,
    pub reply_count: Option<u32>,
    pub embed: Option<Embed>,
    /// URI of the viewer's like record, if they liked this post
    pub viewer_like: Option<String>,
    /// URI of the viewer's repost record, if they reposted this post
    pub viewer_repost: Option<String>,
    pub repost_reason: Option<RepostReason>,
    pub reply_context: Option<ReplyContext>,
}

impl FeedEntry {
    pub fn is_post_record(&self) -> bool {
        self.record_type
            .as_deref()
            .is_none_or(|t| t == POST_RECORD_TYPE)
    }
}

/// Which feed a source pages through
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedKind {
    /// The "Following" home timeline
    #[default]
    Home,
    /// A custom feed generator, by AT-URI
    Generator(String),
}
