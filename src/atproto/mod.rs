// SPDX-License-Identifier: MPL-2.0

mod client;
mod types;

pub use client::{AtprotoFeedSource, ClientError, MAX_PAGE_LIMIT};
pub use types::{
    Embed, ExternalEmbed, FeedEntry, FeedKind, ImageEmbed, POST_RECORD_TYPE, Profile, QuoteEmbed,
    ReplyContext, RepostReason, Session, VideoEmbed,
};
