// SPDX-License-Identifier: MPL-2.0

//! Builders shared by unit tests.

use crate::atproto::{FeedEntry, Profile};
use crate::feed::{Page, RawPage};

pub(crate) fn entry(cid: &str, indexed_at: &str) -> FeedEntry {
    FeedEntry {
        uri: format!("at://did:plc:author/app.bsky.feed.post/{cid}"),
        cid: cid.to_string(),
        author: Profile::minimal(
            "did:plc:author".to_string(),
            "author.bsky.social".to_string(),
            Some("Author".to_string()),
            None,
        ),
        record_type: Some("app.bsky.feed.post".to_string()),
        text: format!("post {cid}"),
        created_at: indexed_at.to_string(),
        indexed_at: indexed_at.to_string(),
        like_count: Some(3),
        repost_count: None,
        reply_count: Some(1),
        embed: None,
        viewer_like: None,
        viewer_repost: None,
        repost_reason: None,
        reply_context: None,
    }
}

/// Page of plain posts given as (cid, indexed_at) pairs
pub(crate) fn page(items: &[(&str, &str)], cursor: Option<&str>) -> Page {
    let entries = items.iter().map(|(cid, ts)| entry(cid, ts)).collect();
    Page::from_entries(
        entries,
        cursor.map(String::from),
        RawPage::new(serde_json::Value::Null),
    )
}

pub(crate) fn ts(hour: u32) -> String {
    format!("2024-01-01T{hour:02}:00:00Z")
}

/// Page of plain posts given as (cid, hour of 2024-01-01) pairs
pub(crate) fn hours(items: &[(&str, u32)], cursor: Option<&str>) -> Page {
    let entries = items.iter().map(|(cid, hour)| entry(cid, &ts(*hour))).collect();
    Page::from_entries(
        entries,
        cursor.map(String::from),
        RawPage::new(serde_json::Value::Null),
    )
}
