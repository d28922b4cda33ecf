// SPDX-License-Identifier: MPL-2.0

use crate::atproto::types::{
    Embed, ExternalEmbed, FeedEntry, FeedKind, ImageEmbed, Profile, QuoteEmbed, ReplyContext,
    RepostReason, Session, VideoEmbed,
};
use crate::feed::{Page, RawPage};
use crate::paging::FeedSource;
use async_trait::async_trait;
use atrium_api::agent::atp_agent::AtpAgent;
use atrium_api::agent::atp_agent::store::MemorySessionStore;
use atrium_api::types::{LimitedNonZeroU8, Union, Unknown};
use atrium_xrpc_client::reqwest::ReqwestClient;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("not authenticated")]
    NotAuthenticated,
}

type Agent = AtpAgent<MemorySessionStore, ReqwestClient>;

/// Largest page the feed endpoints hand out
pub const MAX_PAGE_LIMIT: usize = 100;

/// Pages through a timeline or feed generator of an authenticated account.
///
/// Wraps atrium so the paging layer only sees our own types.
pub struct AtprotoFeedSource {
    agent: Agent,
    feed: FeedKind,
}

impl AtprotoFeedSource {
    /// Resume a session that was created elsewhere
    pub async fn resume(
        service_url: &str,
        session: &Session,
        feed: FeedKind,
    ) -> Result<Self, ClientError> {
        let client = ReqwestClient::new(service_url);
        let agent = AtpAgent::new(client, MemorySessionStore::default());

        let atrium_session = atrium_api::agent::atp_agent::AtpSession::from(
            atrium_api::com::atproto::server::create_session::OutputData {
                access_jwt: session.access_jwt.clone(),
                active: None,
                did: session
                    .did
                    .parse()
                    .map_err(|e| ClientError::Auth(format!("invalid DID: {e}")))?,
                did_doc: None,
                email: None,
                email_auth_factor: None,
                email_confirmed: None,
                handle: session
                    .handle
                    .parse()
                    .map_err(|e| ClientError::Auth(format!("invalid handle: {e}")))?,
                refresh_jwt: session.refresh_jwt.clone(),
                status: None,
            },
        );

        agent
            .resume_session(atrium_session)
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        tracing::info!("resumed session for {} on {service_url}", session.handle);
        Ok(Self { agent, feed })
    }

    /// [`resume`](Self::resume) for synchronous callers. Must not be
    /// called from within the shared runtime.
    pub fn resume_blocking(
        service_url: &str,
        session: &Session,
        feed: FeedKind,
    ) -> Result<Self, ClientError> {
        crate::runtime::block_on(Self::resume(service_url, session, feed))
    }

    pub fn feed(&self) -> &FeedKind {
        &self.feed
    }

    /// The session currently held by the agent, which may have been
    /// refreshed since it was resumed
    pub async fn session(&self) -> Option<Session> {
        let atrium_session = self.agent.get_session().await?;

        Some(Session {
            did: atrium_session.data.did.to_string(),
            handle: atrium_session.data.handle.to_string(),
            access_jwt: atrium_session.data.access_jwt.clone(),
            refresh_jwt: atrium_session.data.refresh_jwt.clone(),
        })
    }

    async fn get_timeline(
        &self,
        limit: LimitedNonZeroU8<100>,
        cursor: Option<String>,
    ) -> Result<Page, ClientError> {
        let params = atrium_api::app::bsky::feed::get_timeline::ParametersData {
            algorithm: None,
            cursor,
            limit: Some(limit),
        };

        let output = self
            .agent
            .api
            .app
            .bsky
            .feed
            .get_timeline(params.into())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let raw = raw_page(&output.data);
        let entries = output.data.feed.into_iter().map(convert_feed_view_post).collect();

        Ok(Page::from_entries(entries, output.data.cursor, raw))
    }

    async fn get_feed(
        &self,
        feed_uri: &str,
        limit: LimitedNonZeroU8<100>,
        cursor: Option<String>,
    ) -> Result<Page, ClientError> {
        let params = atrium_api::app::bsky::feed::get_feed::ParametersData {
            feed: feed_uri
                .parse()
                .map_err(|e| ClientError::InvalidResponse(format!("invalid feed URI: {e}")))?,
            cursor,
            limit: Some(limit),
        };

        let output = self
            .agent
            .api
            .app
            .bsky
            .feed
            .get_feed(params.into())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let raw = raw_page(&output.data);
        let entries = output.data.feed.into_iter().map(convert_feed_view_post).collect();

        Ok(Page::from_entries(entries, output.data.cursor, raw))
    }
}

#[async_trait]
impl FeedSource for AtprotoFeedSource {
    async fn fetch_page(&self, limit: usize, cursor: Option<String>) -> Result<Page, ClientError> {
        let limit = page_limit(limit)?;
        tracing::debug!("fetching {:?} page, cursor {cursor:?}", self.feed);

        match &self.feed {
            FeedKind::Home => self.get_timeline(limit, cursor).await,
            FeedKind::Generator(uri) => self.get_feed(uri, limit, cursor).await,
        }
    }
}

fn clamp_limit(limit: usize) -> u8 {
    limit.clamp(1, MAX_PAGE_LIMIT) as u8
}

fn page_limit(limit: usize) -> Result<LimitedNonZeroU8<100>, ClientError> {
    LimitedNonZeroU8::try_from(clamp_limit(limit))
        .map_err(|e| ClientError::InvalidResponse(format!("invalid page limit: {e}")))
}

fn raw_page<T: serde::Serialize>(data: &T) -> RawPage {
    let value = serde_json::to_value(data).unwrap_or_else(|e| {
        tracing::warn!("could not keep raw feed response: {e}");
        serde_json::Value::Null
    });

    RawPage::new(value)
}

fn profile(author: &atrium_api::app::bsky::actor::defs::ProfileViewBasic) -> Profile {
    Profile::minimal(
        author.data.did.to_string(),
        author.data.handle.to_string(),
        author.data.display_name.clone(),
        author.data.avatar.clone(),
    )
}

fn convert_feed_view_post(feed_view: atrium_api::app::bsky::feed::defs::FeedViewPost) -> FeedEntry {
    let post_view = feed_view.data.post;
    let record = extract_post_record(&post_view.data.record);

    let (viewer_like, viewer_repost) = post_view
        .data
        .viewer
        .as_ref()
        .map(|v| (v.data.like.clone(), v.data.repost.clone()))
        .unwrap_or((None, None));

    FeedEntry {
        uri: post_view.data.uri.clone(),
        cid: post_view.data.cid.as_ref().to_string(),
        author: profile(&post_view.data.author),
        record_type: record.record_type,
        text: record.text,
        created_at: record.created_at,
        indexed_at: post_view.data.indexed_at.as_str().to_string(),
        like_count: post_view.data.like_count.map(|c| c as u32),
        repost_count: post_view.data.repost_count.map(|c| c as u32),
        reply_count: post_view.data.reply_count.map(|c| c as u32),
        embed: extract_embed(&post_view.data.embed),
        viewer_like,
        viewer_repost,
        repost_reason: extract_repost_reason(&feed_view.data.reason),
        reply_context: extract_reply_context(&feed_view.data.reply),
    }
}

#[derive(Debug, Default)]
struct PostRecord {
    record_type: Option<String>,
    text: String,
    created_at: String,
}

fn record_string(
    map: &std::collections::BTreeMap<String, atrium_api::types::DataModel>,
    key: &str,
) -> Option<String> {
    map.get(key)
        .and_then(|dm| serde_json::to_value(dm).ok())
        .and_then(|v| v.as_str().map(String::from))
}

fn extract_post_record(record: &Unknown) -> PostRecord {
    match record {
        Unknown::Object(map) => PostRecord {
            record_type: record_string(map, "$type"),
            text: record_string(map, "text").unwrap_or_default(),
            created_at: record_string(map, "createdAt").unwrap_or_default(),
        },
        _ => PostRecord::default(),
    }
}

fn convert_images(images: &[atrium_api::app::bsky::embed::images::ViewImage]) -> Embed {
    Embed::Images(
        images
            .iter()
            .map(|img| ImageEmbed {
                thumb: img.thumb.as_str().to_string(),
                fullsize: img.fullsize.as_str().to_string(),
                alt: img.alt.clone(),
                aspect_ratio: img
                    .aspect_ratio
                    .as_ref()
                    .map(|ar| (ar.data.width.get() as u32, ar.data.height.get() as u32)),
            })
            .collect(),
    )
}

fn convert_external(view: &atrium_api::app::bsky::embed::external::View) -> Embed {
    let ext = &view.data.external;
    Embed::External(ExternalEmbed {
        uri: ext.data.uri.clone(),
        title: ext.data.title.clone(),
        description: ext.data.description.clone(),
        thumb: ext.data.thumb.clone(),
    })
}

fn convert_video(view: &atrium_api::app::bsky::embed::video::View) -> Embed {
    Embed::Video(VideoEmbed {
        playlist: view.data.playlist.clone(),
        thumbnail: view.data.thumbnail.clone(),
        alt: view.data.alt.clone(),
        aspect_ratio: view
            .data
            .aspect_ratio
            .as_ref()
            .map(|ar| (ar.data.width.get() as u32, ar.data.height.get() as u32)),
    })
}

fn extract_embed(
    embed: &Option<Union<atrium_api::app::bsky::feed::defs::PostViewEmbedRefs>>,
) -> Option<Embed> {
    use atrium_api::app::bsky::feed::defs::PostViewEmbedRefs;

    let Union::Refs(embed_ref) = embed.as_ref()? else {
        return None;
    };

    match embed_ref {
        PostViewEmbedRefs::AppBskyEmbedImagesView(view) => Some(convert_images(&view.data.images)),
        PostViewEmbedRefs::AppBskyEmbedExternalView(view) => Some(convert_external(view)),
        PostViewEmbedRefs::AppBskyEmbedVideoView(view) => Some(convert_video(view)),
        PostViewEmbedRefs::AppBskyEmbedRecordView(view) => {
            extract_quote(&view.data.record).map(Embed::Quote)
        }
        PostViewEmbedRefs::AppBskyEmbedRecordWithMediaView(view) => {
            let quote = extract_quote(&view.data.record.data.record)?;
            let media = extract_media_embed(&view.data.media)?;
            Some(Embed::QuoteWithMedia {
                quote,
                media: Box::new(media),
            })
        }
    }
}

/// Quoted record, if it is visible to the viewer
fn extract_quote(
    record: &Union<atrium_api::app::bsky::embed::record::ViewRecordRefs>,
) -> Option<QuoteEmbed> {
    use atrium_api::app::bsky::embed::record::ViewRecordRefs;

    let Union::Refs(ViewRecordRefs::ViewRecord(view_record)) = record else {
        return None;
    };

    let data = &view_record.data;
    let nested = data
        .embeds
        .as_ref()
        .and_then(|embeds| embeds.first())
        .and_then(extract_nested_embed);

    Some(QuoteEmbed {
        uri: data.uri.clone(),
        cid: data.cid.as_ref().to_string(),
        author: profile(&data.author),
        text: extract_post_record(&data.value).text,
        indexed_at: data.indexed_at.as_str().to_string(),
        embed: nested.map(Box::new),
    })
}

fn extract_nested_embed(
    embed: &Union<atrium_api::app::bsky::embed::record::ViewRecordEmbedsItem>,
) -> Option<Embed> {
    use atrium_api::app::bsky::embed::record::ViewRecordEmbedsItem;

    match embed {
        Union::Refs(ViewRecordEmbedsItem::AppBskyEmbedImagesView(view)) => {
            Some(convert_images(&view.data.images))
        }
        Union::Refs(ViewRecordEmbedsItem::AppBskyEmbedExternalView(view)) => {
            Some(convert_external(view))
        }
        Union::Refs(ViewRecordEmbedsItem::AppBskyEmbedVideoView(view)) => Some(convert_video(view)),
        Union::Refs(ViewRecordEmbedsItem::AppBskyEmbedRecordView(view)) => {
            extract_quote(&view.data.record).map(Embed::Quote)
        }
        Union::Refs(ViewRecordEmbedsItem::AppBskyEmbedRecordWithMediaView(view)) => {
            let quote = extract_quote(&view.data.record.data.record)?;
            let media = extract_media_embed(&view.data.media)?;
            Some(Embed::QuoteWithMedia {
                quote,
                media: Box::new(media),
            })
        }
        _ => None,
    }
}

fn extract_media_embed(
    media: &Union<atrium_api::app::bsky::embed::record_with_media::ViewMediaRefs>,
) -> Option<Embed> {
    use atrium_api::app::bsky::embed::record_with_media::ViewMediaRefs;

    match media {
        Union::Refs(ViewMediaRefs::AppBskyEmbedImagesView(view)) => {
            Some(convert_images(&view.data.images))
        }
        Union::Refs(ViewMediaRefs::AppBskyEmbedVideoView(view)) => Some(convert_video(view)),
        Union::Refs(ViewMediaRefs::AppBskyEmbedExternalView(view)) => Some(convert_external(view)),
        _ => None,
    }
}

/// Who reposted this into the feed
fn extract_repost_reason(
    reason: &Option<Union<atrium_api::app::bsky::feed::defs::FeedViewPostReasonRefs>>,
) -> Option<RepostReason> {
    use atrium_api::app::bsky::feed::defs::FeedViewPostReasonRefs;

    let Union::Refs(FeedViewPostReasonRefs::ReasonRepost(repost)) = reason.as_ref()? else {
        return None;
    };

    Some(RepostReason {
        by: profile(&repost.data.by),
        indexed_at: repost.data.indexed_at.as_str().to_string(),
    })
}

/// Parent and root of a reply. `None` when either is gone or blocked.
fn extract_reply_context(
    reply: &Option<atrium_api::app::bsky::feed::defs::ReplyRef>,
) -> Option<ReplyContext> {
    use atrium_api::app::bsky::feed::defs::{ReplyRefParentRefs, ReplyRefRootRefs};

    let reply = reply.as_ref()?;

    let Union::Refs(ReplyRefParentRefs::PostView(parent)) = &reply.data.parent else {
        return None;
    };
    let Union::Refs(ReplyRefRootRefs::PostView(root)) = &reply.data.root else {
        return None;
    };

    Some(ReplyContext {
        parent_author: profile(&parent.data.author),
        root_author: profile(&root.data.author),
        root_uri: root.data.uri.clone(),
        root_cid: root.data.cid.as_ref().to_string(),
    })
}
