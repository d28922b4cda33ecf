// SPDX-License-Identifier: MPL-2.0

use crate::atproto::ClientError;
use crate::feed::Page;
use async_trait::async_trait;

/// Where pages come from.
///
/// `cursor` is `None` for the newest content. The returned page has no
/// cursor exactly when there is nothing older.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_page(&self, limit: usize, cursor: Option<String>) -> Result<Page, ClientError>;
}
