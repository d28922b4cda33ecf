// SPDX-License-Identifier: MPL-2.0

use crate::atproto::ClientError;
use crate::feed::{FeedChange, FeedError, FeedStore, GapId, LocalEdit, Page};
use crate::paging::FeedSource;
use crate::runtime;
use crate::state::PagingSettings;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PagingError {
    #[error("fetching page failed: {0}")]
    Fetch(#[from] ClientError),
    #[error("merging page failed: {0}")]
    Feed(#[from] FeedError),
}

/// Which request an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Timeline,
    NextPage,
    Prepend,
    GapFill(GapId),
    Sync,
}

/// Outcome of a completed request, reported by [`PagingController::process_responses`]
#[derive(Debug, Clone, PartialEq)]
pub enum PagingEvent {
    /// The timeline was replaced by a first page
    TimelineLoaded { inserted: usize },
    PageAppended { inserted: usize },
    /// Newer content was merged at the head, leaving `gap` if it did not
    /// connect to the stored content
    Prepended { gap: Option<GapId> },
    GapFilled { gap_id: GapId, new_gap: Option<GapId> },
    /// Content reaches back to the sync target; `index` is the row to show
    Synced { index: usize },
    SyncFailed,
    Failed {
        operation: Operation,
        error: PagingError,
    },
}

#[derive(Debug, Clone)]
enum Request {
    Timeline,
    NextPage,
    Prepend {
        auto_gap_fill: u32,
    },
    GapFill {
        gap_id: GapId,
        auto_gap_fill: u32,
    },
    Sync {
        till: DateTime<Utc>,
        pages_left: u32,
        first: bool,
    },
}

impl Request {
    fn operation(&self) -> Operation {
        match self {
            Request::Timeline => Operation::Timeline,
            Request::NextPage => Operation::NextPage,
            Request::Prepend { .. } => Operation::Prepend,
            Request::GapFill { gap_id, .. } => Operation::GapFill(*gap_id),
            Request::Sync { .. } => Operation::Sync,
        }
    }
}

struct InFlight {
    id: u64,
    request: Request,
    handle: tokio::task::JoinHandle<()>,
}

struct Response {
    id: u64,
    result: Result<Page, ClientError>,
}

/// Drives fetch-then-merge cycles for one timeline.
///
/// Requests run on the shared runtime; their responses are queued and only
/// merged when the owner calls [`process_responses`](Self::process_responses)
/// or [`wait_for_response`](Self::wait_for_response), so the store is only
/// ever touched from the thread owning the controller. At most one request
/// is in flight; further requests are rejected until it completes.
pub struct PagingController {
    store: FeedStore,
    source: Arc<dyn FeedSource>,
    settings: PagingSettings,
    in_flight: Option<InFlight>,
    next_request_id: u64,
    sender: Sender<Response>,
    receiver: Receiver<Response>,
}

impl PagingController {
    pub fn new(source: Arc<dyn FeedSource>, settings: PagingSettings) -> Self {
        let (sender, receiver) = mpsc::channel();

        Self {
            store: FeedStore::new(settings.max_timeline_size),
            source,
            settings,
            in_flight: None,
            next_request_id: 1,
            sender,
            receiver,
        }
    }

    /// Read access to the timeline
    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn settings(&self) -> &PagingSettings {
        &self.settings
    }

    pub fn subscribe(&mut self) -> Receiver<FeedChange> {
        self.store.subscribe()
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Load the newest page, replacing whatever is stored
    pub fn get_timeline(&mut self) -> bool {
        let limit = self.settings.add_page_size;
        self.issue(Request::Timeline, limit, None)
    }

    /// Load the page of older content following the stored tail. Does
    /// nothing once the end of the feed was reached.
    pub fn get_timeline_next_page(&mut self) -> bool {
        if self.reject_in_progress() {
            return false;
        }

        let Some(cursor) = self.store.last_cursor().map(String::from) else {
            tracing::debug!("no cursor for next page");
            return false;
        };

        let limit = self.settings.add_page_size;
        self.issue(Request::NextPage, limit, Some(cursor))
    }

    /// Check for newer content. When the new content does not connect to
    /// the stored timeline, up to `auto_gap_fill` gap fills follow without
    /// further calls.
    pub fn get_timeline_prepend(&mut self, auto_gap_fill: u32) -> bool {
        if self.reject_in_progress() {
            return false;
        }

        if self.store.is_full() {
            tracing::info!("timeline is full: {}", self.store.len());
            return false;
        }

        let limit = self.settings.prepend_page_size;
        self.issue(Request::Prepend { auto_gap_fill }, limit, None)
    }

    /// Fetch the content missing at a gap placeholder
    pub fn get_timeline_for_gap(&mut self, gap_id: GapId, auto_gap_fill: u32) -> bool {
        if self.reject_in_progress() {
            return false;
        }

        let Some(gap) = self.store.gap_placeholder(gap_id) else {
            tracing::warn!("no gap {gap_id}");
            return false;
        };

        let Some(cursor) = gap.gap_cursor().map(String::from) else {
            tracing::warn!("no cursor for gap {gap_id}");
            return false;
        };

        let limit = self.settings.add_page_size;
        self.issue(
            Request::GapFill {
                gap_id,
                auto_gap_fill,
            },
            limit,
            Some(cursor),
        )
    }

    /// Reload the timeline from the newest content and keep paging until
    /// it reaches back to `till`, loading at most `max_pages` pages.
    pub fn sync_timeline(&mut self, till: DateTime<Utc>, max_pages: u32) -> bool {
        tracing::info!("sync timeline till {till}, max pages {max_pages}");
        let limit = self.settings.sync_page_size;
        let request = Request::Sync {
            till,
            pages_left: max_pages.max(1),
            first: true,
        };
        self.issue(request, limit, None)
    }

    /// React to the viewport settling on rows `first_visible..=last_visible`.
    ///
    /// Drops rows far below the viewport and loads the next page when the
    /// viewport nears the tail. Returns the timeline timestamp in the middle
    /// of the viewport, for callers that persist a sync point.
    pub fn timeline_movement_ended(
        &mut self,
        first_visible: usize,
        last_visible: usize,
    ) -> Option<DateTime<Utc>> {
        let delete_size = self.settings.delete_size;
        if self.store.len() > last_visible + 2 * delete_size {
            self.store.remove_tail_posts(delete_size);
        }

        if last_visible + self.settings.next_page_threshold > self.store.len()
            && !self.is_in_progress()
        {
            self.get_timeline_next_page();
        }

        let middle = first_visible + last_visible.saturating_sub(first_visible) / 2;
        (middle..=last_visible)
            .chain((first_visible..middle).rev())
            .find_map(|pos| self.store.get(pos).and_then(|post| post.timeline_timestamp()))
    }

    /// Record a local edit of a post shown in the timeline
    pub fn apply_local_edit(&mut self, cid: &str, edit: LocalEdit) {
        self.store.apply_local_edit(cid, edit);
    }

    /// Abort the request in flight, if any. Its response is never merged.
    pub fn abort(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::info!("aborting {:?} request {}", in_flight.request, in_flight.id);
            in_flight.handle.abort();
        }
    }

    /// Abort the request in flight and drop the whole timeline
    pub fn reset(&mut self) {
        self.abort();
        self.store.clear();
    }

    /// Merge all responses that arrived so far
    pub fn process_responses(&mut self) -> Vec<PagingEvent> {
        let mut events = Vec::new();
        while let Ok(response) = self.receiver.try_recv() {
            events.extend(self.handle_response(response));
        }

        events
    }

    /// Block until the request in flight completes and merge it. Returns
    /// nothing if no request completed within `timeout`.
    pub fn wait_for_response(&mut self, timeout: Duration) -> Vec<PagingEvent> {
        let deadline = Instant::now() + timeout;

        while self.in_flight.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(response) => {
                    let events = self.handle_response(response);
                    if !events.is_empty() {
                        return events;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!("no response within {timeout:?}");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Vec::new()
    }

    fn reject_in_progress(&self) -> bool {
        if let Some(in_flight) = &self.in_flight {
            tracing::info!("still in progress: {:?}", in_flight.request.operation());
            return true;
        }

        false
    }

    fn issue(&mut self, request: Request, limit: usize, cursor: Option<String>) -> bool {
        if self.reject_in_progress() {
            return false;
        }

        let id = self.next_request_id;
        self.next_request_id += 1;
        tracing::debug!("request {id}: {request:?}, limit {limit}, cursor {cursor:?}");

        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();
        let handle = runtime::spawn(async move {
            let result = source.fetch_page(limit, cursor).await;
            // The controller may be gone by now
            let _ = sender.send(Response { id, result });
        });

        self.in_flight = Some(InFlight {
            id,
            request,
            handle,
        });

        true
    }

    fn handle_response(&mut self, response: Response) -> Vec<PagingEvent> {
        let Some(in_flight) = self.in_flight.take_if(|f| f.id == response.id) else {
            tracing::debug!("dropping response of stale request {}", response.id);
            return Vec::new();
        };

        let page = match response.result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("{:?} request failed: {e}", in_flight.request);
                let failed = PagingEvent::Failed {
                    operation: in_flight.request.operation(),
                    error: e.into(),
                };
                return match in_flight.request {
                    Request::Sync { .. } => vec![failed, PagingEvent::SyncFailed],
                    _ => vec![failed],
                };
            }
        };

        tracing::debug!("request {} returned {} posts", in_flight.id, page.len());

        match in_flight.request {
            Request::Timeline => {
                let inserted = self.store.set_feed(page);
                vec![PagingEvent::TimelineLoaded { inserted }]
            }
            Request::NextPage => {
                // Keep one row spare for an end-of-feed marker
                self.store.make_room(page.len() + 1);
                let inserted = self.store.append_feed(page);
                vec![PagingEvent::PageAppended { inserted }]
            }
            Request::Prepend { auto_gap_fill } => {
                let gap = self.store.prepend_feed(page);
                let gap = self.bound_size(gap);
                if let Some(gap_id) = gap {
                    self.auto_fill(gap_id, auto_gap_fill);
                }
                vec![PagingEvent::Prepended { gap }]
            }
            Request::GapFill {
                gap_id,
                auto_gap_fill,
            } => match self.store.gap_fill_feed(page, gap_id) {
                Ok(new_gap) => {
                    let new_gap = self.bound_size(new_gap);
                    if let Some(new_gap_id) = new_gap {
                        self.auto_fill(new_gap_id, auto_gap_fill);
                    }
                    vec![PagingEvent::GapFilled { gap_id, new_gap }]
                }
                Err(e) => vec![PagingEvent::Failed {
                    operation: Operation::GapFill(gap_id),
                    error: e.into(),
                }],
            },
            Request::Sync {
                till,
                pages_left,
                first,
            } => self.continue_sync(page, till, pages_left, first),
        }
    }

    /// Trim the store back into its size bound after a merge in the middle
    /// or at the head. Returns `gap` if it survived the trim.
    fn bound_size(&mut self, gap: Option<GapId>) -> Option<GapId> {
        let evicted = self.store.enforce_max_size();
        if evicted > 0 {
            tracing::info!("timeline over its bound, evicted {evicted} posts");
        }

        gap.filter(|&gap_id| self.store.gap_position(gap_id).is_some())
    }

    fn auto_fill(&mut self, gap_id: GapId, auto_gap_fill: u32) {
        if auto_gap_fill == 0 {
            tracing::debug!("gap {gap_id} left for manual fill");
            return;
        }

        if self.store.is_full() {
            tracing::info!("timeline is full, gap {gap_id} left for manual fill");
            return;
        }

        tracing::debug!("auto gap fill {gap_id}, {auto_gap_fill} hops left");
        self.get_timeline_for_gap(gap_id, auto_gap_fill - 1);
    }

    fn continue_sync(
        &mut self,
        page: Page,
        till: DateTime<Utc>,
        pages_left: u32,
        first: bool,
    ) -> Vec<PagingEvent> {
        if first {
            self.store.set_feed(page);
        } else {
            self.store.make_room(page.len() + 1);
            self.store.append_feed(page);
        }

        let Some(last_timestamp) = self.store.last_timestamp() else {
            tracing::warn!("sync failed, feed is empty");
            return vec![PagingEvent::SyncFailed];
        };

        let last_index = self.store.len() - 1;

        if last_timestamp < till {
            let index = self.store.find_timestamp(till).unwrap_or(last_index);
            tracing::info!("sync completed at {index}, last timestamp {last_timestamp}");
            return vec![PagingEvent::Synced { index }];
        }

        if pages_left <= 1 {
            tracing::info!("sync page budget used up, last timestamp {last_timestamp}");
            return vec![PagingEvent::Synced { index: last_index }];
        }

        let Some(cursor) = self.store.last_cursor().map(String::from) else {
            tracing::info!("sync reached end of feed");
            return vec![PagingEvent::Synced { index: last_index }];
        };

        let limit = self.settings.sync_page_size;
        let request = Request::Sync {
            till,
            pages_left: pages_left - 1,
            first: false,
        };
        self.issue(request, limit, Some(cursor));

        Vec::new()
    }
}

impl Drop for PagingController {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hours, ts};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Serves queued responses in order and records every request
    #[derive(Default)]
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Page, ClientError>>>,
        requests: Mutex<Vec<(usize, Option<String>)>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Page, ClientError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            })
        }

        fn gated(responses: Vec<Result<Page, ClientError>>, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                gate: Some(gate),
                ..Default::default()
            })
        }

        fn push(&self, response: Result<Page, ClientError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn requests(&self) -> Vec<(usize, Option<String>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch_page(
            &self,
            limit: usize,
            cursor: Option<String>,
        ) -> Result<Page, ClientError> {
            self.requests.lock().unwrap().push((limit, cursor));

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Network("script exhausted".to_string())))
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn settings() -> PagingSettings {
        PagingSettings {
            max_timeline_size: 20,
            add_page_size: 3,
            prepend_page_size: 3,
            sync_page_size: 3,
            delete_size: 3,
            ..Default::default()
        }
    }

    fn controller(source: &Arc<ScriptedSource>) -> PagingController {
        init_tracing();
        let source: Arc<dyn FeedSource> = source.clone();
        PagingController::new(source, settings())
    }

    fn cids(controller: &PagingController) -> Vec<String> {
        controller
            .store()
            .posts()
            .iter()
            .map(|post| match (post.cid(), post.is_gap()) {
                (Some(cid), _) => cid.to_string(),
                (None, true) => "GAP".to_string(),
                (None, false) => "END".to_string(),
            })
            .collect()
    }

    fn loaded(source: &Arc<ScriptedSource>, items: &[(&str, u32)], cursor: &str) -> PagingController {
        source.push(Ok(hours(items, Some(cursor))));
        let mut controller = controller(source);
        assert!(controller.get_timeline());
        assert!(matches!(
            controller.wait_for_response(TIMEOUT).as_slice(),
            [PagingEvent::TimelineLoaded { .. }]
        ));
        controller
    }

    fn at(hour: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&ts(hour))
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_initial_load_sets_feed() {
        let source = ScriptedSource::new(vec![Ok(hours(&[("a", 10), ("b", 9)], Some("c1")))]);
        let mut controller = controller(&source);

        assert!(controller.get_timeline());
        assert!(controller.is_in_progress());
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::TimelineLoaded { inserted: 2 }]
        );

        assert!(!controller.is_in_progress());
        assert_eq!(cids(&controller), vec!["a", "b"]);
        assert_eq!(controller.store().last_cursor(), Some("c1"));
        assert_eq!(source.requests(), vec![(3, None)]);
    }

    #[test]
    fn test_next_page_until_end_of_feed() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 10), ("b", 9)], "c1");

        source.push(Ok(hours(&[("c", 8), ("d", 7)], None)));
        assert!(controller.get_timeline_next_page());
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::PageAppended { inserted: 2 }]
        );

        assert_eq!(cids(&controller), vec!["a", "b", "c", "d", "END"]);
        assert_eq!(source.requests()[1], (3, Some("c1".to_string())));

        // Terminal state, not an error
        assert!(!controller.get_timeline_next_page());
        assert!(!controller.is_in_progress());
    }

    #[test]
    fn test_requests_rejected_while_in_flight() {
        let gate = Arc::new(Notify::new());
        let source = ScriptedSource::gated(
            vec![Ok(hours(&[("a", 10)], Some("c1")))],
            Arc::clone(&gate),
        );
        let mut controller = controller(&source);

        assert!(controller.get_timeline());
        assert!(!controller.get_timeline());
        assert!(!controller.get_timeline_prepend(0));
        assert!(!controller.get_timeline_next_page());
        assert!(!controller.sync_timeline(at(5), 3));

        gate.notify_one();
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::TimelineLoaded { inserted: 1 }]
        );
        assert_eq!(source.requests().len(), 1);
    }

    #[test]
    fn test_prepend_auto_fills_gap() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 10), ("b", 9)], "c1");

        source.push(Ok(hours(&[("x", 14), ("y", 13), ("z", 12)], Some("gc"))));
        source.push(Ok(hours(&[("w", 11), ("a", 10), ("b", 9)], Some("c1b"))));

        assert!(controller.get_timeline_prepend(1));
        let events = controller.wait_for_response(TIMEOUT);
        let [PagingEvent::Prepended { gap: Some(gap_id) }] = events.as_slice() else {
            panic!("expected a gap, got {events:?}");
        };
        let gap_id = *gap_id;

        // The gap fill was issued without another call
        assert!(controller.is_in_progress());
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::GapFilled {
                gap_id,
                new_gap: None
            }]
        );

        assert_eq!(source.requests()[2], (3, Some("gc".to_string())));
        assert_eq!(cids(&controller), vec!["x", "y", "z", "w", "a", "b"]);
        assert_eq!(controller.store().gap_count(), 0);
        assert_eq!(controller.store().last_cursor(), Some("c1"));
    }

    #[test]
    fn test_prepend_without_auto_fill_leaves_gap() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 10), ("b", 9)], "c1");

        source.push(Ok(hours(&[("x", 14), ("y", 13)], Some("gc"))));
        assert!(controller.get_timeline_prepend(0));
        let events = controller.wait_for_response(TIMEOUT);
        let [PagingEvent::Prepended { gap: Some(gap_id) }] = events.as_slice() else {
            panic!("expected a gap, got {events:?}");
        };

        assert!(!controller.is_in_progress());
        assert_eq!(cids(&controller), vec!["x", "y", "GAP", "a", "b"]);
        assert_eq!(controller.store().gap_position(*gap_id), Some(2));

        // Manual resolution later
        source.push(Ok(hours(&[("a", 10), ("b", 9)], Some("c1"))));
        assert!(controller.get_timeline_for_gap(*gap_id, 0));
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::GapFilled {
                gap_id: *gap_id,
                new_gap: None
            }]
        );
        assert_eq!(cids(&controller), vec!["x", "y", "a", "b"]);
    }

    #[test]
    fn test_redundant_prepend_changes_nothing() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 10), ("b", 9)], "c1");

        source.push(Ok(hours(&[("a", 10), ("b", 9)], Some("c1"))));
        assert!(controller.get_timeline_prepend(2));
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::Prepended { gap: None }]
        );
        assert!(!controller.is_in_progress());
        assert_eq!(cids(&controller), vec!["a", "b"]);
    }

    #[test]
    fn test_prepend_refused_when_full() {
        let source = ScriptedSource::new(vec![Ok(hours(&[("a", 10), ("b", 9)], Some("c1")))]);
        let source_dyn: Arc<dyn FeedSource> = source.clone();
        let mut controller = PagingController::new(
            source_dyn,
            PagingSettings {
                max_timeline_size: 2,
                ..settings()
            },
        );

        assert!(controller.get_timeline());
        controller.wait_for_response(TIMEOUT);
        assert!(controller.store().is_full());
        assert!(!controller.get_timeline_prepend(0));
        assert_eq!(source.requests().len(), 1);
    }

    #[test]
    fn test_gap_fill_of_unknown_gap_rejected() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 10)], "c1");
        assert!(!controller.get_timeline_for_gap(GapId(99), 0));
        assert!(!controller.is_in_progress());
    }

    #[test]
    fn test_fetch_failure_reported_and_cleared() {
        let source = ScriptedSource::new(vec![Err(ClientError::Network("offline".to_string()))]);
        let mut controller = controller(&source);

        assert!(controller.get_timeline());
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::Failed {
                operation: Operation::Timeline,
                error: PagingError::Fetch(ClientError::Network("offline".to_string())),
            }]
        );
        assert!(!controller.is_in_progress());
        assert!(controller.store().is_empty());

        // A failed request does not block the next one
        source.push(Ok(hours(&[("a", 10)], None)));
        assert!(controller.get_timeline());
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::TimelineLoaded { inserted: 1 }]
        );
    }

    #[test]
    fn test_reset_drops_in_flight_response() {
        let gate = Arc::new(Notify::new());
        let source = ScriptedSource::gated(
            vec![Ok(hours(&[("a", 10)], Some("c1")))],
            Arc::clone(&gate),
        );
        let mut controller = controller(&source);
        let changes = controller.subscribe();

        assert!(controller.get_timeline());
        controller.reset();
        assert!(!controller.is_in_progress());
        gate.notify_one();

        std::thread::sleep(Duration::from_millis(50));
        assert!(controller.process_responses().is_empty());
        assert!(controller.wait_for_response(Duration::from_millis(10)).is_empty());
        assert!(controller.store().is_empty());
        assert_eq!(changes.try_recv().unwrap(), FeedChange::Reset);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_sync_pages_until_timestamp() {
        let source = ScriptedSource::new(vec![
            Ok(hours(&[("a", 10), ("b", 9)], Some("c1"))),
            Ok(hours(&[("c", 8), ("d", 7)], Some("c2"))),
        ]);
        let mut controller = controller(&source);

        assert!(controller.sync_timeline(at(8), 5));
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::Synced { index: 2 }]
        );

        assert_eq!(cids(&controller), vec!["a", "b", "c", "d"]);
        assert_eq!(
            source.requests(),
            vec![(3, None), (3, Some("c1".to_string()))]
        );
    }

    #[test]
    fn test_sync_stops_at_page_budget() {
        let source = ScriptedSource::new(vec![Ok(hours(&[("a", 10), ("b", 9)], Some("c1")))]);
        let mut controller = controller(&source);

        assert!(controller.sync_timeline(at(1), 1));
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::Synced { index: 1 }]
        );
        assert_eq!(source.requests().len(), 1);
    }

    #[test]
    fn test_sync_failure() {
        let source = ScriptedSource::new(vec![Err(ClientError::NotAuthenticated)]);
        let mut controller = controller(&source);

        assert!(controller.sync_timeline(at(1), 3));
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![
                PagingEvent::Failed {
                    operation: Operation::Sync,
                    error: PagingError::Fetch(ClientError::NotAuthenticated),
                },
                PagingEvent::SyncFailed,
            ]
        );
    }

    #[test]
    fn test_sync_of_empty_feed_fails() {
        let source = ScriptedSource::new(vec![Ok(hours(&[], None))]);
        let mut controller = controller(&source);

        assert!(controller.sync_timeline(at(1), 3));
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::SyncFailed]
        );
    }

    #[test]
    fn test_movement_near_tail_loads_next_page() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 10), ("b", 9)], "c1");

        source.push(Ok(hours(&[("c", 8)], Some("c2"))));
        let timestamp = controller.timeline_movement_ended(0, 1);
        assert_eq!(timestamp, Some(at(10)));
        assert!(controller.is_in_progress());

        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::PageAppended { inserted: 1 }]
        );
        assert_eq!(cids(&controller), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_movement_far_from_tail_evicts_tail() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 12), ("b", 11), ("c", 10)], "c1");

        for (page, cursor) in [
            (&[("d", 9), ("e", 8), ("f", 7)], "c2"),
            (&[("g", 6), ("h", 5), ("i", 4)], "c3"),
        ] {
            source.push(Ok(hours(page, Some(cursor))));
            assert!(controller.get_timeline_next_page());
            controller.wait_for_response(TIMEOUT);
        }
        assert_eq!(controller.store().len(), 9);

        controller.timeline_movement_ended(0, 1);
        assert!(!controller.is_in_progress());
        assert_eq!(cids(&controller), vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(controller.store().last_cursor(), Some("c2"));
    }

    #[test]
    fn test_next_page_evicts_head_to_stay_bounded() {
        let source = ScriptedSource::new(vec![Ok(hours(
            &[("a", 12), ("b", 11), ("c", 10)],
            Some("c1"),
        ))]);
        let source_dyn: Arc<dyn FeedSource> = source.clone();
        let mut controller = PagingController::new(
            source_dyn,
            PagingSettings {
                max_timeline_size: 5,
                ..settings()
            },
        );
        assert!(controller.get_timeline());
        controller.wait_for_response(TIMEOUT);

        source.push(Ok(hours(&[("d", 9), ("e", 8), ("f", 7)], Some("c2"))));
        assert!(controller.get_timeline_next_page());
        controller.wait_for_response(TIMEOUT);

        assert_eq!(cids(&controller), vec!["c", "d", "e", "f"]);
        assert!(controller.store().len() <= controller.store().max_size());
        assert_eq!(controller.store().last_cursor(), Some("c2"));
    }

    #[test]
    fn test_local_edit_reaches_view() {
        let source = ScriptedSource::new(vec![]);
        let mut controller = loaded(&source, &[("a", 10)], "c1");

        controller.apply_local_edit("a", LocalEdit::LikeCount(1));
        let view = controller.store().view(0).unwrap();
        assert_eq!(view.like_count(), 4);
    }

    fn bounded(source: &Arc<ScriptedSource>, max_timeline_size: usize) -> PagingController {
        init_tracing();
        let source: Arc<dyn FeedSource> = source.clone();
        PagingController::new(
            source,
            PagingSettings {
                max_timeline_size,
                ..settings()
            },
        )
    }

    #[test]
    fn test_prepend_into_nearly_full_timeline_stays_bounded() {
        let source = ScriptedSource::new(vec![Ok(hours(
            &[("a", 10), ("b", 9), ("c", 8), ("d", 7)],
            Some("c1"),
        ))]);
        let mut controller = bounded(&source, 5);
        assert!(controller.get_timeline());
        controller.wait_for_response(TIMEOUT);
        assert!(!controller.store().is_full());

        source.push(Ok(hours(&[("x", 20), ("y", 19), ("z", 18)], Some("g1"))));
        source.push(Ok(hours(&[("w", 17), ("v", 16), ("u", 15)], Some("g2"))));
        source.push(Ok(hours(&[("t", 14), ("s", 13), ("r", 12)], Some("g3"))));

        assert!(controller.get_timeline_prepend(2));
        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::Prepended { gap: None }]
        );

        // The stored posts below the gap were evicted; the gap cursor
        // continues the new tail
        assert!(!controller.is_in_progress());
        assert!(controller.store().len() <= 5);
        assert_eq!(cids(&controller), vec!["x", "y", "z"]);
        assert_eq!(controller.store().last_cursor(), Some("g1"));
        assert_eq!(source.requests().len(), 2);
    }

    #[test]
    fn test_auto_gap_fill_chain_stays_bounded() {
        let source = ScriptedSource::new(vec![
            Ok(hours(&[("a", 10), ("b", 9)], Some("c1"))),
            Ok(hours(&[("c", 8), ("d", 7)], Some("c2"))),
        ]);
        let mut controller = bounded(&source, 7);
        assert!(controller.get_timeline());
        controller.wait_for_response(TIMEOUT);
        assert!(controller.get_timeline_next_page());
        controller.wait_for_response(TIMEOUT);
        assert_eq!(controller.store().len(), 4);

        source.push(Ok(hours(&[("x", 20), ("y", 19), ("z", 18)], Some("g1"))));
        source.push(Ok(hours(&[("w", 17), ("v", 16), ("u", 15)], Some("g2"))));

        assert!(controller.get_timeline_prepend(2));
        let events = controller.wait_for_response(TIMEOUT);
        let [PagingEvent::Prepended { gap: Some(gap_id) }] = events.as_slice() else {
            panic!("expected a gap, got {events:?}");
        };
        let gap_id = *gap_id;
        assert_eq!(cids(&controller), vec!["x", "y", "z", "GAP", "a", "b"]);
        assert!(controller.is_in_progress());

        assert_eq!(
            controller.wait_for_response(TIMEOUT),
            vec![PagingEvent::GapFilled {
                gap_id,
                new_gap: None
            }]
        );
        assert!(!controller.is_in_progress());
        assert!(controller.store().len() <= 7);
        assert_eq!(cids(&controller), vec!["x", "y", "z", "w", "v", "u"]);
        assert_eq!(controller.store().last_cursor(), Some("g2"));
        assert_eq!(source.requests()[3], (3, Some("g1".to_string())));
    }
}
