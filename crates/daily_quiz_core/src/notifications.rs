//! crates/daily_quiz_core/src/notifications.rs
//!
//! The notification feed controller: a paginated, filterable list with debounced
//! refetches and optimistic read-state changes that roll back on failure.
//!
//! The first page always replaces the list and later pages append. Only one
//! page fetch is authoritative at a time: a new first page or a filter change
//! cancels whatever is in flight, and a response whose token was cancelled or
//! whose filter no longer applies is discarded.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::domain::NotificationItem;
use crate::error::{ClientError, ClientResult};
use crate::normalize::{extract_list, first_bool, first_string, first_timestamp};
use crate::ports::ApiRequest;
use crate::scheduling::{Debouncer, RequestSlot};
use crate::unread::UnreadCounter;

pub const NOTIFICATIONS_PATH: &str = "/api/notifications";
pub const READ_ALL_PATH: &str = "/api/notifications/read-all";
pub const FEED_REFRESH_DEBOUNCE: Duration = Duration::from_millis(180);
pub const PAGE_SIZE: u32 = 20;

pub fn read_path(id: &str) -> String {
    format!("{NOTIFICATIONS_PATH}/{id}/read")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
}

impl NotificationFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationFilter::All => "all",
            NotificationFilter::Unread => "unread",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    pub items: Vec<NotificationItem>,
    pub filter: NotificationFilter,
    /// The last page loaded, 0 before the first load.
    pub page: u32,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub error: Option<String>,
}

/// A local change to the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedDelta {
    SetUnread { ids: Vec<String>, unread: bool },
}

/// An applied optimistic change waiting for the server.
#[must_use]
#[derive(Debug)]
pub struct PendingCommit {
    inverse: FeedDelta,
}

impl PendingCommit {
    /// The server confirmed the change.
    pub fn commit(self) {}

    /// The server refused the change; undo it.
    pub fn rollback(self, state: &mut FeedState) {
        state.apply(&self.inverse);
    }
}

impl FeedState {
    /// Applies `delta` and returns its inverse, covering only the items it changed.
    pub fn apply(&mut self, delta: &FeedDelta) -> FeedDelta {
        match delta {
            FeedDelta::SetUnread { ids, unread } => {
                let mut changed = Vec::new();
                for item in self.items.iter_mut() {
                    if item.unread != *unread && ids.contains(&item.id) {
                        item.unread = *unread;
                        changed.push(item.id.clone());
                    }
                }
                FeedDelta::SetUnread {
                    ids: changed,
                    unread: !*unread,
                }
            }
        }
    }

    /// Applies `delta` optimistically; `None` if it changed nothing.
    pub fn apply_optimistic(&mut self, delta: FeedDelta) -> Option<PendingCommit> {
        let inverse = self.apply(&delta);
        let FeedDelta::SetUnread { ids, .. } = &inverse;
        (!ids.is_empty()).then_some(PendingCommit { inverse })
    }

    pub fn unread_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.unread)
            .map(|item| item.id.clone())
            .collect()
    }
}

struct FeedInner {
    api: ApiClient,
    state: Mutex<FeedState>,
    counter: UnreadCounter,
    debouncer: Debouncer,
    first_page: RequestSlot,
    lifetime: CancellationToken,
}

/// Cloneable handle on one feed.
#[derive(Clone)]
pub struct NotificationFeed {
    inner: Arc<FeedInner>,
}

impl NotificationFeed {
    pub fn new(api: ApiClient, counter: UnreadCounter) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                api,
                state: Mutex::new(FeedState::default()),
                counter,
                debouncer: Debouncer::new(FEED_REFRESH_DEBOUNCE),
                first_page: RequestSlot::new(),
                lifetime: CancellationToken::new(),
            }),
        }
    }

    pub async fn snapshot(&self) -> FeedState {
        self.inner.state.lock().await.clone()
    }

    pub fn counter(&self) -> &UnreadCounter {
        &self.inner.counter
    }

    /// Changes the filter and schedules a debounced refetch of the first page.
    pub async fn set_filter(&self, filter: NotificationFilter) {
        {
            let mut state = self.inner.state.lock().await;
            if state.filter != filter {
                self.inner.first_page.cancel();
                state.loading_more = false;
            }
            state.filter = filter;
        }
        self.refresh();
    }

    /// Debounced first-page refetch, used on mount and on filter changes.
    pub fn refresh(&self) {
        let feed = self.clone();
        self.inner.debouncer.schedule(move |token| async move {
            let token = feed.inner.first_page.begin_child(&token);
            let _ = feed.load_page(1, &token).await;
        });
    }

    /// Immediate first-page refetch (explicit user action).
    pub async fn reload(&self) -> ClientResult<()> {
        let token = self.inner.first_page.begin();
        self.load_page(1, &token).await
    }

    /// Appends the next page, if there is one. A later first-page fetch
    /// supersedes it.
    pub async fn load_more(&self) -> ClientResult<()> {
        let next = {
            let state = self.inner.state.lock().await;
            if !state.has_more || state.loading || state.loading_more {
                return Ok(());
            }
            state.page + 1
        };
        let token = self.inner.first_page.begin_child(&self.inner.lifetime);
        self.load_page(next, &token).await
    }

    /// Waits for a pending debounced refetch.
    pub async fn settle(&self) {
        self.inner.debouncer.settle().await;
    }

    /// Aborts everything in flight. The feed must not be used afterwards.
    pub fn teardown(&self) {
        self.inner.debouncer.cancel();
        self.inner.first_page.cancel();
        self.inner.lifetime.cancel();
    }

    async fn load_page(&self, page: u32, token: &CancellationToken) -> ClientResult<()> {
        let filter = {
            let mut state = self.inner.state.lock().await;
            if page == 1 {
                state.loading = true;
                state.loading_more = false;
            } else {
                state.loading_more = true;
            }
            state.filter
        };

        let mut request = ApiRequest::get(NOTIFICATIONS_PATH)
            .with_query("page", page)
            .with_query("limit", PAGE_SIZE);
        if filter == NotificationFilter::Unread {
            request = request.with_query("filter", filter.as_str());
        }
        let result = self.inner.api.send_ok(request, token).await;

        let mut state = self.inner.state.lock().await;
        if token.is_cancelled() || state.filter != filter {
            debug!("Discarding stale notifications page {}", page);
            return Ok(());
        }
        if page == 1 {
            state.loading = false;
        } else {
            state.loading_more = false;
        }

        match result {
            Ok(response) => {
                let (items, has_more) = parse_page(&response.body);
                state.has_more = has_more.unwrap_or(items.len() as u32 >= PAGE_SIZE);
                if page == 1 {
                    state.items = items;
                } else {
                    for item in items {
                        if !state.items.iter().any(|existing| existing.id == item.id) {
                            state.items.push(item);
                        }
                    }
                }
                state.page = page;
                state.error = None;
                Ok(())
            }
            Err(ClientError::Aborted) => Ok(()),
            Err(e) => {
                warn!("Failed to load notifications page {}: {}", page, e);
                state.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Marks one notification read: local flip first, reverted if the server refuses.
    pub async fn mark_read(&self, id: &str) -> ClientResult<()> {
        let delta = FeedDelta::SetUnread {
            ids: vec![id.to_string()],
            unread: false,
        };
        let Some(pending) = self.inner.state.lock().await.apply_optimistic(delta) else {
            return Ok(());
        };

        let token = self.inner.lifetime.child_token();
        match self
            .inner
            .api
            .send_ok(ApiRequest::post(read_path(id), json!({})), &token)
            .await
        {
            Ok(_) => {
                pending.commit();
                self.inner.counter.decrement(1);
                Ok(())
            }
            Err(e) => {
                warn!("Marking notification {} read failed; reverting: {}", id, e);
                pending.rollback(&mut *self.inner.state.lock().await);
                let _ = self.inner.counter.refresh_now().await;
                silence_abort(e)
            }
        }
    }

    /// Marks everything read on the server, including pages not loaded yet.
    /// Loaded items flip first and are restored if the server refuses.
    pub async fn mark_all_read(&self) -> ClientResult<()> {
        let pending = {
            let mut state = self.inner.state.lock().await;
            let delta = FeedDelta::SetUnread {
                ids: state.unread_ids(),
                unread: false,
            };
            state.apply_optimistic(delta)
        };

        let token = self.inner.lifetime.child_token();
        match self
            .inner
            .api
            .send_ok(ApiRequest::post(READ_ALL_PATH, json!({})), &token)
            .await
        {
            Ok(_) => {
                if let Some(pending) = pending {
                    pending.commit();
                }
                self.inner.counter.set(0);
                info!("All notifications marked read");
                Ok(())
            }
            Err(e) => {
                warn!("Marking all notifications read failed; reverting: {}", e);
                if let Some(pending) = pending {
                    pending.rollback(&mut *self.inner.state.lock().await);
                }
                let _ = self.inner.counter.refresh_now().await;
                silence_abort(e)
            }
        }
    }
}

fn silence_abort(err: ClientError) -> ClientResult<()> {
    match err {
        ClientError::Aborted => Ok(()),
        e => Err(e),
    }
}

/// Reads a notifications page: the items and, if the server says, whether more exist.
pub fn parse_page(body: &Value) -> (Vec<NotificationItem>, Option<bool>) {
    let list = extract_list(body, &["notifications", "items", "data"])
        .or_else(|| body.get("data").and_then(|d| extract_list(d, &["notifications", "items"])));
    let items = list
        .map(|records| records.iter().filter_map(parse_notification).collect())
        .unwrap_or_default();
    let has_more = first_bool(body, &["hasMore", "has_more"])
        .or_else(|| body.get("pagination").and_then(|p| first_bool(p, &["hasMore", "has_more"])));
    (items, has_more)
}

pub fn parse_notification(record: &Value) -> Option<NotificationItem> {
    let id = first_string(record, &["id"])?;
    let unread = first_bool(record, &["unread"])
        .or_else(|| first_bool(record, &["read", "isRead", "is_read"]).map(|read| !read))
        .or_else(|| {
            ["readAt", "read_at"]
                .iter()
                .find_map(|key| record.get(*key))
                .map(Value::is_null)
        })
        .unwrap_or(false);
    let created_at = first_timestamp(record, &["createdAt", "created_at"]);

    Some(NotificationItem {
        id,
        title: first_string(record, &["title"]).unwrap_or_default(),
        body: first_string(record, &["body", "message", "content"]).unwrap_or_default(),
        kind: first_string(record, &["kind", "type"]),
        icon: first_string(record, &["icon"]),
        unread,
        created_at,
        action_url: first_string(record, &["actionUrl", "action_url", "url", "link"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_with, ScriptedTransport};
    use crate::unread::UNREAD_COUNT_PATH;

    fn page(ids: &[&str], has_more: bool) -> Value {
        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "id": id, "title": format!("Aviso {id}"), "read": false }))
            .collect();
        json!({ "notifications": items, "hasMore": has_more })
    }

    fn feed_over(transport: ScriptedTransport) -> NotificationFeed {
        let (client, _) = client_with(transport);
        let counter = UnreadCounter::new(client.clone());
        NotificationFeed::new(client, counter)
    }

    #[tokio::test]
    async fn first_page_replaces_and_later_pages_append() {
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, page(&["1", "2"], true))
            .on(NOTIFICATIONS_PATH, 200, page(&["3"], false))
            .on(NOTIFICATIONS_PATH, 200, page(&["9"], false));
        let feed = feed_over(transport.clone());

        feed.reload().await.unwrap();
        feed.load_more().await.unwrap();
        let state = feed.snapshot().await;
        assert_eq!(state.items.len(), 3);
        assert_eq!(state.page, 2);
        assert!(!state.has_more);

        feed.reload().await.unwrap();
        let ids: Vec<_> = feed.snapshot().await.items.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["9"]);

        let pages: Vec<_> = transport
            .requests()
            .iter()
            .filter_map(|r| r.query.iter().find(|(k, _)| k == "page").map(|(_, v)| v.clone()))
            .collect();
        assert_eq!(pages, vec!["1", "2", "1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_changes_are_debounced_and_last_wins() {
        let transport = ScriptedTransport::new().on(NOTIFICATIONS_PATH, 200, page(&["1"], false));
        let feed = feed_over(transport.clone());

        feed.set_filter(NotificationFilter::Unread).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        feed.set_filter(NotificationFilter::All).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        feed.set_filter(NotificationFilter::Unread).await;
        feed.settle().await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .query
            .contains(&("filter".to_string(), "unread".to_string())));
        assert_eq!(feed.snapshot().await.items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_refetch_cancels_the_one_in_flight() {
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, page(&["old"], false))
            .on(NOTIFICATIONS_PATH, 200, page(&["new"], false))
            .delayed(NOTIFICATIONS_PATH, Duration::from_millis(500));
        let feed = feed_over(transport.clone());

        feed.refresh();
        tokio::time::sleep(Duration::from_millis(300)).await;
        feed.refresh();
        feed.settle().await;

        assert_eq!(transport.count(NOTIFICATIONS_PATH), 2);
        let state = feed.snapshot().await;
        assert_eq!(state.items[0].id, "new");
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn mark_read_is_optimistic_and_decrements_counter() {
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, page(&["1", "2"], false))
            .on(&read_path("1"), 200, json!({ "ok": true }));
        let feed = feed_over(transport.clone());
        feed.reload().await.unwrap();
        feed.counter().set(2);

        feed.mark_read("1").await.unwrap();

        let state = feed.snapshot().await;
        assert!(!state.items[0].unread);
        assert!(state.items[1].unread);
        assert_eq!(feed.counter().count(), 1);
        assert_eq!(transport.count(UNREAD_COUNT_PATH), 0);
    }

    #[tokio::test]
    async fn failed_mark_read_reverts_and_refreshes_counter() {
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, page(&["1", "2"], false))
            .on(&read_path("1"), 500, json!({ "error": "boom" }))
            .on(UNREAD_COUNT_PATH, 200, json!({ "count": 2 }));
        let feed = feed_over(transport.clone());
        feed.reload().await.unwrap();

        assert!(feed.mark_read("1").await.is_err());

        assert!(feed.snapshot().await.items[0].unread);
        assert_eq!(transport.count(UNREAD_COUNT_PATH), 1);
        assert_eq!(feed.counter().count(), 2);
    }

    #[tokio::test]
    async fn failed_mark_all_read_restores_prior_flags() {
        let body = json!({ "items": [
            { "id": "1", "unread": true },
            { "id": "2", "unread": false },
            { "id": "3", "readAt": null },
        ]});
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, body)
            .on(READ_ALL_PATH, 500, json!({}))
            .on(UNREAD_COUNT_PATH, 200, json!({ "count": 2 }));
        let feed = feed_over(transport.clone());
        feed.reload().await.unwrap();
        feed.counter().set(0);

        assert!(feed.mark_all_read().await.is_err());

        let flags: Vec<bool> = feed.snapshot().await.items.iter().map(|i| i.unread).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert_eq!(transport.count(UNREAD_COUNT_PATH), 1);
        assert_eq!(feed.counter().count(), 2);
    }

    #[tokio::test]
    async fn mark_all_read_success_zeroes_counter() {
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, page(&["1", "2"], false))
            .on(READ_ALL_PATH, 200, json!({}));
        let feed = feed_over(transport);
        feed.reload().await.unwrap();
        feed.counter().set(2);

        feed.mark_all_read().await.unwrap();

        assert!(feed.snapshot().await.unread_ids().is_empty());
        assert_eq!(feed.counter().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_change_discards_a_slow_next_page() {
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, page(&["a1"], true))
            .on_after(
                NOTIFICATIONS_PATH,
                Duration::from_millis(500),
                200,
                json!({ "notifications": [{ "id": "a2-read", "read": true }], "hasMore": true }),
            )
            .on(NOTIFICATIONS_PATH, 200, json!({ "notifications": [{ "id": "u1", "unread": true }], "hasMore": false }));
        let feed = feed_over(transport.clone());
        feed.reload().await.unwrap();

        let more = tokio::spawn({
            let feed = feed.clone();
            async move { feed.load_more().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        feed.set_filter(NotificationFilter::Unread).await;
        more.await.unwrap().unwrap();
        feed.settle().await;

        let state = feed.snapshot().await;
        let ids: Vec<_> = state.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["u1"]);
        assert_eq!(state.filter, NotificationFilter::Unread);
        assert_eq!(state.page, 1);
        assert!(!state.has_more);
        assert!(!state.loading_more);
        assert_eq!(transport.count(NOTIFICATIONS_PATH), 3);
    }

    #[tokio::test]
    async fn mark_all_read_reaches_unloaded_pages() {
        let transport = ScriptedTransport::new()
            .on(NOTIFICATIONS_PATH, 200, json!({ "notifications": [{ "id": "1", "read": true }], "hasMore": true }))
            .on(READ_ALL_PATH, 200, json!({}));
        let feed = feed_over(transport.clone());
        feed.reload().await.unwrap();
        feed.counter().set(5);

        feed.mark_all_read().await.unwrap();

        assert_eq!(transport.count(READ_ALL_PATH), 1);
        assert_eq!(feed.counter().count(), 0);
    }

    #[test]
    fn inverse_only_covers_changed_items() {
        let mut state = FeedState::default();
        state.items = ["a", "b"]
            .iter()
            .map(|id| parse_notification(&json!({ "id": id, "unread": *id == "a" })).unwrap())
            .collect();

        let inverse = state.apply(&FeedDelta::SetUnread {
            ids: vec!["a".into(), "b".into()],
            unread: false,
        });
        assert_eq!(
            inverse,
            FeedDelta::SetUnread {
                ids: vec!["a".into()],
                unread: true
            }
        );
    }
}
