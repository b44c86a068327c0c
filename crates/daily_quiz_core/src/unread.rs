//! crates/daily_quiz_core/src/unread.rs
//!
//! The shared unread-notifications counter behind the badge. There is one owner
//! per signed-in client; views subscribe to it instead of polling on their own.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::normalize::first_f64;
use crate::ports::ApiRequest;
use crate::scheduling::{Debouncer, RequestSlot};

pub const UNREAD_COUNT_PATH: &str = "/api/notifications/unread-count";
pub const UNREAD_REFRESH_DEBOUNCE: Duration = Duration::from_millis(220);

struct CounterInner {
    api: ApiClient,
    count: watch::Sender<u64>,
    debouncer: Debouncer,
    requests: RequestSlot,
}

/// Cloneable handle on the shared counter.
#[derive(Clone)]
pub struct UnreadCounter {
    inner: Arc<CounterInner>,
}

impl UnreadCounter {
    pub fn new(api: ApiClient) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            inner: Arc::new(CounterInner {
                api,
                count,
                debouncer: Debouncer::new(UNREAD_REFRESH_DEBOUNCE),
                requests: RequestSlot::new(),
            }),
        }
    }

    pub fn count(&self) -> u64 {
        *self.inner.count.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.count.subscribe()
    }

    pub fn set(&self, count: u64) {
        self.inner.count.send_replace(count);
    }

    /// Local decrement after a confirmed single read, saving a round trip.
    pub fn decrement(&self, by: u64) {
        self.inner.count.send_modify(|count| *count = count.saturating_sub(by));
    }

    /// Debounced refresh from the server.
    pub fn refresh(&self) {
        let counter = self.clone();
        self.inner.debouncer.schedule(move |token| async move {
            let token = counter.inner.requests.begin_child(&token);
            let _ = counter.fetch(&token).await;
        });
    }

    /// Immediate refresh. Debounced and immediate refreshes share one slot, so
    /// whichever started last is the one whose count is kept.
    pub async fn refresh_now(&self) -> ClientResult<u64> {
        let token = self.inner.requests.begin();
        self.fetch(&token).await
    }

    /// Waits for a pending debounced refresh.
    pub async fn settle(&self) {
        self.inner.debouncer.settle().await;
    }

    async fn fetch(&self, token: &CancellationToken) -> ClientResult<u64> {
        let result = self
            .inner
            .api
            .send_ok(ApiRequest::get(UNREAD_COUNT_PATH), token)
            .await
            .map(|response| parse_count(&response.body));
        match result {
            Ok(count) => {
                self.set(count);
                Ok(count)
            }
            Err(ClientError::Aborted) => {
                debug!("Unread count refresh aborted");
                Err(ClientError::Aborted)
            }
            Err(e) => {
                warn!("Failed to refresh unread count: {}", e);
                Err(e)
            }
        }
    }
}

fn parse_count(body: &Value) -> u64 {
    body.as_f64()
        .or_else(|| first_f64(body, &["count", "unreadCount", "unread_count", "unread"]))
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map_or(0, |n| n as u64)
}
