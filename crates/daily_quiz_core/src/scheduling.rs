//! crates/daily_quiz_core/src/scheduling.rs
//!
//! Cancel-and-replace request slots and debounced tasks.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Holds the cancellation token of the latest request for one logical resource.
/// Starting a new request cancels the previous one, so the last one started wins.
#[derive(Clone, Default)]
pub struct RequestSlot {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels whatever is in flight and returns the token for the new request.
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Like `begin`, but the new token is also cancelled along with `parent`.
    pub fn begin_child(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancels the in-flight request, if any. Used on teardown.
    pub fn cancel(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = current.take() {
            token.cancel();
        }
    }
}

struct Pending {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs a task once triggers stop arriving for `delay`.
///
/// Each trigger cancels the previous token, which both stops a pending timer and
/// aborts a request the previous task already started.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<Pending>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule<F, Fut>(&self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let delay = self.delay;
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            task(task_token).await;
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(Pending { token, handle }) {
            previous.token.cancel();
        }
    }

    /// Cancels the pending or running task.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.token.cancel();
        }
    }

    /// Waits for the most recently scheduled task to finish.
    pub async fn settle(&self) {
        let handle = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.take().map(|p| p.handle)
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn begin_cancels_previous_request() {
        let slot = RequestSlot::new();
        let first = slot.begin();
        let second = slot.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        slot.cancel();
        assert!(second.is_cancelled());
    }

    #[test]
    fn child_slot_follows_parent() {
        let slot = RequestSlot::new();
        let parent = CancellationToken::new();
        let child = slot.begin_child(&parent);
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(!slot.begin().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_run_once() {
        let debouncer = Debouncer::new(Duration::from_millis(180));
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let runs = runs.clone();
            debouncer.schedule(move |_| async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        debouncer.settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_task_sees_cancellation() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let observed = Arc::new(Mutex::new(None));
        let seen = observed.clone();
        debouncer.schedule(move |token| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            *seen.lock().unwrap() = Some(token.is_cancelled());
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        debouncer.schedule(|_| async {});
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*observed.lock().unwrap(), Some(true));
    }
}
