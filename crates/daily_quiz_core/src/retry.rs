//! crates/daily_quiz_core/src/retry.rs
//!
//! Fixed linear backoff for reads that may hit a transient 5xx.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ClientResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// The delay before retry `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(240),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// retries are used up. Only 5xx responses are retried.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!("Transient failure ({}); retry {} in {:?}", e, retry, delay);
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
