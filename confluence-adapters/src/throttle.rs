//! Rate-limits publishes to a [`Source`] by sleeping at least
//! `interval` between consecutive publishes, per the throttle
//! adapter contract.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use confluence_core::Source;
use tokio_util::sync::CancellationToken;

/// Outcome of [`ThrottleAdapter::publish`].
#[derive(Debug, PartialEq, Eq)]
pub enum ThrottleOutcome {
    /// The item was published (after waiting out any remaining
    /// throttle interval).
    Published,
    /// Cancellation fired while waiting; the item was not
    /// published. This is benign, not an error.
    Cancelled,
}

/// Wraps a [`Source`] so that consecutive publishes are spaced at
/// least `interval` apart.
pub struct ThrottleAdapter<T> {
    source: Source<T>,
    interval: Duration,
    last_publish: Mutex<Option<Instant>>,
    cancel: CancellationToken,
}

impl<T: Send + Sync + Clone + 'static> ThrottleAdapter<T> {
    pub fn new(source: Source<T>, interval: Duration) -> Self {
        ThrottleAdapter {
            source,
            interval,
            last_publish: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Shares an externally-owned cancellation token instead of the
    /// adapter's own.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits out any remaining throttle interval, then publishes
    /// `item`. Cancellation during the wait returns `Cancelled`
    /// without publishing.
    pub async fn publish(&self, item: T) -> ThrottleOutcome {
        if let Some(remaining) = self.remaining_wait() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ThrottleOutcome::Cancelled,
                _ = tokio::time::sleep(remaining) => {}
            }
        }
        self.source.publish(item).await;
        *self.last_publish.lock().unwrap() = Some(Instant::now());
        ThrottleOutcome::Published
    }

    fn remaining_wait(&self) -> Option<Duration> {
        let last = (*self.last_publish.lock().unwrap())?;
        let elapsed = last.elapsed();
        (elapsed < self.interval).then(|| self.interval - elapsed)
    }

    pub fn complete(&self) {
        self.source.complete();
    }

    pub fn fault(&self, message: impl Into<String>) {
        self.source.fault(message);
    }
}
