//! Turns a poll function into a [`Source`], per the polling adapter
//! contract: tick on an interval, publish whatever the poll
//! function returns, and stop on a predicate or cancellation.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use confluence_core::Source;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Evaluated against the last published item and the elapsed time
/// since the adapter started; `true` ends polling after that item
/// is published.
pub type StopPredicate<T> = Arc<dyn Fn(&T, Duration) -> bool + Send + Sync>;

/// Builder for a polling producer adapter.
pub struct PollingAdapter<T> {
    interval: Duration,
    stop_predicate: Option<StopPredicate<T>>,
    cancel: CancellationToken,
}

impl<T: Send + Sync + Clone + 'static> PollingAdapter<T> {
    /// Polls no more often than once per `interval`.
    pub fn new(interval: Duration) -> Self {
        PollingAdapter {
            interval,
            stop_predicate: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops polling once `predicate(last_item, elapsed)` is true.
    pub fn with_stop_predicate(
        mut self,
        predicate: impl Fn(&T, Duration) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.stop_predicate = Some(Arc::new(predicate));
        self
    }

    /// Shares an externally-owned cancellation token instead of the
    /// adapter's own.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token that, once cancelled, ends this adapter's polling
    /// loop after its in-flight `poll` call returns.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns the polling loop, publishing to `source`.
    ///
    /// `poll` is awaited once per tick; `None` means "no item this
    /// tick" (a try-get miss), not an error. The source completes
    /// once the stop predicate fires or the cancellation token is
    /// cancelled.
    pub fn spawn<F, Fut>(self, source: Source<T>, poll: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        tokio::spawn(async move {
            let started = Instant::now();
            loop {
                let item = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    item = poll() => item,
                };

                if let Some(value) = item {
                    source.publish(value.clone()).await;
                    if let Some(predicate) = &self.stop_predicate {
                        if predicate(&value, started.elapsed()) {
                            break;
                        }
                    }
                }

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            tracing::debug!(name = source.name(), "polling adapter stopped");
            source.complete();
        })
    }
}
