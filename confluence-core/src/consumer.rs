//! The pull-based iterator exposed to downstream code,
//! multiplexing every current [`crate::Reader`] into one
//! unified sequence.
//!
//! Refer to the [crate] docs for more info.

use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

use futures_util::future::select_all;
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::ReaderItem,
    error::FlowError,
    flow::FlowHandle,
};

/// Outcome of [`Consumer::next`].
///
/// Matches the terminal states of the state machine in the
/// engine's design: at most one [`ConsumerItem::Error`] is ever
/// surfaced, and cancellation always ends in [`ConsumerItem::Done`],
/// never an error.
#[derive(Debug)]
pub enum ConsumerItem<T> {
    /// The next item, in whichever source's turn came up.
    Value(T),
    /// Every attached source has completed and drained, the
    /// consumer was cancelled, or the flow was disposed.
    Done,
    /// A source faulted; surfaced exactly once.
    Error(FlowError),
}

struct Inner<T> {
    flow: FlowHandle<T>,
    cancel: CancellationToken,
    faulted: AtomicBool,
}

/// Pull-based iterator over the union of every [`crate::Source`]
/// currently attached to a [`crate::Flow`].
///
/// There is exactly one `Consumer` per `Flow`; [`crate::Flow::consumer`]
/// hands out clones of the same handle.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Consumer {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + Clone + 'static> Consumer<T> {
    pub(crate) fn new(flow: FlowHandle<T>) -> Self {
        let cancel = flow.cancel_token().child_token();
        Consumer {
            inner: Arc::new(Inner {
                flow,
                cancel,
                faulted: AtomicBool::new(false),
            }),
        }
    }

    /// Cooperative single-step pull.
    ///
    /// Suspends until some attached source has an item ready, the
    /// topology changes (in which case the wait set is silently
    /// rebuilt and waiting continues), every source has completed
    /// and drained, the consumer is cancelled, or the flow is
    /// disposed.
    pub async fn next(&self) -> ConsumerItem<T> {
        loop {
            if self.inner.flow.disposed() || self.inner.faulted.load(Ordering::SeqCst) {
                return ConsumerItem::Done;
            }

            // Register for the next topology change before taking the
            // reader snapshot, so a concurrent attach/detach landing
            // in between is never missed.
            let topology_changed = self.inner.flow.topology_changed_listener();
            let readers = self.inner.flow.readers_snapshot();

            if readers.is_empty() {
                if self.inner.flow.ever_attached() {
                    return ConsumerItem::Done;
                }
                tokio::select! {
                    biased;
                    _ = self.inner.cancel.cancelled() => return ConsumerItem::Done,
                    _ = topology_changed => continue,
                }
            }

            let reader_futs = readers.iter().map(|r| Box::pin(r.recv()));
            tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => return ConsumerItem::Done,
                _ = topology_changed => continue,
                (item, idx, _) = select_all(reader_futs) => match item {
                    ReaderItem::Item(value) => return ConsumerItem::Value(value),
                    ReaderItem::Closed => {
                        self.inner.flow.detach_by_reader(&readers[idx]);
                        continue;
                    }
                    ReaderItem::Faulted(e) => {
                        self.inner.faulted.store(true, Ordering::SeqCst);
                        return ConsumerItem::Error(e);
                    }
                },
            }
        }
    }

    /// Cancels any in-flight wait and releases the flow's
    /// resources. Idempotent; subsequent [`Consumer::next`] calls
    /// yield [`ConsumerItem::Done`].
    pub fn dispose(&self) {
        self.inner.cancel.cancel();
        self.inner.flow.dispose();
    }
}
