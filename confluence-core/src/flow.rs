//! The fan-in aggregator: owns a set of subscriptions and hands
//! out a single [`crate::Consumer`].
//!
//! Refer to the [crate] docs for more info.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::{buffer, Reader, Writer},
    consumer::Consumer,
    error::FlowError,
    source::{Predicate, Source},
    BufferPolicy,
};

struct Subscription<T> {
    source: Source<T>,
    reader: Reader<T>,
    writer: Writer<T>,
}

struct Inner<T> {
    name: Arc<str>,
    subscriptions: Mutex<HashMap<usize, Subscription<T>>>,
    /// Readers whose subscription was explicitly detached while
    /// items it already accepted were still unread. Kept here,
    /// outside `subscriptions`, purely so the Consumer keeps
    /// polling them until they report `Closed` on their own —
    /// detaching must stop *new* delivery without discarding what
    /// was already enqueued.
    draining: Mutex<Vec<Reader<T>>>,
    topology_changed: Notify,
    disposed: AtomicBool,
    cancel: CancellationToken,
    consumer: Mutex<Option<Consumer<T>>>,
    /// Set the first time `attach` is ever called. Lets the
    /// Consumer tell "nothing attached yet" (keep waiting) apart
    /// from "everything attached has drained" (done).
    ever_attached: AtomicBool,
}

/// Handle Consumer uses to read the current subscription set
/// and rebuild its wait set, without holding a back-pointer to
/// the full [`Flow`] API.
pub(crate) struct FlowHandle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FlowHandle<T> {
    fn clone(&self) -> Self {
        FlowHandle {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + Clone + 'static> FlowHandle<T> {
    pub(crate) fn readers_snapshot(&self) -> Vec<Reader<T>> {
        let mut readers: Vec<Reader<T>> = self
            .inner
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .map(|s| s.reader.clone())
            .collect();
        readers.extend(self.inner.draining.lock().unwrap().iter().cloned());
        readers
    }

    /// `true` once at least one `Subscription` has ever existed.
    /// Until then, an empty reader set means "not started yet",
    /// not "done".
    pub(crate) fn ever_attached(&self) -> bool {
        self.inner.ever_attached.load(Ordering::SeqCst)
    }

    /// Registers for the next topology-change notification without
    /// awaiting it, so callers can take a reader snapshot afterward
    /// without risking a missed wakeup between the two steps.
    pub(crate) fn topology_changed_listener(&self) -> impl Future<Output = ()> + '_ {
        self.inner.topology_changed.notified()
    }

    pub(crate) fn disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Dual lookup used when a reader reports "closed": drops
    /// whichever subscription or draining entry currently owns
    /// that reader. In both cases the reader has nothing left to
    /// deliver, so it is safe to forget entirely.
    pub(crate) fn detach_by_reader(&self, reader: &Reader<T>) {
        let found = {
            let subs = self.inner.subscriptions.lock().unwrap();
            subs.iter()
                .find(|(_, s)| s.reader.is_same(reader))
                .map(|(k, _)| *k)
        };
        if let Some(key) = found {
            self.remove_drained(key);
            return;
        }

        let mut draining = self.inner.draining.lock().unwrap();
        if let Some(pos) = draining.iter().position(|r| r.is_same(reader)) {
            draining.remove(pos);
        }
    }

    /// Removes a subscription whose Source completed or faulted on
    /// its own; its Reader already reported the terminal state, so
    /// there is nothing left to drain.
    fn remove_drained(&self, key: usize) {
        let removed = self.inner.subscriptions.lock().unwrap().remove(&key);
        if let Some(sub) = removed {
            sub.source.remove_writer(&sub.writer);
            sub.writer.complete_ok();
            crate::diagnostics::current().topology_changed(&self.inner.name);
            self.inner.topology_changed.notify_waiters();
        }
    }

    pub(crate) fn dispose(&self) {
        if self
            .inner
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.cancel.cancel();
            let subs = std::mem::take(&mut *self.inner.subscriptions.lock().unwrap());
            for sub in subs.into_values() {
                sub.source.remove_writer(&sub.writer);
                sub.writer.complete_ok();
            }
            self.inner.draining.lock().unwrap().clear();
            self.inner.topology_changed.notify_waiters();
        }
    }
}

/// Aggregates an open set of named [`Source`]s into one
/// lazily-consumed, pull-based sequence.
///
/// A `Flow` is a cheap, `Clone`-able handle: attaching or
/// detaching sources through any clone is visible to every other
/// clone and to the [`crate::Consumer`] returned by
/// [`Flow::consumer`].
pub struct Flow<T> {
    handle: FlowHandle<T>,
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Flow {
            handle: self.handle.clone(),
        }
    }
}

impl<T: Send + Sync + Clone + 'static> Flow<T> {
    /// Creates a new, empty `Flow` named `name`.
    ///
    /// Sources may be attached before, during, or after
    /// consumption begins via [`Flow::attach`].
    pub fn new(name: impl Into<String>) -> Self {
        Flow {
            handle: FlowHandle {
                inner: Arc::new(Inner {
                    name: Arc::from(name.into()),
                    subscriptions: Mutex::new(HashMap::new()),
                    draining: Mutex::new(Vec::new()),
                    topology_changed: Notify::new(),
                    disposed: AtomicBool::new(false),
                    cancel: CancellationToken::new(),
                    consumer: Mutex::new(None),
                    ever_attached: AtomicBool::new(false),
                }),
            },
        }
    }

    /// Registers a new subscription to `source`, buffered under
    /// `policy` and optionally filtered by `predicate`.
    ///
    /// Safe to call before, during, or after consumption has
    /// started; the active [`crate::Consumer`] observes the new
    /// subscription on its next wait cycle.
    pub fn attach(
        &self,
        source: Source<T>,
        predicate: Option<Predicate<T>>,
        policy: BufferPolicy,
    ) -> Result<(), FlowError> {
        if self.handle.disposed() {
            return Err(FlowError::Disposed);
        }

        let (writer, reader) = buffer(policy);
        source.add_writer(writer.clone(), predicate);

        let key = source.identity();
        self.handle
            .inner
            .subscriptions
            .lock()
            .unwrap()
            .insert(key, Subscription { source, reader, writer });

        self.handle.inner.ever_attached.store(true, Ordering::SeqCst);
        crate::diagnostics::current().topology_changed(&self.handle.inner.name);
        self.handle.inner.topology_changed.notify_waiters();
        Ok(())
    }

    /// Removes the subscription to `source`, if any, and stops it
    /// from receiving further items.
    ///
    /// Items already enqueued for `source` remain visible to the
    /// [`crate::Consumer`] until drained; no new items appear
    /// afterward. The Reader is kept (outside the active
    /// subscription set) until it reports empty-and-closed on its
    /// own.
    pub fn detach(&self, source: &Source<T>) -> bool {
        let key = source.identity();
        let removed = self.handle.inner.subscriptions.lock().unwrap().remove(&key);
        match removed {
            Some(sub) => {
                sub.source.remove_writer(&sub.writer);
                sub.writer.complete_ok();
                self.handle.inner.draining.lock().unwrap().push(sub.reader);
                crate::diagnostics::current().topology_changed(&self.handle.inner.name);
                self.handle.inner.topology_changed.notify_waiters();
                true
            }
            None => false,
        }
    }

    /// Returns the single [`crate::Consumer`] for this flow,
    /// creating it on first call.
    pub fn consumer(&self) -> Consumer<T> {
        let mut slot = self.handle.inner.consumer.lock().unwrap();
        slot.get_or_insert_with(|| Consumer::new(self.handle.clone()))
            .clone()
    }

    /// Idempotent teardown: removes every writer from its source,
    /// completes every writer, and lets the active
    /// [`crate::Consumer`] observe closure on its next wait cycle.
    ///
    /// Unlike [`Flow::detach`], disposal is an immediate stop, not
    /// a graceful drain: [`crate::Consumer::next`] starts yielding
    /// `Done` right away rather than draining whatever was still
    /// enqueued.
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    /// Returns `true` once [`Flow::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.handle.disposed()
    }
}
