//! A named producer of items, fanning each published item out
//! to every attached [`Writer`].
//!
//! Refer to the [crate] docs for more info.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio_util::sync::CancellationToken;

use crate::{
    buffer::{BlockingOutcome, EnqueueOutcome, Writer},
    diagnostics::{self, Diagnostics},
    error::{FlowError, RejectReason},
};

/// A predicate deciding whether a subscriber accepts an item.
///
/// Predicate evaluation is synchronous; a panic inside one is
/// treated as "reject this item" for that subscriber and reported
/// to diagnostics rather than propagated.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct WriterEntry<T> {
    writer: Writer<T>,
    predicate: Option<Predicate<T>>,
    cancel: CancellationToken,
}

impl<T> Clone for WriterEntry<T> {
    fn clone(&self) -> Self {
        WriterEntry {
            writer: self.writer.clone(),
            predicate: self.predicate.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

struct Inner<T> {
    name: Arc<str>,
    writers: Mutex<Vec<WriterEntry<T>>>,
    shutdown: CancellationToken,
    terminated: AtomicBool,
    diagnostics: Arc<dyn Diagnostics>,
}

/// A named, independently-producing data source of items of type `T`.
///
/// A `Source` is a cheap, `Clone`-able handle: every clone refers
/// to the same writer registry and identity, matching the "stable
/// identity per Source" invariant a [`crate::Flow`] relies on.
pub struct Source<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Source {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + Clone + 'static> Source<T> {
    /// Creates a new, empty `Source` named `name`.
    ///
    /// `name` is opaque to the engine; it is only surfaced in
    /// diagnostics and error messages.
    pub fn new(name: impl Into<String>) -> Self {
        Source {
            inner: Arc::new(Inner {
                name: Arc::from(name.into()),
                writers: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
                terminated: AtomicBool::new(false),
                diagnostics: diagnostics::current(),
            }),
        }
    }

    /// The source's name, as given to [`Source::new`].
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` iff `self` and `other` are handles to the
    /// same underlying source.
    pub fn is_same(&self, other: &Source<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A stable key suitable for a [`crate::Flow`]'s subscription map.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Returns `true` once [`Source::complete`] or [`Source::fault`]
    /// has been called.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Attaches `writer`, optionally filtered by `predicate`.
    ///
    /// Safe to call concurrently with [`Source::publish`]. If the
    /// source has already completed or faulted, `writer` is
    /// immediately completed to match (a Source does not resurrect
    /// for late attachers — see `DESIGN.md`).
    pub fn add_writer(&self, writer: Writer<T>, predicate: Option<Predicate<T>>) {
        if self.inner.terminated.load(Ordering::SeqCst) {
            writer.complete_ok();
            return;
        }
        let entry = WriterEntry {
            writer,
            predicate,
            cancel: self.inner.shutdown.child_token(),
        };
        self.inner.writers.lock().unwrap().push(entry);
    }

    /// Removes `writer` from the registry, if present.
    ///
    /// Cancels any in-flight `enqueue_blocking` wait for `writer`
    /// started by [`Source::publish`], satisfying the teardown
    /// order in which a writer must stop receiving items before
    /// it is completed.
    pub fn remove_writer(&self, writer: &Writer<T>) {
        let mut writers = self.inner.writers.lock().unwrap();
        if let Some(pos) = writers.iter().position(|e| e.writer.is_same(writer)) {
            let entry = writers.remove(pos);
            entry.cancel.cancel();
        }
    }

    /// Fans `item` out to every attached writer whose predicate
    /// (if any) accepts it.
    ///
    /// Subscriptions under [`crate::BufferPolicy::BoundedWait`]
    /// suspend this call until space is available (or the
    /// subscription is detached); every other subscriber is
    /// delivered to without waiting on that one, matching the
    /// "best-effort per subscriber" fan-out contract.
    pub async fn publish(&self, item: T) {
        if self.inner.terminated.load(Ordering::SeqCst) {
            return;
        }

        let snapshot: Vec<WriterEntry<T>> = self.inner.writers.lock().unwrap().clone();
        let mut pending = Vec::new();

        for entry in snapshot {
            if let Some(predicate) = &entry.predicate {
                let accepted = catch_unwind(AssertUnwindSafe(|| predicate(&item)));
                match accepted {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(_) => {
                        self.inner.diagnostics.predicate_error(&self.inner.name);
                        continue;
                    }
                }
            }

            match entry.writer.try_enqueue(item.clone()) {
                EnqueueOutcome::Accepted => {}
                EnqueueOutcome::RejectedClosed(_) => {
                    self.inner
                        .diagnostics
                        .buffer_rejected(&self.inner.name, RejectReason::Closed);
                }
                EnqueueOutcome::RejectedFull(returned) => {
                    pending.push(self.deliver_full(entry, returned));
                }
            }
        }

        if !pending.is_empty() {
            futures_util::future::join_all(pending).await;
        }
    }

    /// Resolves a full-buffer rejection for one subscription:
    /// waits for space under `BoundedWait`, or reports the
    /// rejection to diagnostics under `fail`/`drop-newest`.
    async fn deliver_full(&self, entry: WriterEntry<T>, item: T) {
        match entry.writer.enqueue_blocking(item, &entry.cancel).await {
            BlockingOutcome::Accepted => {}
            BlockingOutcome::Cancelled(_) => {
                // The subscription was detached mid-wait; the
                // item was neither delivered nor silently lost —
                // this call simply stops waiting on it.
            }
            BlockingOutcome::Full(_) => {
                self.inner
                    .diagnostics
                    .buffer_rejected(&self.inner.name, RejectReason::Full);
            }
            BlockingOutcome::Closed(_) => {
                self.inner
                    .diagnostics
                    .buffer_rejected(&self.inner.name, RejectReason::Closed);
            }
        }
    }

    /// Marks end-of-stream, completing every attached writer. Idempotent.
    pub fn complete(&self) {
        if self
            .inner
            .terminated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.shutdown.cancel();
            let writers = std::mem::take(&mut *self.inner.writers.lock().unwrap());
            for entry in writers {
                entry.writer.complete_ok();
            }
        }
    }

    /// Terminates with `message`, faulting every attached writer
    /// with the same error. Idempotent and mutually exclusive
    /// with [`Source::complete`].
    pub fn fault(&self, message: impl Into<String>) {
        if self
            .inner
            .terminated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let message = message.into();
            self.inner.diagnostics.producer_fault(&self.inner.name, &message);
            let error = FlowError::ProducerFault {
                source_name: self.inner.name.to_string(),
                message,
            };
            self.inner.shutdown.cancel();
            let writers = std::mem::take(&mut *self.inner.writers.lock().unwrap());
            for entry in writers {
                entry.writer.complete_err(error.clone());
            }
        }
    }
}
