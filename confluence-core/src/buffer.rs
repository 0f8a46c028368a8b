//! A single-producer, single-consumer FIFO with a capacity
//! policy and a terminal state, shared by exactly one
//! [`Writer`] and one [`Reader`].
//!
//! Refer to the [crate] docs for more info.

use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;

/// Capacity and overflow behavior of a [`Buffer`].
///
/// Modeled as a tagged variant (rather than an inheritance
/// hierarchy of buffer types) so every [`Writer`]/[`Reader`]
/// pair shares one uniform surface regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Always accepts; may grow without bound.
    Unbounded,
    /// The producer suspends until space is available.
    /// This is the primary backpressure policy.
    BoundedWait(NonZeroUsize),
    /// Evicts the oldest entry to make room; "latest wins".
    BoundedDropOldest(NonZeroUsize),
    /// Rejects the new item when full; "first wins".
    BoundedDropNewest(NonZeroUsize),
    /// Surfaces a rejection to the caller when full.
    BoundedFail(NonZeroUsize),
}

impl BufferPolicy {
    /// Convenience constructor for [`BufferPolicy::Unbounded`].
    pub fn unbounded() -> Self {
        BufferPolicy::Unbounded
    }

    /// Convenience constructor for [`BufferPolicy::BoundedWait`].
    ///
    /// # Panics
    ///
    /// Iff `capacity` is zero.
    pub fn bounded_wait(capacity: usize) -> Self {
        BufferPolicy::BoundedWait(NonZeroUsize::new(capacity).expect("capacity must be non-zero"))
    }

    /// Convenience constructor for [`BufferPolicy::BoundedDropOldest`].
    pub fn bounded_drop_oldest(capacity: usize) -> Self {
        BufferPolicy::BoundedDropOldest(
            NonZeroUsize::new(capacity).expect("capacity must be non-zero"),
        )
    }

    /// Convenience constructor for [`BufferPolicy::BoundedDropNewest`].
    pub fn bounded_drop_newest(capacity: usize) -> Self {
        BufferPolicy::BoundedDropNewest(
            NonZeroUsize::new(capacity).expect("capacity must be non-zero"),
        )
    }

    /// Convenience constructor for [`BufferPolicy::BoundedFail`].
    pub fn bounded_fail(capacity: usize) -> Self {
        BufferPolicy::BoundedFail(NonZeroUsize::new(capacity).expect("capacity must be non-zero"))
    }
}

/// Terminal state of a [`Buffer`].
#[derive(Debug, Clone)]
enum Terminal {
    Open,
    Ok,
    Err(FlowError),
}

struct Shared<T> {
    policy: BufferPolicy,
    queue: Mutex<VecDeque<T>>,
    terminal: Mutex<Terminal>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> Shared<T> {
    fn is_closed(&self) -> bool {
        !matches!(&*self.terminal.lock().unwrap(), Terminal::Open)
    }
}

/// Allocates a new [`Buffer`], returning its [`Writer`] and
/// [`Reader`] ends.
pub fn buffer<T>(policy: BufferPolicy) -> (Writer<T>, Reader<T>) {
    let shared = Arc::new(Shared {
        policy,
        queue: Mutex::new(VecDeque::new()),
        terminal: Mutex::new(Terminal::Open),
        not_empty: Notify::new(),
        not_full: Notify::new(),
    });
    (
        Writer {
            shared: shared.clone(),
        },
        Reader {
            shared,
            error_delivered: Arc::new(AtomicBool::new(false)),
        },
    )
}

/// Outcome of [`Writer::try_enqueue`].
#[derive(Debug)]
pub enum EnqueueOutcome<T> {
    Accepted,
    RejectedFull(T),
    RejectedClosed(T),
}

/// Outcome of [`Writer::enqueue_blocking`].
#[derive(Debug)]
pub enum BlockingOutcome<T> {
    Accepted,
    Cancelled(T),
    /// Rejected because the buffer is at capacity under a policy
    /// that does not wait for space (every policy but
    /// [`BufferPolicy::BoundedWait`]). Distinct from [`Self::Closed`]
    /// so a caller doesn't mistake "full" for "terminated".
    Full(T),
    /// The buffer's writer end was already completed or faulted.
    Closed(T),
}

/// Sender half of a [`Buffer`]; owned by a [`crate::Source`]'s
/// writer registry.
pub struct Writer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Writer<T> {
    fn clone(&self) -> Self {
        Writer {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Writer<T> {
    /// Returns `true` iff `self` and `other` are the two
    /// handles sharing one underlying buffer.
    pub fn is_same(&self, other: &Writer<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Tries to enqueue `item` without suspending.
    pub fn try_enqueue(&self, item: T) -> EnqueueOutcome<T> {
        if self.shared.is_closed() {
            return EnqueueOutcome::RejectedClosed(item);
        }

        let mut queue = self.shared.queue.lock().unwrap();
        match self.shared.policy {
            BufferPolicy::Unbounded => {
                queue.push_back(item);
                drop(queue);
                self.shared.not_empty.notify_one();
                EnqueueOutcome::Accepted
            }
            BufferPolicy::BoundedWait(capacity) => {
                if queue.len() < capacity.get() {
                    queue.push_back(item);
                    drop(queue);
                    self.shared.not_empty.notify_one();
                    EnqueueOutcome::Accepted
                } else {
                    EnqueueOutcome::RejectedFull(item)
                }
            }
            BufferPolicy::BoundedDropOldest(capacity) => {
                if queue.len() >= capacity.get() {
                    queue.pop_front();
                }
                queue.push_back(item);
                drop(queue);
                self.shared.not_empty.notify_one();
                EnqueueOutcome::Accepted
            }
            BufferPolicy::BoundedDropNewest(capacity) | BufferPolicy::BoundedFail(capacity) => {
                if queue.len() < capacity.get() {
                    queue.push_back(item);
                    drop(queue);
                    self.shared.not_empty.notify_one();
                    EnqueueOutcome::Accepted
                } else {
                    EnqueueOutcome::RejectedFull(item)
                }
            }
        }
    }

    /// Awaits and claims space, respecting `cancel`.
    ///
    /// Only meaningful under [`BufferPolicy::BoundedWait`]; under
    /// every other policy this degrades to a single
    /// [`Writer::try_enqueue`] call.
    pub async fn enqueue_blocking(&self, mut item: T, cancel: &CancellationToken) -> BlockingOutcome<T> {
        loop {
            // Register for the wakeup *before* trying again, so a
            // notification fired between the failed attempt and the
            // `.await` below is never missed.
            let not_full = self.shared.not_full.notified();
            match self.try_enqueue(item) {
                EnqueueOutcome::Accepted => return BlockingOutcome::Accepted,
                EnqueueOutcome::RejectedClosed(returned) => return BlockingOutcome::Closed(returned),
                EnqueueOutcome::RejectedFull(returned) => {
                    item = returned;
                    if !matches!(self.shared.policy, BufferPolicy::BoundedWait(_)) {
                        return BlockingOutcome::Full(item);
                    }
                    tokio::select! {
                        _ = not_full => {}
                        _ = cancel.cancelled() => return BlockingOutcome::Cancelled(item),
                    }
                }
            }
        }
    }

    /// Marks the buffer as completed-ok. Idempotent.
    pub fn complete_ok(&self) {
        let mut terminal = self.shared.terminal.lock().unwrap();
        if matches!(&*terminal, Terminal::Open) {
            *terminal = Terminal::Ok;
            drop(terminal);
            self.shared.not_empty.notify_waiters();
            self.shared.not_full.notify_waiters();
        }
    }

    /// Marks the buffer as completed-with-error. Idempotent.
    pub fn complete_err(&self, err: FlowError) {
        let mut terminal = self.shared.terminal.lock().unwrap();
        if matches!(&*terminal, Terminal::Open) {
            *terminal = Terminal::Err(err);
            drop(terminal);
            self.shared.not_empty.notify_waiters();
            self.shared.not_full.notify_waiters();
        }
    }
}

/// Outcome of [`Reader::recv`].
#[derive(Debug)]
pub enum ReaderItem<T> {
    Item(T),
    Closed,
    Faulted(FlowError),
}

/// Receiver half of a [`Buffer`]; owned by a [`crate::Flow`].
///
/// `Clone` produces another handle to the *same* logical reader
/// (sharing the underlying queue and the "error delivered exactly
/// once" flag) rather than a second, independent reader — there is
/// still only one reader per buffer, just possibly multiple Rust
/// values referencing it.
pub struct Reader<T> {
    shared: Arc<Shared<T>>,
    error_delivered: Arc<AtomicBool>,
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Reader {
            shared: self.shared.clone(),
            error_delivered: self.error_delivered.clone(),
        }
    }
}

impl<T> Reader<T> {
    /// Returns `true` iff `self` and `other` are handles to the
    /// same underlying reader.
    pub fn is_same(&self, other: &Reader<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn check_terminal(&self) -> Option<ReaderItem<T>> {
        let terminal = self.shared.terminal.lock().unwrap();
        match &*terminal {
            Terminal::Open => None,
            Terminal::Ok => Some(ReaderItem::Closed),
            Terminal::Err(e) => {
                if self.error_delivered.swap(true, Ordering::SeqCst) {
                    Some(ReaderItem::Closed)
                } else {
                    Some(ReaderItem::Faulted(e.clone()))
                }
            }
        }
    }

    /// Awaits the next item, or the buffer's terminal state.
    ///
    /// Cancel-safe: may be dropped mid-await (e.g. inside a
    /// `tokio::select!` branch that lost the race) without
    /// losing an already-enqueued item.
    pub async fn recv(&self) -> ReaderItem<T> {
        loop {
            let notified = self.shared.not_empty.notified();

            if let Some(item) = self.shared.queue.lock().unwrap().pop_front() {
                self.shared.not_full.notify_one();
                return ReaderItem::Item(item);
            }

            if let Some(terminal) = self.check_terminal() {
                return terminal;
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let (writer, reader) = buffer::<u32>(BufferPolicy::unbounded());
        for i in 0..5 {
            assert!(matches!(writer.try_enqueue(i), EnqueueOutcome::Accepted));
        }
        for i in 0..5 {
            match reader.recv().await {
                ReaderItem::Item(v) => assert_eq!(i, v),
                other => panic!("expected item, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn bounded_wait_rejects_when_full_then_accepts_blocking() {
        let (writer, reader) = buffer::<u32>(BufferPolicy::bounded_wait(1));
        assert!(matches!(writer.try_enqueue(1), EnqueueOutcome::Accepted));
        assert!(matches!(writer.try_enqueue(2), EnqueueOutcome::RejectedFull(2)));

        let cancel = CancellationToken::new();
        let writer2 = writer.clone();
        let cancel2 = cancel.clone();
        let wait = tokio::spawn(async move {
            writer2.enqueue_blocking(2, &cancel2).await
        });

        // Drain the one slot; the waiting producer should then succeed.
        assert!(matches!(reader.recv().await, ReaderItem::Item(1)));
        assert!(matches!(wait.await.unwrap(), BlockingOutcome::Accepted));
        assert!(matches!(reader.recv().await, ReaderItem::Item(2)));
    }

    #[tokio::test]
    async fn bounded_wait_cancellation_returns_item() {
        let (writer, _reader) = buffer::<u32>(BufferPolicy::bounded_wait(1));
        assert!(matches!(writer.try_enqueue(1), EnqueueOutcome::Accepted));

        let cancel = CancellationToken::new();
        cancel.cancel();
        match writer.enqueue_blocking(2, &cancel).await {
            BlockingOutcome::Cancelled(item) => assert_eq!(2, item),
            other => panic!("expected cancelled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drop_oldest_evicts_head() {
        let (writer, reader) = buffer::<u32>(BufferPolicy::bounded_drop_oldest(2));
        writer.try_enqueue(1);
        writer.try_enqueue(2);
        writer.try_enqueue(3); // evicts 1
        assert!(matches!(reader.recv().await, ReaderItem::Item(2)));
        assert!(matches!(reader.recv().await, ReaderItem::Item(3)));
    }

    #[tokio::test]
    async fn drop_newest_rejects_new_item() {
        let (writer, reader) = buffer::<u32>(BufferPolicy::bounded_drop_newest(1));
        writer.try_enqueue(1);
        assert!(matches!(writer.try_enqueue(2), EnqueueOutcome::RejectedFull(2)));
        assert!(matches!(reader.recv().await, ReaderItem::Item(1)));
    }

    #[tokio::test]
    async fn completion_drains_then_closes() {
        let (writer, reader) = buffer::<u32>(BufferPolicy::unbounded());
        writer.try_enqueue(1);
        writer.complete_ok();
        writer.complete_ok(); // idempotent
        assert!(matches!(reader.recv().await, ReaderItem::Item(1)));
        assert!(matches!(reader.recv().await, ReaderItem::Closed));
        assert!(matches!(reader.recv().await, ReaderItem::Closed));
    }

    #[tokio::test]
    async fn fault_is_delivered_exactly_once() {
        let (writer, reader) = buffer::<u32>(BufferPolicy::unbounded());
        writer.complete_err(FlowError::ProducerFault {
            source_name: "a".into(),
            message: "boom".into(),
        });
        assert!(matches!(reader.recv().await, ReaderItem::Faulted(_)));
        assert!(matches!(reader.recv().await, ReaderItem::Closed));
    }
}
