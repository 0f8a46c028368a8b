//! Minimal sequential pull-side operators: `filter`, `take`, and
//! the terminal `for_each`.
//!
//! These wrap a [`Consumer`] directly rather than spawning a
//! driver task, since none of them need concurrency or
//! reordering — they run entirely on the caller's own pull.

use confluence_core::{Consumer, ConsumerItem, FlowError};

/// Skips items `predicate` rejects; a panicking predicate is
/// treated the same way [`confluence_core::Source::publish`]
/// treats one: the offending item is dropped, not propagated.
pub struct Filter<T> {
    upstream: Consumer<T>,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: Send + Sync + Clone + 'static> Filter<T> {
    pub fn new(
        upstream: Consumer<T>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Filter {
            upstream,
            predicate: Box::new(predicate),
        }
    }

    pub async fn next(&self) -> ConsumerItem<T> {
        loop {
            match self.upstream.next().await {
                ConsumerItem::Value(value) => {
                    let accepted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        (self.predicate)(&value)
                    }))
                    .unwrap_or(false);
                    if accepted {
                        return ConsumerItem::Value(value);
                    }
                }
                other => return other,
            }
        }
    }
}

/// Yields at most `limit` values, then `Done` forever, without
/// waiting on or consuming any further upstream items.
pub struct Take<T> {
    upstream: Consumer<T>,
    limit: usize,
    taken: std::sync::atomic::AtomicUsize,
}

impl<T: Send + Sync + Clone + 'static> Take<T> {
    pub fn new(upstream: Consumer<T>, limit: usize) -> Self {
        Take {
            upstream,
            limit,
            taken: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub async fn next(&self) -> ConsumerItem<T> {
        use std::sync::atomic::Ordering;
        if self.taken.load(Ordering::SeqCst) >= self.limit {
            return ConsumerItem::Done;
        }
        match self.upstream.next().await {
            ConsumerItem::Value(value) => {
                self.taken.fetch_add(1, Ordering::SeqCst);
                ConsumerItem::Value(value)
            }
            other => other,
        }
    }
}

/// Drains `consumer` to completion, calling `action` on each
/// value. Returns `Ok(())` once the upstream completes, or the
/// first [`FlowError`] it surfaces.
pub async fn for_each<T, F>(consumer: Consumer<T>, mut action: F) -> Result<(), FlowError>
where
    T: Send + Sync + Clone + 'static,
    F: FnMut(T),
{
    loop {
        match consumer.next().await {
            ConsumerItem::Value(value) => action(value),
            ConsumerItem::Done => return Ok(()),
            ConsumerItem::Error(error) => return Err(error),
        }
    }
}
