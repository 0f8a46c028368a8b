//! Wraps a push-style callback registration as a [`Source`]: a
//! synchronous `push` that hands items to an async pump task.

use confluence_core::Source;
use tokio::sync::mpsc;

/// The synchronous half of a callback adapter; hand this to
/// whatever external API expects a plain callback.
pub struct CallbackSource<T> {
    sender: mpsc::UnboundedSender<T>,
}

impl<T> Clone for CallbackSource<T> {
    fn clone(&self) -> Self {
        CallbackSource {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Send + Sync + Clone + 'static> CallbackSource<T> {
    /// Builds a linked `(CallbackSource, Source)` pair. The
    /// `Source` completes once every `CallbackSource` clone has
    /// been dropped.
    pub fn new(name: impl Into<String>) -> (CallbackSource<T>, Source<T>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<T>();
        let source = Source::new(name);
        let pump_source = source.clone();
        tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                pump_source.publish(item).await;
            }
            tracing::debug!(name = pump_source.name(), "callback adapter dropped");
            pump_source.complete();
        });
        (CallbackSource { sender }, source)
    }

    /// Hands `item` to the pump task from synchronous calling
    /// code. Returns `false` once the `Source` side has stopped
    /// accepting further pushes (every `CallbackSource` clone was
    /// already dropped).
    pub fn push(&self, item: T) -> bool {
        self.sender.send(item).is_ok()
    }
}
