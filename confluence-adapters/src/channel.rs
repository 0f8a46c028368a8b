//! Wraps an external [`tokio::sync::mpsc`] channel as a [`Source`].

use confluence_core::Source;
use tokio::sync::mpsc;

/// Spawns a pump task that republishes everything received on
/// `receiver` to a new `Source`, completing it once `receiver`
/// closes.
pub fn from_channel<T: Send + Sync + Clone + 'static>(
    name: impl Into<String>,
    mut receiver: mpsc::Receiver<T>,
) -> Source<T> {
    let source = Source::new(name);
    let pump_source = source.clone();
    tokio::spawn(async move {
        while let Some(item) = receiver.recv().await {
            pump_source.publish(item).await;
        }
        tracing::debug!(name = pump_source.name(), "channel adapter's sender dropped");
        pump_source.complete();
    });
    source
}
