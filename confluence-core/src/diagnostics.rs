//! Process-wide diagnostics sink.
//!
//! The engine never consults implicit global state inside its hot
//! loops; instead, every fan-out/fan-in seam accepts an
//! `Arc<dyn Diagnostics>` handed to it at construction time, and a
//! single process-wide default (forwarding to [`tracing`]) is
//! installed lazily the first time one is needed. Call
//! [`install`] during process startup to replace the default
//! before any [`crate::Source`] or [`crate::Flow`] is built.

use std::sync::{Arc, OnceLock};

use crate::error::RejectReason;

/// Observes, without altering, the non-fatal events the engine
/// encounters while fanning items out to subscribers.
///
/// All methods have a no-op default so that implementers only
/// need to override the events they care about.
pub trait Diagnostics: Send + Sync + 'static {
    /// A publish into `source_name`'s buffer for a subscription
    /// was rejected under that subscription's buffer policy.
    fn buffer_rejected(&self, source_name: &str, reason: RejectReason) {
        let _ = (source_name, reason);
    }

    /// An acceptance predicate attached to `source_name` panicked;
    /// the item was treated as rejected for that subscriber.
    fn predicate_error(&self, source_name: &str) {
        let _ = source_name;
    }

    /// `source_name` faulted with `message`.
    fn producer_fault(&self, source_name: &str, message: &str) {
        let _ = (source_name, message);
    }

    /// A [`crate::Flow`]'s subscription topology changed
    /// (attach, detach, or dispose).
    fn topology_changed(&self, flow_name: &str) {
        let _ = flow_name;
    }
}

/// Default [`Diagnostics`] sink, forwarding every event to
/// [`tracing`] at a severity matching the event's impact.
#[derive(Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn buffer_rejected(&self, source_name: &str, reason: RejectReason) {
        tracing::warn!(source = source_name, %reason, "buffer rejected item");
    }

    fn predicate_error(&self, source_name: &str) {
        tracing::warn!(source = source_name, "acceptance predicate panicked");
    }

    fn producer_fault(&self, source_name: &str, message: &str) {
        tracing::error!(source = source_name, message, "source faulted");
    }

    fn topology_changed(&self, flow_name: &str) {
        tracing::debug!(flow = flow_name, "flow topology changed");
    }
}

static DIAGNOSTICS: OnceLock<Arc<dyn Diagnostics>> = OnceLock::new();

/// Installs `sink` as the process-wide diagnostics sink.
///
/// Returns `false` (and leaves the existing sink in place) if a
/// sink was already installed, mirroring `OnceLock`'s semantics.
/// Call this once, early, before any engine value is constructed.
pub fn install(sink: Arc<dyn Diagnostics>) -> bool {
    DIAGNOSTICS.set(sink).is_ok()
}

/// Returns the process-wide diagnostics sink, installing
/// [`TracingDiagnostics`] as the default on first use.
pub fn current() -> Arc<dyn Diagnostics> {
    DIAGNOSTICS
        .get_or_init(|| Arc::new(TracingDiagnostics))
        .clone()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingDiagnostics {
        rejections: AtomicUsize,
    }

    impl Diagnostics for CountingDiagnostics {
        fn buffer_rejected(&self, _source_name: &str, _reason: RejectReason) {
            self.rejections.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_sink_never_panics() {
        let sink = current();
        sink.buffer_rejected("a", RejectReason::Full);
        sink.predicate_error("a");
        sink.producer_fault("a", "boom");
        sink.topology_changed("flow");
    }

    #[test]
    fn custom_sink_observes_events() {
        let sink = Arc::new(CountingDiagnostics::default());
        sink.buffer_rejected("a", RejectReason::Full);
        sink.buffer_rejected("a", RejectReason::Closed);
        assert_eq!(2, sink.rejections.load(Ordering::SeqCst));
    }
}
