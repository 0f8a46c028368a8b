use snafu::Snafu;

/// Enumeration of non-retryable errors that may
/// surface while publishing into, or pulling from,
/// a [`crate::Flow`].
///
/// Refer to the [crate] docs for more info.
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
pub enum FlowError {
    /// A [`crate::Source`] faulted; every [`crate::Writer`]
    /// attached to it observes the same message exactly once.
    #[snafu(display("source {source_name:?} faulted: {message}"))]
    ProducerFault { source_name: String, message: String },

    /// A publish was not accepted under the attached
    /// subscription's buffer policy.
    ///
    /// Never terminates the [`crate::Source`] or the
    /// [`crate::Flow`]; reported to diagnostics only.
    #[snafu(display("buffer for {source_name:?} rejected an item: {reason}"))]
    BufferRejected {
        source_name: String,
        reason: RejectReason,
    },

    /// Attempted to use a [`crate::Flow`] or
    /// [`crate::Consumer`] after it was disposed.
    #[snafu(display("the flow has already been disposed"))]
    Disposed,
}

/// Reasons a [`FlowError::BufferRejected`] may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The buffer was at capacity under a
    /// policy that does not wait for space.
    Full,
    /// The buffer's writer end was already completed or faulted.
    Closed,
}

impl core::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RejectReason::Full => write!(f, "buffer is full"),
            RejectReason::Closed => write!(f, "buffer is closed"),
        }
    }
}
