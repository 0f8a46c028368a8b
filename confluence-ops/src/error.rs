use confluence_core::FlowError;
use snafu::Snafu;

/// Enumeration of non-retryable errors an operator may surface.
///
/// Refer to the [crate] docs for more info.
#[derive(Debug, Snafu, Clone)]
pub enum OperatorError {
    /// The upstream [`confluence_core::Consumer`] surfaced an error.
    #[snafu(display("upstream flow error: {source}"))]
    Upstream { source: FlowError },

    /// An operator's delegate returned an error for one item.
    ///
    /// With `continue_on_error`, the offending item is dropped and
    /// this never reaches the operator's output; otherwise it
    /// terminates the operator's output.
    #[snafu(display("operator delegate failed: {message}"))]
    Delegate { message: String },

    /// A delegate did not complete within its per-operation timeout.
    #[snafu(display("operator delegate timed out"))]
    Timeout,
}
