use std::{num::NonZeroUsize, time::Duration};

/// Tuning knobs shared by every operator in this crate.
///
/// Mirrors the builder style `confluence_core::buffer::BufferPolicy`
/// uses for its own convenience constructors.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub(crate) concurrency: NonZeroUsize,
    pub(crate) timeout: Option<Duration>,
    pub(crate) continue_on_error: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            concurrency: NonZeroUsize::new(1).unwrap(),
            timeout: None,
            continue_on_error: false,
        }
    }
}

impl OperatorConfig {
    /// Maximum number of delegate invocations in flight at once.
    ///
    /// # Panics
    ///
    /// Iff `concurrency` is zero.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = NonZeroUsize::new(concurrency).expect("concurrency must be non-zero");
        self
    }

    /// Bounds how long a single delegate invocation may run before
    /// it is treated as [`crate::OperatorError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// When `true`, a delegate error drops only the offending item
    /// instead of terminating the operator's output.
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}
