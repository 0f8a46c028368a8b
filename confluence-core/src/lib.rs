// Use the README file as the root-level
// docs for this library.
#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod consumer;
pub mod diagnostics;
pub mod error;
pub mod flow;
pub mod source;

pub use buffer::BufferPolicy;
pub use consumer::{Consumer, ConsumerItem};
pub use error::FlowError;
pub use flow::Flow;
pub use source::{Predicate, Source};

/// Blanket trait for data flowing through a [`Flow`].
///
/// Items must be cloneable because a single published item is
/// fanned out to every attached subscription's own buffer.
pub trait Flows: Send + Sync + Clone + 'static {}
impl<T> Flows for T where T: Send + Sync + Clone + 'static {}
