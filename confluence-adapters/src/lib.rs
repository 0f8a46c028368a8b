// Use the README file as the root-level
// docs for this library.
#![doc = include_str!("../README.md")]

pub mod callback;
pub mod channel;
pub mod polling;
pub mod throttle;

pub use callback::CallbackSource;
pub use channel::from_channel;
pub use polling::{PollingAdapter, StopPredicate};
pub use throttle::{ThrottleAdapter, ThrottleOutcome};
