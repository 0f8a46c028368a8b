// Use the README file as the root-level
// docs for this library.
#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod ordered;
pub mod pipeline;
pub mod unordered;

mod worker;

pub use config::OperatorConfig;
pub use error::OperatorError;
pub use ordered::map_ordered;
pub use pipeline::{for_each, Filter, Take};
pub use unordered::map_unordered;
