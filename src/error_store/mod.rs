//! Validation failures and the accumulator that collects them.
//!
//! Errors found during one dump or load pass are collected, never
//! short-circuited, and raised once as a single [`ValidationError`].

mod messages;
mod store;
mod validation;

pub use messages::{merge_errors, ErrorKey, ErrorMessages, SCHEMA};
pub use store::ErrorStore;
pub use validation::ValidationError;
