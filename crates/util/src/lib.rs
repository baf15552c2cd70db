//! Shared polling helpers: retry/backoff policies and deadline bookkeeping.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod backoff;
mod deadline;

pub use backoff::RetryPolicy;
pub use deadline::Deadline;
