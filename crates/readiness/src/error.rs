use std::time::Duration;

use thiserror::Error;

use crate::Gate;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A readiness gate exhausted its budget.
    #[error("not ready: gate {gate} timed out after {waited:?} (last: {last_status})")]
    NotReady {
        /// The gate that timed out.
        gate: Gate,
        /// How long was spent waiting overall.
        waited: Duration,
        /// The last sub-status observed at that gate.
        last_status: String,
    },
}
