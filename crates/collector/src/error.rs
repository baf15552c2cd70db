use std::time::Duration;

use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// No valid record appeared before the budget ran out and the
    /// caller required one.
    #[error(
        "no cluster info for `{cluster_name}` after {attempts} poll(s) over {waited:?} (last: {last_status})"
    )]
    NoClusterInfo {
        /// The cluster that was being collected for.
        cluster_name: String,
        /// Number of channel polls made.
        attempts: u32,
        /// Total time spent polling.
        waited: Duration,
        /// The last error or status observed.
        last_status: String,
    },
}
