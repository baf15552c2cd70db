use thiserror::Error;

use crate::MembershipReport;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer ready nodes than expected.
    #[error("expected at least {expected} ready node(s), found {found}")]
    InsufficientNodes {
        /// The required minimum.
        expected: usize,
        /// Ready nodes actually observed.
        found: usize,
        /// Full report including per-host diagnostics.
        report: Box<MembershipReport>,
    },

    /// The node list itself could not be fetched.
    #[error("failed to list nodes: {0}")]
    ListNodes(String),
}
