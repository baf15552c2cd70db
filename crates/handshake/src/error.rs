use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A handshake step did not complete.
    #[error("handshake step `{step}` failed: {detail}")]
    StepFailed {
        /// The step that failed.
        step: String,
        /// What the step last reported.
        detail: String,
    },
}
