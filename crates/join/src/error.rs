use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Every join attempt failed.
    #[error("join failed after {attempts} attempt(s): {last_error}")]
    JoinFailed {
        /// How many attempts were made.
        attempts: u32,
        /// The failure of the final attempt.
        last_error: String,
        /// Tail of the agent service log, when it could be captured.
        service_logs: Option<String>,
    },

    /// The install script could not be spawned.
    #[error("failed to spawn installer: {0}")]
    Spawn(#[source] std::io::Error),

    /// The install script exited non-zero.
    #[error("installer exited with {status}: {stderr}")]
    InstallFailed {
        /// Exit status of the installer.
        status: std::process::ExitStatus,
        /// Captured stderr tail.
        stderr: String,
    },
}
