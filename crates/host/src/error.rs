use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// systemctl/journalctl exited non-zero for a control operation.
    #[error("{command} {unit} exited with {status}")]
    ControlFailed {
        /// The command that was run.
        command: &'static str,
        /// The unit it was run against.
        unit: String,
        /// Its exit status.
        status: std::process::ExitStatus,
    },

    /// Failed to spawn a host command.
    #[error("failed to spawn {0}: {1}")]
    Spawn(&'static str, #[source] std::io::Error),

    /// The command produced non-utf8 output.
    #[error("failed to parse {0} output")]
    OutputParse(&'static str),

    /// Failed to remove a stale package-manager lock file.
    #[error("failed to clear lock file {path}: {source}")]
    LockClear {
        /// The lock file path.
        path: String,
        /// The underlying io error.
        source: std::io::Error,
    },
}
