use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote command exited non-zero.
    #[error("remote command on {host} exited with {status}: {stderr}")]
    NonZeroExitCode {
        /// Host the command ran on.
        host: String,
        /// Exit status of the remote command.
        status: std::process::ExitStatus,
        /// Captured stderr of the remote command.
        stderr: String,
    },

    /// The remote command produced non-utf8 output.
    #[error("failed to parse remote command output")]
    OutputParse,

    /// Failed to spawn the ssh client.
    #[error("failed to spawn ssh: {0}")]
    Spawn(#[source] std::io::Error),
}
