use muster_channel::ChannelError;
use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Publishing is not possible through a discovery-only channel.
    #[error("scan channel is discovery-only; publish via the fs channel")]
    Unsupported,
}

impl ChannelError for Error {}
