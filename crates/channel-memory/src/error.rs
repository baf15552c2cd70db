use muster_channel::ChannelError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
#[error("memory channel error")]
pub struct Error;

impl ChannelError for Error {}
