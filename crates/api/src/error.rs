use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The API rejected the presented credential.
    #[error("api rejected credential (http {0})")]
    Unauthorized(u16),

    /// The API answered with an unexpected status.
    #[error("api returned http {0}")]
    UnexpectedStatus(u16),

    /// The request itself failed (connect, tls, timeout).
    #[error("api request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A response body did not parse.
    #[error("failed to parse api response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to run the local kubectl query.
    #[error("failed to spawn kubectl: {0}")]
    Spawn(#[source] std::io::Error),
}
