use thiserror::Error;

/// The result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating or decoding a cluster token payload.
#[derive(Debug, Error)]
pub enum Error {
    /// Payload decoded but a required field was absent or empty.
    #[error("payload missing required field `{0}`")]
    MissingField(&'static str),

    /// Token string shorter than the minimum credential length.
    #[error("token too short ({0} chars, need more than 40)")]
    TokenTooShort(usize),

    /// Token string does not start with `K` followed by a hex digit.
    #[error("token has invalid prefix (expected `K` then `0-9a-f`)")]
    TokenBadPrefix,

    /// Structured payload was not valid JSON.
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A line of a shell-sourceable payload had no `KEY=value` shape.
    #[error("unparseable line in env payload: `{0}`")]
    EnvLine(String),

    /// `server_url` field did not parse.
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    /// `server_ip` field did not parse.
    #[error("invalid server ip: {0}")]
    Ip(#[from] std::net::AddrParseError),

    /// `export_time` field did not parse.
    #[error("invalid export timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// `is_primary` field was neither true nor false.
    #[error("invalid boolean `{0}` in payload")]
    Bool(String),
}
