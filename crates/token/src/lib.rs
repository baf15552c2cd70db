//! The join credential record a server publishes and agents collect.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod codec;
mod error;

pub use error::{Error, Result};

use std::net::IpAddr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Minimum credential length; anything this short is never a real token.
pub const MIN_TOKEN_LEN: usize = 41;

/// Identity under which a server publishes its credential.
///
/// Passed explicitly everywhere instead of being derived from ambient
/// host facts, so the publication key is testable without a real host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Name grouping all nodes of one cluster.
    pub cluster_name: String,

    /// Hostname of the publishing node.
    pub node_name: String,
}

impl NodeIdentity {
    /// Creates an identity from cluster and node names.
    pub fn new(cluster_name: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            node_name: node_name.into(),
        }
    }

    /// The publication key: `{cluster_name}_{node_name}`.
    ///
    /// Each server publishes under its own key, so HA servers never
    /// conflict and republication by the same server overwrites.
    #[must_use]
    pub fn record_key(&self) -> String {
        format!("{}_{}", self.cluster_name, self.node_name)
    }
}

/// The validated join credential a server exports.
///
/// Immutable once published; a re-export creates a new record under the
/// same `{cluster_name}_{node_name}` key. Carries no expiry — consumers
/// that cache it must re-check staleness via [`Self::export_time`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterToken {
    /// Name grouping all nodes of one cluster.
    pub cluster_name: String,

    /// Fully qualified domain name of the server.
    pub server_fqdn: String,

    /// Address agents should reach the server on.
    pub server_ip: IpAddr,

    /// Full join URL (scheme, host, port).
    pub server_url: Url,

    /// Hostname of the publishing server node.
    pub server_node: String,

    /// Whether this server initialized the cluster.
    pub is_primary: bool,

    /// The opaque join credential.
    pub token: String,

    /// When the record was exported.
    pub export_time: DateTime<Utc>,

    /// Grouping key for collection queries.
    pub tag: String,
}

impl ClusterToken {
    /// The identity this record was published under.
    #[must_use]
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(self.cluster_name.clone(), self.server_node.clone())
    }

    /// The publication key for this record.
    #[must_use]
    pub fn record_key(&self) -> String {
        self.identity().record_key()
    }

    /// Checks that every required field is present and the token string
    /// itself is a plausible credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] for an empty `cluster_name` or
    /// `server_node`, or a token validation error.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(Error::MissingField("cluster_name"));
        }
        if self.server_node.is_empty() {
            return Err(Error::MissingField("server_node"));
        }
        validate_token_str(&self.token)?;
        Ok(())
    }

    /// Encodes the record as pretty JSON.
    #[must_use]
    pub fn to_json_bytes(&self) -> Bytes {
        // Serialization of these field types cannot fail.
        Bytes::from(serde_json::to_vec_pretty(self).unwrap_or_default())
    }

    /// Encodes the record as a shell-sourceable `KEY="value"` script.
    #[must_use]
    pub fn to_env_bytes(&self) -> Bytes {
        codec::encode_env(self)
    }

    /// Decodes a payload in either encoding, auto-detected.
    ///
    /// # Errors
    ///
    /// Returns a decode error for malformed payloads, or
    /// [`Error::MissingField`] when a required field is absent.
    pub fn decode(payload: &Bytes) -> Result<Self> {
        codec::decode(payload)
    }
}

/// Validates a raw token string: trimmed, more than 40 characters,
/// starting with `K` followed by a lowercase hex digit.
///
/// Returns the trimmed token on success. The credential generator may
/// write the file incrementally, so callers treat failures here as
/// transient and keep polling.
///
/// # Errors
///
/// [`Error::TokenTooShort`] or [`Error::TokenBadPrefix`].
pub fn validate_token_str(raw: &str) -> Result<&str> {
    let token = raw.trim();
    if token.len() < MIN_TOKEN_LEN {
        return Err(Error::TokenTooShort(token.len()));
    }
    let bytes = token.as_bytes();
    if bytes[0] != b'K' || !matches!(bytes[1], b'0'..=b'9' | b'a'..=b'f') {
        return Err(Error::TokenBadPrefix);
    }
    Ok(token)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_token() -> ClusterToken {
        ClusterToken {
            cluster_name: "prod".to_string(),
            server_fqdn: "server-1.internal".to_string(),
            server_ip: "10.0.1.5".parse().unwrap(),
            server_url: "https://10.0.1.5:6443".parse().unwrap(),
            server_node: "server-1".to_string(),
            is_primary: true,
            token: "K1a2b3c4d5e6f7890123456789012345678901234".to_string(),
            export_time: "2026-08-30T12:00:00Z".parse().unwrap(),
            tag: "prod".to_string(),
        }
    }

    #[test]
    fn accepts_valid_token_strings() {
        let token = "K1a2b3c4d5e6f7890123456789012345678901234";
        assert_eq!(validate_token_str(token).unwrap(), token);

        // Surrounding whitespace is stripped.
        let padded = format!("  {token}\n");
        assert_eq!(validate_token_str(&padded).unwrap(), token);
    }

    #[test]
    fn rejects_short_tokens() {
        assert!(matches!(
            validate_token_str("short"),
            Err(Error::TokenTooShort(5))
        ));
        // Exactly 40 chars is still too short.
        let forty = format!("K1{}", "a".repeat(38));
        assert!(matches!(
            validate_token_str(&forty),
            Err(Error::TokenTooShort(40))
        ));
    }

    #[test]
    fn rejects_bad_prefixes() {
        let wrong_first = format!("X1{}", "a".repeat(40));
        assert!(matches!(
            validate_token_str(&wrong_first),
            Err(Error::TokenBadPrefix)
        ));
        // Second char must be lowercase hex.
        let wrong_second = format!("KZ{}", "a".repeat(40));
        assert!(matches!(
            validate_token_str(&wrong_second),
            Err(Error::TokenBadPrefix)
        ));
    }

    #[test]
    fn record_key_embeds_identity() {
        let token = sample_token();
        assert_eq!(token.record_key(), "prod_server-1");
        assert_eq!(
            NodeIdentity::new("prod", "server-2").record_key(),
            "prod_server-2"
        );
    }

    #[test]
    fn validate_rejects_empty_required_fields() {
        let mut token = sample_token();
        token.cluster_name = String::new();
        assert!(matches!(
            token.validate(),
            Err(Error::MissingField("cluster_name"))
        ));

        let mut token = sample_token();
        token.token = "short".to_string();
        assert!(token.validate().is_err());
    }
}
