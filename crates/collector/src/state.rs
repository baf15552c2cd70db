//! Agent-local record of the last collection run.

use std::path::Path;

use chrono::{DateTime, Utc};
use muster_token::ClusterToken;
use serde::{Deserialize, Serialize};
use url::Url;

/// What the agent knows about its last collection attempt.
///
/// Written next to the agent's configuration so re-runs are idempotent
/// and a failed bring-up can be diagnosed from the node itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionState {
    /// Whether a credential was successfully collected.
    pub token_collected: bool,

    /// When this record was written.
    pub timestamp: DateTime<Utc>,

    /// The cluster collection ran for.
    pub cluster_name: String,

    /// The server URL that will be joined, on success.
    pub server_url: Option<Url>,

    /// The collected credential, on success.
    pub token: Option<String>,

    /// The last observed error, on failure.
    pub error: Option<String>,
}

impl CollectionState {
    /// State for a successful collection.
    #[must_use]
    pub fn collected(token: &ClusterToken) -> Self {
        Self {
            token_collected: true,
            timestamp: Utc::now(),
            cluster_name: token.cluster_name.clone(),
            server_url: Some(token.server_url.clone()),
            token: Some(token.token.clone()),
            error: None,
        }
    }

    /// State for an exhausted collection run.
    #[must_use]
    pub fn failed(cluster_name: &str, error: &str) -> Self {
        Self {
            token_collected: false,
            timestamp: Utc::now(),
            cluster_name: cluster_name.to_string(),
            server_url: None,
            token: None,
            error: Some(error.to_string()),
        }
    }

    /// Writes the state as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Reads a previously written state.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or does not parse.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
