//! Read-only queries against the cluster control plane.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{ClusterInfo, NodeState};

use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;
use url::Url;

/// Read-only view of a cluster control plane.
///
/// Split along the readiness gates: a cheap TCP probe, an
/// unauthenticated local probe (distinguishes "port open" from "API
/// actually serving"), a server-local node-ready query, and an
/// authenticated node list used both to prove a token authenticates and
/// to count members after join.
#[async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    /// The error type for API operations.
    type Error: Debug + std::error::Error + Send + Sync;

    /// Whether the API port accepts TCP connections.
    async fn port_open(&self) -> bool;

    /// Unauthenticated local API call; succeeds only once the API is
    /// actually serving. Returns a short cluster snapshot for
    /// observability.
    async fn probe(&self) -> std::result::Result<ClusterInfo, Self::Error>;

    /// Whether the control plane reports the named node as Ready.
    async fn node_ready(&self, node_name: &str)
    -> std::result::Result<bool, Self::Error>;

    /// Authenticated read-only node list.
    async fn list_nodes(
        &self,
        token: &str,
    ) -> std::result::Result<Vec<NodeState>, Self::Error>;
}

/// `ClusterApi` implementation for a K3s control plane.
///
/// HTTP probes go over the API port (self-signed certificates are
/// accepted; the supervisor serves its own CA); the node-ready gate is
/// a server-local `k3s kubectl` query, which is how the control plane
/// is reachable before any credential exists.
#[derive(Clone, Debug)]
pub struct K3sApi {
    base_url: Url,
    client: reqwest::Client,
    k3s_bin: PathBuf,
    probe_timeout: Duration,
}

impl K3sApi {
    /// Creates an API client for the given base URL (scheme, host,
    /// port).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            base_url,
            client,
            k3s_bin: PathBuf::from("k3s"),
            probe_timeout: Duration::from_secs(2),
        })
    }

    /// Overrides the path to the k3s binary used for local queries.
    #[must_use]
    pub fn with_k3s_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.k3s_bin = bin.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ClusterApi for K3sApi {
    type Error = Error;

    async fn port_open(&self) -> bool {
        let Some(host) = self.base_url.host_str() else {
            return false;
        };
        let port = self.base_url.port_or_known_default().unwrap_or(6443);

        tokio::time::timeout(self.probe_timeout, TcpStream::connect((host, port)))
            .await
            .is_ok_and(|conn| conn.is_ok())
    }

    async fn probe(&self) -> Result<ClusterInfo> {
        let response = self.client.get(self.endpoint("/ping")).send().await?;
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus(response.status().as_u16()));
        }

        // Version is nice-to-have observability; its absence is not a
        // probe failure.
        let version = match self.client.get(self.endpoint("/version")).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<types::VersionInfo>()
                .await
                .ok()
                .map(|v| v.git_version),
            _ => None,
        };

        Ok(ClusterInfo {
            endpoint: self.base_url.to_string(),
            version,
        })
    }

    async fn node_ready(&self, node_name: &str) -> Result<bool> {
        let output = Command::new(&self.k3s_bin)
            .arg("kubectl")
            .arg("get")
            .arg("node")
            .arg(node_name)
            .arg("-o")
            .arg("json")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(Error::Spawn)?;

        if !output.status.success() {
            // Typically NotFound: the node has not registered yet.
            debug!("node {} not reported by control plane yet", node_name);
            return Ok(false);
        }

        let item: types::NodeItem = serde_json::from_slice(&output.stdout)?;
        Ok(item.is_ready())
    }

    async fn list_nodes(&self, token: &str) -> Result<Vec<NodeState>> {
        let response = self
            .client
            .get(self.endpoint("/api/v1/nodes"))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return Err(Error::UnexpectedStatus(status.as_u16()));
        }

        let body = response.text().await?;
        types::parse_node_list(&body)
    }
}
