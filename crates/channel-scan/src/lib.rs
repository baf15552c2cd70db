//! Fallback discovery channel: probe candidate hosts' API port on the
//! local subnet and fetch the dropped credential file over SSH.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cidr::Ipv4Cidr;
use muster_channel::PublicationChannel;
use muster_remote::RemoteExec;
use muster_token::{ClusterToken, NodeIdentity};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Discovery-only publication channel for deployments without a shared
/// record store.
///
/// The server side of this variant drops its record files locally (see
/// `muster-channel-fs`); agents probe each candidate host's API port
/// and, where it is open, list and fetch the dropped records over the
/// administrative channel. Hosts that do not respond, or respond but
/// carry no record, are skipped; candidates are tried in order and
/// every fetched payload is returned, so the collector can pick any
/// valid one.
#[derive(Debug)]
pub struct ScanChannel<R: RemoteExec> {
    candidates: Vec<String>,
    api_port: u16,
    drop_dir: String,
    probe_timeout: Duration,
    remote: Arc<R>,
}

// Not derived: the executor is behind an `Arc`, so cloning never needs
// `R: Clone`.
impl<R: RemoteExec> Clone for ScanChannel<R> {
    fn clone(&self) -> Self {
        Self {
            candidates: self.candidates.clone(),
            api_port: self.api_port,
            drop_dir: self.drop_dir.clone(),
            probe_timeout: self.probe_timeout,
            remote: Arc::clone(&self.remote),
        }
    }
}

impl<R: RemoteExec> ScanChannel<R> {
    /// Creates a channel scanning an explicit candidate host list.
    pub fn new(candidates: Vec<String>, api_port: u16, drop_dir: impl Into<String>, remote: R) -> Self {
        Self {
            candidates,
            api_port,
            drop_dir: drop_dir.into(),
            probe_timeout: Duration::from_secs(2),
            remote: Arc::new(remote),
        }
    }

    /// Creates a channel scanning every usable address of a subnet.
    pub fn across_subnet(
        subnet: Ipv4Cidr,
        api_port: u16,
        drop_dir: impl Into<String>,
        remote: R,
    ) -> Self {
        let first = subnet.first_address();
        let last = subnet.last_address();
        let candidates = subnet
            .iter()
            .addresses()
            // Skip network and broadcast addresses on real subnets.
            .filter(|addr| subnet.network_length() >= 31 || (*addr != first && *addr != last))
            .map(|addr| addr.to_string())
            .collect();

        Self::new(candidates, api_port, drop_dir, remote)
    }

    /// Overrides the per-host TCP probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    async fn port_open(&self, host: &str) -> bool {
        tokio::time::timeout(
            self.probe_timeout,
            TcpStream::connect((host, self.api_port)),
        )
        .await
        .is_ok_and(|conn| conn.is_ok())
    }

    /// Fetches every record for `cluster_name` dropped on one host.
    async fn fetch_from(&self, host: &str, cluster_name: &str) -> Vec<Bytes> {
        let listing = match self.remote.exec(host, &["ls", &self.drop_dir]).await {
            Ok(listing) => listing,
            Err(e) => {
                debug!("no records listable on {}: {:?}", host, e);
                return Vec::new();
            }
        };

        let prefix = format!("{cluster_name}_");
        let mut payloads = Vec::new();
        for name in listing.lines().map(str::trim) {
            if !name.starts_with(&prefix) || !name.ends_with(".env") {
                continue;
            }
            let path = format!("{}/{}", self.drop_dir, name);
            match self.remote.exec(host, &["cat", &path]).await {
                Ok(contents) => payloads.push(Bytes::from(contents)),
                Err(e) => debug!("failed to fetch {} from {}: {:?}", path, host, e),
            }
        }
        payloads
    }
}

#[async_trait]
impl<R: RemoteExec> PublicationChannel for ScanChannel<R> {
    type Error = Error;

    async fn publish(&self, _token: &ClusterToken) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn retract(&self, _identity: &NodeIdentity) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn query(&self, cluster_name: &str) -> Result<Vec<Bytes>> {
        let mut payloads = Vec::new();

        for host in &self.candidates {
            if !self.port_open(host).await {
                debug!("api port closed on candidate {}", host);
                continue;
            }

            let fetched = self.fetch_from(host, cluster_name).await;
            if !fetched.is_empty() {
                info!("found {} record(s) on {}", fetched.len(), host);
            }
            payloads.extend(fetched);
        }

        Ok(payloads)
    }
}
