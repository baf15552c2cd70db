//! Server-side post-join verification: did the expected number of
//! nodes actually make it into the cluster?
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use muster_api::{ClusterApi, NodeState};
use muster_remote::RemoteExec;
use serde::Serialize;
use tracing::{info, warn};

/// How many journal lines to pull from a straggling agent.
const DIAG_LOG_LINES: u32 = 50;

/// Outcome of a membership check.
#[derive(Clone, Debug, Serialize)]
pub struct MembershipReport {
    /// The required minimum of ready nodes.
    pub expected_min_nodes: usize,

    /// Every node the control plane reported, ready or not.
    pub nodes: Vec<NodeState>,

    /// Per-host journal tails gathered for unready/missing agents.
    /// Best-effort: a fetch failure is recorded as a note, never as a
    /// verification failure.
    pub diagnostics: Vec<HostDiagnostics>,
}

/// Captured logs (or the reason they could not be captured) for one
/// straggling host.
#[derive(Clone, Debug, Serialize)]
pub struct HostDiagnostics {
    /// The host the logs were pulled from.
    pub host: String,
    /// Journal tail, or an explanation of why it is missing.
    pub logs: String,
}

impl MembershipReport {
    /// Nodes currently reporting Ready.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.ready).count()
    }
}

/// Checks cluster membership from the server side after agents join.
pub struct MembershipVerifier<A, R> {
    api: A,
    remote: Option<R>,
}

impl<A, R> MembershipVerifier<A, R>
where
    A: ClusterApi,
    R: RemoteExec,
{
    /// Creates a verifier without remote diagnostics.
    pub const fn new(api: A) -> Self {
        Self { api, remote: None }
    }

    /// Enables best-effort journal capture from straggling agents.
    #[must_use]
    pub fn with_remote(mut self, remote: R) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Verifies that at least `expected_min_nodes` nodes are Ready.
    ///
    /// `agent_hosts` are the hosts expected to have joined; on
    /// shortfall, each host that is missing or unready gets its agent
    /// journal tail pulled into the report.
    ///
    /// # Errors
    ///
    /// [`Error::ListNodes`] if the control plane cannot be queried, or
    /// [`Error::InsufficientNodes`] carrying the diagnostic report.
    pub async fn verify_membership(
        &self,
        token: &str,
        expected_min_nodes: usize,
        agent_hosts: &[String],
    ) -> Result<MembershipReport> {
        let nodes = self
            .api
            .list_nodes(token)
            .await
            .map_err(|e| Error::ListNodes(format!("{e:?}")))?;

        let mut report = MembershipReport {
            expected_min_nodes,
            nodes,
            diagnostics: Vec::new(),
        };

        let found = report.ready_count();
        if found >= expected_min_nodes {
            info!(
                "cluster converged: {}/{} ready node(s)",
                found, expected_min_nodes
            );
            return Ok(report);
        }

        warn!(
            "cluster short: {}/{} ready node(s)",
            found, expected_min_nodes
        );
        report.diagnostics = self.gather_diagnostics(&report, agent_hosts).await;

        Err(Error::InsufficientNodes {
            expected: expected_min_nodes,
            found,
            report: Box::new(report),
        })
    }

    /// Pulls agent journals from hosts that are missing or unready.
    async fn gather_diagnostics(
        &self,
        report: &MembershipReport,
        agent_hosts: &[String],
    ) -> Vec<HostDiagnostics> {
        let Some(remote) = &self.remote else {
            return Vec::new();
        };

        let mut diagnostics = Vec::new();
        for host in agent_hosts {
            let accounted = report
                .nodes
                .iter()
                .any(|n| n.ready && (n.name == *host || host.starts_with(&n.name)));
            if accounted {
                continue;
            }

            let lines = DIAG_LOG_LINES.to_string();
            let logs = match remote
                .exec(
                    host,
                    &["journalctl", "-u", "k3s-agent", "-n", &lines, "--no-pager"],
                )
                .await
            {
                Ok(logs) => logs,
                Err(e) => format!("log fetch failed: {e:?}"),
            };
            diagnostics.push(HostDiagnostics {
                host: host.clone(),
                logs,
            });
        }
        diagnostics
    }
}
