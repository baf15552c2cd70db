//! Top-level handshake flows: verify-then-publish on a server node,
//! collect-then-join on an agent node.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod report;

pub use error::{Error, Result};
pub use report::{HandshakeReport, HandshakeRole, HandshakeStep};

use std::net::IpAddr;

use chrono::Utc;
use muster_api::ClusterApi;
use muster_channel::PublicationChannel;
use muster_collector::{CollectOptions, CollectOutcome, Collector};
use muster_host::ServiceManager;
use muster_join::{Installer, JoinOrchestrator, K3sJoinCommand};
use muster_readiness::ReadinessVerifier;
use muster_token::ClusterToken;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

/// Facts about the publishing server that go into the credential
/// record. Passed explicitly rather than read from the host, so the
/// flow is testable without a real machine.
#[derive(Clone, Debug)]
pub struct ServerFacts {
    /// Cluster the credential belongs to.
    pub cluster_name: String,

    /// Hostname of this server node.
    pub node_name: String,

    /// FQDN agents should resolve.
    pub server_fqdn: String,

    /// Address of this server.
    pub server_ip: IpAddr,

    /// API endpoint agents join against.
    pub server_url: Url,

    /// Whether this is the primary server of an HA set.
    pub is_primary: bool,

    /// Free-form tag carried on the record.
    pub tag: String,
}

impl ServerFacts {
    /// Facts for a standalone (primary) server; the FQDN defaults to
    /// the node name and the tag to the cluster name.
    pub fn new(
        cluster_name: impl Into<String>,
        node_name: impl Into<String>,
        server_ip: IpAddr,
        server_url: Url,
    ) -> Self {
        let cluster_name = cluster_name.into();
        let node_name = node_name.into();
        Self {
            server_fqdn: node_name.clone(),
            tag: cluster_name.clone(),
            cluster_name,
            node_name,
            server_ip,
            server_url,
            is_primary: true,
        }
    }

    /// Overrides the FQDN.
    #[must_use]
    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.server_fqdn = fqdn.into();
        self
    }

    /// Marks this server as a secondary member of an HA set.
    #[must_use]
    pub const fn secondary(mut self) -> Self {
        self.is_primary = false;
        self
    }
}

/// Server-side flow: run the readiness gate chain and, only once it
/// passes, publish the credential record.
///
/// A failed readiness run leaves the channel untouched, so agents keep
/// polling instead of joining against a half-up server.
pub struct ServerHandshake<M, A, C> {
    verifier: ReadinessVerifier<M, A>,
    channel: C,
    facts: ServerFacts,
}

impl<M, A, C> ServerHandshake<M, A, C>
where
    M: ServiceManager,
    A: ClusterApi,
    C: PublicationChannel,
{
    /// Creates the flow over the given seams.
    pub const fn new(verifier: ReadinessVerifier<M, A>, channel: C, facts: ServerFacts) -> Self {
        Self {
            verifier,
            channel,
            facts,
        }
    }

    /// Runs verify-then-publish, returning a step-by-step report.
    pub async fn run(&self) -> HandshakeReport {
        let mut report = HandshakeReport::new(HandshakeRole::Server);

        let started = Instant::now();
        let readiness = self.verifier.verify().await;
        let elapsed = started.elapsed();
        if !readiness.is_ready() {
            let detail = readiness.failed_gate().map_or_else(
                || "readiness did not complete".to_string(),
                |failed| format!("gate {} gave up: {}", failed.gate, failed.last_status),
            );
            warn!("not publishing credential for `{}`", self.facts.cluster_name);
            report.fail("verify-readiness", elapsed, detail);
            return report;
        }
        let Some(token) = readiness.token.clone() else {
            report.fail("verify-readiness", elapsed, "no token captured");
            return report;
        };
        report.pass(
            "verify-readiness",
            elapsed,
            readiness
                .cluster_info
                .clone()
                .unwrap_or_else(|| "all gates passed".to_string()),
        );

        let started = Instant::now();
        let record = self.assemble(token);
        match self.publish(&record).await {
            Ok(()) => {
                info!("published credential `{}`", record.record_key());
                report.pass(
                    "publish-credential",
                    started.elapsed(),
                    format!("record `{}`", record.record_key()),
                );
            }
            Err(detail) => report.fail("publish-credential", started.elapsed(), detail),
        }
        report
    }

    fn assemble(&self, token: String) -> ClusterToken {
        ClusterToken {
            cluster_name: self.facts.cluster_name.clone(),
            server_fqdn: self.facts.server_fqdn.clone(),
            server_ip: self.facts.server_ip,
            server_url: self.facts.server_url.clone(),
            server_node: self.facts.node_name.clone(),
            is_primary: self.facts.is_primary,
            token,
            export_time: Utc::now(),
            tag: self.facts.tag.clone(),
        }
    }

    async fn publish(&self, record: &ClusterToken) -> std::result::Result<(), String> {
        record.validate().map_err(|e| e.to_string())?;
        self.channel
            .publish(record)
            .await
            .map_err(|e| format!("publish failed: {e}"))
    }
}

/// Agent-side flow: collect the credential off the channel, then drive
/// the bounded join loop with it.
pub struct AgentHandshake<C, I, M> {
    collector: Collector<C>,
    orchestrator: JoinOrchestrator<I, M>,
    options: CollectOptions,
    node_name: String,
    agent_version: Option<String>,
}

impl<C, I, M> AgentHandshake<C, I, M>
where
    C: PublicationChannel,
    I: Installer,
    M: ServiceManager,
{
    /// Creates the flow over the given seams.
    pub const fn new(
        channel: Collector<C>,
        orchestrator: JoinOrchestrator<I, M>,
        options: CollectOptions,
        node_name: String,
    ) -> Self {
        Self {
            collector: channel,
            orchestrator,
            options,
            node_name,
            agent_version: None,
        }
    }

    /// Pins the agent version passed to the installer.
    #[must_use]
    pub fn with_agent_version(mut self, version: impl Into<String>) -> Self {
        self.agent_version = Some(version.into());
        self
    }

    /// Runs collect-then-join, returning a step-by-step report.
    pub async fn run(&self) -> HandshakeReport {
        let mut report = HandshakeReport::new(HandshakeRole::Agent);

        let started = Instant::now();
        let token = match self.collector.collect(&self.options).await {
            Ok(CollectOutcome::Collected(token)) => {
                report.pass(
                    "collect-credential",
                    started.elapsed(),
                    format!("credential from `{}`", token.server_node),
                );
                token
            }
            Ok(CollectOutcome::ProceedWithoutToken) => {
                report.pass(
                    "collect-credential",
                    started.elapsed(),
                    "no credential within budget, proceeding without join",
                );
                return report;
            }
            Err(e) => {
                report.fail("collect-credential", started.elapsed(), e.to_string());
                return report;
            }
        };

        let mut command = K3sJoinCommand::new(token.server_url.clone(), token.token.clone())
            .with_node_name(&self.node_name);
        if let Some(version) = &self.agent_version {
            command = command.with_version(version);
        }

        let started = Instant::now();
        match self.orchestrator.join(&command).await {
            Ok(()) => {
                info!("agent {} joined `{}`", self.node_name, token.cluster_name);
                report.pass(
                    "join-cluster",
                    started.elapsed(),
                    format!("joined via {}", token.server_url),
                );
            }
            Err(e) => report.fail("join-cluster", started.elapsed(), e.to_string()),
        }
        report
    }
}
