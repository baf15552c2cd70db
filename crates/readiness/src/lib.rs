//! Server-side readiness verification: the gate chain that must pass
//! before a join credential may be published.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod report;

pub use error::{Error, Result};
pub use report::{GateTrace, ReadinessReport};

use std::path::PathBuf;
use std::time::Duration;

use muster_api::ClusterApi;
use muster_host::ServiceManager;
use muster_token::validate_token_str;
use muster_util::{Deadline, RetryPolicy};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Hard bounds on the overall verification budget.
const MIN_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// States of the server-local readiness machine.
///
/// Transient and recomputed on every run; the only transitions are
/// forward through the gates, to `Failed` on budget exhaustion, or a
/// restart from `Unstarted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReadinessState {
    /// No verification has run.
    Unstarted,
    /// The cluster service is active.
    ServiceActive,
    /// The control plane reports this node Ready.
    NodeReady,
    /// The token file exists and is well-formed.
    TokenPresent,
    /// The token was accepted by the API.
    TokenAuthenticated,
    /// The API port is open and the API is serving.
    ApiReachable,
    /// Terminal success: safe to publish.
    Ready,
    /// Terminal failure: some gate exhausted the budget.
    Failed,
}

/// The verification gates, in chain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Gate {
    /// Cluster service is running.
    ServiceActive,
    /// Control plane reports the node Ready.
    NodeReady,
    /// Token file present and well-formed.
    TokenPresent,
    /// Token accepted by an authenticated API call.
    TokenAuthenticated,
    /// API port open and API serving.
    ApiReachable,
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ServiceActive => "service-active",
            Self::NodeReady => "node-ready",
            Self::TokenPresent => "token-present",
            Self::TokenAuthenticated => "token-authenticated",
            Self::ApiReachable => "api-reachable",
        };
        write!(f, "{name}")
    }
}

impl Gate {
    const fn passed_state(self) -> ReadinessState {
        match self {
            Self::ServiceActive => ReadinessState::ServiceActive,
            Self::NodeReady => ReadinessState::NodeReady,
            Self::TokenPresent => ReadinessState::TokenPresent,
            Self::TokenAuthenticated => ReadinessState::TokenAuthenticated,
            Self::ApiReachable => ReadinessState::ApiReachable,
        }
    }
}

/// Options for a verification run.
#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// The cluster service unit.
    pub service_unit: String,

    /// This node's name as the control plane knows it.
    pub node_name: String,

    /// Where the credential generator writes the token.
    pub token_path: PathBuf,

    /// Overall budget; clamped to 30–600s.
    pub timeout: Duration,

    /// Pacing of the service-active checks.
    pub service_poll: RetryPolicy,

    /// Pacing of the node-ready checks.
    pub node_poll: RetryPolicy,

    /// Cap on node-ready checks.
    pub node_max_attempts: u32,

    /// Pacing of the token, authentication, and API checks.
    pub token_poll: RetryPolicy,
}

impl VerifyOptions {
    /// Defaults for a K3s server node.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            service_unit: "k3s".to_string(),
            node_name: node_name.into(),
            token_path: PathBuf::from("/var/lib/rancher/k3s/server/node-token"),
            timeout: Duration::from_secs(300),
            service_poll: RetryPolicy::fixed(Duration::from_secs(10)),
            node_poll: RetryPolicy::fixed(Duration::from_secs(15)),
            node_max_attempts: 20,
            token_poll: RetryPolicy::fixed(Duration::from_secs(5)),
        }
    }
}

/// Outcome of a single gate check.
enum Check<T> {
    Pass(T, String),
    Pending(String),
}

/// Certifies that a freshly booted server's join token is safe to
/// publish.
///
/// Purely observational: polls local service state, the token file, and
/// the control-plane API, and never mutates anything remote. Gate
/// timeouts surface as a failed report, not a panic or hang, so the
/// caller can abort the wider deployment.
pub struct ReadinessVerifier<M, A> {
    services: M,
    api: A,
    options: VerifyOptions,
}

impl<M, A> ReadinessVerifier<M, A>
where
    M: ServiceManager,
    A: ClusterApi,
{
    /// Creates a verifier over the given seams.
    pub const fn new(services: M, api: A, options: VerifyOptions) -> Self {
        Self {
            services,
            api,
            options,
        }
    }

    /// Runs the full gate chain within the configured budget.
    ///
    /// Each gate polls until it passes, its attempt cap is hit, or the
    /// shared deadline expires; the first gate to give up terminates
    /// the run with a `Failed` report naming it.
    pub async fn verify(&self) -> ReadinessReport {
        let budget = self.options.timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
        let deadline = Deadline::after(budget);
        let mut report = ReadinessReport {
            state: ReadinessState::Unstarted,
            token: None,
            trace: Vec::new(),
            cluster_info: None,
        };

        info!(
            "verifying readiness of {} (budget {:?})",
            self.options.node_name, budget
        );

        // Gate 1: service active.
        let passed = self
            .run_gate(&mut report, &deadline, Gate::ServiceActive, None, || {
                self.check_service()
            })
            .await;
        if passed.is_none() {
            return report;
        }

        // Gate 2: node ready, bounded attempts on top of the deadline.
        let passed = self
            .run_gate(
                &mut report,
                &deadline,
                Gate::NodeReady,
                Some(self.options.node_max_attempts),
                || self.check_node_ready(),
            )
            .await;
        if passed.is_none() {
            return report;
        }

        // Gate 3: token present and well-formed.
        let Some(token) = self
            .run_gate(&mut report, &deadline, Gate::TokenPresent, None, || {
                self.check_token_file()
            })
            .await
        else {
            return report;
        };

        // Gate 4: token actually authenticates.
        let passed = self
            .run_gate(
                &mut report,
                &deadline,
                Gate::TokenAuthenticated,
                None,
                || self.check_token_auth(&token),
            )
            .await;
        if passed.is_none() {
            return report;
        }

        // Gate 5: API port open and API serving.
        let Some(info) = self
            .run_gate(&mut report, &deadline, Gate::ApiReachable, None, || {
                self.check_api()
            })
            .await
        else {
            return report;
        };

        report.state = ReadinessState::Ready;
        report.token = Some(token);
        report.cluster_info = Some(info);
        info!(
            "node {} ready after {:?}",
            self.options.node_name,
            deadline.elapsed()
        );
        report
    }

    /// Polls one gate until it passes or gives up, recording the trace.
    async fn run_gate<T, F, Fut>(
        &self,
        report: &mut ReadinessReport,
        deadline: &Deadline,
        gate: Gate,
        max_attempts: Option<u32>,
        mut check: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Check<T>>,
    {
        let poll = match gate {
            Gate::ServiceActive => self.options.service_poll,
            Gate::NodeReady => self.options.node_poll,
            _ => self.options.token_poll,
        };

        let mut attempts = 0;
        let mut last_status;
        loop {
            attempts += 1;
            match check().await {
                Check::Pass(value, status) => {
                    debug!("gate {} passed: {}", gate, status);
                    report.state = gate.passed_state();
                    report.trace.push(GateTrace {
                        gate,
                        attempts,
                        waited: deadline.elapsed(),
                        passed: true,
                        last_status: status,
                    });
                    return Some(value);
                }
                Check::Pending(status) => {
                    debug!("gate {} pending: {}", gate, status);
                    last_status = status;
                }
            }

            if max_attempts.is_some_and(|cap| attempts >= cap) {
                last_status = format!("{last_status} (attempt cap reached)");
                break;
            }
            if !deadline.sleep_capped(poll.delay(attempts - 1)).await {
                break;
            }
        }

        warn!("gate {} gave up: {}", gate, last_status);
        report.state = ReadinessState::Failed;
        report.trace.push(GateTrace {
            gate,
            attempts,
            waited: deadline.elapsed(),
            passed: false,
            last_status,
        });
        None
    }

    async fn check_service(&self) -> Check<()> {
        match self.services.is_active(&self.options.service_unit).await {
            Ok(true) => Check::Pass((), format!("{} active", self.options.service_unit)),
            Ok(false) => Check::Pending(format!("{} not active", self.options.service_unit)),
            Err(e) => Check::Pending(format!("service status unavailable: {e:?}")),
        }
    }

    async fn check_node_ready(&self) -> Check<()> {
        match self.api.node_ready(&self.options.node_name).await {
            Ok(true) => Check::Pass((), format!("node {} ready", self.options.node_name)),
            Ok(false) => Check::Pending(format!("node {} not ready", self.options.node_name)),
            Err(e) => Check::Pending(format!("node status unavailable: {e:?}")),
        }
    }

    async fn check_token_file(&self) -> Check<String> {
        let raw = match tokio::fs::read_to_string(&self.options.token_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Check::Pending("token file absent".to_string());
            }
            Err(e) => return Check::Pending(format!("token file unreadable: {e}")),
        };

        // A malformed token is logged distinctly from an absent one but
        // handled the same: the generator may be writing incrementally.
        match validate_token_str(&raw) {
            Ok(token) => Check::Pass(token.to_string(), "token well-formed".to_string()),
            Err(e) => {
                warn!("token file present but invalid: {}", e);
                Check::Pending(format!("token invalid: {e}"))
            }
        }
    }

    async fn check_token_auth(&self, token: &str) -> Check<()> {
        match self.api.list_nodes(token).await {
            Ok(nodes) => Check::Pass((), format!("token accepted, {} node(s)", nodes.len())),
            Err(e) => Check::Pending(format!("token not accepted: {e:?}")),
        }
    }

    async fn check_api(&self) -> Check<String> {
        if !self.api.port_open().await {
            return Check::Pending("api port closed".to_string());
        }
        match self.api.probe().await {
            Ok(info) => {
                let info = info.to_string();
                Check::Pass(info.clone(), format!("api serving: {info}"))
            }
            Err(e) => Check::Pending(format!("port open but api not serving: {e:?}")),
        }
    }
}

#[cfg(test)]
mod tests;
