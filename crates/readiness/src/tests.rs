use super::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use muster_api::{ClusterInfo, NodeState};

/// Service manager that reports active after N checks.
#[derive(Clone, Debug)]
struct ScriptedServices {
    active_after: u32,
    calls: Arc<AtomicU32>,
}

impl ScriptedServices {
    fn active_after(n: u32) -> Self {
        Self {
            active_after: n,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl muster_host::ServiceManager for ScriptedServices {
    type Error = muster_host::Error;

    async fn is_active(&self, _unit: &str) -> std::result::Result<bool, Self::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(call >= self.active_after)
    }

    async fn start(&self, _unit: &str) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    async fn stop(&self, _unit: &str) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    async fn logs(&self, _unit: &str, _lines: usize) -> std::result::Result<String, Self::Error> {
        Ok(String::new())
    }
}

/// Cluster API with per-gate scripted behavior.
#[derive(Clone, Debug)]
struct ScriptedApi {
    node_ready_after: u32,
    node_calls: Arc<AtomicU32>,
    accept_token: bool,
    api_serving: bool,
}

impl ScriptedApi {
    fn healthy() -> Self {
        Self {
            node_ready_after: 1,
            node_calls: Arc::new(AtomicU32::new(0)),
            accept_token: true,
            api_serving: true,
        }
    }
}

#[async_trait]
impl ClusterApi for ScriptedApi {
    type Error = muster_api::Error;

    async fn port_open(&self) -> bool {
        self.api_serving
    }

    async fn probe(&self) -> std::result::Result<ClusterInfo, Self::Error> {
        if self.api_serving {
            Ok(ClusterInfo {
                endpoint: "https://10.0.1.5:6443/".to_string(),
                version: Some("v1.30.2+k3s1".to_string()),
            })
        } else {
            Err(muster_api::Error::UnexpectedStatus(503))
        }
    }

    async fn node_ready(&self, _node_name: &str) -> std::result::Result<bool, Self::Error> {
        let call = self.node_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(call >= self.node_ready_after)
    }

    async fn list_nodes(&self, _token: &str) -> std::result::Result<Vec<NodeState>, Self::Error> {
        if self.accept_token {
            Ok(vec![NodeState {
                name: "server-1".to_string(),
                ready: true,
            }])
        } else {
            Err(muster_api::Error::Unauthorized(401))
        }
    }
}

const VALID_TOKEN: &str = "K1a2b3c4d5e6f7890123456789012345678901234";

fn options_with_token_file(dir: &tempfile::TempDir) -> VerifyOptions {
    let mut options = VerifyOptions::new("server-1");
    options.token_path = dir.path().join("node-token");
    options
}

#[tokio::test(start_paused = true)]
async fn happy_path_passes_all_gates() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_with_token_file(&dir);
    std::fs::write(&options.token_path, format!("{VALID_TOKEN}\n")).unwrap();

    // Service needs two polls, node needs two, everything else is up.
    let services = ScriptedServices::active_after(2);
    let mut api = ScriptedApi::healthy();
    api.node_ready_after = 2;

    let verifier = ReadinessVerifier::new(services, api, options);
    let report = verifier.verify().await;

    assert!(report.is_ready());
    assert_eq!(report.state, ReadinessState::Ready);
    assert_eq!(report.token.as_deref(), Some(VALID_TOKEN));
    assert_eq!(report.trace.len(), 5);
    assert!(report.trace.iter().all(|t| t.passed));
    // One 10s service wait plus one 15s node wait.
    assert_eq!(report.waited(), Duration::from_secs(25));

    let token = report.into_result().unwrap();
    assert_eq!(token, VALID_TOKEN);
}

#[tokio::test(start_paused = true)]
async fn malformed_token_does_not_advance_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let options = options_with_token_file(&dir);
    std::fs::write(&options.token_path, "short").unwrap();

    // Credential generator finishes writing during the fourth cycle.
    let token_path = options.token_path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        std::fs::write(&token_path, VALID_TOKEN).unwrap();
    });

    let verifier =
        ReadinessVerifier::new(ScriptedServices::active_after(1), ScriptedApi::healthy(), options);
    let report = verifier.verify().await;

    assert!(report.is_ready());
    let token_gate = report
        .trace
        .iter()
        .find(|t| t.gate == Gate::TokenPresent)
        .unwrap();
    // Three malformed reads, then the valid one on cycle four.
    assert_eq!(token_gate.attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn inactive_service_fails_the_first_gate() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options_with_token_file(&dir);
    options.timeout = Duration::from_secs(30);

    let verifier = ReadinessVerifier::new(
        ScriptedServices::active_after(u32::MAX),
        ScriptedApi::healthy(),
        options,
    );
    let report = verifier.verify().await;

    assert!(!report.is_ready());
    assert_eq!(report.state, ReadinessState::Failed);
    let failed = report.failed_gate().unwrap();
    assert_eq!(failed.gate, Gate::ServiceActive);
    // Overshoot bounded by one poll interval.
    assert!(failed.waited <= Duration::from_secs(40));

    assert!(matches!(
        report.into_result(),
        Err(Error::NotReady {
            gate: Gate::ServiceActive,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn rejected_token_is_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options_with_token_file(&dir);
    options.timeout = Duration::from_secs(30);
    std::fs::write(&options.token_path, VALID_TOKEN).unwrap();

    let mut api = ScriptedApi::healthy();
    api.accept_token = false;

    let verifier = ReadinessVerifier::new(ScriptedServices::active_after(1), api, options);
    let report = verifier.verify().await;

    // Well-formed but unauthenticated: must not come out ready.
    assert!(!report.is_ready());
    assert_eq!(report.failed_gate().unwrap().gate, Gate::TokenAuthenticated);
}

#[tokio::test(start_paused = true)]
async fn node_ready_gate_respects_attempt_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options_with_token_file(&dir);
    options.node_max_attempts = 3;
    options.timeout = Duration::from_secs(600);

    let mut api = ScriptedApi::healthy();
    api.node_ready_after = u32::MAX;

    let verifier = ReadinessVerifier::new(ScriptedServices::active_after(1), api, options);
    let report = verifier.verify().await;

    assert!(!report.is_ready());
    let failed = report.failed_gate().unwrap();
    assert_eq!(failed.gate, Gate::NodeReady);
    assert_eq!(failed.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn tiny_timeout_is_clamped_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options_with_token_file(&dir);
    options.timeout = Duration::from_secs(1);

    let verifier = ReadinessVerifier::new(
        ScriptedServices::active_after(u32::MAX),
        ScriptedApi::healthy(),
        options,
    );
    let report = verifier.verify().await;

    // The 1s request is clamped to the 30s floor: three 10s polls.
    assert!(!report.is_ready());
    assert!(report.waited() >= Duration::from_secs(30));
}
