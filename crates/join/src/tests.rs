use super::*;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

/// Installer that fails a scripted number of times, then succeeds.
#[derive(Clone, Debug)]
struct ScriptedInstaller {
    fail_first: u32,
    installs: Arc<AtomicU32>,
    cleanups: Arc<AtomicU32>,
    installed: Arc<AtomicBool>,
}

impl ScriptedInstaller {
    fn failing_first(n: u32) -> Self {
        Self {
            fail_first: n,
            installs: Arc::new(AtomicU32::new(0)),
            cleanups: Arc::new(AtomicU32::new(0)),
            installed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Installer for ScriptedInstaller {
    type Error = Error;

    async fn install_agent(
        &self,
        _command: &K3sJoinCommand,
    ) -> std::result::Result<(), Self::Error> {
        let call = self.installs.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(Error::Spawn(std::io::Error::other("scripted failure")));
        }
        self.installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self) -> std::result::Result<(), Self::Error> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        self.installed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Service manager mirroring the installer's state.
#[derive(Clone, Debug)]
struct MirrorServices {
    installed: Arc<AtomicBool>,
    stops: Arc<AtomicU32>,
    starts: Arc<AtomicU32>,
}

impl MirrorServices {
    fn tracking(installer: &ScriptedInstaller) -> Self {
        Self {
            installed: installer.installed.clone(),
            stops: Arc::new(AtomicU32::new(0)),
            starts: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl ServiceManager for MirrorServices {
    type Error = muster_host::Error;

    async fn is_active(&self, _unit: &str) -> std::result::Result<bool, Self::Error> {
        Ok(self.installed.load(Ordering::SeqCst))
    }

    async fn start(&self, _unit: &str) -> std::result::Result<(), Self::Error> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _unit: &str) -> std::result::Result<(), Self::Error> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logs(&self, _unit: &str, lines: usize) -> std::result::Result<String, Self::Error> {
        Ok(format!("last {lines} lines of k3s-agent journal"))
    }
}

fn command() -> K3sJoinCommand {
    K3sJoinCommand::new(
        "https://10.0.1.5:6443".parse().unwrap(),
        "K1a2b3c4d5e6f7890123456789012345678901234",
    )
}

#[tokio::test(start_paused = true)]
async fn exhausts_exactly_max_attempts_with_cleanup_between() {
    let installer = ScriptedInstaller::failing_first(u32::MAX);
    let services = MirrorServices::tracking(&installer);
    let orchestrator =
        JoinOrchestrator::new(installer.clone(), services, JoinOptions::default());

    let err = orchestrator.join(&command()).await.unwrap_err();

    assert_eq!(installer.installs.load(Ordering::SeqCst), 3);
    assert_eq!(installer.cleanups.load(Ordering::SeqCst), 3);

    let Error::JoinFailed {
        attempts,
        service_logs,
        ..
    } = err
    else {
        panic!("expected JoinFailed");
    };
    assert_eq!(attempts, 3);
    assert!(service_logs.unwrap().contains("k3s-agent journal"));
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_a_later_attempt_after_backoff() {
    let installer = ScriptedInstaller::failing_first(1);
    let services = MirrorServices::tracking(&installer);
    let orchestrator =
        JoinOrchestrator::new(installer.clone(), services, JoinOptions::default());

    let start = tokio::time::Instant::now();
    orchestrator.join(&command()).await.unwrap();

    assert_eq!(installer.installs.load(Ordering::SeqCst), 2);
    assert_eq!(installer.cleanups.load(Ordering::SeqCst), 1);
    // One 30s backoff between the two attempts.
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn install_without_active_service_is_a_failure() {
    let installer = ScriptedInstaller::failing_first(0);
    let services = MirrorServices::tracking(&installer);
    // Sever the mirror: service never reports active.
    let services = MirrorServices {
        installed: Arc::new(AtomicBool::new(false)),
        ..services
    };

    let mut options = JoinOptions::default();
    options.max_attempts = 1;
    let orchestrator = JoinOrchestrator::new(installer, services, options);

    let err = orchestrator.join(&command()).await.unwrap_err();
    let Error::JoinFailed { last_error, .. } = err else {
        panic!("expected JoinFailed");
    };
    assert!(last_error.contains("did not become active"));
}

#[tokio::test(start_paused = true)]
async fn lock_mitigation_runs_around_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let installer = ScriptedInstaller::failing_first(u32::MAX);
    let services = MirrorServices::tracking(&installer);

    let mitigation = PackageLockMitigation {
        lock_paths: vec![PathBuf::from(dir.path().join("absent.lock"))],
        competing_units: vec!["ssm-agent".to_string()],
        wait_budget: Duration::from_secs(60),
        poll: RetryPolicy::fixed(Duration::from_secs(5)),
    };

    let orchestrator =
        JoinOrchestrator::new(installer, services.clone(), JoinOptions::default())
            .with_lock_mitigation(mitigation);

    let _ = orchestrator.join(&command()).await;

    // Competing unit stopped before and restarted after each attempt.
    assert_eq!(services.stops.load(Ordering::SeqCst), 3);
    assert_eq!(services.starts.load(Ordering::SeqCst), 3);
}
