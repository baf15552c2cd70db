//! Agent-side join orchestration: bounded retries around the installer
//! with cleanup of partial state between attempts.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod command;
mod error;
mod install;

pub use command::K3sJoinCommand;
pub use error::{Error, Result};
pub use install::K3sInstaller;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use muster_host::{PackageLockMitigation, ServiceManager};
use muster_util::RetryPolicy;
use tracing::{info, warn};

/// Installs and removes the cluster agent on this host.
#[async_trait]
pub trait Installer: Send + Sync + 'static {
    /// The error type for install operations.
    type Error: Debug + std::error::Error + Send + Sync;

    /// Installs and starts the agent against the given server.
    async fn install_agent(
        &self,
        command: &K3sJoinCommand,
    ) -> std::result::Result<(), Self::Error>;

    /// Removes partial install state left by a failed attempt.
    async fn cleanup(&self) -> std::result::Result<(), Self::Error>;
}

/// Options for the join loop.
#[derive(Clone, Debug)]
pub struct JoinOptions {
    /// Maximum install attempts.
    pub max_attempts: u32,

    /// Sleep between attempts.
    pub backoff: Duration,

    /// The agent service unit whose activity defines success.
    pub service_unit: String,

    /// Pacing of the post-install service-active checks.
    pub settle_poll: RetryPolicy,

    /// How many service-active checks to make per attempt.
    pub settle_attempts: u32,

    /// How many log lines to capture on final failure.
    pub log_lines: usize,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(30),
            service_unit: "k3s-agent".to_string(),
            settle_poll: RetryPolicy::fixed(Duration::from_secs(5)),
            settle_attempts: 6,
            log_lines: 50,
        }
    }
}

/// Drives the agent-side join with bounded retries.
///
/// Each attempt: re-run the package-lock mitigation, install, then wait
/// for the agent service to report active. A failed attempt is cleaned
/// up before the next one so half-installed state cannot poison it.
pub struct JoinOrchestrator<I, M> {
    installer: I,
    services: M,
    lock: Option<PackageLockMitigation>,
    options: JoinOptions,
}

impl<I, M> JoinOrchestrator<I, M>
where
    I: Installer,
    M: ServiceManager,
{
    /// Creates an orchestrator over the given seams.
    pub const fn new(installer: I, services: M, options: JoinOptions) -> Self {
        Self {
            installer,
            services,
            lock: None,
            options,
        }
    }

    /// Enables package-lock mitigation around each attempt.
    #[must_use]
    pub fn with_lock_mitigation(mut self, lock: PackageLockMitigation) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Runs the join to completion or exhaustion.
    ///
    /// # Errors
    ///
    /// [`Error::JoinFailed`] once `max_attempts` attempts have failed,
    /// carrying the agent service's log tail when it can be read.
    pub async fn join(&self, command: &K3sJoinCommand) -> Result<()> {
        let max_attempts = self.options.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!(
                "join attempt {}/{} against {}",
                attempt,
                max_attempts,
                command.server_url()
            );

            if let Some(lock) = &self.lock {
                if let Err(e) = lock.prepare(&self.services).await {
                    warn!("package-lock mitigation failed: {e}");
                }
            }

            let result = self.attempt(command).await;

            if let Some(lock) = &self.lock {
                lock.restore(&self.services).await;
            }

            match result {
                Ok(()) => {
                    info!("agent joined on attempt {}", attempt);
                    return Ok(());
                }
                Err(e) => {
                    warn!("join attempt {} failed: {}", attempt, e);
                    last_error = e;

                    if let Err(e) = self.installer.cleanup().await {
                        warn!("cleanup after failed attempt: {e:?}");
                    }
                    if attempt < max_attempts {
                        tokio::time::sleep(self.options.backoff).await;
                    }
                }
            }
        }

        let service_logs = self
            .services
            .logs(&self.options.service_unit, self.options.log_lines)
            .await
            .ok();

        Err(Error::JoinFailed {
            attempts: max_attempts,
            last_error,
            service_logs,
        })
    }

    /// One install attempt plus the service-active settle check.
    async fn attempt(&self, command: &K3sJoinCommand) -> std::result::Result<(), String> {
        self.installer
            .install_agent(command)
            .await
            .map_err(|e| format!("installer failed: {e:?}"))?;

        for check in 0..self.options.settle_attempts {
            match self.services.is_active(&self.options.service_unit).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return Err(format!("service status unavailable: {e:?}")),
            }
            tokio::time::sleep(self.options.settle_poll.delay(check)).await;
        }

        Err(format!(
            "service {} did not become active",
            self.options.service_unit
        ))
    }
}

#[cfg(test)]
mod tests;
