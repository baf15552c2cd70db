//! Single-host mutual exclusion around the package manager.
//!
//! During concurrent node bring-up the installer competes for the
//! package manager's on-disk lock with other management agents
//! (cloud-init, SSM-style agents, unattended upgrades). The discipline
//! here: stop the competing units, wait a bounded time for the lock to
//! clear on its own, force-remove it only once that budget elapses, and
//! restart the units after the installer is done.

use std::path::PathBuf;
use std::time::Duration;

use muster_util::{Deadline, RetryPolicy};
use tracing::{info, warn};

use crate::{Error, Result, ServiceManager};

/// Lock-clearing policy applied before each install attempt.
#[derive(Clone, Debug)]
pub struct PackageLockMitigation {
    /// Package-manager lock files to watch (and, at the end of the
    /// budget, clear).
    pub lock_paths: Vec<PathBuf>,

    /// Units that grab the package manager on their own schedule.
    pub competing_units: Vec<String>,

    /// How long to wait for the lock to clear before forcing it.
    pub wait_budget: Duration,

    /// Pacing of the lock checks.
    pub poll: RetryPolicy,
}

impl Default for PackageLockMitigation {
    fn default() -> Self {
        Self {
            lock_paths: vec![
                PathBuf::from("/var/lib/dpkg/lock-frontend"),
                PathBuf::from("/var/lib/dpkg/lock"),
                PathBuf::from("/var/lib/apt/lists/lock"),
            ],
            competing_units: vec![
                "unattended-upgrades".to_string(),
                "apt-daily.timer".to_string(),
                "apt-daily-upgrade.timer".to_string(),
            ],
            wait_budget: Duration::from_secs(300),
            poll: RetryPolicy::fixed(Duration::from_secs(5)),
        }
    }
}

impl PackageLockMitigation {
    /// Stops competing units and waits for the package-manager lock.
    ///
    /// Stop failures are logged and ignored (a unit may simply not be
    /// installed on this host). If the lock is still held once
    /// `wait_budget` elapses it is assumed stale and force-removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if force-removing a stale lock file fails.
    pub async fn prepare<M: ServiceManager>(&self, services: &M) -> Result<()> {
        for unit in &self.competing_units {
            if let Err(e) = services.stop(unit).await {
                warn!("could not stop competing unit {}: {:?}", unit, e);
            }
        }

        let deadline = Deadline::after(self.wait_budget);
        let mut attempt = 0;
        loop {
            let Some(held) = self.held_lock() else {
                return Ok(());
            };

            if !deadline.sleep_capped(self.poll.delay(attempt)).await {
                break;
            }
            attempt += 1;
            info!(
                "package lock {} still held after {:?}",
                held.display(),
                deadline.elapsed()
            );
        }

        // Budget exhausted: whatever held the lock is presumed dead.
        for path in &self.lock_paths {
            match std::fs::remove_file(path) {
                Ok(()) => warn!("force-cleared stale package lock {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::LockClear {
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }

        Ok(())
    }

    /// Restarts the competing units once the installer has finished.
    pub async fn restore<M: ServiceManager>(&self, services: &M) {
        for unit in &self.competing_units {
            if let Err(e) = services.start(unit).await {
                warn!("could not restart competing unit {}: {:?}", unit, e);
            }
        }
    }

    fn held_lock(&self) -> Option<&PathBuf> {
        self.lock_paths.iter().find(|path| path.exists())
    }
}
