//! systemctl/journalctl-backed service manager.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result, ServiceManager};

/// `ServiceManager` shelling out to systemctl and journalctl.
#[derive(Clone, Debug, Default)]
pub struct SystemdManager;

impl SystemdManager {
    /// Creates a new `SystemdManager`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn systemctl(&self, verb: &'static str, unit: &str) -> Result<()> {
        let status = Command::new("systemctl")
            .arg(verb)
            .arg(unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::Spawn("systemctl", e))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::ControlFailed {
                command: verb,
                unit: unit.to_string(),
                status,
            })
        }
    }
}

#[async_trait]
impl ServiceManager for SystemdManager {
    type Error = Error;

    async fn is_active(&self, unit: &str) -> Result<bool> {
        // Exit code 0 means active; any other clean exit means not (yet)
        // active, which is a poll answer rather than an error.
        let status = Command::new("systemctl")
            .arg("is-active")
            .arg("--quiet")
            .arg(unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::Spawn("systemctl", e))?;

        debug!("systemctl is-active {}: {}", unit, status.success());
        Ok(status.success())
    }

    async fn start(&self, unit: &str) -> Result<()> {
        self.systemctl("start", unit).await
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        self.systemctl("stop", unit).await
    }

    async fn logs(&self, unit: &str, lines: usize) -> Result<String> {
        let output = Command::new("journalctl")
            .arg("-u")
            .arg(unit)
            .arg("-n")
            .arg(lines.to_string())
            .arg("--no-pager")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Spawn("journalctl", e))?;

        if !output.status.success() {
            return Err(Error::ControlFailed {
                command: "journalctl",
                unit: unit.to_string(),
                status: output.status,
            });
        }

        String::from_utf8(output.stdout).map_err(|_| Error::OutputParse("journalctl"))
    }
}
