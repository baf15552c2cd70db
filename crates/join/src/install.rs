//! Installer backed by the upstream install script.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::{Error, Installer, K3sJoinCommand, Result};

/// Runs the stock K3s install script in agent mode.
#[derive(Clone, Debug)]
pub struct K3sInstaller {
    script_path: PathBuf,
    uninstall_path: PathBuf,
}

impl Default for K3sInstaller {
    fn default() -> Self {
        Self {
            script_path: PathBuf::from("/usr/local/bin/k3s-install.sh"),
            uninstall_path: PathBuf::from("/usr/local/bin/k3s-agent-uninstall.sh"),
        }
    }
}

impl K3sInstaller {
    /// Creates an installer around the given install script.
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            ..Self::default()
        }
    }

    /// Overrides the uninstall script used for cleanup.
    #[must_use]
    pub fn with_uninstall_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.uninstall_path = path.into();
        self
    }
}

#[async_trait]
impl Installer for K3sInstaller {
    type Error = Error;

    async fn install_agent(&self, command: &K3sJoinCommand) -> Result<()> {
        info!(
            "installing agent against {} via {}",
            command.server_url(),
            self.script_path.display()
        );

        let mut cmd = Command::new("sh");
        cmd.arg(&self.script_path);
        command.apply_to(&mut cmd);

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(Error::Spawn)?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(10).collect();
            Err(Error::InstallFailed {
                status: output.status,
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            })
        }
    }

    /// Removes partial install state so the next attempt starts clean.
    async fn cleanup(&self) -> Result<()> {
        if !self.uninstall_path.exists() {
            // Nothing was installed far enough to leave artifacts.
            return Ok(());
        }

        let status = Command::new("sh")
            .arg(&self.uninstall_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(Error::Spawn)?;

        if !status.success() {
            warn!("uninstall script exited with {}", status);
        }
        Ok(())
    }
}
