//! Remote command execution over SSH, the sole cross-node mechanism in
//! the fallback discovery variant.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Executes a command on a remote host, returning its stdout.
#[async_trait]
pub trait RemoteExec: Send + Sync + 'static {
    /// The error type for remote execution.
    type Error: Debug + std::error::Error + Send + Sync;

    /// Runs `command` on `host` and returns its stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started or exits
    /// non-zero.
    async fn exec(
        &self,
        host: &str,
        command: &[&str],
    ) -> std::result::Result<String, Self::Error>;
}

/// `RemoteExec` implementation shelling out to the `ssh` client.
///
/// Host-key checking is disabled: the targets are ephemeral test hosts
/// whose keys were generated moments ago and will never be seen again.
#[derive(Clone, Debug)]
pub struct SshRemote {
    user: String,
    identity_file: Option<PathBuf>,
    connect_timeout: Duration,
}

impl SshRemote {
    /// Creates a remote executor connecting as `user`.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Uses the given private key instead of the ssh-agent default.
    #[must_use]
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Overrides the TCP connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl RemoteExec for SshRemote {
    type Error = Error;

    async fn exec(&self, host: &str, command: &[&str]) -> Result<String> {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.connect_timeout.as_secs().max(1)
            ))
            .arg("-o")
            .arg("BatchMode=yes");

        if let Some(identity_file) = &self.identity_file {
            cmd.arg("-i").arg(identity_file);
        }

        cmd.arg(format!("{}@{}", self.user, host))
            .arg("--")
            .args(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("running remote command on {}: {:?}", host, command);

        let output = cmd.output().await.map_err(Error::Spawn)?;
        if !output.status.success() {
            return Err(Error::NonZeroExitCode {
                host: host.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| Error::OutputParse)
    }
}
