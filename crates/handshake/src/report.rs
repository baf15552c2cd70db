//! Structured outcome of a handshake run.

use std::time::Duration;

use serde::Serialize;

use crate::{Error, Result};

/// Which side of the handshake a report describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum HandshakeRole {
    /// Verify-then-publish flow on a server node.
    Server,
    /// Collect-then-join flow on an agent node.
    Agent,
}

impl std::fmt::Display for HandshakeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// One completed step of the flow.
#[derive(Clone, Debug, Serialize)]
pub struct HandshakeStep {
    /// Step name.
    pub name: String,
    /// Whether the step completed.
    pub passed: bool,
    /// Time spent inside this step.
    pub elapsed: Duration,
    /// The step's final status line.
    pub detail: String,
}

/// Step-by-step result of a server or agent handshake.
///
/// The flow stops at the first failed step, so at most one entry has
/// `passed == false` and it is always the last one.
#[derive(Clone, Debug, Serialize)]
pub struct HandshakeReport {
    /// The side that ran.
    pub role: HandshakeRole,
    /// Steps in execution order.
    pub steps: Vec<HandshakeStep>,
}

impl HandshakeReport {
    pub(crate) const fn new(role: HandshakeRole) -> Self {
        Self {
            role,
            steps: Vec::new(),
        }
    }

    pub(crate) fn pass(&mut self, name: &str, elapsed: Duration, detail: impl Into<String>) {
        self.steps.push(HandshakeStep {
            name: name.to_string(),
            passed: true,
            elapsed,
            detail: detail.into(),
        });
    }

    pub(crate) fn fail(&mut self, name: &str, elapsed: Duration, detail: impl Into<String>) {
        self.steps.push(HandshakeStep {
            name: name.to_string(),
            passed: false,
            elapsed,
            detail: detail.into(),
        });
    }

    /// Whether every step completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|step| step.passed)
    }

    /// The step that failed, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&HandshakeStep> {
        self.steps.iter().find(|step| !step.passed)
    }

    /// Total time across all steps.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.steps.iter().map(|step| step.elapsed).sum()
    }

    /// Converts the report into `Ok(())` or a typed failure naming the
    /// step that gave up.
    ///
    /// # Errors
    ///
    /// [`Error::StepFailed`] when any step failed.
    pub fn into_result(self) -> Result<()> {
        match self.failed_step() {
            Some(failed) => Err(Error::StepFailed {
                step: failed.name.clone(),
                detail: failed.detail.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for HandshakeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} handshake: {}",
            self.role,
            if self.succeeded() { "ok" } else { "FAILED" }
        )?;
        for step in &self.steps {
            writeln!(
                f,
                "  {} {} in {:?} ({})",
                if step.passed { "passed" } else { "FAILED" },
                step.name,
                step.elapsed,
                step.detail,
            )?;
        }
        Ok(())
    }
}
