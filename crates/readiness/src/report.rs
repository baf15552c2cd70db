//! Structured outcome of a readiness verification run.

use std::time::Duration;

use serde::Serialize;

use crate::{Error, Gate, ReadinessState, Result};

/// What happened at one gate.
#[derive(Clone, Debug, Serialize)]
pub struct GateTrace {
    /// The gate.
    pub gate: Gate,
    /// How many checks were made.
    pub attempts: u32,
    /// Total elapsed time when the gate resolved.
    pub waited: Duration,
    /// Whether the gate passed.
    pub passed: bool,
    /// The last sub-status observed (a pass message, or the reason the
    /// gate was still pending when the budget ran out).
    pub last_status: String,
}

/// Step-by-step result of `verify_readiness`.
///
/// Lets a deployment pipeline distinguish "service never came up" from
/// "token never authenticated" from "API never served" without parsing
/// logs.
#[derive(Clone, Debug, Serialize)]
pub struct ReadinessReport {
    /// Terminal state: `Ready` or `Failed`.
    pub state: ReadinessState,
    /// The validated token, on success.
    pub token: Option<String>,
    /// One entry per gate reached, in order.
    pub trace: Vec<GateTrace>,
    /// Cluster snapshot from the API gate, when it was reached.
    pub cluster_info: Option<String>,
}

impl ReadinessReport {
    /// Whether the full gate chain passed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }

    /// The gate that failed, if any.
    #[must_use]
    pub fn failed_gate(&self) -> Option<&GateTrace> {
        self.trace.iter().find(|entry| !entry.passed)
    }

    /// Total time spent across all gates.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.trace.last().map_or(Duration::ZERO, |t| t.waited)
    }

    /// Converts the report into the validated token, or a typed
    /// failure naming the gate that timed out.
    ///
    /// # Errors
    ///
    /// [`Error::NotReady`] when any gate failed.
    pub fn into_result(self) -> Result<String> {
        if let Some(failed) = self.failed_gate() {
            return Err(Error::NotReady {
                gate: failed.gate,
                waited: self.waited(),
                last_status: failed.last_status.clone(),
            });
        }
        self.token.ok_or(Error::NotReady {
            gate: Gate::TokenPresent,
            waited: Duration::ZERO,
            last_status: "no token captured".to_string(),
        })
    }
}

impl std::fmt::Display for ReadinessReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "readiness: {:?}", self.state)?;
        for entry in &self.trace {
            writeln!(
                f,
                "  {} {} after {} attempt(s) in {:?} ({})",
                if entry.passed { "passed" } else { "FAILED" },
                entry.gate,
                entry.attempts,
                entry.waited,
                entry.last_status,
            )?;
        }
        if let Some(info) = &self.cluster_info {
            writeln!(f, "  cluster: {info}")?;
        }
        Ok(())
    }
}
