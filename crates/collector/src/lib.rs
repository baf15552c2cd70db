//! Agent-side collection: poll the publication channel until a valid
//! join credential appears.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod state;

pub use error::{Error, Result};
pub use state::CollectionState;

use std::path::PathBuf;
use std::time::Duration;

use muster_channel::PublicationChannel;
use muster_token::ClusterToken;
use muster_util::{Deadline, RetryPolicy};
use tracing::{debug, info, warn};

/// Options for one collection run.
#[derive(Clone, Debug)]
pub struct CollectOptions {
    /// The cluster to collect a credential for.
    pub cluster_name: String,

    /// Overall polling budget.
    pub timeout: Duration,

    /// Whether exhausting the budget is fatal. When false, the caller
    /// falls back to manual configuration and exhaustion is reported as
    /// [`CollectOutcome::ProceedWithoutToken`].
    pub wait_for_token: bool,

    /// Pacing of the channel polls.
    pub poll: RetryPolicy,

    /// Where to persist the agent-local collection record, if anywhere.
    pub state_path: Option<PathBuf>,
}

impl CollectOptions {
    /// Defaults: 300s budget, 5s polls, token required.
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            timeout: Duration::from_secs(300),
            wait_for_token: true,
            poll: RetryPolicy::fixed(Duration::from_secs(5)),
            state_path: None,
        }
    }
}

/// How a collection run ended.
#[derive(Clone, Debug)]
pub enum CollectOutcome {
    /// A validated credential was found.
    Collected(ClusterToken),

    /// Budget exhausted and `wait_for_token` was false: proceed with
    /// static configuration.
    ProceedWithoutToken,
}

/// Polls a publication channel for this cluster's join credential.
#[derive(Clone, Debug)]
pub struct Collector<C> {
    channel: C,
}

impl<C: PublicationChannel> Collector<C> {
    /// Creates a collector over the given channel.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Polls until a valid record appears or the budget runs out.
    ///
    /// Multiple candidate records (HA servers) are fine: the first one
    /// that decodes and validates wins. Structurally incomplete or
    /// malformed candidates are rejected and polling continues, since a
    /// different server may still publish a complete record.
    ///
    /// # Errors
    ///
    /// [`Error::NoClusterInfo`] on budget exhaustion when
    /// `wait_for_token` is set.
    pub async fn collect(&self, options: &CollectOptions) -> Result<CollectOutcome> {
        let deadline = Deadline::after(options.timeout);
        let mut attempts = 0;
        let mut last_status = "no records found".to_string();

        info!(
            "collecting cluster info for `{}` (budget {:?})",
            options.cluster_name, options.timeout
        );

        loop {
            attempts += 1;
            // A slow channel (a subnet scan, say) must not run past the
            // budget, so the query itself is capped by what is left.
            let Some(remaining) = deadline.remaining() else {
                break;
            };
            match tokio::time::timeout(remaining, self.channel.query(&options.cluster_name)).await
            {
                Ok(Ok(payloads)) => {
                    if let Some(token) =
                        first_valid(&options.cluster_name, &payloads, &mut last_status)
                    {
                        info!(
                            "collected credential for `{}` from {} after {} poll(s)",
                            options.cluster_name, token.server_node, attempts
                        );
                        self.persist(options, CollectionState::collected(&token));
                        return Ok(CollectOutcome::Collected(token));
                    }
                }
                Ok(Err(e)) => {
                    debug!("channel query failed: {e:?}");
                    last_status = format!("channel query failed: {e:?}");
                }
                Err(_) => {
                    last_status = format!("channel query still running after {remaining:?}");
                    break;
                }
            }

            if !deadline.sleep_capped(options.poll.delay(attempts - 1)).await {
                break;
            }
        }

        let waited = deadline.elapsed();
        self.persist(
            options,
            CollectionState::failed(&options.cluster_name, &last_status),
        );

        if options.wait_for_token {
            Err(Error::NoClusterInfo {
                cluster_name: options.cluster_name.clone(),
                attempts,
                waited,
                last_status,
            })
        } else {
            warn!(
                "no cluster info for `{}` after {:?}; proceeding without automation",
                options.cluster_name, waited
            );
            Ok(CollectOutcome::ProceedWithoutToken)
        }
    }

    /// Best-effort state persistence; never masks the primary outcome.
    fn persist(&self, options: &CollectOptions, state: CollectionState) {
        let Some(path) = &options.state_path else {
            return;
        };
        if let Err(e) = state.write(path) {
            warn!("failed to write collection state to {}: {e}", path.display());
        }
    }
}

/// Picks the first candidate that decodes, validates, and belongs to
/// the requested cluster.
fn first_valid(
    cluster_name: &str,
    payloads: &[bytes::Bytes],
    last_status: &mut String,
) -> Option<ClusterToken> {
    for payload in payloads {
        match ClusterToken::decode(payload) {
            Ok(token) if token.cluster_name == cluster_name => return Some(token),
            Ok(token) => {
                debug!(
                    "skipping record for other cluster `{}`",
                    token.cluster_name
                );
            }
            Err(e) => {
                // An incomplete payload will not self-heal, but another
                // server's record may still arrive; keep polling.
                warn!("rejecting candidate record: {e}");
                *last_status = format!("rejected candidate: {e}");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests;
