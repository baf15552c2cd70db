//! Abstract interface for carrying a validated join credential from
//! server to agents under a pull (polling) model.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use muster_token::{ClusterToken, NodeIdentity};

/// Marker trait for channel errors.
pub trait ChannelError: Debug + Error + Send + Sync {}

/// A publication channel with at-least-once, pull-based delivery.
///
/// Records are keyed by `{cluster_name}_{node_name}`, so publishing is
/// idempotent (same key overwrites, last write wins) and concurrent HA
/// servers never conflict by construction. Queries are filtered by
/// cluster name and return zero-to-many encoded payloads; decoding and
/// validation are the consumer's job, since a fallback channel may hand
/// back whichever encoding it found.
#[async_trait]
pub trait PublicationChannel: Clone + Send + Sync + 'static {
    /// The error type for channel operations.
    type Error: ChannelError;

    /// Publishes a record under its `{cluster_name}_{node_name}` key,
    /// overwriting any previous record with the same key.
    async fn publish(&self, token: &ClusterToken) -> Result<(), Self::Error>;

    /// Removes the record published under the given identity, if any.
    async fn retract(&self, identity: &NodeIdentity) -> Result<(), Self::Error>;

    /// Returns the encoded payloads of every record whose key belongs
    /// to the given cluster.
    async fn query(&self, cluster_name: &str) -> Result<Vec<Bytes>, Self::Error>;
}
