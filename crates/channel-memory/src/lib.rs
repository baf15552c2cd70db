//! In-process implementation of the publication channel, used for
//! single-process deployments and as the test substrate.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use muster_channel::PublicationChannel;
use muster_token::{ClusterToken, NodeIdentity};
use tokio::sync::Mutex;

/// In-memory publication channel.
#[derive(Clone, Debug, Default)]
pub struct MemoryChannel {
    records: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryChannel {
    /// Creates a new empty `MemoryChannel`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of records currently held, across all clusters.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the channel holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl PublicationChannel for MemoryChannel {
    type Error = Error;

    async fn publish(&self, token: &ClusterToken) -> Result<(), Self::Error> {
        self.records
            .lock()
            .await
            .insert(token.record_key(), token.to_json_bytes());
        Ok(())
    }

    async fn retract(&self, identity: &NodeIdentity) -> Result<(), Self::Error> {
        self.records.lock().await.remove(&identity.record_key());
        Ok(())
    }

    async fn query(&self, cluster_name: &str) -> Result<Vec<Bytes>, Self::Error> {
        let prefix = format!("{cluster_name}_");
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, payload)| payload.clone())
            .collect())
    }
}
