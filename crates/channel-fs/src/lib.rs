//! File-drop implementation of the publication channel: records land in
//! a well-known directory, in both encodings, for retrieval over an
//! administrative channel.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use muster_channel::PublicationChannel;
use muster_token::{ClusterToken, NodeIdentity};
use tracing::{debug, info};

/// Default well-known directory for dropped credential records.
pub static DEFAULT_DROP_DIR: &str = "/var/lib/muster/cluster-info";

/// Publication channel backed by a directory of record files.
///
/// Each record is written as `{key}.json` and `{key}.env` (the latter
/// shell-sourceable, for consumers without a JSON parser). Writes go
/// through a temp file and rename, so a reader never observes a
/// half-written record.
#[derive(Clone, Debug)]
pub struct FsChannel {
    dir: PathBuf,
}

impl FsChannel {
    /// Creates a channel over the given directory, creating it if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Io("failed to create channel directory", e))?;
        Ok(Self { dir })
    }

    /// The directory records are dropped into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_atomic(&self, name: &str, payload: &Bytes) -> Result<()> {
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let dest = self.dir.join(name);

        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| Error::Io("failed to write record temp file", e))?;
        tokio::fs::rename(&tmp, &dest)
            .await
            .map_err(|e| Error::Io("failed to move record into place", e))?;

        debug!("dropped record file {}", dest.display());
        Ok(())
    }

    async fn remove_if_present(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io("failed to remove record file", e)),
        }
    }
}

#[async_trait]
impl PublicationChannel for FsChannel {
    type Error = Error;

    async fn publish(&self, token: &ClusterToken) -> Result<()> {
        let key = token.record_key();
        self.write_atomic(&format!("{key}.json"), &token.to_json_bytes())
            .await?;
        self.write_atomic(&format!("{key}.env"), &token.to_env_bytes())
            .await?;

        info!("published cluster record {} to {}", key, self.dir.display());
        Ok(())
    }

    async fn retract(&self, identity: &NodeIdentity) -> Result<()> {
        let key = identity.record_key();
        self.remove_if_present(&format!("{key}.json")).await?;
        self.remove_if_present(&format!("{key}.env")).await?;

        info!("retracted cluster record {}", key);
        Ok(())
    }

    async fn query(&self, cluster_name: &str) -> Result<Vec<Bytes>> {
        let prefix = format!("{cluster_name}_");
        let mut payloads = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::Io("failed to read channel directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Io("failed to read channel directory entry", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            let bytes = tokio::fs::read(entry.path())
                .await
                .map_err(|e| Error::Io("failed to read record file", e))?;
            payloads.push(Bytes::from(bytes));
        }

        Ok(payloads)
    }
}
