//! Host-local service control and package-manager lock discipline.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod pkg_lock;
mod systemd;

pub use error::{Error, Result};
pub use pkg_lock::PackageLockMitigation;
pub use systemd::SystemdManager;

use std::fmt::Debug;

use async_trait::async_trait;

/// Controls and inspects host services.
#[async_trait]
pub trait ServiceManager: Send + Sync + 'static {
    /// The error type for service operations.
    type Error: Debug + std::error::Error + Send + Sync;

    /// Whether the unit is currently active.
    async fn is_active(&self, unit: &str) -> std::result::Result<bool, Self::Error>;

    /// Starts the unit.
    async fn start(&self, unit: &str) -> std::result::Result<(), Self::Error>;

    /// Stops the unit.
    async fn stop(&self, unit: &str) -> std::result::Result<(), Self::Error>;

    /// Returns the last `lines` lines of the unit's log.
    async fn logs(&self, unit: &str, lines: usize)
    -> std::result::Result<String, Self::Error>;
}
