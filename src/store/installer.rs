//! The single-installation guard.
//!
//! A [`StoreCell`] holds at most one [`ActiveConfiguration`] for its whole
//! lifetime. Installation is an atomic set-once: when several callers race,
//! exactly one wins and the rest get [`AlreadyConfigured`]. The process-wide
//! cell is [`StoreCell::global`]; tests and embedders can create their own.

use std::sync::OnceLock;

use thiserror::Error;
use tracing::{error, info};

use super::ActiveConfiguration;

/// Raised when a store is already installed in the cell.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("a configuration store is already installed")]
pub struct AlreadyConfigured;

static GLOBAL: StoreCell = StoreCell::new();

/// Set-once slot for the active configuration.
#[derive(Debug, Default)]
pub struct StoreCell {
    slot: OnceLock<ActiveConfiguration>,
}

impl StoreCell {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// The process-wide cell.
    pub fn global() -> &'static StoreCell {
        &GLOBAL
    }

    /// Fail early when something is already installed.
    ///
    /// This is only a fast path; [`install`](Self::install) re-checks
    /// atomically.
    pub fn ensure_vacant(&self) -> Result<(), AlreadyConfigured> {
        if self.slot.get().is_some() {
            error!("a configuration store is already installed; refusing to build another");
            return Err(AlreadyConfigured);
        }
        Ok(())
    }

    /// Install `config` unless another configuration got there first.
    pub fn install(
        &self,
        config: ActiveConfiguration,
    ) -> Result<&ActiveConfiguration, AlreadyConfigured> {
        let sources = config.sources().len();
        self.slot.set(config).map_err(|_| {
            error!("lost the race to install a configuration store");
            AlreadyConfigured
        })?;
        info!(sources, "configuration store installed");
        // set succeeded, so the slot is populated
        self.slot.get().ok_or(AlreadyConfigured)
    }

    /// The installed configuration, if any.
    pub fn get(&self) -> Option<&ActiveConfiguration> {
        self.slot.get()
    }

    pub fn is_installed(&self) -> bool {
        self.slot.get().is_some()
    }
}
