//! The autonomous workers that make up a running kitchen.
//!
//! Every worker owns a [`WorkerContext`] (its name plus a handle to the
//! coordination substrate) and a `run` loop that only ever touches shared
//! state through substrate primitives.

pub mod camera;
pub mod logger;
pub mod manager;
pub mod robot;

use tracing::debug;

use crate::error::SubstrateError;
use crate::substrate::{SubstrateRef, keys};

/// Per-worker handle bundling the worker's name and substrate connection.
pub struct WorkerContext {
    pub name: String,
    pub substrate: SubstrateRef,
}

impl WorkerContext {
    pub fn new(name: impl Into<String>, substrate: SubstrateRef) -> Self {
        Self {
            name: name.into(),
            substrate,
        }
    }

    /// Publish a message to the shared log channel, prefixed with the
    /// worker's name. This is simulated-system traffic the LogAggregator
    /// consumes; process-level logging goes through `tracing` separately.
    pub async fn log(&self, message: &str) -> Result<(), SubstrateError> {
        debug!(worker = %self.name, "{message}");
        self.substrate
            .publish(keys::LOG_CHANNEL, &format!("{}: {}", self.name, message))
            .await
    }
}
