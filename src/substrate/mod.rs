//! The coordination substrate every kitchen worker talks to.
//!
//! Workers never share memory; all shared state flows through the primitive
//! set defined here: an atomic hash store, a set store, blocking FIFO queues,
//! and publish/subscribe channels. The contract mirrors the subset of Redis
//! the kitchen protocols rely on, so any backend satisfying it is usable.
//!
//! The substrate is injected into every worker constructor as an
//! `Arc<dyn Substrate>`; there is no process-wide singleton.

pub mod keys;
mod memory;

pub use memory::MemorySubstrate;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SubstrateError;

/// Reference-counted handle to a substrate.
pub type SubstrateRef = Arc<dyn Substrate>;

/// Which end of a queue an operation touches.
///
/// Queues are strict FIFO when pushed on one side and popped on the other.
/// Failed orders are pushed back on the pop side so a retry jumps the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSide {
    /// The head of the queue (the pop end).
    Left,
    /// The tail of the queue (the push end).
    Right,
}

/// Keyed storage, queue, and publish primitives.
///
/// No multi-key transactions: workers must not assume that a queue push and
/// an accompanying publish are observed atomically by a third party.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Set a field in a hash table.
    async fn hash_set(&self, table: &str, key: &str, value: &str) -> Result<(), SubstrateError>;

    /// Read a single field from a hash table.
    async fn hash_get(&self, table: &str, key: &str) -> Result<Option<String>, SubstrateError>;

    /// Read an entire hash table.
    async fn hash_get_all(&self, table: &str) -> Result<HashMap<String, String>, SubstrateError>;

    /// Delete a hash table wholesale.
    async fn hash_delete(&self, table: &str) -> Result<(), SubstrateError>;

    /// Add a value to a set (idempotent).
    async fn set_add(&self, set: &str, value: &str) -> Result<(), SubstrateError>;

    /// Test set membership.
    async fn set_is_member(&self, set: &str, value: &str) -> Result<bool, SubstrateError>;

    /// Push a value onto one end of a queue.
    async fn queue_push(
        &self,
        queue: &str,
        value: &str,
        side: QueueSide,
    ) -> Result<(), SubstrateError>;

    /// Pop a value from one end of a queue, blocking until one is available.
    ///
    /// `timeout == None` blocks forever. Returns `Ok(None)` only when the
    /// timeout elapses with the queue still empty.
    async fn queue_pop(
        &self,
        queue: &str,
        side: QueueSide,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, SubstrateError>;

    /// Publish a payload to a channel. Delivery is at-most-once per
    /// currently subscribed listener; nobody listening is not an error.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SubstrateError>;

    /// Create a private subscriber handle for one worker.
    fn subscriber(&self) -> Box<dyn Subscriber>;

    /// Discard all stored state. Fresh-run semantics; live subscriptions
    /// are unaffected.
    async fn reset_all(&self) -> Result<(), SubstrateError>;
}

/// A worker's private view of the pub/sub side of the substrate.
///
/// Each worker owns exactly one subscriber; messages published to a channel
/// while the handle is subscribed to it are delivered at most once, in
/// publish order, with no ordering guarantee relative to queue operations.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Start receiving messages published to `channel`.
    async fn subscribe(&mut self, channel: &str);

    /// Stop receiving messages for `channel`. Messages already in flight
    /// for it are dropped on the next `receive`.
    async fn unsubscribe(&mut self, channel: &str);

    /// Wait up to `timeout` for the next message on any subscribed channel.
    async fn receive(&mut self, timeout: Duration) -> Option<(String, String)>;
}
