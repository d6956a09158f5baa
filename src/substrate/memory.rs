//! In-process substrate implementation backed by tokio primitives.
//!
//! Queues are mutex-guarded `VecDeque`s with a `Notify` waking blocked pops;
//! pub/sub is a registry of per-subscriber unbounded channels, so delivery is
//! at-most-once per subscriber that was registered at publish time. This
//! matches the Redis semantics the worker protocols were written against.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;

use super::{QueueSide, Subscriber, Substrate};
use crate::error::SubstrateError;

type Message = (String, String);

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
    /// Registered pub/sub listeners: channel -> (subscriber id, sender).
    topics: Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<Message>)>>>,
    queue_signal: Notify,
    next_subscriber_id: AtomicU64,
}

/// In-memory coordination substrate shared by all workers of one kitchen.
#[derive(Default)]
pub struct MemorySubstrate {
    shared: Arc<Shared>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemorySubstrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySubstrate").finish_non_exhaustive()
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn hash_set(&self, table: &str, key: &str, value: &str) -> Result<(), SubstrateError> {
        let mut hashes = self.shared.hashes.lock().expect("hashes lock");
        hashes
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, table: &str, key: &str) -> Result<Option<String>, SubstrateError> {
        let hashes = self.shared.hashes.lock().expect("hashes lock");
        Ok(hashes.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn hash_get_all(&self, table: &str) -> Result<HashMap<String, String>, SubstrateError> {
        let hashes = self.shared.hashes.lock().expect("hashes lock");
        Ok(hashes.get(table).cloned().unwrap_or_default())
    }

    async fn hash_delete(&self, table: &str) -> Result<(), SubstrateError> {
        let mut hashes = self.shared.hashes.lock().expect("hashes lock");
        hashes.remove(table);
        Ok(())
    }

    async fn set_add(&self, set: &str, value: &str) -> Result<(), SubstrateError> {
        let mut sets = self.shared.sets.lock().expect("sets lock");
        sets.entry(set.to_string())
            .or_default()
            .insert(value.to_string());
        Ok(())
    }

    async fn set_is_member(&self, set: &str, value: &str) -> Result<bool, SubstrateError> {
        let sets = self.shared.sets.lock().expect("sets lock");
        Ok(sets.get(set).is_some_and(|s| s.contains(value)))
    }

    async fn queue_push(
        &self,
        queue: &str,
        value: &str,
        side: QueueSide,
    ) -> Result<(), SubstrateError> {
        {
            let mut queues = self.shared.queues.lock().expect("queues lock");
            let q = queues.entry(queue.to_string()).or_default();
            match side {
                QueueSide::Left => q.push_front(value.to_string()),
                QueueSide::Right => q.push_back(value.to_string()),
            }
        }
        self.shared.queue_signal.notify_waiters();
        Ok(())
    }

    async fn queue_pop(
        &self,
        queue: &str,
        side: QueueSide,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, SubstrateError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Arm the wakeup before checking so a concurrent push between the
            // check and the await cannot be missed.
            let notified = self.shared.queue_signal.notified();
            {
                let mut queues = self.shared.queues.lock().expect("queues lock");
                if let Some(q) = queues.get_mut(queue) {
                    let value = match side {
                        QueueSide::Left => q.pop_front(),
                        QueueSide::Right => q.pop_back(),
                    };
                    if let Some(value) = value {
                        return Ok(Some(value));
                    }
                }
            }
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SubstrateError> {
        let mut topics = self.shared.topics.lock().expect("topics lock");
        if let Some(listeners) = topics.get_mut(channel) {
            listeners.retain(|(_, tx)| {
                tx.send((channel.to_string(), payload.to_string())).is_ok()
            });
        }
        Ok(())
    }

    fn subscriber(&self) -> Box<dyn Subscriber> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        Box::new(MemorySubscriber {
            shared: self.shared.clone(),
            id,
            tx,
            rx,
            channels: HashSet::new(),
        })
    }

    async fn reset_all(&self) -> Result<(), SubstrateError> {
        self.shared.queues.lock().expect("queues lock").clear();
        self.shared.hashes.lock().expect("hashes lock").clear();
        self.shared.sets.lock().expect("sets lock").clear();
        Ok(())
    }
}

/// One worker's pub/sub endpoint on a [`MemorySubstrate`].
struct MemorySubscriber {
    shared: Arc<Shared>,
    id: u64,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    channels: HashSet<String>,
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn subscribe(&mut self, channel: &str) {
        if !self.channels.insert(channel.to_string()) {
            return;
        }
        let mut topics = self.shared.topics.lock().expect("topics lock");
        topics
            .entry(channel.to_string())
            .or_default()
            .push((self.id, self.tx.clone()));
    }

    async fn unsubscribe(&mut self, channel: &str) {
        if !self.channels.remove(channel) {
            return;
        }
        let mut topics = self.shared.topics.lock().expect("topics lock");
        if let Some(listeners) = topics.get_mut(channel) {
            listeners.retain(|(id, _)| *id != self.id);
            if listeners.is_empty() {
                topics.remove(channel);
            }
        }
    }

    async fn receive(&mut self, timeout: Duration) -> Option<(String, String)> {
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some((channel, payload))) => {
                    // Messages in flight for a channel unsubscribed since
                    // they were published are dropped, matching Redis.
                    if self.channels.contains(&channel) {
                        return Some((channel, payload));
                    }
                }
                Ok(None) | Err(_) => return None,
            }
        }
    }
}

impl Drop for MemorySubscriber {
    fn drop(&mut self) {
        let mut topics = self.shared.topics.lock().expect("topics lock");
        for channel in self.channels.drain() {
            if let Some(listeners) = topics.get_mut(&channel) {
                listeners.retain(|(id, _)| *id != self.id);
                if listeners.is_empty() {
                    topics.remove(&channel);
                }
            }
        }
    }
}
