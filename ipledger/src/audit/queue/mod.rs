//! Durable audit event queue
//!
//! Producers enqueue serialized [`AuditEvent`]s and persister workers claim
//! them one at a time. Delivery is at-least-once: a claimed message that is
//! neither acked nor nacked becomes claimable again once its visibility
//! timeout lapses, and a message that exhausts its delivery attempts moves to
//! the dead-letter channel instead of cycling forever.
//!
//! Two drivers exist behind [`build_queue`]: an in-process [`memory`] queue
//! for single-binary deployments and tests, and a Redis Streams consumer
//! group (`redis-queue` feature) for multi-instance deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::audit::event::AuditEvent;
use crate::config::{QueueConfig, QueueDriver};

pub mod memory;
#[cfg(feature = "redis-queue")]
pub mod redis;

pub use memory::MemoryQueue;

/// Queue-assigned identifier for an enqueued message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A claimed message awaiting ack or nack
///
/// Consuming the delivery by value in [`AuditQueue::ack`] and
/// [`AuditQueue::nack`] makes settling it twice unrepresentable.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue-assigned message identifier
    pub id: MessageId,
    /// Which delivery attempt this is, starting at 1
    pub attempt: u32,
    /// Raw payload bytes as enqueued
    pub payload: Vec<u8>,
}

/// A message that exhausted its attempts or was rejected outright
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Original message identifier
    pub id: MessageId,
    /// Attempt count at the time the message was parked
    pub attempt: u32,
    /// Raw payload bytes as enqueued
    pub payload: Vec<u8>,
    /// Why the message was parked
    pub reason: String,
}

/// Queue operation errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend cannot be reached; the operation may succeed later
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// The event could not be encoded for transport
    #[error("failed to encode audit event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The backend rejected the operation
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// Durable at-least-once message queue for audit events
#[async_trait]
pub trait AuditQueue: Send + Sync {
    /// Serialize and enqueue an event, returning its queue-assigned id
    async fn enqueue(&self, event: &AuditEvent) -> Result<MessageId, QueueError>;

    /// Claim the next available message, waiting up to the configured block
    /// window. `Ok(None)` means nothing arrived within the window.
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError>;

    /// Settle a delivery as processed, removing it from the queue
    async fn ack(&self, delivery: Delivery) -> Result<(), QueueError>;

    /// Settle a delivery as failed
    ///
    /// With `requeue` the message becomes available for another attempt
    /// unless it has exhausted its attempts, in which case it dead-letters.
    /// Without `requeue` it dead-letters immediately.
    async fn nack(&self, delivery: Delivery, requeue: bool) -> Result<(), QueueError>;
}

/// Build the queue driver named by the configuration
pub fn build_queue(config: &QueueConfig) -> Result<Arc<dyn AuditQueue>, QueueError> {
    match config.driver {
        QueueDriver::Memory => Ok(Arc::new(MemoryQueue::from_config(config))),
        #[cfg(feature = "redis-queue")]
        QueueDriver::Redis => Ok(Arc::new(redis::RedisQueue::new(config)?)),
        #[cfg(not(feature = "redis-queue"))]
        QueueDriver::Redis => Err(QueueError::Backend(
            "redis driver requires the redis-queue feature".to_string(),
        )),
    }
}
