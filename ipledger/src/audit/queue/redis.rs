//! Redis Streams audit queue
//!
//! One stream holds pending events, one consumer group spans every persister
//! process, and each process claims under a unique consumer name. Fresh
//! messages arrive via `XREADGROUP BLOCK`; deliveries whose idle time passes
//! the visibility timeout are reclaimed with `XAUTOCLAIM`, which also
//! advances the per-message delivery counter used for the attempt cap.
//! Parked messages move to the `<stream>:dead` stream with their payload,
//! attempt count, and reason.
//!
//! Pool creation is lazy; connection failures surface as
//! [`QueueError::Unavailable`] so callers can decide whether to retry.

use async_trait::async_trait;
use deadpool_redis::{Config as DeadpoolConfig, Connection, Pool, Runtime};
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{AuditQueue, Delivery, MessageId, QueueError};
use crate::audit::event::AuditEvent;
use crate::config::QueueConfig;

/// Stream field carrying the serialized event
const PAYLOAD_FIELD: &str = "payload";

/// Redis Streams consumer-group queue
pub struct RedisQueue {
    pool: Pool,
    stream: String,
    dead_stream: String,
    group: String,
    consumer: String,
    visibility: Duration,
    max_attempts: u32,
    block_millis: u64,
    group_init: OnceCell<()>,
}

impl RedisQueue {
    /// Create the queue from configuration
    ///
    /// The pool connects lazily, so this succeeds even while Redis is down;
    /// the first operation reports [`QueueError::Unavailable`] instead.
    pub fn new(config: &QueueConfig) -> Result<Self, QueueError> {
        let cfg = DeadpoolConfig::from_url(&config.url);

        let pool = cfg
            .builder()
            .map_err(|e| QueueError::Unavailable(format!("failed to build redis pool: {}", e)))?
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| QueueError::Unavailable(format!("failed to create redis pool: {}", e)))?;

        tracing::info!(
            stream = %config.stream,
            group = %config.group,
            "redis audit queue pool created: max_connections={}",
            config.max_connections
        );

        Ok(Self {
            pool,
            stream: config.stream.clone(),
            dead_stream: format!("{}:dead", config.stream),
            group: config.group.clone(),
            consumer: format!("persister-{}", Uuid::new_v4()),
            visibility: config.visibility_timeout(),
            max_attempts: config.max_attempts,
            block_millis: config.block_millis,
            group_init: OnceCell::new(),
        })
    }

    /// Name of the dead-letter stream
    pub fn dead_stream(&self) -> &str {
        &self.dead_stream
    }

    /// This process's consumer name within the group
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    async fn connection(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }

    /// Create the consumer group once, from the start of the stream so
    /// events enqueued before the first worker came up are still seen
    async fn ensure_group(&self) -> Result<(), QueueError> {
        self.group_init
            .get_or_try_init(|| async {
                let mut conn = self.connection().await?;
                let created: Result<(), redis::RedisError> = conn
                    .xgroup_create_mkstream(&self.stream, &self.group, "0")
                    .await;
                match created {
                    Ok(()) => Ok(()),
                    Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
                    Err(e) => Err(map_redis_err(e)),
                }
            })
            .await
            .map(|_| ())
    }

    /// Claim one delivery whose visibility timeout has lapsed
    ///
    /// Entries over the attempt cap or without a payload field park in the
    /// dead-letter stream and the scan continues.
    async fn claim_expired(&self, conn: &mut Connection) -> Result<Option<Delivery>, QueueError> {
        loop {
            let reply: StreamAutoClaimReply = conn
                .xautoclaim_options(
                    &self.stream,
                    &self.group,
                    &self.consumer,
                    self.visibility.as_millis() as u64,
                    "0-0",
                    StreamAutoClaimOptions::default().count(1),
                )
                .await
                .map_err(map_redis_err)?;

            let Some(entry) = reply.claimed.into_iter().next() else {
                return Ok(None);
            };

            let attempt = self.delivery_count(conn, &entry.id).await?;
            let Some(payload) = payload_bytes(&entry) else {
                self.park(conn, &entry.id, attempt, Vec::new(), "missing payload field")
                    .await?;
                continue;
            };

            if attempt > self.max_attempts {
                tracing::warn!(
                    message_id = %entry.id,
                    attempts = attempt,
                    "audit message dead-lettered after exhausting attempts"
                );
                self.park(
                    conn,
                    &entry.id,
                    attempt,
                    payload,
                    &format!("exhausted {} delivery attempts", self.max_attempts),
                )
                .await?;
                continue;
            }

            return Ok(Some(Delivery {
                id: MessageId(entry.id),
                attempt,
                payload,
            }));
        }
    }

    /// Delivery counter for a pending entry, maintained by the group
    async fn delivery_count(&self, conn: &mut Connection, id: &str) -> Result<u32, QueueError> {
        let reply: StreamPendingCountReply = conn
            .xpending_count(&self.stream, &self.group, id, id, 1)
            .await
            .map_err(map_redis_err)?;

        Ok(reply
            .ids
            .first()
            .map(|pending| pending.times_delivered as u32)
            .unwrap_or(1))
    }

    /// Move an entry to the dead-letter stream and drop it from the queue
    async fn park(
        &self,
        conn: &mut Connection,
        id: &str,
        attempt: u32,
        payload: Vec<u8>,
        reason: &str,
    ) -> Result<(), QueueError> {
        let mut pipe = redis::pipe();
        pipe.cmd("XADD")
            .arg(&self.dead_stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .arg("attempt")
            .arg(attempt)
            .arg("reason")
            .arg(reason)
            .arg("source_id")
            .arg(id)
            .ignore();
        pipe.cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(id)
            .ignore();
        pipe.cmd("XDEL").arg(&self.stream).arg(id).ignore();

        let _: () = pipe.query_async(conn).await.map_err(map_redis_err)?;
        Ok(())
    }
}

#[async_trait]
impl AuditQueue for RedisQueue {
    async fn enqueue(&self, event: &AuditEvent) -> Result<MessageId, QueueError> {
        let payload = serde_json::to_vec(event)?;
        let mut conn = self.connection().await?;

        let id: String = conn
            .xadd(&self.stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(map_redis_err)?;

        Ok(MessageId(id))
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        self.ensure_group().await?;
        let mut conn = self.connection().await?;

        if let Some(delivery) = self.claim_expired(&mut conn).await? {
            return Ok(Some(delivery));
        }

        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(self.block_millis as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await
            .map_err(map_redis_err)?;

        let Some(entry) = reply.keys.into_iter().flat_map(|key| key.ids).next() else {
            return Ok(None);
        };

        match payload_bytes(&entry) {
            Some(payload) => Ok(Some(Delivery {
                id: MessageId(entry.id),
                attempt: 1,
                payload,
            })),
            None => {
                self.park(&mut conn, &entry.id, 1, Vec::new(), "missing payload field")
                    .await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(delivery.id.as_str())
            .ignore();
        pipe.cmd("XDEL")
            .arg(&self.stream)
            .arg(delivery.id.as_str())
            .ignore();

        let _: () = pipe.query_async(&mut conn).await.map_err(map_redis_err)?;
        Ok(())
    }

    async fn nack(&self, delivery: Delivery, requeue: bool) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;

        if !requeue {
            return self
                .park(
                    &mut conn,
                    delivery.id.as_str(),
                    delivery.attempt,
                    delivery.payload,
                    "rejected by consumer",
                )
                .await;
        }

        if delivery.attempt >= self.max_attempts {
            tracing::warn!(
                message_id = %delivery.id,
                attempts = delivery.attempt,
                "audit message dead-lettered after exhausting attempts"
            );
            return self
                .park(
                    &mut conn,
                    delivery.id.as_str(),
                    delivery.attempt,
                    delivery.payload,
                    &format!("exhausted {} delivery attempts", self.max_attempts),
                )
                .await;
        }

        // Leave the entry pending; it becomes claimable again once its idle
        // time passes the visibility timeout
        Ok(())
    }
}

/// Extract the payload bytes from a stream entry
fn payload_bytes(entry: &StreamId) -> Option<Vec<u8>> {
    match entry.map.get(PAYLOAD_FIELD) {
        Some(redis::Value::BulkString(bytes)) => Some(bytes.clone()),
        Some(other) => redis::from_redis_value(other).ok(),
        None => None,
    }
}

/// Classify a Redis error as retriable unavailability or a hard failure
fn map_redis_err(e: redis::RedisError) -> QueueError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        QueueError::Unavailable(e.to_string())
    } else {
        QueueError::Backend(e.to_string())
    }
}
