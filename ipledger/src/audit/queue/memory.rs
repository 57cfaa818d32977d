//! In-process audit queue
//!
//! Backs single-binary deployments and tests. Messages live in a
//! `std::sync::Mutex`-protected state struct; the mutex is never held across
//! `.await` points — waiting happens on a `tokio::sync::Notify` after the
//! lock is dropped. Visibility reclaim runs opportunistically inside every
//! claim attempt, so expired deliveries return to the ready queue (or
//! dead-letter once their attempts are spent) without a background task.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::{AuditQueue, DeadLetter, Delivery, MessageId, QueueError};
use crate::audit::event::AuditEvent;
use crate::config::QueueConfig;

/// How often a blocked dequeue re-checks for expired deliveries
const RECLAIM_TICK: Duration = Duration::from_millis(25);

/// A message waiting to be claimed
struct Stored {
    id: MessageId,
    /// Deliveries so far; 0 for a never-claimed message
    deliveries: u32,
    payload: Vec<u8>,
}

/// A claimed message awaiting settlement
struct InFlight {
    deliveries: u32,
    payload: Vec<u8>,
    claimed_at: Instant,
}

/// Internal state protected by a `std::sync::Mutex`
struct QueueState {
    next_id: u64,
    ready: VecDeque<Stored>,
    in_flight: HashMap<String, InFlight>,
    dead: Vec<DeadLetter>,
}

/// In-process at-least-once queue
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    visibility: Duration,
    max_attempts: u32,
    block_for: Duration,
}

impl MemoryQueue {
    /// Create a queue with explicit settings
    pub fn new(visibility: Duration, max_attempts: u32, block_for: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                next_id: 0,
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
                dead: Vec::new(),
            }),
            notify: Notify::new(),
            visibility,
            max_attempts,
            block_for,
        }
    }

    /// Create a queue from the shared queue configuration
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.visibility_timeout(),
            config.max_attempts,
            config.block_window(),
        )
    }

    /// Enqueue pre-encoded payload bytes
    pub fn enqueue_raw(&self, payload: Vec<u8>) -> MessageId {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = MessageId(state.next_id.to_string());
            state.ready.push_back(Stored {
                id: id.clone(),
                deliveries: 0,
                payload,
            });
            id
        }; // lock dropped here

        self.notify.notify_one();
        id
    }

    /// Snapshot of the dead-letter channel
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().unwrap().dead.clone()
    }

    /// Number of messages waiting to be claimed
    pub fn ready_len(&self) -> usize {
        self.state.lock().unwrap().ready.len()
    }

    /// Number of claimed messages awaiting settlement
    pub fn in_flight_len(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    /// Claim the next ready message if one exists
    fn try_claim(&self) -> Option<Delivery> {
        let mut state = self.state.lock().unwrap();
        self.reclaim_expired(&mut state);

        let stored = state.ready.pop_front()?;
        let attempt = stored.deliveries + 1;
        state.in_flight.insert(
            stored.id.0.clone(),
            InFlight {
                deliveries: attempt,
                payload: stored.payload.clone(),
                claimed_at: Instant::now(),
            },
        );

        Some(Delivery {
            id: stored.id,
            attempt,
            payload: stored.payload,
        })
    }

    /// Return expired deliveries to the ready queue or the dead-letter channel
    ///
    /// Must be called with the state lock held.
    fn reclaim_expired(&self, state: &mut QueueState) {
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, claimed)| claimed.claimed_at.elapsed() >= self.visibility)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(claimed) = state.in_flight.remove(&id) {
                if claimed.deliveries >= self.max_attempts {
                    tracing::warn!(
                        message_id = %id,
                        attempts = claimed.deliveries,
                        "audit message dead-lettered after visibility timeout"
                    );
                    state.dead.push(DeadLetter {
                        id: MessageId(id),
                        attempt: claimed.deliveries,
                        payload: claimed.payload,
                        reason: format!("no ack after {} attempts", claimed.deliveries),
                    });
                } else {
                    state.ready.push_back(Stored {
                        id: MessageId(id),
                        deliveries: claimed.deliveries,
                        payload: claimed.payload,
                    });
                    self.notify.notify_one();
                }
            }
        }
    }
}

#[async_trait]
impl AuditQueue for MemoryQueue {
    async fn enqueue(&self, event: &AuditEvent) -> Result<MessageId, QueueError> {
        let payload = serde_json::to_vec(event)?;
        Ok(self.enqueue_raw(payload))
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + self.block_for;

        loop {
            if let Some(delivery) = self.try_claim() {
                return Ok(Some(delivery));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            // Wake early on a new message, otherwise tick so expired
            // deliveries are reclaimed during the block window
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining.min(RECLAIM_TICK)) => {}
            }
        }
    }

    async fn ack(&self, delivery: Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if state.in_flight.remove(delivery.id.as_str()).is_none() {
            // The visibility timeout already reclaimed it; the redelivery
            // will produce a duplicate, which at-least-once permits
            tracing::debug!(message_id = %delivery.id, "late ack for reclaimed message");
        }
        Ok(())
    }

    async fn nack(&self, delivery: Delivery, requeue: bool) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        let Some(claimed) = state.in_flight.remove(delivery.id.as_str()) else {
            tracing::debug!(message_id = %delivery.id, "late nack for reclaimed message");
            return Ok(());
        };

        if !requeue {
            state.dead.push(DeadLetter {
                id: delivery.id,
                attempt: claimed.deliveries,
                payload: claimed.payload,
                reason: "rejected by consumer".to_string(),
            });
        } else if claimed.deliveries >= self.max_attempts {
            tracing::warn!(
                message_id = %delivery.id,
                attempts = claimed.deliveries,
                "audit message dead-lettered after exhausting attempts"
            );
            state.dead.push(DeadLetter {
                id: delivery.id,
                attempt: claimed.deliveries,
                payload: claimed.payload,
                reason: format!("exhausted {} delivery attempts", self.max_attempts),
            });
        } else {
            state.ready.push_back(Stored {
                id: delivery.id,
                deliveries: claimed.deliveries,
                payload: claimed.payload,
            });
            drop(state); // lock dropped before waking waiters
            self.notify.notify_one();
        }

        Ok(())
    }
}
