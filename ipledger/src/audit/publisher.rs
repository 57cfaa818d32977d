//! Audit event producer
//!
//! The publisher's only job is handing an event to the queue; persistence
//! happens later in the persister workers. When the queue is down the error
//! is returned loudly — the business mutation that triggered the event has
//! already committed and is never rolled back, so callers log and continue.

use std::sync::Arc;

use super::event::AuditEvent;
use super::queue::{AuditQueue, MessageId, QueueError};

/// Producer-side handle to the audit queue
#[derive(Clone)]
pub struct AuditPublisher {
    queue: Arc<dyn AuditQueue>,
}

impl AuditPublisher {
    pub fn new(queue: Arc<dyn AuditQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue an event for asynchronous persistence
    pub async fn publish(&self, event: AuditEvent) -> Result<MessageId, QueueError> {
        match self.queue.enqueue(&event).await {
            Ok(id) => {
                tracing::debug!(
                    message_id = %id,
                    action = %event.action_kind,
                    user_id = event.actor.user_id,
                    "audit event enqueued"
                );
                Ok(id)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    action = %event.action_kind,
                    user_id = event.actor.user_id,
                    "failed to enqueue audit event"
                );
                Err(e)
            }
        }
    }
}
