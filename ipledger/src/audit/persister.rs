//! Audit persister worker
//!
//! Drives deliveries from the queue into the store. Each delivery moves
//! through validate → insert → settle:
//!
//! - a payload that fails to parse, or an event that is semantically invalid
//!   (non-positive user id, empty action kind or entity type), dead-letters
//!   immediately and is never retried;
//! - a retriable store failure requeues the delivery for another attempt;
//! - any other store failure dead-letters;
//! - success acks, removing the message for good.
//!
//! Several workers may run concurrently over the same queue; ordering across
//! events is not guaranteed. A worker holds at most one claimed delivery, so
//! shutdown leaves at most one message per worker to be reclaimed by the
//! visibility timeout.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::event::AuditEvent;
use super::queue::{AuditQueue, Delivery};
use super::store::{AuditLogStore, NewAuditLog};

/// Pause after a failed dequeue before polling again
const DEQUEUE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Queue-to-store worker
pub struct AuditPersister {
    worker: usize,
    queue: Arc<dyn AuditQueue>,
    store: Arc<dyn AuditLogStore>,
}

impl AuditPersister {
    /// Create a worker; `worker` labels its log lines
    pub fn new(worker: usize, queue: Arc<dyn AuditQueue>, store: Arc<dyn AuditLogStore>) -> Self {
        Self {
            worker,
            queue,
            store,
        }
    }

    /// Run until the token cancels
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(worker = self.worker, "audit persister started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                dequeued = self.queue.dequeue() => match dequeued {
                    // A claim dropped when shutdown wins the race is
                    // reclaimed after the visibility timeout
                    Ok(Some(delivery)) => self.process(delivery).await,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            worker = self.worker,
                            error = %e,
                            "audit dequeue failed, backing off"
                        );
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(DEQUEUE_RETRY_DELAY) => {}
                        }
                    }
                }
            }
        }

        tracing::info!(worker = self.worker, "audit persister stopped");
    }

    /// Process one delivery through validate → insert → settle
    async fn process(&self, delivery: Delivery) {
        let event: AuditEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    worker = self.worker,
                    message_id = %delivery.id,
                    error = %e,
                    "malformed audit payload, dead-lettering"
                );
                self.settle_nack(delivery, false).await;
                return;
            }
        };

        if let Err(reason) = validate(&event) {
            tracing::warn!(
                worker = self.worker,
                message_id = %delivery.id,
                reason,
                "invalid audit event, dead-lettering"
            );
            self.settle_nack(delivery, false).await;
            return;
        }

        let message_id = delivery.id.clone();
        let attempt = delivery.attempt;

        match self.store.insert(NewAuditLog::from(event)).await {
            Ok(row_id) => {
                tracing::debug!(
                    worker = self.worker,
                    message_id = %message_id,
                    row_id,
                    "audit event persisted"
                );
                if let Err(e) = self.queue.ack(delivery).await {
                    tracing::error!(
                        worker = self.worker,
                        message_id = %message_id,
                        error = %e,
                        "failed to ack persisted audit event"
                    );
                }
            }
            Err(e) if e.is_retriable() => {
                tracing::warn!(
                    worker = self.worker,
                    message_id = %message_id,
                    attempt,
                    error = %e,
                    "audit store unavailable, requeueing"
                );
                self.settle_nack(delivery, true).await;
            }
            Err(e) => {
                tracing::error!(
                    worker = self.worker,
                    message_id = %message_id,
                    error = %e,
                    "audit event rejected by store, dead-lettering"
                );
                self.settle_nack(delivery, false).await;
            }
        }
    }

    async fn settle_nack(&self, delivery: Delivery, requeue: bool) {
        let message_id = delivery.id.clone();
        if let Err(e) = self.queue.nack(delivery, requeue).await {
            tracing::error!(
                worker = self.worker,
                message_id = %message_id,
                error = %e,
                "failed to nack audit delivery"
            );
        }
    }
}

/// Reject events that parsed but cannot become a valid row
fn validate(event: &AuditEvent) -> Result<(), &'static str> {
    if event.actor.user_id <= 0 {
        return Err("actor user id must be positive");
    }
    if event.action_kind.trim().is_empty() {
        return Err("action kind is empty");
    }
    if event.entity_type.trim().is_empty() {
        return Err("entity type is empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::action::ActionKind;
    use crate::audit::event::ActorRef;
    use crate::audit::queue::MemoryQueue;
    use crate::audit::store::{AuditLogRecord, LogPage, LogQuery, StoreError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Mock store that can fail the first N inserts or fail every insert
    struct MockStore {
        inserted: AtomicU64,
        unavailable_times: AtomicU64,
        constraint_always: bool,
        last_entry: Mutex<Option<NewAuditLog>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                inserted: AtomicU64::new(0),
                unavailable_times: AtomicU64::new(0),
                constraint_always: false,
                last_entry: Mutex::new(None),
            }
        }

        fn failing_first(times: u64) -> Self {
            let store = Self::new();
            store.unavailable_times.store(times, Ordering::SeqCst);
            store
        }

        fn rejecting() -> Self {
            Self {
                constraint_always: true,
                ..Self::new()
            }
        }

        fn insert_count(&self) -> u64 {
            self.inserted.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuditLogStore for MockStore {
        async fn insert(&self, entry: NewAuditLog) -> Result<i64, StoreError> {
            if self.constraint_always {
                return Err(StoreError::Constraint("user_id must exist".to_string()));
            }
            let remaining = self.unavailable_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.unavailable_times.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            *self.last_entry.lock().unwrap() = Some(entry);
            let id = self.inserted.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(id as i64)
        }

        async fn get(&self, _id: i64) -> Result<Option<AuditLogRecord>, StoreError> {
            Ok(None)
        }

        async fn list(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
            Ok(LogPage {
                records: Vec::new(),
                total: 0,
                page: query.page,
                per_page: query.per_page,
            })
        }

        async fn initialize(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn harness(store: MockStore) -> (Arc<MemoryQueue>, Arc<MockStore>, AuditPersister) {
        let queue = Arc::new(MemoryQueue::new(
            Duration::from_secs(5),
            5,
            Duration::from_millis(50),
        ));
        let store = Arc::new(store);
        let persister = AuditPersister::new(
            0,
            queue.clone() as Arc<dyn AuditQueue>,
            store.clone() as Arc<dyn AuditLogStore>,
        );
        (queue, store, persister)
    }

    fn sample_event() -> AuditEvent {
        AuditEvent::new(ActorRef::new(42), ActionKind::IpCreated, "ip_address")
            .with_entity_id("17")
            .with_metadata(json!({"after": {"value": "10.0.0.2"}}))
    }

    #[tokio::test]
    async fn valid_event_is_persisted_and_acked() {
        let (queue, store, persister) = harness(MockStore::new());
        queue.enqueue(&sample_event()).await.unwrap();

        let delivery = queue.dequeue().await.unwrap().unwrap();
        persister.process(delivery).await;

        assert_eq!(store.insert_count(), 1);
        assert_eq!(queue.ready_len(), 0);
        assert_eq!(queue.in_flight_len(), 0);
        assert!(queue.dead_letters().is_empty());

        let entry = store.last_entry.lock().unwrap().take().unwrap();
        assert_eq!(entry.user_id, 42);
        assert_eq!(entry.action, "ip_address.created");
        assert_eq!(entry.entity_id.as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn malformed_payload_dead_letters_without_insert() {
        let (queue, store, persister) = harness(MockStore::new());
        queue.enqueue_raw(b"{not valid json".to_vec());

        let delivery = queue.dequeue().await.unwrap().unwrap();
        persister.process(delivery).await;

        assert_eq!(store.insert_count(), 0);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload, b"{not valid json".to_vec());
    }

    #[tokio::test]
    async fn non_positive_user_id_dead_letters() {
        let (queue, store, persister) = harness(MockStore::new());
        let payload = serde_json::to_vec(&json!({
            "actor": {"userId": 0},
            "actionKind": "auth.login",
            "entityType": "user"
        }))
        .unwrap();
        queue.enqueue_raw(payload);

        let delivery = queue.dequeue().await.unwrap().unwrap();
        persister.process(delivery).await;

        assert_eq!(store.insert_count(), 0);
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn empty_entity_type_dead_letters() {
        let (queue, store, persister) = harness(MockStore::new());
        let payload = serde_json::to_vec(&json!({
            "actor": {"userId": 42},
            "actionKind": "auth.login",
            "entityType": "  "
        }))
        .unwrap();
        queue.enqueue_raw(payload);

        let delivery = queue.dequeue().await.unwrap().unwrap();
        persister.process(delivery).await;

        assert_eq!(store.insert_count(), 0);
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn unknown_action_kind_still_persists() {
        let (queue, store, persister) = harness(MockStore::new());
        let payload = serde_json::to_vec(&json!({
            "actor": {"userId": 42},
            "actionKind": "subnet.archived",
            "entityType": "subnet"
        }))
        .unwrap();
        queue.enqueue_raw(payload);

        let delivery = queue.dequeue().await.unwrap().unwrap();
        persister.process(delivery).await;

        assert_eq!(store.insert_count(), 1);
        let entry = store.last_entry.lock().unwrap().take().unwrap();
        assert_eq!(entry.action, "subnet.archived");
    }

    #[tokio::test]
    async fn retriable_store_failure_requeues_then_succeeds() {
        let (queue, store, persister) = harness(MockStore::failing_first(1));
        queue.enqueue(&sample_event()).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        persister.process(first).await;
        assert_eq!(store.insert_count(), 0);
        assert_eq!(queue.ready_len(), 1);

        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);
        persister.process(second).await;

        assert_eq!(store.insert_count(), 1);
        assert!(queue.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn non_retriable_store_failure_dead_letters() {
        let (queue, store, persister) = harness(MockStore::rejecting());
        queue.enqueue(&sample_event()).await.unwrap();

        let delivery = queue.dequeue().await.unwrap().unwrap();
        persister.process(delivery).await;

        assert_eq!(store.insert_count(), 0);
        assert_eq!(queue.dead_letters().len(), 1);
        assert_eq!(queue.ready_len(), 0);
    }

    #[tokio::test]
    async fn run_loop_drains_queue_and_stops_on_cancel() {
        let (queue, store, persister) = harness(MockStore::new());
        for _ in 0..3 {
            queue.enqueue(&sample_event()).await.unwrap();
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(persister.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.insert_count(), 3);
        assert_eq!(queue.ready_len(), 0);
        assert!(queue.dead_letters().is_empty());
    }
}
