//! End-to-end audit pipeline on the in-process queue and an embedded store
//!
//! Publishes a handful of audit events, runs one persister worker until the
//! queue drains, then lists the stored rows and renders them the way the
//! HTTP API does.
//!
//! ```sh
//! cargo run --example pipeline
//! ```

use ipledger::audit::action::describe;
use ipledger::config::StorageDriver;
use ipledger::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::default();
    init_tracing(&config)?;

    let dir = tempfile::tempdir()?;
    let storage = StorageConfig {
        driver: StorageDriver::Local,
        path: dir.path().join("audit.db").to_string_lossy().into_owned(),
        ..StorageConfig::default()
    };
    let store = build_store(&storage).await?;
    store.initialize().await?;

    let queue = build_queue(&QueueConfig {
        block_millis: 250,
        ..QueueConfig::default()
    })?;

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(
        AuditPersister::new(0, Arc::clone(&queue), Arc::clone(&store)).run(shutdown.clone()),
    );

    let publisher = AuditPublisher::new(Arc::clone(&queue));
    let admin = json!({"id": 1, "email": "ada@example.com", "name": "Ada", "user_type": "admin"});
    let operator = json!({"id": 2, "email": "gus@example.com", "name": "Gus", "user_type": "user"});

    publisher
        .publish(
            AuditEvent::new(ActorRef::new(1).with_session("sess-01"), ActionKind::Login, "user")
                .with_metadata(json!({"user": admin}))
                .with_context(RequestContext {
                    request_ip: Some("203.0.113.7".to_string()),
                    user_agent: Some("Mozilla/5.0".to_string()),
                }),
        )
        .await?;

    publisher
        .publish(
            AuditEvent::new(ActorRef::new(1), ActionKind::IpCreated, "ip_address")
                .with_entity_id("17")
                .with_metadata(json!({
                    "user": admin,
                    "after": {"value": "10.0.0.1", "label": "web-1", "comment": null}
                })),
        )
        .await?;

    publisher
        .publish(
            AuditEvent::new(ActorRef::new(2), ActionKind::IpUpdated, "ip_address")
                .with_entity_id("17")
                .with_metadata(json!({
                    "user": operator,
                    "before": {"value": "10.0.0.1", "label": "web-1", "comment": null},
                    "after": {"value": "10.0.0.2", "label": "web-1", "comment": "moved rack"}
                }))
                .with_context(RequestContext {
                    request_ip: Some("198.51.100.4".to_string()),
                    user_agent: Some("curl/8.5".to_string()),
                }),
        )
        .await?;

    publisher
        .publish(
            AuditEvent::new(ActorRef::new(1).with_session("sess-01"), ActionKind::Logout, "user")
                .with_metadata(json!({"user": admin})),
        )
        .await?;

    // Give the worker a moment to drain the queue
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if store.list(&LogQuery::default()).await?.total >= 4 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown.cancel();
    let _ = worker.await;

    let page = store.list(&LogQuery::default()).await?;
    println!("\n{} audit logs, newest first:\n", page.total);
    for record in &page.records {
        let action = describe(&record.action, &record.metadata);
        println!(
            "#{:<3} {:<20} {:<20} {}",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            action.label,
            action.details,
        );
    }

    if let Some(updated) = page
        .records
        .iter()
        .find(|r| r.action == "ip_address.updated")
    {
        let action = describe(&updated.action, &updated.metadata);
        println!("\nDetail for #{}:", updated.id);
        println!("  category:   {}", action.category);
        println!("  ip address: {}", action.subject_address);
        println!("  actor:      user {}", updated.user_id);
        println!(
            "  request ip: {}",
            updated.request_ip.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
