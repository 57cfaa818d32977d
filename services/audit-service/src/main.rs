//! Audit service
//!
//! Runs the persistence side of the audit pipeline in one binary: persister
//! workers draining the durable queue into the append-only store, plus the
//! read-only HTTP API the admin UI lists audit logs through.

use ipledger::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_named(env!("CARGO_PKG_NAME"))?;
    init_tracing(&config)?;

    info!(
        queue = ?config.queue.driver,
        storage = ?config.storage.driver,
        workers = config.queue.workers,
        "Audit pipeline configured"
    );

    let store = build_store(&config.storage).await?;
    store.initialize().await?;

    let queue = build_queue(&config.queue)?;

    // Workers run for the lifetime of the process and stop on the same
    // signal that drains the HTTP side.
    let shutdown = CancellationToken::new();
    let mut workers = Vec::with_capacity(config.queue.workers);
    for worker in 0..config.queue.workers {
        let persister = AuditPersister::new(worker, Arc::clone(&queue), Arc::clone(&store));
        workers.push(tokio::spawn(persister.run(shutdown.clone())));
    }

    let app = Router::new()
        .route("/health", get(health))
        .merge(audit_log_routes().with_state(QueryState::new(Arc::clone(&store))));

    let served = Server::new(config).serve(app).await;

    shutdown.cancel();
    for joined in future::join_all(workers).await {
        if let Err(e) = joined {
            error!("Persister worker panicked: {}", e);
        }
    }
    served?;

    info!("Audit service stopped");
    Ok(())
}

/// Liveness probe with service identity
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
