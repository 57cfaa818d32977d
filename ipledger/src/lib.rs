//! # ipledger
//!
//! Cross-service audit event pipeline for the IP inventory suite. Business
//! services record who did what by publishing audit events; a durable queue
//! decouples them from persistence; worker consumers append the events to an
//! immutable log store; a read-only HTTP API renders the log for the admin UI.
//! An edge gateway fronts the upstream services and normalizes their failures.
//!
//! ## Pipeline
//!
//! - **Publisher**: serializes an [`AuditEvent`](audit::AuditEvent) and blocks
//!   only on enqueue — never on the write landing
//! - **Queue**: at-least-once delivery with visibility timeouts, bounded
//!   attempts, and a dead-letter channel (Redis Streams or in-memory)
//! - **Persister**: validates, appends, acks; malformed events dead-letter,
//!   transient storage failures requeue
//! - **Store**: append-only rows guarded by database triggers — update and
//!   delete fail with a distinct error even for out-of-band writers
//! - **Query**: read-only listing and detail endpoints with rendered,
//!   human-readable action summaries
//! - **Gateway**: reqwest-backed proxying with a fixed error-normalization
//!   contract (passthrough / 503 / 500 / 422)
//!
//! ## Example
//!
//! ```rust,no_run
//! use ipledger::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load_from("config.toml")?;
//!     init_tracing(&config)?;
//!
//!     let queue = build_queue(&config.queue)?;
//!     let store = build_store(&config.storage).await?;
//!     store.initialize().await?;
//!
//!     let publisher = AuditPublisher::new(Arc::clone(&queue));
//!     let event = AuditEvent::new(ActorRef::new(42), ActionKind::Login, "user");
//!     publisher.publish(event).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::action::{ActionKind, UnknownActionKind};
    pub use crate::audit::event::{ActorRef, AuditEvent, RequestContext};
    pub use crate::audit::persister::AuditPersister;
    pub use crate::audit::publisher::AuditPublisher;
    pub use crate::audit::queue::{build_queue, AuditQueue, Delivery, MessageId, QueueError};
    pub use crate::audit::query::{audit_log_routes, QueryState};
    pub use crate::audit::store::{
        build_store, AuditLogRecord, AuditLogStore, LogPage, LogQuery, NewAuditLog, StoreError,
    };
    pub use crate::config::{Config, GatewayConfig, QueueConfig, ServiceConfig, StorageConfig};
    pub use crate::error::{Error, ErrorResponse, Result};
    pub use crate::gateway::client::ServiceClient;
    pub use crate::gateway::proxy::{forward, ProxyError};
    pub use crate::observability::init_tracing;
    pub use crate::server::Server;

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Router,
    };

    pub use serde::{Deserialize, Serialize};

    // Re-export tracing macros and types
    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    // Re-export tokio for async runtime
    pub use tokio;

    // Re-export async-trait for async trait definitions
    pub use async_trait::async_trait;

    // Re-export time utilities
    pub use chrono::{DateTime, Utc};

    // Re-export UUID
    pub use uuid::Uuid;

    // Re-export futures utilities
    pub use futures::{future, stream, Future, Stream, StreamExt};

    // Re-export HTTP types
    pub use http::{Method, Uri};
}
