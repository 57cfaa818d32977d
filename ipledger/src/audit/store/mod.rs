//! Audit log store trait and backend implementations
//!
//! The `AuditLogStore` trait defines the append-only persistence interface
//! for audit log rows. Implementations enforce immutability at the database
//! level with `BEFORE UPDATE` / `BEFORE DELETE` triggers that abort, so even
//! out-of-band writes cannot rewrite history. The trait itself exposes no
//! update or delete operation.
//!
//! # Available Backends
//!
//! - **PostgreSQL** (`postgres` feature): trigger function raising an
//!   exception on UPDATE/DELETE
//! - **Local** (`local-store` feature): embedded libsql file with
//!   `RAISE(ABORT, ...)` triggers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::audit::event::AuditEvent;
use crate::config::{StorageConfig, StorageDriver};

#[cfg(feature = "postgres")]
pub mod pg;

#[cfg(feature = "local-store")]
pub mod local;

/// Abort message raised by the immutability triggers; both backends match on
/// it to classify the failure
pub(crate) const IMMUTABLE_MESSAGE: &str = "audit logs are immutable";

/// Default page size for listings
pub const DEFAULT_PER_PAGE: u32 = 15;

/// Upper bound on the requested page size
pub const MAX_PER_PAGE: u32 = 100;

/// A row to append
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: i64,
    pub session_id: Option<String>,
    /// Raw action kind string as received on the wire
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub metadata: Value,
    pub request_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<AuditEvent> for NewAuditLog {
    fn from(event: AuditEvent) -> Self {
        Self {
            user_id: event.actor.user_id,
            session_id: event.actor.session_id,
            action: event.action_kind,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            metadata: event.metadata,
            request_ip: event.context.request_ip,
            user_agent: event.context.user_agent,
        }
    }
}

/// A stored audit log row
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogRecord {
    pub id: i64,
    pub user_id: i64,
    pub session_id: Option<String>,
    /// Raw action kind string; may no longer parse under the current
    /// registry and renders defensively in that case
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub metadata: Value,
    pub request_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sort direction for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Filters, sort, and pagination for a listing
#[derive(Debug, Clone)]
pub struct LogQuery {
    /// Exact-match filter on `user_id`
    pub user_id: Option<i64>,
    /// Exact-match filter on the raw action string
    pub action: Option<String>,
    /// Exact-match filter on `entity_type`
    pub entity_type: Option<String>,
    /// Sort by `created_at`; newest first by default
    pub sort: SortOrder,
    /// 1-based page number
    pub page: u32,
    /// Rows per page
    pub per_page: u32,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            action: None,
            entity_type: None,
            sort: SortOrder::Desc,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl LogQuery {
    /// Row offset implied by page and per_page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// One page of a listing plus the unpaged total
#[derive(Debug, Clone)]
pub struct LogPage {
    pub records: Vec<AuditLogRecord>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl LogPage {
    /// Last page number; 1 even when there are no rows
    pub fn last_page(&self) -> u32 {
        if self.total == 0 || self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(u64::from(self.per_page)).max(1) as u32
    }
}

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// An immutability trigger aborted the statement
    #[error("audit log records are immutable")]
    ImmutableRecord,

    /// The database cannot be reached; the operation may succeed later
    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    /// A constraint rejected the row
    #[error("audit store constraint violated: {0}")]
    Constraint(String),

    /// The statement failed for any other reason
    #[error("audit store query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Whether retrying the same operation can reasonably succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Append-only audit log persistence
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Append a row, returning its assigned id
    ///
    /// `created_at` is assigned by the database at insert time.
    async fn insert(&self, entry: NewAuditLog) -> Result<i64, StoreError>;

    /// Fetch one row by id
    async fn get(&self, id: i64) -> Result<Option<AuditLogRecord>, StoreError>;

    /// List rows matching the query with a total count
    async fn list(&self, query: &LogQuery) -> Result<LogPage, StoreError>;

    /// Create the table, indexes, and immutability triggers (idempotent)
    async fn initialize(&self) -> Result<(), StoreError>;
}

/// Build the store backend named by the configuration
pub async fn build_store(config: &StorageConfig) -> Result<Arc<dyn AuditLogStore>, StoreError> {
    match config.driver {
        #[cfg(feature = "postgres")]
        StorageDriver::Postgres => Ok(Arc::new(pg::PgAuditLogStore::connect(config).await?)),
        #[cfg(not(feature = "postgres"))]
        StorageDriver::Postgres => Err(StoreError::Query(
            "postgres driver requires the postgres feature".to_string(),
        )),
        #[cfg(feature = "local-store")]
        StorageDriver::Local => Ok(Arc::new(local::LocalAuditLogStore::open(&config.path).await?)),
        #[cfg(not(feature = "local-store"))]
        StorageDriver::Local => Err(StoreError::Query(
            "local driver requires the local-store feature".to_string(),
        )),
    }
}
