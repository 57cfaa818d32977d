//! PostgreSQL audit log store
//!
//! Immutability is enforced with a trigger function that raises an exception
//! on UPDATE or DELETE; the error mapper recognizes the abort message and
//! classifies it as [`StoreError::ImmutableRecord`] so tampering attempts are
//! distinguishable from ordinary failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use super::{
    AuditLogRecord, AuditLogStore, LogPage, LogQuery, NewAuditLog, SortOrder, StoreError,
    IMMUTABLE_MESSAGE,
};
use crate::config::StorageConfig;

/// PostgreSQL-backed audit log store
pub struct PgAuditLogStore {
    pool: PgPool,
}

impl PgAuditLogStore {
    /// Connect a pool per the storage configuration
    pub async fn connect(config: &StorageConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to postgres: {}", e)))?;

        tracing::info!(
            "postgres audit store connected: max_connections={}",
            config.max_connections
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for PgAuditLogStore {
    async fn insert(&self, entry: NewAuditLog) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO audit_logs (
                user_id, session_id, action, entity_type,
                entity_id, metadata, request_ip, user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.session_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.metadata)
        .bind(&entry.request_ip)
        .bind(&entry.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.0)
    }

    async fn get(&self, id: i64) -> Result<Option<AuditLogRecord>, StoreError> {
        let row = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT id, user_id, session_id, action, entity_type,
                   entity_id, metadata, request_ip, user_agent, created_at
            FROM audit_logs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.map(Into::into))
    }

    async fn list(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut arg_index = 0;

        if query.user_id.is_some() {
            arg_index += 1;
            conditions.push(format!("user_id = ${}", arg_index));
        }
        if query.action.is_some() {
            arg_index += 1;
            conditions.push(format!("action = ${}", arg_index));
        }
        if query.entity_type.is_some() {
            arg_index += 1;
            conditions.push(format!("entity_type = ${}", arg_index));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_clause);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(user_id) = query.user_id {
            count_query = count_query.bind(user_id);
        }
        if let Some(ref action) = query.action {
            count_query = count_query.bind(action);
        }
        if let Some(ref entity_type) = query.entity_type {
            count_query = count_query.bind(entity_type);
        }
        let (total,) = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let order = match query.sort {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        // id breaks created_at ties so pagination stays stable
        let rows_sql = format!(
            r#"
            SELECT id, user_id, session_id, action, entity_type,
                   entity_id, metadata, request_ip, user_agent, created_at
            FROM audit_logs{}
            ORDER BY created_at {}, id {}
            LIMIT ${} OFFSET ${}
            "#,
            where_clause,
            order,
            order,
            arg_index + 1,
            arg_index + 2
        );

        let mut rows_query = sqlx::query_as::<_, AuditLogRow>(&rows_sql);
        if let Some(user_id) = query.user_id {
            rows_query = rows_query.bind(user_id);
        }
        if let Some(ref action) = query.action {
            rows_query = rows_query.bind(action);
        }
        if let Some(ref entity_type) = query.entity_type {
            rows_query = rows_query.bind(entity_type);
        }
        let rows = rows_query
            .bind(i64::from(query.per_page))
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(LogPage {
            records: rows.into_iter().map(Into::into).collect(),
            total: total as u64,
            page: query.page,
            per_page: query.per_page,
        })
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                session_id TEXT,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT,
                metadata JSONB NOT NULL DEFAULT 'null'::jsonb,
                request_ip TEXT,
                user_agent TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        for index_sql in [
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_user_created ON audit_logs (user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs (entity_type, entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_action ON audit_logs (action)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_session ON audit_logs (session_id)",
        ] {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        }

        sqlx::query(&format!(
            r#"
            CREATE OR REPLACE FUNCTION audit_logs_immutable() RETURNS trigger AS $fn$
            BEGIN
                RAISE EXCEPTION '{}';
            END;
            $fn$ LANGUAGE plpgsql
            "#,
            IMMUTABLE_MESSAGE
        ))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            DO $$
            BEGIN
                IF NOT EXISTS (
                    SELECT 1 FROM pg_trigger WHERE tgname = 'audit_logs_no_update'
                ) THEN
                    CREATE TRIGGER audit_logs_no_update
                    BEFORE UPDATE ON audit_logs
                    FOR EACH ROW EXECUTE FUNCTION audit_logs_immutable();
                END IF;

                IF NOT EXISTS (
                    SELECT 1 FROM pg_trigger WHERE tgname = 'audit_logs_no_delete'
                ) THEN
                    CREATE TRIGGER audit_logs_no_delete
                    BEFORE DELETE ON audit_logs
                    FOR EACH ROW EXECUTE FUNCTION audit_logs_immutable();
                END IF;
            END
            $$;
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct AuditLogRow {
    id: i64,
    user_id: i64,
    session_id: Option<String>,
    action: String,
    entity_type: String,
    entity_id: Option<String>,
    metadata: serde_json::Value,
    request_ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for AuditLogRecord {
    fn from(row: AuditLogRow) -> Self {
        AuditLogRecord {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            metadata: row.metadata,
            request_ip: row.request_ip,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

/// Classify a sqlx error into the store error taxonomy
fn map_sqlx_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            if message.contains(IMMUTABLE_MESSAGE) {
                StoreError::ImmutableRecord
            } else if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation()
            {
                StoreError::Constraint(message)
            } else {
                StoreError::Query(message)
            }
        }
        e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}
