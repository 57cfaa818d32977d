//! Local libsql audit log store
//!
//! Embedded database file for single-binary deployments and tests.
//! Immutability is enforced with triggers that `RAISE(ABORT, ...)` on UPDATE
//! and DELETE; the abort message maps to [`StoreError::ImmutableRecord`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use super::{
    AuditLogRecord, AuditLogStore, LogPage, LogQuery, NewAuditLog, SortOrder, StoreError,
    IMMUTABLE_MESSAGE,
};

/// libsql-backed audit log store
pub struct LocalAuditLogStore {
    db: Arc<libsql::Database>,
}

impl LocalAuditLogStore {
    /// Open (or create) the database file
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to open {}: {}", path, e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn connect(&self) -> Result<libsql::Connection, StoreError> {
        self.db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("failed to connect: {}", e)))
    }

    /// Run one statement against a fresh connection, mapped into the store
    /// error taxonomy; used by tests to probe the immutability triggers
    #[cfg(test)]
    async fn raw_execute(&self, sql: &str) -> Result<u64, StoreError> {
        let conn = self.connect()?;
        conn.execute(sql, ()).await.map_err(map_libsql_err)
    }
}

#[async_trait]
impl AuditLogStore for LocalAuditLogStore {
    async fn insert(&self, entry: NewAuditLog) -> Result<i64, StoreError> {
        let conn = self.connect()?;

        let metadata_str = serde_json::to_string(&entry.metadata)
            .map_err(|e| StoreError::Query(format!("failed to encode metadata: {}", e)))?;

        conn.execute(
            r#"
            INSERT INTO audit_logs (
                user_id, session_id, action, entity_type,
                entity_id, metadata, request_ip, user_agent
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            libsql::params![
                entry.user_id,
                entry.session_id.clone(),
                entry.action.clone(),
                entry.entity_type.clone(),
                entry.entity_id.clone(),
                metadata_str,
                entry.request_ip.clone(),
                entry.user_agent.clone(),
            ],
        )
        .await
        .map_err(map_libsql_err)?;

        Ok(conn.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<AuditLogRecord>, StoreError> {
        let conn = self.connect()?;

        let mut rows = conn
            .query(
                r#"
                SELECT id, user_id, session_id, action, entity_type,
                       entity_id, metadata, request_ip, user_agent, created_at
                FROM audit_logs WHERE id = ?1
                "#,
                libsql::params![id],
            )
            .await
            .map_err(map_libsql_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(map_libsql_err(e)),
        }
    }

    async fn list(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
        let conn = self.connect()?;

        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<libsql::Value> = Vec::new();

        if let Some(user_id) = query.user_id {
            args.push(libsql::Value::Integer(user_id));
            conditions.push(format!("user_id = ?{}", args.len()));
        }
        if let Some(ref action) = query.action {
            args.push(libsql::Value::Text(action.clone()));
            conditions.push(format!("action = ?{}", args.len()));
        }
        if let Some(ref entity_type) = query.entity_type {
            args.push(libsql::Value::Text(entity_type.clone()));
            conditions.push(format!("entity_type = ?{}", args.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_clause);
        let mut count_rows = conn
            .query(&count_sql, args.clone())
            .await
            .map_err(map_libsql_err)?;
        let total: i64 = match count_rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| StoreError::Query(format!("failed to read count: {}", e)))?,
            Ok(None) => 0,
            Err(e) => return Err(map_libsql_err(e)),
        };

        let order = match query.sort {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        // RFC 3339 text sorts chronologically; id breaks ties
        let rows_sql = format!(
            r#"
            SELECT id, user_id, session_id, action, entity_type,
                   entity_id, metadata, request_ip, user_agent, created_at
            FROM audit_logs{}
            ORDER BY created_at {}, id {}
            LIMIT ?{} OFFSET ?{}
            "#,
            where_clause,
            order,
            order,
            args.len() + 1,
            args.len() + 2
        );

        args.push(libsql::Value::Integer(i64::from(query.per_page)));
        args.push(libsql::Value::Integer(query.offset() as i64));

        let mut rows = conn.query(&rows_sql, args).await.map_err(map_libsql_err)?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            records.push(row_to_record(&row)?);
        }

        Ok(LogPage {
            records,
            total: total as u64,
            page: query.page,
            per_page: query.per_page,
        })
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                session_id TEXT,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT,
                metadata TEXT,
                request_ip TEXT,
                user_agent TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
            "#,
            (),
        )
        .await
        .map_err(map_libsql_err)?;

        for index_sql in [
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_user_created ON audit_logs (user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs (entity_type, entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_action ON audit_logs (action)",
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_session ON audit_logs (session_id)",
        ] {
            conn.execute(index_sql, ()).await.map_err(map_libsql_err)?;
        }

        // Immutability triggers
        conn.execute(
            &format!(
                r#"
                CREATE TRIGGER IF NOT EXISTS audit_logs_no_update
                BEFORE UPDATE ON audit_logs
                BEGIN
                    SELECT RAISE(ABORT, '{}');
                END
                "#,
                IMMUTABLE_MESSAGE
            ),
            (),
        )
        .await
        .map_err(map_libsql_err)?;

        conn.execute(
            &format!(
                r#"
                CREATE TRIGGER IF NOT EXISTS audit_logs_no_delete
                BEFORE DELETE ON audit_logs
                BEGIN
                    SELECT RAISE(ABORT, '{}');
                END
                "#,
                IMMUTABLE_MESSAGE
            ),
            (),
        )
        .await
        .map_err(map_libsql_err)?;

        Ok(())
    }
}

fn row_to_record(row: &libsql::Row) -> Result<AuditLogRecord, StoreError> {
    let created_at_str: String = row
        .get(9)
        .map_err(|e| StoreError::Query(format!("failed to read created_at: {}", e)))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("failed to parse created_at: {}", e)))?;

    Ok(AuditLogRecord {
        id: row
            .get(0)
            .map_err(|e| StoreError::Query(format!("failed to read id: {}", e)))?,
        user_id: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("failed to read user_id: {}", e)))?,
        session_id: row.get(2).ok(),
        action: row
            .get(3)
            .map_err(|e| StoreError::Query(format!("failed to read action: {}", e)))?,
        entity_type: row
            .get(4)
            .map_err(|e| StoreError::Query(format!("failed to read entity_type: {}", e)))?,
        entity_id: row.get(5).ok(),
        metadata: row
            .get::<String>(6)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(Value::Null),
        request_ip: row.get(7).ok(),
        user_agent: row.get(8).ok(),
        created_at,
    })
}

/// Classify a libsql error into the store error taxonomy
fn map_libsql_err(e: libsql::Error) -> StoreError {
    let message = e.to_string();
    if message.contains(IMMUTABLE_MESSAGE) {
        StoreError::ImmutableRecord
    } else if message.contains("database is locked") {
        StoreError::Unavailable(message)
    } else if message.contains("constraint") || message.contains("UNIQUE") {
        StoreError::Constraint(message)
    } else {
        StoreError::Query(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn open_store() -> (tempfile::TempDir, LocalAuditLogStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let store = LocalAuditLogStore::open(path.to_str().unwrap()).await.unwrap();
        store.initialize().await.unwrap();
        (dir, store)
    }

    fn entry(user_id: i64, action: &str, entity_type: &str) -> NewAuditLog {
        NewAuditLog {
            user_id,
            session_id: Some("sess-1".to_string()),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: Some("17".to_string()),
            metadata: json!({"after": {"value": "10.0.0.2"}}),
            request_ip: Some("203.0.113.9".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let (_dir, store) = open_store().await;

        let first = store.insert(entry(1, "auth.login", "user")).await.unwrap();
        let second = store
            .insert(entry(2, "ip_address.created", "ip_address"))
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn get_round_trips_all_fields() {
        let (_dir, store) = open_store().await;

        let id = store
            .insert(entry(42, "ip_address.updated", "ip_address"))
            .await
            .unwrap();
        let record = store.get(id).await.unwrap().unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.user_id, 42);
        assert_eq!(record.session_id.as_deref(), Some("sess-1"));
        assert_eq!(record.action, "ip_address.updated");
        assert_eq!(record.entity_type, "ip_address");
        assert_eq!(record.entity_id.as_deref(), Some("17"));
        assert_eq!(record.metadata["after"]["value"], "10.0.0.2");
        assert_eq!(record.request_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(record.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn get_missing_row_returns_none() {
        let (_dir, store) = open_store().await;
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_is_rejected_by_trigger() {
        let (_dir, store) = open_store().await;
        let id = store.insert(entry(1, "auth.login", "user")).await.unwrap();

        let err = store
            .raw_execute(&format!(
                "UPDATE audit_logs SET action = 'forged' WHERE id = {}",
                id
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::ImmutableRecord));
        assert_eq!(
            store.get(id).await.unwrap().unwrap().action,
            "auth.login"
        );
    }

    #[tokio::test]
    async fn delete_is_rejected_by_trigger() {
        let (_dir, store) = open_store().await;
        let id = store.insert(entry(1, "auth.login", "user")).await.unwrap();

        let err = store
            .raw_execute(&format!("DELETE FROM audit_logs WHERE id = {}", id))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::ImmutableRecord));
        assert!(store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_filters_are_anded() {
        let (_dir, store) = open_store().await;
        store.insert(entry(1, "auth.login", "user")).await.unwrap();
        store
            .insert(entry(1, "ip_address.created", "ip_address"))
            .await
            .unwrap();
        store
            .insert(entry(2, "ip_address.created", "ip_address"))
            .await
            .unwrap();

        let page = store
            .list(&LogQuery {
                user_id: Some(1),
                action: Some("ip_address.created".to_string()),
                ..LogQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].user_id, 1);
        assert_eq!(page.records[0].action, "ip_address.created");
    }

    #[tokio::test]
    async fn list_defaults_to_newest_first() {
        let (_dir, store) = open_store().await;
        for n in 1..=3 {
            store.insert(entry(n, "auth.login", "user")).await.unwrap();
        }

        let page = store.list(&LogQuery::default()).await.unwrap();
        let ids: Vec<i64> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let ascending = store
            .list(&LogQuery {
                sort: SortOrder::Asc,
                ..LogQuery::default()
            })
            .await
            .unwrap();
        let ids: Vec<i64> = ascending.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn list_paginates_with_total() {
        let (_dir, store) = open_store().await;
        for n in 1..=7 {
            store.insert(entry(n, "auth.login", "user")).await.unwrap();
        }

        let page = store
            .list(&LogQuery {
                sort: SortOrder::Asc,
                page: 2,
                per_page: 3,
                ..LogQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 7);
        assert_eq!(page.last_page(), 3);
        let ids: Vec<i64> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn initialize_twice_is_harmless() {
        let (_dir, store) = open_store().await;
        store.initialize().await.unwrap();
        store.insert(entry(1, "auth.login", "user")).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_action_strings_persist_verbatim() {
        let (_dir, store) = open_store().await;
        let id = store
            .insert(entry(1, "subnet.archived", "subnet"))
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.action, "subnet.archived");
    }
}
