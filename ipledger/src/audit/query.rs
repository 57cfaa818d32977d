//! Read-only audit log query API
//!
//! Serves paginated, filtered listings and single-record lookups, rendering
//! every row through the action descriptor registry. There are no write
//! routes here at all; immutability is the store's job.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::action;
use super::store::{
    AuditLogRecord, AuditLogStore, LogQuery, SortOrder, DEFAULT_PER_PAGE, MAX_PER_PAGE,
};
use crate::error::Error;

/// Shared state for the query handlers
#[derive(Clone)]
pub struct QueryState {
    pub store: Arc<dyn AuditLogStore>,
}

impl QueryState {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }
}

/// Routes for the audit log read API
pub fn audit_log_routes() -> Router<QueryState> {
    Router::new()
        .route("/api/v1/audit-logs", get(list_audit_logs))
        .route("/api/v1/audit-logs/{id}", get(get_audit_log))
}

/// Listing query parameters; filters use `filter[...]` keys
#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(rename = "filter[user_id]")]
    user_id: Option<String>,
    #[serde(rename = "filter[action]")]
    action: Option<String>,
    #[serde(rename = "filter[entity_type]")]
    entity_type: Option<String>,
    /// `created_at` or `-created_at`; anything else keeps the default
    sort: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

async fn list_audit_logs(
    State(state): State<QueryState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, Error> {
    let query = build_query(&params)?;
    let page = state.store.list(&query).await?;

    let data: Vec<Value> = page
        .records
        .iter()
        .map(|record| render_record(record, false))
        .collect();

    Ok(Json(json!({
        "data": data,
        "meta": {
            "current_page": page.page,
            "per_page": page.per_page,
            "total": page.total,
            "last_page": page.last_page(),
        }
    })))
}

async fn get_audit_log(
    State(state): State<QueryState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, Error> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("audit log {} not found", id)))?;

    Ok(Json(json!({ "data": render_record(&record, true) })))
}

/// Translate query parameters into a store query
fn build_query(params: &ListParams) -> Result<LogQuery, Error> {
    let user_id = match params.user_id.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            Error::ValidationError("filter[user_id] must be an integer".to_string())
        })?),
    };

    let sort = match params.sort.as_deref() {
        Some("created_at") => SortOrder::Asc,
        _ => SortOrder::Desc,
    };

    Ok(LogQuery {
        user_id,
        action: params.action.clone().filter(|s| !s.is_empty()),
        entity_type: params.entity_type.clone().filter(|s| !s.is_empty()),
        sort,
        page: params.page.unwrap_or(1).max(1),
        per_page: params
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE),
    })
}

/// Render one stored row for the API
///
/// The detail view additionally exposes the raw metadata and request
/// context. `included.user` appears only when the metadata carries the actor
/// snapshot. Unknown action strings render with registry fallbacks; a
/// listing never fails because of one old or foreign row.
fn render_record(record: &AuditLogRecord, detail: bool) -> Value {
    let description = action::describe(&record.action, &record.metadata);

    let mut attributes = json!({
        "action": description.label,
        "type": description.category,
        "details": description.details,
        "ip_address": description.subject_address,
        "user_id": record.user_id,
        "entity_type": record.entity_type,
        "entity_id": record.entity_id,
        "createdAt": record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    });

    if detail {
        attributes["metadata"] = record.metadata.clone();
        attributes["request_ip"] = json!(record.request_ip);
        attributes["user_agent"] = json!(record.user_agent);
    }

    let mut rendered = json!({
        "type": "audit_log",
        "id": record.id.to_string(),
        "attributes": attributes,
        "relationships": {
            "user": { "data": { "type": "user", "id": record.user_id.to_string() } }
        },
    });

    if let Some(user) = record.metadata.get("user") {
        rendered["included"] = json!({ "user": user });
    }

    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::store::{LogPage, NewAuditLog, StoreError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Store stub that records the query it receives
    struct StubStore {
        rows: Vec<AuditLogRecord>,
        seen_query: Mutex<Option<LogQuery>>,
    }

    impl StubStore {
        fn new(rows: Vec<AuditLogRecord>) -> Self {
            Self {
                rows,
                seen_query: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl AuditLogStore for StubStore {
        async fn insert(&self, _entry: NewAuditLog) -> Result<i64, StoreError> {
            Err(StoreError::Query("read-only stub".to_string()))
        }

        async fn get(&self, id: i64) -> Result<Option<AuditLogRecord>, StoreError> {
            Ok(self.rows.iter().find(|r| r.id == id).cloned())
        }

        async fn list(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
            *self.seen_query.lock().unwrap() = Some(query.clone());
            Ok(LogPage {
                records: self.rows.clone(),
                total: self.rows.len() as u64,
                page: query.page,
                per_page: query.per_page,
            })
        }

        async fn initialize(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn record(id: i64, action: &str, metadata: Value) -> AuditLogRecord {
        AuditLogRecord {
            id,
            user_id: 42,
            session_id: Some("sess-1".to_string()),
            action: action.to_string(),
            entity_type: "ip_address".to_string(),
            entity_id: Some("17".to_string()),
            metadata,
            request_ip: Some("203.0.113.9".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 8, 20, 14, 3, 11).unwrap(),
        }
    }

    fn router(rows: Vec<AuditLogRecord>) -> (Arc<StubStore>, Router) {
        let store = Arc::new(StubStore::new(rows));
        let state = QueryState::new(store.clone() as Arc<dyn AuditLogStore>);
        (store, audit_log_routes().with_state(state))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn defaults_sort_newest_first() {
        let query = build_query(&ListParams::default()).unwrap();
        assert_eq!(query.sort, SortOrder::Desc);
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, DEFAULT_PER_PAGE);
        assert!(query.user_id.is_none());
    }

    #[test]
    fn sort_and_clamping_rules() {
        let params = ListParams {
            sort: Some("created_at".to_string()),
            per_page: Some(250),
            page: Some(0),
            ..ListParams::default()
        };
        let query = build_query(&params).unwrap();
        assert_eq!(query.sort, SortOrder::Asc);
        assert_eq!(query.per_page, MAX_PER_PAGE);
        assert_eq!(query.page, 1);

        let params = ListParams {
            sort: Some("entity_type".to_string()),
            ..ListParams::default()
        };
        assert_eq!(build_query(&params).unwrap().sort, SortOrder::Desc);
    }

    #[test]
    fn non_numeric_user_filter_is_rejected() {
        let params = ListParams {
            user_id: Some("abc".to_string()),
            ..ListParams::default()
        };
        assert!(matches!(
            build_query(&params),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn renders_updated_record() {
        let row = record(
            311,
            "ip_address.updated",
            json!({
                "user": {"id": 42, "email": "a@b.c", "name": "Ada", "user_type": "admin"},
                "before": {"value": "10.0.0.1", "label": "web-1", "comment": null},
                "after": {"value": "10.0.0.2", "label": "web-1", "comment": null}
            }),
        );

        let rendered = render_record(&row, false);
        assert_eq!(rendered["type"], "audit_log");
        assert_eq!(rendered["id"], "311");
        assert_eq!(rendered["attributes"]["action"], "IP Address Updated");
        assert_eq!(rendered["attributes"]["type"], "update");
        assert_eq!(
            rendered["attributes"]["details"],
            "(Updated) IP address from 10.0.0.1 to 10.0.0.2"
        );
        assert_eq!(rendered["attributes"]["ip_address"], "10.0.0.2");
        assert_eq!(rendered["attributes"]["createdAt"], "2026-08-20 14:03:11");
        assert_eq!(
            rendered["relationships"]["user"]["data"],
            json!({"type": "user", "id": "42"})
        );
        assert_eq!(rendered["included"]["user"]["email"], "a@b.c");
        // List view omits the detail-only attributes
        assert!(rendered["attributes"].get("metadata").is_none());
        assert!(rendered["attributes"].get("request_ip").is_none());
    }

    #[test]
    fn detail_view_adds_metadata_and_request_context() {
        let row = record(7, "auth.login", json!({"user": {"id": 42}}));
        let rendered = render_record(&row, true);
        assert_eq!(rendered["attributes"]["details"], "User logged in");
        assert_eq!(rendered["attributes"]["ip_address"], "-");
        assert_eq!(rendered["attributes"]["request_ip"], "203.0.113.9");
        assert_eq!(rendered["attributes"]["user_agent"], "Mozilla/5.0");
        assert_eq!(rendered["attributes"]["metadata"]["user"]["id"], 42);
    }

    #[test]
    fn unknown_action_renders_with_fallbacks() {
        let row = record(9, "subnet.archived", Value::Null);
        let rendered = render_record(&row, false);
        assert_eq!(rendered["attributes"]["action"], "subnet.archived");
        assert_eq!(rendered["attributes"]["type"], "unknown");
        assert_eq!(rendered["attributes"]["ip_address"], "-");
        assert!(rendered.get("included").is_none());
    }

    #[tokio::test]
    async fn list_route_passes_filters_to_the_store() {
        let (store, router) = router(Vec::new());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/audit-logs?filter%5Buser_id%5D=42&filter%5Baction%5D=auth.login&sort=created_at&per_page=250")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["meta"]["total"], 0);
        assert_eq!(body["meta"]["current_page"], 1);
        assert_eq!(body["meta"]["last_page"], 1);

        let seen = store.seen_query.lock().unwrap().clone().unwrap();
        assert_eq!(seen.user_id, Some(42));
        assert_eq!(seen.action.as_deref(), Some("auth.login"));
        assert_eq!(seen.sort, SortOrder::Asc);
        assert_eq!(seen.per_page, MAX_PER_PAGE);
    }

    #[tokio::test]
    async fn list_route_renders_rows() {
        let rows = vec![record(
            311,
            "ip_address.created",
            json!({"after": {"value": "10.0.0.2"}}),
        )];
        let (_store, router) = router(rows);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/audit-logs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["attributes"]["action"], "IP Address Created");
        assert_eq!(
            body["data"][0]["attributes"]["details"],
            "Created IP address: 10.0.0.2"
        );
        assert_eq!(body["meta"]["total"], 1);
    }

    #[tokio::test]
    async fn show_route_returns_404_envelope_for_missing_rows() {
        let (_store, router) = router(Vec::new());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/audit-logs/999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], 404);
        assert!(body["error"].as_str().unwrap().contains("999"));
    }

    #[tokio::test]
    async fn invalid_user_filter_returns_422() {
        let (_store, router) = router(Vec::new());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/audit-logs?filter%5Buser_id%5D=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
