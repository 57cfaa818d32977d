//! Audit log passthrough handlers
//!
//! Read-only: the audit service exposes no create, update, or delete to
//! forward.

use axum::extract::RawQuery;
use ipledger::prelude::*;

use super::with_query;
use crate::AppState;

/// Proxy: list audit logs, forwarding filters, sort, and pagination verbatim
pub async fn list_audit_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let path = with_query("api/v1/audit-logs", query);
    forward(state.audit.get(&path, &headers).await, state.debug).await
}

/// Proxy: fetch one audit log with its full detail
pub async fn get_audit_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    forward(
        state
            .audit
            .get(&format!("api/v1/audit-logs/{id}"), &headers)
            .await,
        state.debug,
    )
    .await
}
