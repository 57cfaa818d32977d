//! User directory passthrough handlers
//!
//! User records live in the auth service; the gateway exposes list, show,
//! and create.

use axum::extract::RawQuery;
use ipledger::prelude::*;
use serde_json::Value;

use super::{body_or_empty, with_query};
use crate::AppState;

/// Proxy: list users
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let path = with_query("api/v1/users", query);
    forward(state.auth.get(&path, &headers).await, state.debug).await
}

/// Proxy: fetch one user
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    forward(
        state.auth.get(&format!("api/v1/users/{id}"), &headers).await,
        state.debug,
    )
    .await
}

/// Proxy: create a user
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let body = body_or_empty(body);

    forward(
        state.auth.post("api/v1/users", &headers, &body).await,
        state.debug,
    )
    .await
}
