//! IP inventory passthrough handlers

use axum::extract::RawQuery;
use ipledger::prelude::*;
use serde_json::Value;

use super::{body_or_empty, with_query};
use crate::AppState;

/// Proxy: list IP addresses, forwarding filters and pagination verbatim
pub async fn list_ip_addresses(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let path = with_query("api/v1/ip-addresses", query);
    forward(state.inventory.get(&path, &headers).await, state.debug).await
}

/// Proxy: aggregate counts for the dashboard cards
pub async fn ip_address_stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    forward(
        state
            .inventory
            .get("api/v1/ip-addresses/stats", &headers)
            .await,
        state.debug,
    )
    .await
}

/// Proxy: fetch one IP address
pub async fn get_ip_address(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    forward(
        state
            .inventory
            .get(&format!("api/v1/ip-addresses/{id}"), &headers)
            .await,
        state.debug,
    )
    .await
}

/// Proxy: record a new IP address
pub async fn create_ip_address(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let body = body_or_empty(body);

    forward(
        state
            .inventory
            .post("api/v1/ip-addresses", &headers, &body)
            .await,
        state.debug,
    )
    .await
}

/// Proxy: update an IP address, preserving the caller's method
pub async fn update_ip_address(
    method: Method,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let body = body_or_empty(body);
    let path = format!("api/v1/ip-addresses/{id}");

    let outcome = if method == Method::PATCH {
        state.inventory.patch(&path, &headers, &body).await
    } else {
        state.inventory.put(&path, &headers, &body).await
    };

    forward(outcome, state.debug).await
}

/// Proxy: delete an IP address
pub async fn delete_ip_address(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    forward(
        state
            .inventory
            .delete(&format!("api/v1/ip-addresses/{id}"), &headers)
            .await,
        state.debug,
    )
    .await
}
