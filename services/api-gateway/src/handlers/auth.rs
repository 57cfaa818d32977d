//! Authentication passthrough handlers

use ipledger::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;

use super::body_or_empty;
use crate::AppState;

/// Proxy: authenticate against the auth service
///
/// The one gateway route with local validation: requests without
/// credentials are rejected here, before any upstream call.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let body = body_or_empty(body);

    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for field in ["email", "password"] {
        if !filled(&body, field) {
            errors
                .entry(field.to_string())
                .or_default()
                .push(format!("The {field} field is required."));
        }
    }
    if !errors.is_empty() {
        return ProxyError::from_field_errors(errors).respond(state.debug);
    }

    forward(
        state.auth.post("api/v1/login", &headers, &body).await,
        state.debug,
    )
    .await
}

/// Proxy: exchange the current token for a fresh one
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let body = body_or_empty(body);

    forward(
        state.auth.post("api/v1/refresh", &headers, &body).await,
        state.debug,
    )
    .await
}

/// Proxy: invalidate the current token
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    forward(
        state.auth.delete("api/v1/logout", &headers).await,
        state.debug,
    )
    .await
}

/// A field counts as provided when it is present and non-empty
fn filled(body: &Value, field: &str) -> bool {
    match body.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}
