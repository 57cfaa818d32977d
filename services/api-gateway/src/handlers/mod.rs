use axum::Json;
use serde_json::{json, Value};

pub mod auth;
pub mod health;
pub mod inventory;
pub mod logs;
pub mod users;

pub use auth::{login, logout, refresh};
pub use health::health;
pub use inventory::{
    create_ip_address, delete_ip_address, get_ip_address, ip_address_stats, list_ip_addresses,
    update_ip_address,
};
pub use logs::{get_audit_log, list_audit_logs};
pub use users::{create_user, get_user, list_users};

/// Append the caller's query string to an upstream path
pub(crate) fn with_query(path: &str, query: Option<String>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

/// Incoming JSON body, or an empty object when the caller sent none
pub(crate) fn body_or_empty(body: Option<Json<Value>>) -> Value {
    body.map(|Json(body)| body).unwrap_or_else(|| json!({}))
}
