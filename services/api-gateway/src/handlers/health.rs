use ipledger::prelude::*;

/// Health check endpoint
///
/// Returns the gateway's identity. Used by the liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
