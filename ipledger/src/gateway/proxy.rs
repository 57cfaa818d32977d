//! Response normalization for proxied upstream calls
//!
//! Every gateway handler resolves to exactly one of four outcomes:
//!
//! 1. The upstream answered — pass its status and body through unchanged
//! 2. The upstream was unreachable (connect failure or timeout) — `503`
//! 3. Something unexpected broke while proxying — `500`
//! 4. Local validation rejected the request before any upstream call — `422`
//!
//! There are no automatic retries; a hung upstream surfaces as outcome 2
//! once the client timeout lapses.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

/// Body substituted when an upstream error response carries no readable JSON.
const FALLBACK_ERROR_MESSAGE: &str = "Service error occurred";

/// A proxied call that could not be answered with an upstream passthrough.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream never produced a response (connect failure or timeout).
    #[error("Service is unavailable: {0}")]
    Unavailable(String),

    /// The request failed local validation; no upstream call was made.
    #[error("{message}")]
    Validation {
        message: String,
        errors: BTreeMap<String, Vec<String>>,
    },

    /// Anything else that went wrong while proxying.
    #[error("{0}")]
    Unexpected(String),
}

impl ProxyError {
    /// Start a validation failure with a summary message.
    pub fn validation(message: impl Into<String>) -> Self {
        ProxyError::Validation {
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }

    /// Attach a per-field validation message. No-op on other variants.
    pub fn with_field(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        if let ProxyError::Validation { ref mut errors, .. } = self {
            errors.entry(field.into()).or_default().push(error.into());
        }
        self
    }

    /// Validation failure whose summary is derived from the field messages:
    /// the first one, with a count of any others.
    pub fn from_field_errors(errors: BTreeMap<String, Vec<String>>) -> Self {
        let all: Vec<&String> = errors.values().flatten().collect();
        let message = match all.len() {
            0 => "The given data was invalid.".to_string(),
            1 => all[0].clone(),
            n => format!(
                "{} (and {} more error{})",
                all[0],
                n - 1,
                if n == 2 { "" } else { "s" }
            ),
        };

        ProxyError::Validation { message, errors }
    }

    /// Classify a client-side failure: connect errors and timeouts mean the
    /// upstream is unreachable, everything else is unexpected.
    pub fn classify(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProxyError::Unavailable(err.to_string())
        } else {
            ProxyError::Unexpected(err.to_string())
        }
    }

    /// Render the normalized JSON response. `debug` controls whether the
    /// unexpected-error detail is exposed to the caller.
    pub fn respond(self, debug: bool) -> Response {
        match self {
            ProxyError::Unavailable(detail) => {
                tracing::error!("Gateway: upstream unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "message": "Service is unavailable",
                        "error": detail,
                    })),
                )
                    .into_response()
            }

            ProxyError::Validation { message, errors } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "message": message,
                    "errors": errors,
                })),
            )
                .into_response(),

            ProxyError::Unexpected(detail) => {
                tracing::error!("Gateway: unexpected error: {}", detail);
                let exposed = if debug {
                    detail
                } else {
                    "Internal server error".to_string()
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "message": "An unexpected error occurred",
                        "error": exposed,
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Turn the outcome of an upstream call into the response the caller sees.
///
/// Upstream responses pass through with status and body unchanged, error
/// statuses included — a 404 from the inventory service is the caller's 404.
pub async fn forward(outcome: reqwest::Result<reqwest::Response>, debug: bool) -> Response {
    match outcome {
        Ok(upstream) => passthrough(upstream, debug).await,
        Err(err) => ProxyError::classify(err).respond(debug),
    }
}

async fn passthrough(upstream: reqwest::Response, debug: bool) -> Response {
    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));

    let body: Bytes = match upstream.bytes().await {
        Ok(body) => body,
        Err(err) => return ProxyError::classify(err).respond(debug),
    };

    // An upstream error page that is not JSON is replaced so the caller
    // still receives an envelope it can parse.
    if (status.is_client_error() || status.is_server_error())
        && serde_json::from_slice::<Value>(&body).is_err()
    {
        return (status, Json(json!({ "message": FALLBACK_ERROR_MESSAGE }))).into_response();
    }

    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}
