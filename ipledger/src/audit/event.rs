//! Audit event wire types
//!
//! [`AuditEvent`] is the message producers enqueue and persister workers
//! consume. Field names serialize in camelCase to match the queue payload
//! contract shared across services.

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::action::ActionKind;

/// The user on whose behalf an audited action ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRef {
    /// Authenticated user id
    pub user_id: i64,
    /// Session the action ran under, when known
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ActorRef {
    /// Create an actor reference for a user
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            session_id: None,
        }
    }

    /// Attach the session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Ambient HTTP request details captured at publish time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Client IP address
    #[serde(default)]
    pub request_ip: Option<String>,
    /// User agent string
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Extract the request context from HTTP headers
    ///
    /// The client IP is the first entry of `x-forwarded-for` when present,
    /// falling back to `x-real-ip`. Proxies append to `x-forwarded-for`, so
    /// the first entry is the original client.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            request_ip: headers
                .get("x-forwarded-for")
                .or_else(|| headers.get("x-real-ip"))
                .and_then(|v| v.to_str().ok())
                .map(|s| s.split(',').next().unwrap_or(s).trim().to_string()),
            user_agent: headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        }
    }
}

/// A single audit event as carried on the queue
///
/// `action_kind` stays a raw string on the wire so that a consumer built
/// before a new action kind was introduced still persists the event; the
/// string is only interpreted at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Who performed the action
    pub actor: ActorRef,
    /// Wire form of the action kind, e.g. `ip_address.updated`
    pub action_kind: String,
    /// Kind of entity acted upon, e.g. `ip_address`
    pub entity_type: String,
    /// Identifier of the entity, absent for login/logout
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Free-form payload: `user` snapshot plus `before`/`after` as applicable
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Ambient request details
    #[serde(default)]
    pub context: RequestContext,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(actor: ActorRef, kind: ActionKind, entity_type: impl Into<String>) -> Self {
        Self {
            actor,
            action_kind: kind.as_str().to_string(),
            entity_type: entity_type.into(),
            entity_id: None,
            metadata: serde_json::Value::Null,
            context: RequestContext::default(),
        }
    }

    /// Set the entity id
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the metadata payload
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the request context
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Parse the action kind, failing on strings outside the registry
    pub fn kind(&self) -> Result<ActionKind, super::action::UnknownActionKind> {
        self.action_kind.parse()
    }
}
