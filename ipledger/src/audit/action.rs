//! Action descriptor registry
//!
//! Every audited action kind maps to a display label, a coarse category, a
//! detail renderer, and a subject-address extractor. The registry is a closed
//! enum with append-only evolution: new kinds get new variants, existing
//! variants never change meaning. Stored rows keep the raw kind string, so
//! rows written under a newer registry than the reader's still render — via
//! [`describe`], which degrades unknown kinds to fallbacks instead of
//! failing the listing.
//!
//! All rendering is purely functional over the kind and the record's
//! metadata snapshots; missing snapshot fields render as `"-"`.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder rendered when a subject address or snapshot field is absent
const NO_ADDRESS: &str = "-";

/// A wire string that does not name a registered action kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action kind: {0}")]
pub struct UnknownActionKind(pub String);

/// Registered audit action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// A user signed in
    Login,
    /// A user signed out
    Logout,
    /// An IP address entry was created
    IpCreated,
    /// An IP address entry was updated
    IpUpdated,
    /// An IP address entry was deleted
    IpDeleted,
}

impl ActionKind {
    /// All registered kinds, in declaration order
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Login,
        ActionKind::Logout,
        ActionKind::IpCreated,
        ActionKind::IpUpdated,
        ActionKind::IpDeleted,
    ];

    /// Wire form of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "auth.login",
            Self::Logout => "auth.logout",
            Self::IpCreated => "ip_address.created",
            Self::IpUpdated => "ip_address.updated",
            Self::IpDeleted => "ip_address.deleted",
        }
    }

    /// Human-readable display label
    pub fn label(self) -> &'static str {
        match self {
            Self::Login => "User Login",
            Self::Logout => "User Logout",
            Self::IpCreated => "IP Address Created",
            Self::IpUpdated => "IP Address Updated",
            Self::IpDeleted => "IP Address Deleted",
        }
    }

    /// Coarse category used for filtering and badge colors in the UI
    pub fn category(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::IpCreated => "create",
            Self::IpUpdated => "update",
            Self::IpDeleted => "delete",
        }
    }

    /// The IP address the action was about
    ///
    /// Auth actions have no subject address and render the `"-"` sentinel.
    /// Create/update read the `after` snapshot, delete reads `before`.
    pub fn subject_address(self, metadata: &Value) -> String {
        match self {
            Self::Login | Self::Logout => NO_ADDRESS.to_string(),
            Self::IpCreated | Self::IpUpdated => snapshot_field(metadata, "after", "value")
                .unwrap_or(NO_ADDRESS)
                .to_string(),
            Self::IpDeleted => snapshot_field(metadata, "before", "value")
                .unwrap_or(NO_ADDRESS)
                .to_string(),
        }
    }

    /// Human-readable summary of what the action did
    pub fn details(self, metadata: &Value) -> String {
        match self {
            Self::Login => "User logged in".to_string(),
            Self::Logout => "User logged out".to_string(),
            Self::IpCreated => format!(
                "Created IP address: {}",
                snapshot_field(metadata, "after", "value").unwrap_or(NO_ADDRESS)
            ),
            Self::IpDeleted => format!(
                "Deleted IP address: {}",
                snapshot_field(metadata, "before", "value").unwrap_or(NO_ADDRESS)
            ),
            Self::IpUpdated => update_details(metadata),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth.login" => Ok(Self::Login),
            "auth.logout" => Ok(Self::Logout),
            "ip_address.created" => Ok(Self::IpCreated),
            "ip_address.updated" => Ok(Self::IpUpdated),
            "ip_address.deleted" => Ok(Self::IpDeleted),
            other => Err(UnknownActionKind(other.to_string())),
        }
    }
}

/// Rendered descriptor for one stored action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescription {
    /// Display label
    pub label: String,
    /// Coarse category (`login|logout|create|update|delete`, or `unknown`)
    pub category: String,
    /// Human-readable summary
    pub details: String,
    /// The IP address the action was about, or `"-"`
    pub subject_address: String,
}

/// Render the descriptor for a stored action string
///
/// Unknown kinds come from rows persisted under a newer registry; they render
/// with the raw string as label and details rather than failing the request.
pub fn describe(action: &str, metadata: &Value) -> ActionDescription {
    match action.parse::<ActionKind>() {
        Ok(kind) => ActionDescription {
            label: kind.label().to_string(),
            category: kind.category().to_string(),
            details: kind.details(metadata),
            subject_address: kind.subject_address(metadata),
        },
        Err(_) => ActionDescription {
            label: action.to_string(),
            category: "unknown".to_string(),
            details: action.to_string(),
            subject_address: NO_ADDRESS.to_string(),
        },
    }
}

/// Build the change summary for an update by comparing snapshots
///
/// Fields compare in a fixed order (value, label, comment) and each
/// difference contributes one phrase. Identical snapshots produce the bare
/// `"(Updated) "` prefix with an empty phrase list.
fn update_details(metadata: &Value) -> String {
    let null = Value::Null;
    let before = metadata.get("before").unwrap_or(&null);
    let after = metadata.get("after").unwrap_or(&null);

    let mut changes: Vec<String> = Vec::new();

    let (b, a) = (field(before, "value"), field(after, "value"));
    if b != a {
        changes.push(format!(
            "IP address from {} to {}",
            b.unwrap_or(NO_ADDRESS),
            a.unwrap_or(NO_ADDRESS)
        ));
    }

    let (b, a) = (field(before, "label"), field(after, "label"));
    if b != a {
        changes.push(format!(
            "label from {} to {}",
            b.unwrap_or(NO_ADDRESS),
            a.unwrap_or(NO_ADDRESS)
        ));
    }

    match (field(before, "comment"), field(after, "comment")) {
        (None, Some(_)) => changes.push("added comment".to_string()),
        (Some(_), None) => changes.push("removed the comment".to_string()),
        (Some(b), Some(a)) if b != a => changes.push("updated the comment".to_string()),
        _ => {}
    }

    format!("(Updated) {}", changes.join(", "))
}

fn field<'a>(snapshot: &'a Value, key: &str) -> Option<&'a str> {
    snapshot.get(key)?.as_str()
}

fn snapshot_field<'a>(metadata: &'a Value, snapshot: &str, key: &str) -> Option<&'a str> {
    metadata.get(snapshot)?.get(key)?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_parse() {
        let err = "subnet.archived".parse::<ActionKind>().unwrap_err();
        assert_eq!(err, UnknownActionKind("subnet.archived".to_string()));
    }

    #[test]
    fn test_labels_and_categories() {
        assert_eq!(ActionKind::Login.label(), "User Login");
        assert_eq!(ActionKind::Login.category(), "login");
        assert_eq!(ActionKind::IpCreated.label(), "IP Address Created");
        assert_eq!(ActionKind::IpCreated.category(), "create");
        assert_eq!(ActionKind::IpUpdated.label(), "IP Address Updated");
        assert_eq!(ActionKind::IpUpdated.category(), "update");
        assert_eq!(ActionKind::IpDeleted.category(), "delete");
        assert_eq!(ActionKind::Logout.category(), "logout");
    }

    #[test]
    fn test_subject_address_auth_sentinel() {
        let metadata = json!({"user": {"id": 1}});
        assert_eq!(ActionKind::Login.subject_address(&metadata), "-");
        assert_eq!(ActionKind::Logout.subject_address(&metadata), "-");
    }

    #[test]
    fn test_subject_address_created_and_updated_use_after() {
        let metadata = json!({
            "before": {"value": "10.0.0.1"},
            "after": {"value": "10.0.0.2"}
        });
        assert_eq!(
            ActionKind::IpCreated.subject_address(&metadata),
            "10.0.0.2"
        );
        assert_eq!(
            ActionKind::IpUpdated.subject_address(&metadata),
            "10.0.0.2"
        );
    }

    #[test]
    fn test_subject_address_deleted_uses_before() {
        let metadata = json!({"before": {"value": "192.168.0.9"}});
        assert_eq!(
            ActionKind::IpDeleted.subject_address(&metadata),
            "192.168.0.9"
        );
    }

    #[test]
    fn test_subject_address_missing_snapshot() {
        assert_eq!(ActionKind::IpCreated.subject_address(&Value::Null), "-");
        assert_eq!(
            ActionKind::IpDeleted.subject_address(&json!({"after": {}})),
            "-"
        );
    }

    #[test]
    fn test_fixed_details() {
        assert_eq!(ActionKind::Login.details(&Value::Null), "User logged in");
        assert_eq!(ActionKind::Logout.details(&Value::Null), "User logged out");
    }

    #[test]
    fn test_created_and_deleted_details() {
        let metadata = json!({
            "before": {"value": "10.1.0.4"},
            "after": {"value": "10.1.0.5"}
        });
        assert_eq!(
            ActionKind::IpCreated.details(&metadata),
            "Created IP address: 10.1.0.5"
        );
        assert_eq!(
            ActionKind::IpDeleted.details(&metadata),
            "Deleted IP address: 10.1.0.4"
        );
    }

    #[test]
    fn test_update_details_value_and_comment() {
        let metadata = json!({
            "before": {"value": "10.0.0.1", "label": "A", "comment": null},
            "after": {"value": "10.0.0.2", "label": "A", "comment": "note"}
        });
        assert_eq!(
            ActionKind::IpUpdated.details(&metadata),
            "(Updated) IP address from 10.0.0.1 to 10.0.0.2, added comment"
        );
    }

    #[test]
    fn test_update_details_value_only() {
        let metadata = json!({
            "before": {"value": "10.0.0.1", "label": "web-1", "comment": "x"},
            "after": {"value": "10.0.0.2", "label": "web-1", "comment": "x"}
        });
        assert_eq!(
            ActionKind::IpUpdated.details(&metadata),
            "(Updated) IP address from 10.0.0.1 to 10.0.0.2"
        );
    }

    #[test]
    fn test_update_details_label_only() {
        let metadata = json!({
            "before": {"value": "10.0.0.1", "label": "web-1"},
            "after": {"value": "10.0.0.1", "label": "db-1"}
        });
        assert_eq!(
            ActionKind::IpUpdated.details(&metadata),
            "(Updated) label from web-1 to db-1"
        );
    }

    #[test]
    fn test_update_details_comment_removed() {
        let metadata = json!({
            "before": {"value": "10.0.0.1", "comment": "old"},
            "after": {"value": "10.0.0.1"}
        });
        assert_eq!(
            ActionKind::IpUpdated.details(&metadata),
            "(Updated) removed the comment"
        );
    }

    #[test]
    fn test_update_details_comment_updated() {
        let metadata = json!({
            "before": {"comment": "draft"},
            "after": {"comment": "final"}
        });
        assert_eq!(
            ActionKind::IpUpdated.details(&metadata),
            "(Updated) updated the comment"
        );
    }

    #[test]
    fn test_update_details_all_three_fields() {
        let metadata = json!({
            "before": {"value": "10.0.0.1", "label": "A", "comment": "x"},
            "after": {"value": "10.0.0.2", "label": "B", "comment": "y"}
        });
        assert_eq!(
            ActionKind::IpUpdated.details(&metadata),
            "(Updated) IP address from 10.0.0.1 to 10.0.0.2, label from A to B, updated the comment"
        );
    }

    #[test]
    fn test_update_details_no_changes() {
        let metadata = json!({
            "before": {"value": "10.0.0.1", "label": "A", "comment": "x"},
            "after": {"value": "10.0.0.1", "label": "A", "comment": "x"}
        });
        assert_eq!(ActionKind::IpUpdated.details(&metadata), "(Updated) ");
    }

    #[test]
    fn test_update_details_missing_snapshots() {
        // Both snapshots absent compares as equal everywhere
        assert_eq!(ActionKind::IpUpdated.details(&Value::Null), "(Updated) ");
    }

    #[test]
    fn test_describe_known_kind() {
        let metadata = json!({"after": {"value": "10.9.9.9"}});
        let desc = describe("ip_address.created", &metadata);
        assert_eq!(desc.label, "IP Address Created");
        assert_eq!(desc.category, "create");
        assert_eq!(desc.details, "Created IP address: 10.9.9.9");
        assert_eq!(desc.subject_address, "10.9.9.9");
    }

    #[test]
    fn test_describe_unknown_kind_falls_back() {
        let desc = describe("subnet.archived", &Value::Null);
        assert_eq!(desc.label, "subnet.archived");
        assert_eq!(desc.category, "unknown");
        assert_eq!(desc.details, "subnet.archived");
        assert_eq!(desc.subject_address, "-");
    }
}
