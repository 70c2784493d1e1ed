use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::de::{opt_string_or_number, string_or_number};
use super::enums::{NotificationKind, Severity};

/// A notification shown in the bell list.
///
/// Created by a server push or a REST fetch. The client only ever flips
/// `read`; entries are never deleted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "isRead")]
    pub read: bool,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub related_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Notification {
    pub fn new(
        id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            created_at,
            read: false,
            related_entity_id: None,
            severity: None,
        }
    }

    pub fn with_related(mut self, entity_id: impl Into<String>) -> Self {
        self.related_entity_id = Some(entity_id.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Unknown categories from newer backends fall back to `Info`.
fn lenient_kind<'de, D>(deserializer: D) -> Result<NotificationKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| s.parse::<NotificationKind>().ok())
        .unwrap_or_default())
}
