/// Notification model and wire normalization
use crate::error::{NotifyError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::warn;

/// Opaque server-assigned identifier (numbers and strings both accepted).
/// Empty when the backend sent none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpaqueId(String);

pub type NotificationId = OpaqueId;

impl OpaqueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpaqueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for OpaqueId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl Serialize for OpaqueId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OpaqueId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        Ok(match Option::<RawId>::deserialize(deserializer)? {
            Some(RawId::Signed(n)) => Self(n.to_string()),
            Some(RawId::Unsigned(n)) => Self(n.to_string()),
            Some(RawId::Text(s)) => Self(s),
            None => Self::default(),
        })
    }
}

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Appointment,
    Payment,
    Chat,
    #[default]
    #[serde(other)]
    Other,
}

/// A normalized notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sub_type: Option<String>,
    pub related_id: Option<OpaqueId>,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Notification as the backend sends it.
///
/// The REST listing uses snake_case with `metadata` as an encoded string;
/// push payloads use camelCase with `timestamp` and an object. Both land here.
#[derive(Debug, Clone, Deserialize)]
pub struct WireNotification {
    #[serde(default)]
    pub id: OpaqueId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<NotificationKind>,
    #[serde(default, alias = "subType")]
    pub sub_type: Option<String>,
    #[serde(default, alias = "relatedId")]
    pub related_id: Option<OpaqueId>,
    #[serde(default, alias = "isRead")]
    pub is_read: Option<bool>,
    #[serde(default, alias = "createdAt", alias = "timestamp")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl WireNotification {
    /// Normalize a listing entry; a missing or unreadable timestamp is an error
    pub fn normalize(self) -> Result<Notification> {
        self.normalize_with_fallback(None)
    }

    /// Normalize, using `fallback` when the payload carries no usable timestamp
    pub fn normalize_with_fallback(self, fallback: Option<DateTime<Utc>>) -> Result<Notification> {
        let timestamp = match self.created_at.as_deref().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => fallback.ok_or_else(|| {
                NotifyError::Protocol(format!(
                    "Notification {} has no valid created_at ({:?})",
                    self.id, self.created_at
                ))
            })?,
        };

        let metadata = decode_metadata(&self.id, self.metadata);

        Ok(Notification {
            id: self.id,
            title: self.title.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
            sub_type: self.sub_type,
            related_id: self.related_id,
            is_read: self.is_read.unwrap_or(false),
            timestamp,
            metadata,
        })
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO one taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn decode_metadata(id: &OpaqueId, raw: Option<serde_json::Value>) -> Option<serde_json::Value> {
    match raw? {
        serde_json::Value::Null => None,
        serde_json::Value::String(encoded) if encoded.is_empty() => None,
        serde_json::Value::String(encoded) => match serde_json::from_str(&encoded) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(notification = %id, "Dropping undecodable metadata: {}", e);
                None
            }
        },
        structured => Some(structured),
    }
}

/// Where a click on a notification leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    Appointment(OpaqueId),
    Payment(OpaqueId),
    Chat(OpaqueId),
}

impl NavigationTarget {
    pub fn for_notification(notification: &Notification) -> Option<Self> {
        let related = notification.related_id.clone()?;
        match notification.kind {
            NotificationKind::Appointment => Some(Self::Appointment(related)),
            NotificationKind::Payment => Some(Self::Payment(related)),
            NotificationKind::Chat => Some(Self::Chat(related)),
            NotificationKind::Other => None,
        }
    }
}
