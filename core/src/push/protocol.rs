/// Frame definitions for the push channel
use crate::notification::{Notification, WireNotification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frame type of the authentication frame
pub const AUTH_FRAME_TYPE: &str = "AUTH";

/// `type` values the server uses to acknowledge authentication
const AUTH_ACK_TYPES: [&str; 3] = ["AUTH_OK", "AUTH_ACK", "AUTH_SUCCESS"];

/// First client-to-server frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub token: String,
}

impl AuthFrame {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            frame_type: AUTH_FRAME_TYPE.to_string(),
            token: token.into(),
        }
    }

    /// Serialize to the JSON text sent over the channel
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Server acknowledged the AUTH frame
    AuthAck(serde_json::Value),
    /// Application payload, assumed (not verified) to look like a notification
    Payload(serde_json::Value),
}

impl PushEvent {
    /// Decode raw frame bytes; anything that is not JSON is an error
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        if is_auth_ack(&value) {
            Ok(PushEvent::AuthAck(value))
        } else {
            Ok(PushEvent::Payload(value))
        }
    }
}

fn is_auth_ack(value: &serde_json::Value) -> bool {
    value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|t| AUTH_ACK_TYPES.iter().any(|ack| ack.eq_ignore_ascii_case(t)))
}

/// A push payload as accumulated by the live feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveNotification {
    /// Arrival order within one connection manager
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl LiveNotification {
    pub fn new(seq: u64, payload: serde_json::Value) -> Self {
        Self {
            seq,
            received_at: Utc::now(),
            payload,
        }
    }

    /// Lenient conversion; needs at least an `id` in the payload
    pub fn to_notification(&self) -> Option<Notification> {
        let wire: WireNotification = serde_json::from_value(self.payload.clone()).ok()?;
        if wire.id.is_empty() {
            return None;
        }
        wire.normalize_with_fallback(Some(self.received_at)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_frame_shape() {
        let text = AuthFrame::new("abc").to_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"type": "AUTH", "token": "abc"}));
    }

    #[test]
    fn test_decode_payload_and_ack() {
        let payload = PushEvent::from_bytes(br#"{"id":3,"message":"hi"}"#).unwrap();
        assert_eq!(payload, PushEvent::Payload(json!({"id": 3, "message": "hi"})));

        let ack = PushEvent::from_bytes(br#"{"type":"auth_ok"}"#).unwrap();
        assert!(matches!(ack, PushEvent::AuthAck(_)));

        // AUTH echoed back is not an acknowledgment
        let echo = PushEvent::from_bytes(br#"{"type":"AUTH","token":"x"}"#).unwrap();
        assert!(matches!(echo, PushEvent::Payload(_)));
    }

    #[test]
    fn test_plain_text_is_rejected() {
        assert!(PushEvent::from_bytes(b"Your KYC is not verified. Please complete it.").is_err());
    }

    #[test]
    fn test_live_to_notification() {
        let live = LiveNotification::new(1, json!({"id": 5, "type": "chat", "message": "new message"}));
        let n = live.to_notification().unwrap();
        assert_eq!(n.id.as_str(), "5");
        assert_eq!(n.timestamp, live.received_at);

        let anonymous = LiveNotification::new(2, json!({"message": "no id"}));
        assert!(anonymous.to_notification().is_none());
    }
}
