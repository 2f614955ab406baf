use serde::Serialize;
use serde_json::Value;

use crate::timestamp;

/// Delivery status reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryState {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryState {
    /// Unknown or missing values fall back to `Sent`.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read" => DeliveryState::Read,
            "delivered" => DeliveryState::Delivered,
            _ => DeliveryState::Sent,
        }
    }
}

/// Where a timeline entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Attributed by the backend (fetch or push).
    Server,
    /// Synthesized locally right after a send, not yet confirmed.
    LocalEcho { echo_id: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Option<String>,
    pub conversation_id: String,
    pub sender: Option<String>,
    pub sender_name: Option<String>,
    pub body: String,
    pub timestamp: f64,
    pub delivery_state: DeliveryState,
    pub provenance: Provenance,
}

impl Message {
    /// Decode a backend message document. Missing fields get safe defaults.
    pub fn from_value(item: &Value) -> Self {
        let id = str_field(item, &["wamid", "id"]).or_else(|| object_id(item.get("_id")));
        let body = match item.get("text") {
            Some(Value::Object(text)) => text.get("body").and_then(|v| v.as_str()),
            Some(Value::String(text)) => Some(text.as_str()),
            _ => item.get("body").and_then(|v| v.as_str()),
        }
        .unwrap_or_default()
        .to_string();
        let status = str_field(item, &["status", "deliveryState"]).unwrap_or_default();

        Self {
            id,
            conversation_id: str_field(item, &["wa_id", "conversationId", "conversation_id"])
                .unwrap_or_default(),
            sender: str_field(item, &["from", "sender"]),
            sender_name: str_field(item, &["name"]),
            body,
            timestamp: timestamp::normalize(item.get("timestamp").unwrap_or(&Value::Null)),
            delivery_state: DeliveryState::from_wire(&status),
            provenance: Provenance::Server,
        }
    }

    pub fn local_echo(
        conversation_id: &str,
        local_user: &str,
        body: &str,
        timestamp: f64,
        echo_id: u64,
    ) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.to_string(),
            sender: None,
            sender_name: Some(local_user.to_string()),
            body: body.to_string(),
            timestamp,
            delivery_state: DeliveryState::Sent,
            provenance: Provenance::LocalEcho { echo_id },
        }
    }

    pub fn is_local_echo(&self) -> bool {
        matches!(self.provenance, Provenance::LocalEcho { .. })
    }

    pub fn echo_id(&self) -> Option<u64> {
        match self.provenance {
            Provenance::LocalEcho { echo_id } => Some(echo_id),
            Provenance::Server => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub display_name: String,
    pub last_message_preview: String,
    pub last_message_timestamp: f64,
    pub pinned: bool,
    pub muted: bool,
    pub unread_count: u32,
}

impl Conversation {
    /// Returns `None` for entries without a usable id.
    pub fn from_value(item: &Value) -> Option<Self> {
        let id = str_field(item, &["wa_id", "id", "conversationId"])?;
        let display_name = str_field(item, &["name", "displayName", "display_name", "title"])
            .unwrap_or_else(|| "Unknown".to_string());
        let last_timestamp = item
            .get("last_timestamp")
            .or_else(|| item.get("lastMessageTimestamp"))
            .unwrap_or(&Value::Null);
        Some(Self {
            id,
            display_name,
            last_message_preview: str_field(item, &["last_message", "lastMessagePreview"])
                .unwrap_or_default(),
            last_message_timestamp: timestamp::normalize(last_timestamp),
            pinned: item.get("pinned").and_then(|v| v.as_bool()).unwrap_or(false),
            muted: item.get("muted").and_then(|v| v.as_bool()).unwrap_or(false),
            unread_count: item
                .get("unread_count")
                .and_then(|v| v.as_u64())
                .map(|n| n.min(u64::from(u32::MAX)) as u32)
                .unwrap_or(0),
        })
    }
}

/// Body of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    #[serde(rename = "wa_id")]
    pub conversation_id: String,
    pub text: String,
    #[serde(rename = "name")]
    pub sender: String,
}

/// First non-empty string among `keys`.
fn str_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn object_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("$oid").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_backend_message() {
        let msg = Message::from_value(&json!({
            "_id": {"$oid": "66b0c0ffee"},
            "wamid": "wamid.HBgM",
            "wa_id": "919937320320",
            "from": "919937320320",
            "name": "Ravi Kumar",
            "text": {"body": "Hi there"},
            "timestamp": "1754400000",
            "status": "Delivered"
        }));
        assert_eq!(msg.id.as_deref(), Some("wamid.HBgM"));
        assert_eq!(msg.conversation_id, "919937320320");
        assert_eq!(msg.sender.as_deref(), Some("919937320320"));
        assert_eq!(msg.body, "Hi there");
        assert_eq!(msg.timestamp, 1754400000.0);
        assert_eq!(msg.delivery_state, DeliveryState::Delivered);
        assert_eq!(msg.provenance, Provenance::Server);
    }

    #[test]
    fn missing_fields_default() {
        let msg = Message::from_value(&json!({"_id": {"$oid": "abc"}}));
        assert_eq!(msg.id.as_deref(), Some("abc"));
        assert_eq!(msg.body, "");
        assert_eq!(msg.timestamp, 0.0);
        assert_eq!(msg.delivery_state, DeliveryState::Sent);
        assert!(msg.sender.is_none());
    }

    #[test]
    fn accepts_logical_field_names() {
        let msg = Message::from_value(&json!({
            "conversationId": "A",
            "sender": "me",
            "body": "plain",
            "deliveryState": "read",
            "timestamp": 5
        }));
        assert_eq!(msg.conversation_id, "A");
        assert_eq!(msg.sender.as_deref(), Some("me"));
        assert_eq!(msg.body, "plain");
        assert_eq!(msg.delivery_state, DeliveryState::Read);
    }

    #[test]
    fn delivery_state_fails_open() {
        assert_eq!(DeliveryState::from_wire("sent"), DeliveryState::Sent);
        assert_eq!(DeliveryState::from_wire("DELIVERED"), DeliveryState::Delivered);
        assert_eq!(DeliveryState::from_wire("read"), DeliveryState::Read);
        assert_eq!(DeliveryState::from_wire("failed"), DeliveryState::Sent);
        assert_eq!(DeliveryState::from_wire(""), DeliveryState::Sent);
    }

    #[test]
    fn conversation_without_id_is_skipped() {
        assert!(Conversation::from_value(&json!({"name": "nobody"})).is_none());
        let conv = Conversation::from_value(&json!({
            "wa_id": "A",
            "name": "Alice",
            "last_message": "see you",
            "last_timestamp": "",
            "unread_count": 2
        }))
        .unwrap();
        assert_eq!(conv.display_name, "Alice");
        assert_eq!(conv.last_message_timestamp, 0.0);
        assert_eq!(conv.unread_count, 2);
        assert!(!conv.pinned);
    }

    #[test]
    fn outgoing_message_uses_backend_field_names() {
        let out = OutgoingMessage {
            conversation_id: "A".into(),
            text: "hi".into(),
            sender: "You".into(),
        };
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"wa_id": "A", "text": "hi", "name": "You"})
        );
    }
}
