use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::api::models::Message;

/// A realtime event, independent of the transport that delivered it.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    NewMessage(Message),
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
}

impl RealtimeEvent {
    /// Build an event from a named duplex-channel emission.
    pub fn from_channel(name: &str, data: &Value) -> Option<Self> {
        match name {
            "new_message" => Some(Self::NewMessage(Message::from_value(data))),
            "typing_start" => Some(Self::TypingStart {
                conversation_id: conversation_ref(data)?,
            }),
            "typing_stop" => Some(Self::TypingStop {
                conversation_id: conversation_ref(data)?,
            }),
            _ => None,
        }
    }

    /// Parse the JSON payload of a server-push stream record.
    /// Malformed or unknown records yield `None`.
    pub fn from_record(payload: &str) -> Option<Self> {
        let record: IncomingEvent = serde_json::from_str(payload).ok()?;
        match record.event_type.as_str() {
            "new_message" => record
                .message
                .filter(Value::is_object)
                .map(|m| Self::NewMessage(Message::from_value(&m))),
            other => Self::from_channel(other, &Value::Object(record.data)),
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Self::NewMessage(msg) => &msg.conversation_id,
            Self::TypingStart { conversation_id } | Self::TypingStop { conversation_id } => {
                conversation_id
            }
        }
    }
}

/// Stream record envelope: `{"type": ..., "message": {...}}`.
#[derive(Debug, Deserialize)]
struct IncomingEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    message: Option<Value>,
    #[serde(flatten)]
    data: Map<String, Value>,
}

/// Events the client emits over the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::TypingStart { conversation_id } | Self::TypingStop { conversation_id } => {
                json!({ "wa_id": conversation_id })
            }
        }
    }
}

fn conversation_ref(data: &Value) -> Option<String> {
    data.get("wa_id")
        .or_else(|| data.get("conversationId"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
