//! Text packet codec for Engine.IO v4 carrying Socket.IO v5.
//!
//! An Engine.IO frame is a one-digit packet type followed by its payload.
//! `message` frames (`4`) carry a Socket.IO packet, itself a one-digit type,
//! an optional `/namespace,` prefix, an optional ack id and a JSON body:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000}   engine open
//! 2 / 3                                ping / pong
//! 40 / 40{"sid":".."}                  socket connect / connect ack
//! 42["new_message",{...}]              socket event
//! 44{"message":"Not authorized"}       socket connect error
//! ```
//!
//! Binary attachments are not supported; binary events decode as `Other`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Value),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
    Other,
}

pub fn decode_engine(frame: &str) -> Option<EnginePacket> {
    let mut chars = frame.chars();
    let kind = chars.next()?;
    let rest = chars.as_str();
    let packet = match kind {
        '0' => EnginePacket::Open(serde_json::from_str(rest).unwrap_or(Value::Null)),
        '1' => EnginePacket::Close,
        '2' => EnginePacket::Ping(rest.to_string()),
        '3' => EnginePacket::Pong(rest.to_string()),
        '4' => EnginePacket::Message(rest.to_string()),
        '5' => EnginePacket::Upgrade,
        '6' => EnginePacket::Noop,
        _ => return None,
    };
    Some(packet)
}

pub fn decode_socket(payload: &str) -> Option<SocketPacket> {
    let mut chars = payload.chars();
    let kind = chars.next()?;
    let mut rest = chars.as_str();

    if rest.starts_with('/') {
        rest = match rest.find(',') {
            Some(idx) => &rest[idx + 1..],
            None => "",
        };
    }
    let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    let packet = match kind {
        '0' => SocketPacket::Connect(serde_json::from_str(body).ok()),
        '1' => SocketPacket::Disconnect,
        '2' => {
            let mut args = match serde_json::from_str::<Value>(body).ok()? {
                Value::Array(args) => args.into_iter(),
                _ => return None,
            };
            let name = match args.next()? {
                Value::String(name) => name,
                _ => return None,
            };
            SocketPacket::Event {
                name,
                data: args.next().unwrap_or(Value::Null),
            }
        }
        '4' => SocketPacket::ConnectError(serde_json::from_str(body).unwrap_or(Value::Null)),
        '3' | '5' | '6' => SocketPacket::Other,
        _ => return None,
    };
    Some(packet)
}

/// Socket.IO connect request for the default namespace.
pub fn encode_connect() -> String {
    "40".to_string()
}

pub fn encode_event(name: &str, data: &Value) -> String {
    let args = Value::Array(vec![Value::String(name.to_string()), data.clone()]);
    format!("42{args}")
}

pub fn encode_pong(probe: &str) -> String {
    format!("3{probe}")
}
