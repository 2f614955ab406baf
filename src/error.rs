use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures talking to the HTTP API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
}

/// Failures opening or running a realtime transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("cannot serialise config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("no config directory available")]
    NoConfigDir,
}
