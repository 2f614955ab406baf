use std::time::Duration;

use reqwest::Client as HttpClient;
use reqwest::header::ACCEPT;
use serde_json::Value;
use url::Url;

use crate::api::models::{Conversation, Message, OutgoingMessage};
use crate::error::ClientError;

/// HTTP side of the backend: wholesale fetches, sends and the event stream.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    // no total timeout: the event stream body is long-lived
    stream_http: HttpClient,
    base: Url,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(ClientError::UnsupportedScheme(base.scheme().to_string()));
        }
        let http = HttpClient::builder().timeout(request_timeout).build()?;
        let stream_http = HttpClient::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            stream_http,
            base,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Socket.IO endpoint at the service origin.
    pub fn socket_url(&self) -> Url {
        let mut url = self.endpoint(&["socket.io", ""]);
        url.set_query(Some("EIO=4&transport=websocket"));
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always permitted between special schemes
        let _ = url.set_scheme(scheme);
        url
    }

    pub fn events_url(&self) -> Url {
        self.endpoint(&["events"])
    }

    fn map_err(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.request_timeout)
        } else {
            ClientError::Network(err)
        }
    }

    async fn get_json(&self, url: Url) -> Result<Value, ClientError> {
        let resp = self.http.get(url).send().await.map_err(|e| self.map_err(e))?;
        if !resp.status().is_success() {
            return Err(ClientError::Status(resp.status()));
        }
        let bytes = resp.bytes().await.map_err(|e| self.map_err(e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `GET /chats`. The list comes back unordered; callers sort it.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let json = self.get_json(self.endpoint(&["chats"])).await?;
        let items = list_items(&json, &["chats", "data"]);
        Ok(items.iter().filter_map(Conversation::from_value).collect())
    }

    /// `GET /chats/{id}`: every message of one conversation, in any order.
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        let json = self.get_json(self.endpoint(&["chats", conversation_id])).await?;
        let items = list_items(&json, &["messages", "data"]);
        Ok(items
            .iter()
            .map(|item| {
                let mut msg = Message::from_value(item);
                if msg.conversation_id.is_empty() {
                    msg.conversation_id = conversation_id.to_string();
                }
                msg
            })
            .collect())
    }

    /// `POST /messages`. The response body is not used.
    pub async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<(), ClientError> {
        let resp = self
            .http
            .post(self.endpoint(&["messages"]))
            .json(outgoing)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        if !resp.status().is_success() {
            return Err(ClientError::Status(resp.status()));
        }
        Ok(())
    }

    /// Open `GET /events`. Only receiving the response head is bounded.
    pub async fn open_events(&self) -> Result<reqwest::Response, ClientError> {
        let req = self
            .stream_http
            .get(self.events_url())
            .header(ACCEPT, "text/event-stream")
            .send();
        let resp = tokio::time::timeout(self.request_timeout, req)
            .await
            .map_err(|_| ClientError::Timeout(self.request_timeout))?
            .map_err(ClientError::Network)?;
        if !resp.status().is_success() {
            return Err(ClientError::Status(resp.status()));
        }
        Ok(resp)
    }
}

/// Accept a bare array or an object wrapping one under a known key.
fn list_items(json: &Value, keys: &[&str]) -> Vec<Value> {
    if let Some(arr) = json.as_array() {
        return arr.clone();
    }
    keys.iter()
        .find_map(|k| json.get(*k).and_then(|v| v.as_array()))
        .cloned()
        .unwrap_or_default()
}
