//! Server-push stream: `GET /events` read as server-sent events.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use super::{EVENT_BUFFER, Link};
use crate::api::client::ApiClient;
use crate::api::events::RealtimeEvent;
use crate::error::TransportError;

/// A successful response head counts as established; there is no handshake.
pub async fn open(api: &ApiClient) -> Result<Link, TransportError> {
    let resp = api.open_events().await?;
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(read_records(resp, tx));
    Ok(Link::new(rx, None))
}

async fn read_records(resp: reqwest::Response, events: mpsc::Sender<RealtimeEvent>) {
    let mut records = Box::pin(resp.bytes_stream().eventsource());
    loop {
        tokio::select! {
            record = records.next() => match record {
                Some(Ok(record)) => match RealtimeEvent::from_record(&record.data) {
                    Some(event) => {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                    None => debug!("ignoring stream record {:?}", record.data),
                },
                Some(Err(err)) => {
                    warn!("event stream error: {err}");
                    break;
                }
                None => break,
            },
            _ = events.closed() => return,
        }
    }
    info!("event stream finished");
}
