//! Duplex channel: Socket.IO over a WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::socketio::{
    EnginePacket, SocketPacket, decode_engine, decode_socket, encode_connect, encode_event,
    encode_pong,
};
use super::{EVENT_BUFFER, Link};
use crate::api::events::{OutboundEvent, RealtimeEvent};
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_BUFFER: usize = 16;

/// Connect and complete the Socket.IO handshake within `connect_timeout`.
pub async fn open(url: &Url, connect_timeout: Duration) -> Result<Link, TransportError> {
    let ws = tokio::time::timeout(connect_timeout, handshake(url.as_str()))
        .await
        .map_err(|_| TransportError::Timeout(connect_timeout))??;

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    tokio::spawn(pump(ws, events_tx, outbound_rx));
    Ok(Link::new(events_rx, Some(outbound_tx)))
}

async fn handshake(url: &str) -> Result<WsStream, TransportError> {
    let (mut ws, _) = connect_async(url).await?;
    while let Some(frame) = ws.next().await {
        let text = match frame? {
            Frame::Text(text) => text,
            Frame::Close(_) => break,
            _ => continue,
        };
        match decode_engine(&text) {
            Some(EnginePacket::Open(info)) => {
                debug!("engine session opened: {info}");
                ws.send(Frame::Text(encode_connect())).await?;
            }
            Some(EnginePacket::Ping(probe)) => ws.send(Frame::Text(encode_pong(&probe))).await?,
            Some(EnginePacket::Message(payload)) => match decode_socket(&payload) {
                Some(SocketPacket::Connect(_)) => return Ok(ws),
                Some(SocketPacket::ConnectError(reason)) => {
                    return Err(TransportError::Handshake(reason.to_string()));
                }
                _ => {}
            },
            Some(EnginePacket::Close) => break,
            _ => {}
        }
    }
    Err(TransportError::Handshake(
        "closed before connect acknowledgment".into(),
    ))
}

/// Shuttle frames until either side goes away. Dropping `events` is how
/// the selector learns the channel is gone.
async fn pump(
    ws: WsStream,
    events: mpsc::Sender<RealtimeEvent>,
    mut outbound: mpsc::Receiver<OutboundEvent>,
) {
    let (mut write, mut read) = ws.split();
    let mut outbound_open = true;
    loop {
        tokio::select! {
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Frame::Text(text))) => text,
                    Some(Ok(Frame::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!("duplex channel error: {err}");
                        break;
                    }
                };
                match decode_engine(&text) {
                    Some(EnginePacket::Ping(probe)) => {
                        if write.send(Frame::Text(encode_pong(&probe))).await.is_err() {
                            break;
                        }
                    }
                    Some(EnginePacket::Message(payload)) => match decode_socket(&payload) {
                        Some(SocketPacket::Event { name, data }) => {
                            match RealtimeEvent::from_channel(&name, &data) {
                                Some(event) => {
                                    if events.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                None => debug!("ignoring duplex event {name}"),
                            }
                        }
                        Some(SocketPacket::Disconnect) => {
                            info!("server closed the duplex channel");
                            break;
                        }
                        _ => {}
                    },
                    Some(EnginePacket::Close) => break,
                    _ => {}
                }
            }
            out = outbound.recv(), if outbound_open => match out {
                Some(event) => {
                    let frame = encode_event(event.name(), &event.payload());
                    if write.send(Frame::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => outbound_open = false,
            },
            _ = events.closed() => break,
        }
    }
    let _ = write.send(Frame::Close(None)).await;
    debug!("duplex pump finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Minimal Socket.IO server: handshake, one pushed event, then echo
    /// whatever the client emits back as a frame on `seen`.
    async fn spawn_socketio(
        ack: &'static str,
        seen: mpsc::Sender<String>,
    ) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Frame::Text(r#"0{"sid":"e1","pingInterval":25000,"pingTimeout":20000}"#.into()))
                .await
                .unwrap();
            let connect = ws.next().await.unwrap().unwrap();
            assert_eq!(connect, Frame::Text("40".into()));
            ws.send(Frame::Text(ack.into())).await.unwrap();
            ws.send(Frame::Text("2".into())).await.unwrap();
            ws.send(Frame::Text(
                r#"42["new_message",{"wa_id":"A","text":{"body":"pushed"},"timestamp":5}]"#.into(),
            ))
            .await
            .unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let Frame::Text(text) = frame {
                    let _ = seen.send(text).await;
                }
            }
        });
        Url::parse(&format!("ws://127.0.0.1:{port}/socket.io/?EIO=4&transport=websocket")).unwrap()
    }

    #[tokio::test]
    async fn handshake_events_and_emits() {
        let (seen_tx, mut seen_rx) = mpsc::channel(8);
        let url = spawn_socketio(r#"40{"sid":"s1"}"#, seen_tx).await;
        let mut link = open(&url, Duration::from_secs(5)).await.unwrap();

        match link.events.recv().await {
            Some(RealtimeEvent::NewMessage(msg)) => assert_eq!(msg.body, "pushed"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(seen_rx.recv().await.as_deref(), Some("3"));

        let outbound = link.outbound.clone().unwrap();
        outbound
            .send(OutboundEvent::TypingStart { conversation_id: "A".into() })
            .await
            .unwrap();
        assert_eq!(
            seen_rx.recv().await.as_deref(),
            Some(r#"42["typing_start",{"wa_id":"A"}]"#)
        );
    }

    #[tokio::test]
    async fn connect_error_fails_the_attempt() {
        let (seen_tx, _seen_rx) = mpsc::channel(8);
        let url = spawn_socketio(r#"44{"message":"nope"}"#, seen_tx).await;
        match open(&url, Duration::from_secs(5)).await {
            Err(TransportError::Handshake(reason)) => assert!(reason.contains("nope")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/socket.io/")).unwrap();
        assert!(open(&url, Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let _ws = accept_async(tcp).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/socket.io/")).unwrap();
        match open(&url, Duration::from_millis(300)).await {
            Err(TransportError::Timeout(t)) => assert_eq!(t, Duration::from_millis(300)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
