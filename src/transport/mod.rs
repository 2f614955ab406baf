//! Realtime transport selection.
//!
//! Exactly one transport is active per session. The selector walks a
//! one-way chain, duplex channel, then server-push stream, then polling,
//! and never moves back up it.

pub mod duplex;
pub mod socketio;
pub mod stream;

use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::api::client::ApiClient;
use crate::api::events::{OutboundEvent, RealtimeEvent};
use crate::error::TransportError;

pub(crate) const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Uninitialized,
    TryingDuplex,
    DuplexActive,
    TryingStream,
    StreamActive,
    PollingActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Duplex,
    Stream,
}

#[derive(Debug, PartialEq)]
pub enum TransportSignal {
    Event(RealtimeEvent),
    /// The active push transport went away.
    Closed,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub duplex_enabled: bool,
    pub stream_enabled: bool,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            duplex_enabled: true,
            stream_enabled: true,
            connect_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_secs(3),
        }
    }
}

/// An established push transport: inbound events plus, for the duplex
/// channel, a way to emit.
#[derive(Debug)]
pub struct Link {
    events: mpsc::Receiver<RealtimeEvent>,
    outbound: Option<mpsc::Sender<OutboundEvent>>,
}

impl Link {
    pub fn new(
        events: mpsc::Receiver<RealtimeEvent>,
        outbound: Option<mpsc::Sender<OutboundEvent>>,
    ) -> Self {
        Self { events, outbound }
    }
}

/// Opens the network side of a transport attempt.
pub trait Connector {
    fn open(&self, attempt: Attempt) -> impl Future<Output = Result<Link, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpConnector {
    api: ApiClient,
    connect_timeout: Duration,
}

impl HttpConnector {
    pub fn new(api: ApiClient, connect_timeout: Duration) -> Self {
        Self { api, connect_timeout }
    }
}

impl Connector for HttpConnector {
    async fn open(&self, attempt: Attempt) -> Result<Link, TransportError> {
        match attempt {
            Attempt::Duplex => duplex::open(&self.api.socket_url(), self.connect_timeout).await,
            Attempt::Stream => stream::open(&self.api).await,
        }
    }
}

pub struct TransportSelector {
    config: TransportConfig,
    state: TransportState,
    link: Option<Link>,
}

impl TransportSelector {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            state: TransportState::Uninitialized,
            link: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state == TransportState::PollingActive
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// Leave `Uninitialized` and name the first attempt to make, if any.
    pub fn start(&mut self) -> Option<Attempt> {
        if self.state != TransportState::Uninitialized {
            warn!("transport selector already started ({:?})", self.state);
            return None;
        }
        if self.config.duplex_enabled {
            self.state = TransportState::TryingDuplex;
            Some(Attempt::Duplex)
        } else {
            self.after_duplex()
        }
    }

    fn after_duplex(&mut self) -> Option<Attempt> {
        if self.config.stream_enabled {
            self.state = TransportState::TryingStream;
            Some(Attempt::Stream)
        } else {
            self.fall_back_to_polling();
            None
        }
    }

    fn fall_back_to_polling(&mut self) {
        info!("using polling fallback every {:?}", self.config.poll_interval);
        self.link = None;
        self.state = TransportState::PollingActive;
    }

    pub fn on_established(&mut self, attempt: Attempt, link: Link) {
        self.state = match (self.state, attempt) {
            (TransportState::TryingDuplex, Attempt::Duplex) => {
                info!("duplex channel connected");
                TransportState::DuplexActive
            }
            (TransportState::TryingStream, Attempt::Stream) => {
                info!("event stream connected");
                TransportState::StreamActive
            }
            (state, attempt) => {
                warn!("ignoring {attempt:?} link while {state:?}");
                return;
            }
        };
        self.link = Some(link);
    }

    /// Record a failed attempt and name the next one, if any.
    pub fn on_failed(&mut self, attempt: Attempt, err: &TransportError) -> Option<Attempt> {
        warn!("{attempt:?} transport unavailable: {err}");
        match (self.state, attempt) {
            (TransportState::TryingDuplex, Attempt::Duplex) => self.after_duplex(),
            (TransportState::TryingStream, Attempt::Stream) => {
                self.fall_back_to_polling();
                None
            }
            _ => None,
        }
    }

    /// The active transport ended; fall through to the next tier.
    pub fn on_closed(&mut self) -> Option<Attempt> {
        self.link = None;
        match self.state {
            TransportState::DuplexActive => {
                warn!("duplex channel disconnected");
                self.after_duplex()
            }
            TransportState::StreamActive => {
                warn!("event stream ended");
                self.fall_back_to_polling();
                None
            }
            _ => None,
        }
    }

    /// Next inbound event. Pends forever while no push transport is active.
    pub async fn next_event(&mut self) -> TransportSignal {
        match self.link.as_mut() {
            Some(link) => match link.events.recv().await {
                Some(event) => TransportSignal::Event(event),
                None => TransportSignal::Closed,
            },
            None => std::future::pending().await,
        }
    }

    /// Emit over the duplex channel. Other transports cannot emit.
    pub fn emit(&self, event: OutboundEvent) -> bool {
        let Some(tx) = self.link.as_ref().and_then(|l| l.outbound.as_ref()) else {
            debug!("no duplex channel, dropping {}", event.name());
            return false;
        };
        tx.try_send(event).is_ok()
    }
}
