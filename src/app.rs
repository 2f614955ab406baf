use std::fs;
use std::future::pending;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::api::client::ApiClient;
use crate::api::models::{Conversation, Message};
use crate::error::{ClientError, ConfigError, TransportError};
use crate::session::{Session, TypingNotifier};
use crate::transport::{
    Attempt, Connector, HttpConnector, Link, TransportConfig, TransportSelector, TransportSignal,
};
use crate::ui::Renderer;
use crate::utils::run_async_to_loop;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    /// Sender name used for sends and for recognising our own messages.
    pub local_user: String,
    pub duplex_enabled: bool,
    pub stream_enabled: bool,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub typing_idle_ms: u64,
    pub rollback_on_send_failure: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            local_user: "You".to_string(),
            duplex_enabled: true,
            stream_enabled: true,
            connect_timeout_secs: 20,
            request_timeout_secs: 10,
            poll_interval_secs: 3,
            typing_idle_ms: 2000,
            rollback_on_send_failure: false,
        }
    }
}

impl AppConfig {
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("chatwire.toml"))
    }

    /// Load from the user config directory. A missing or unreadable file
    /// yields the defaults.
    pub fn load() -> Self {
        let Some(path) = Self::toml_path() else {
            warn!("no config directory, using defaults");
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}", path.display());
                Self::default()
            }
            Err(err) => {
                warn!("ignoring {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::toml_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            duplex_enabled: self.duplex_enabled,
            stream_enabled: self.stream_enabled,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }
}

/// User intent delivered to the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open(String),
    Send(String),
    /// A keystroke in the composer of the open conversation.
    Typing,
    Search(String),
    Quit,
}

/// Results of spawned network work.
enum Completion {
    Conversations(Result<Vec<Conversation>, ClientError>),
    Messages {
        conversation_id: String,
        result: Result<Vec<Message>, ClientError>,
    },
    Sent {
        echo_id: u64,
        result: Result<(), ClientError>,
    },
    Transport {
        attempt: Attempt,
        result: Result<Link, TransportError>,
    },
}

/// Run against the configured backend until `Quit` or the command channel
/// closes. Returns the renderer.
pub async fn run<R: Renderer>(
    config: &AppConfig,
    renderer: R,
    commands: mpsc::Receiver<Command>,
) -> Result<R, ClientError> {
    let api = ApiClient::new(&config.base_url, config.request_timeout())?;
    let connector = HttpConnector::new(api.clone(), config.transport().connect_timeout);
    Ok(run_with(config, api, connector, renderer, commands).await)
}

pub async fn run_with<C, R>(
    config: &AppConfig,
    api: ApiClient,
    connector: C,
    renderer: R,
    mut commands: mpsc::Receiver<Command>,
) -> R
where
    C: Connector + Clone + Send + Sync + 'static,
    R: Renderer,
{
    let (completions_tx, mut completions) = mpsc::unbounded_channel();
    let mut driver = Driver {
        session: Session::new(config.local_user.clone(), config.rollback_on_send_failure),
        selector: TransportSelector::new(config.transport()),
        typing: TypingNotifier::new(config.typing_idle()),
        renderer,
        api,
        connector,
        completions: completions_tx,
        poll: None,
        list_in_flight: false,
        list_dirty: false,
    };
    info!("connecting to {}", driver.api.base_url());
    driver.start();

    loop {
        let typing_deadline = driver.typing.deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Quit) | None => break,
                Some(command) => driver.on_command(command),
            },
            Some(done) = completions.recv() => driver.on_completion(done),
            signal = driver.selector.next_event() => driver.on_signal(signal),
            _ = tick(&mut driver.poll) => driver.on_poll(),
            _ = idle(typing_deadline) => driver.on_typing_idle(),
        }
    }
    if let Some(stop) = driver.typing.on_idle() {
        driver.selector.emit(stop);
    }
    info!("event loop stopped");
    driver.renderer
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

struct Driver<C, R> {
    session: Session,
    selector: TransportSelector,
    typing: TypingNotifier,
    renderer: R,
    api: ApiClient,
    connector: C,
    completions: mpsc::UnboundedSender<Completion>,
    poll: Option<Interval>,
    list_in_flight: bool,
    list_dirty: bool,
}

impl<C, R> Driver<C, R>
where
    C: Connector + Clone + Send + Sync + 'static,
    R: Renderer,
{
    fn start(&mut self) {
        self.refresh_conversations();
        let first = self.selector.start();
        self.attempt(first);
    }

    fn attempt(&mut self, next: Option<Attempt>) {
        match next {
            Some(attempt) => {
                debug!("trying {attempt:?} transport");
                let connector = self.connector.clone();
                run_async_to_loop(&self.completions, async move {
                    let result = connector.open(attempt).await;
                    Completion::Transport { attempt, result }
                });
            }
            None if self.selector.is_polling() && self.poll.is_none() => {
                let period = self.selector.poll_interval();
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.poll = Some(interval);
            }
            None => {}
        }
    }

    /// At most one list fetch in flight; changes arriving meanwhile are
    /// folded into a single follow-up.
    fn refresh_conversations(&mut self) {
        if self.list_in_flight {
            self.list_dirty = true;
            return;
        }
        self.list_in_flight = true;
        let api = self.api.clone();
        run_async_to_loop(&self.completions, async move {
            Completion::Conversations(api.conversations().await)
        });
    }

    fn fetch_messages(&self, conversation_id: String) {
        let api = self.api.clone();
        run_async_to_loop(&self.completions, async move {
            let result = api.messages(&conversation_id).await;
            Completion::Messages {
                conversation_id,
                result,
            }
        });
    }

    fn open(&mut self, conversation_id: String) {
        if let Some(stop) = self.typing.on_idle() {
            self.selector.emit(stop);
        }
        self.session.select(&conversation_id);
        self.render_conversations();
        self.render_timeline();
        self.fetch_messages(conversation_id);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Open(id) => self.open(id),
            Command::Send(text) => {
                let Some(send) = self.session.compose(&text, now_secs()) else {
                    debug!("nothing to send");
                    return;
                };
                self.render_timeline();
                if let Some(stop) = self.typing.on_idle() {
                    self.selector.emit(stop);
                }
                let api = self.api.clone();
                run_async_to_loop(&self.completions, async move {
                    let result = api.send_message(&send.outgoing).await;
                    Completion::Sent {
                        echo_id: send.echo_id,
                        result,
                    }
                });
            }
            Command::Typing => {
                let Some(id) = self.session.active_conversation().map(str::to_string) else {
                    return;
                };
                for event in self.typing.on_input(&id, Instant::now()) {
                    self.selector.emit(event);
                }
            }
            Command::Search(query) => {
                self.session.set_filter(&query);
                self.render_conversations();
            }
            Command::Quit => {}
        }
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Conversations(result) => {
                self.list_in_flight = false;
                let open = match result {
                    Ok(list) => self.session.apply_conversations(list),
                    Err(err) => {
                        warn!("failed to load chats: {err}");
                        self.session.conversations_failed(&err.to_string());
                        None
                    }
                };
                self.render_conversations();
                if let Some(id) = open {
                    self.open(id);
                }
                if std::mem::take(&mut self.list_dirty) {
                    self.refresh_conversations();
                }
            }
            Completion::Messages {
                conversation_id,
                result,
            } => match result {
                Ok(messages) => {
                    if self.session.apply_messages(&conversation_id, messages) {
                        self.render_timeline();
                    }
                }
                Err(err) => warn!("failed to load messages for {conversation_id}: {err}"),
            },
            Completion::Sent { echo_id, result } => match result {
                Ok(()) => debug!("message {echo_id} accepted"),
                Err(err) => {
                    warn!("send failed: {err}");
                    if self.session.send_failed(echo_id) {
                        self.render_timeline();
                    }
                }
            },
            Completion::Transport { attempt, result } => match result {
                Ok(link) => self.selector.on_established(attempt, link),
                Err(err) => {
                    let next = self.selector.on_failed(attempt, &err);
                    self.attempt(next);
                }
            },
        }
    }

    fn on_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Event(event) => {
                let outcome = self.session.handle_event(event);
                if outcome.timeline_changed {
                    self.render_timeline();
                }
                if outcome.refresh_conversations {
                    self.refresh_conversations();
                }
            }
            TransportSignal::Closed => {
                let next = self.selector.on_closed();
                self.attempt(next);
            }
        }
    }

    fn on_poll(&mut self) {
        if let Some(id) = self.session.active_conversation() {
            self.fetch_messages(id.to_string());
        }
        self.refresh_conversations();
    }

    fn on_typing_idle(&mut self) {
        if let Some(stop) = self.typing.on_idle() {
            self.selector.emit(stop);
        }
    }

    fn render_conversations(&mut self) {
        let view = self.session.conversation_view();
        self.renderer.conversations(&view);
    }

    fn render_timeline(&mut self) {
        let view = self.session.timeline_view();
        self.renderer.timeline(view.as_ref());
    }
}
