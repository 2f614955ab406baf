//! Session state owned by the event loop. No I/O happens here.

use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::api::events::{OutboundEvent, RealtimeEvent};
use crate::api::models::{Conversation, Message, OutgoingMessage};
use crate::reconcile::{Mode, Reconciler};
use crate::timeline::{self, ConversationRow, TimelineItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Typing,
}

impl Presence {
    pub fn label(self) -> &'static str {
        match self {
            Presence::Online => "online",
            Presence::Typing => "typing...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventOutcome {
    pub timeline_changed: bool,
    pub refresh_conversations: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationListView {
    pub rows: Vec<ConversationRow>,
    pub active: Option<String>,
    /// Inline error shown in place of the list.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineView {
    pub conversation_id: String,
    pub title: String,
    pub presence: Presence,
    pub items: Vec<TimelineItem>,
}

/// An optimistic send: the echo already in the timeline plus the request
/// still to be made.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub echo_id: u64,
    pub outgoing: OutgoingMessage,
}

pub struct Session {
    reconciler: Reconciler,
    rollback_on_send_failure: bool,
    conversations: Vec<Conversation>,
    loaded: bool,
    list_error: Option<String>,
    filter: String,
    active: Option<String>,
    timeline: Vec<Message>,
    presence: Presence,
    next_echo_id: u64,
}

impl Session {
    pub fn new(local_user: impl Into<String>, rollback_on_send_failure: bool) -> Self {
        Self {
            reconciler: Reconciler::new(local_user),
            rollback_on_send_failure,
            conversations: Vec::new(),
            loaded: false,
            list_error: None,
            filter: String::new(),
            active: None,
            timeline: Vec::new(),
            presence: Presence::Online,
            next_echo_id: 1,
        }
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Adopt a wholesale conversation list. Returns the conversation to open
    /// when this is the first load and nothing is open yet.
    pub fn apply_conversations(&mut self, mut list: Vec<Conversation>) -> Option<String> {
        timeline::sort_conversations(&mut list);
        self.conversations = list;
        self.list_error = None;
        let first_load = !self.loaded;
        self.loaded = true;
        if first_load && self.active.is_none() {
            return self.conversations.first().map(|c| c.id.clone());
        }
        None
    }

    /// Only the initial load surfaces an error; later refreshes keep the
    /// last good list.
    pub fn conversations_failed(&mut self, err: &str) {
        if !self.loaded {
            self.list_error = Some(format!("Failed to load chats: {err}"));
        }
    }

    /// Make `id` active, discarding the current timeline. The caller fetches
    /// the new conversation wholesale.
    pub fn select(&mut self, id: &str) {
        info!("opening conversation {id}");
        self.active = Some(id.to_string());
        self.timeline.clear();
        self.presence = Presence::Online;
    }

    /// Apply a wholesale fetch. Responses for a conversation that is no
    /// longer active are dropped.
    pub fn apply_messages(&mut self, conversation_id: &str, messages: Vec<Message>) -> bool {
        if self.active.as_deref() != Some(conversation_id) {
            debug!("dropping stale messages for {conversation_id}");
            return false;
        }
        let current = std::mem::take(&mut self.timeline);
        self.timeline = self.reconciler.reconcile(current, messages, Mode::Replace);
        true
    }

    pub fn handle_event(&mut self, event: RealtimeEvent) -> EventOutcome {
        let is_active = self.active.as_deref() == Some(event.conversation_id());
        match event {
            RealtimeEvent::NewMessage(msg) => {
                let mut outcome = EventOutcome {
                    timeline_changed: false,
                    refresh_conversations: true,
                };
                if is_active {
                    let current = std::mem::take(&mut self.timeline);
                    self.timeline = self.reconciler.reconcile(current, [msg], Mode::Append);
                    outcome.timeline_changed = true;
                }
                outcome
            }
            RealtimeEvent::TypingStart { .. } | RealtimeEvent::TypingStop { .. } if !is_active => {
                EventOutcome::default()
            }
            RealtimeEvent::TypingStart { .. } => self.set_presence(Presence::Typing),
            RealtimeEvent::TypingStop { .. } => self.set_presence(Presence::Online),
        }
    }

    fn set_presence(&mut self, presence: Presence) -> EventOutcome {
        let changed = self.presence != presence;
        self.presence = presence;
        EventOutcome {
            timeline_changed: changed,
            refresh_conversations: false,
        }
    }

    /// Append an optimistic echo for `text` and return the send to perform.
    pub fn compose(&mut self, text: &str, now: f64) -> Option<PendingSend> {
        let text = text.trim();
        let conversation_id = self.active.clone()?;
        if text.is_empty() {
            return None;
        }
        let echo_id = self.next_echo_id;
        self.next_echo_id += 1;
        let local_user = self.reconciler.local_user().to_string();
        let echo = Message::local_echo(&conversation_id, &local_user, text, now, echo_id);
        let current = std::mem::take(&mut self.timeline);
        self.timeline = self.reconciler.reconcile(current, [echo], Mode::Append);
        Some(PendingSend {
            echo_id,
            outgoing: OutgoingMessage {
                conversation_id,
                text: text.to_string(),
                sender: local_user,
            },
        })
    }

    /// A send failed. The echo stays unless rollback is configured.
    /// Returns whether the timeline changed.
    pub fn send_failed(&mut self, echo_id: u64) -> bool {
        if !self.rollback_on_send_failure {
            return false;
        }
        let before = self.timeline.len();
        self.timeline.retain(|m| m.echo_id() != Some(echo_id));
        before != self.timeline.len()
    }

    pub fn set_filter(&mut self, query: &str) {
        self.filter = query.to_string();
    }

    pub fn conversation_view(&self) -> ConversationListView {
        ConversationListView {
            rows: timeline::conversation_rows(&self.conversations, &self.filter),
            active: self.active.clone(),
            error: self.list_error.clone(),
        }
    }

    pub fn timeline_view(&self) -> Option<TimelineView> {
        let id = self.active.as_ref()?;
        let title = self
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.display_name.clone())
            .unwrap_or_else(|| id.clone());
        Some(TimelineView {
            conversation_id: id.clone(),
            title,
            presence: self.presence,
            items: timeline::render_timeline(&self.timeline, self.reconciler.local_user()),
        })
    }
}

/// Outgoing typing notifications: start on the first keystroke, stop after
/// an idle period.
#[derive(Debug)]
pub struct TypingNotifier {
    idle: Duration,
    typing_in: Option<String>,
    deadline: Option<Instant>,
}

impl TypingNotifier {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            typing_in: None,
            deadline: None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_input(&mut self, conversation_id: &str, now: Instant) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        if self.typing_in.as_deref() != Some(conversation_id) {
            if let Some(previous) = self.typing_in.take() {
                out.push(OutboundEvent::TypingStop {
                    conversation_id: previous,
                });
            }
            out.push(OutboundEvent::TypingStart {
                conversation_id: conversation_id.to_string(),
            });
            self.typing_in = Some(conversation_id.to_string());
        }
        self.deadline = Some(now + self.idle);
        out
    }

    /// Call once the deadline has passed.
    pub fn on_idle(&mut self) -> Option<OutboundEvent> {
        self.deadline = None;
        self.typing_in
            .take()
            .map(|conversation_id| OutboundEvent::TypingStop { conversation_id })
    }
}
