//! Merging fetched, pushed and optimistic messages into one ordered timeline.

use crate::api::models::Message;
use crate::timeline::{Direction, direction};

/// How far apart an echo and its server copy may be stamped.
pub const ECHO_CONFIRM_WINDOW_SECS: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Append,
    Replace,
}

#[derive(Debug, PartialEq)]
enum Identity<'a> {
    Server(&'a str),
    Composite {
        conversation_id: &'a str,
        timestamp: u64,
        sender: Option<&'a str>,
        body: &'a str,
    },
}

fn identity(msg: &Message) -> Identity<'_> {
    match msg.id.as_deref() {
        Some(id) => Identity::Server(id),
        None => Identity::Composite {
            conversation_id: &msg.conversation_id,
            timestamp: msg.timestamp.to_bits(),
            sender: msg.sender.as_deref().or(msg.sender_name.as_deref()),
            body: &msg.body,
        },
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    local_user: String,
}

impl Reconciler {
    pub fn new(local_user: impl Into<String>) -> Self {
        Self {
            local_user: local_user.into(),
        }
    }

    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    pub fn reconcile(
        &self,
        timeline: Vec<Message>,
        incoming: impl IntoIterator<Item = Message>,
        mode: Mode,
    ) -> Vec<Message> {
        let mut merged = match mode {
            Mode::Replace => self.replace(timeline, incoming.into_iter().collect()),
            Mode::Append => {
                let mut merged = timeline;
                for msg in incoming {
                    self.merge_one(&mut merged, msg);
                }
                merged
            }
        };
        sort_chronologically(&mut merged);
        merged
    }

    fn replace(&self, timeline: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
        let mut confirmed = vec![false; incoming.len()];
        let mut pending = Vec::new();
        for echo in timeline.into_iter().filter(Message::is_local_echo) {
            let matched = (0..incoming.len())
                .find(|&i| !confirmed[i] && self.confirms(&incoming[i], &echo));
            match matched {
                Some(i) => confirmed[i] = true,
                None => pending.push(echo),
            }
        }
        let mut merged = incoming;
        merged.extend(pending);
        merged
    }

    fn merge_one(&self, timeline: &mut Vec<Message>, incoming: Message) {
        if incoming.is_local_echo() {
            timeline.push(incoming);
            return;
        }
        let existing = timeline
            .iter()
            .position(|m| same_message(m, &incoming))
            .or_else(|| timeline.iter().position(|m| self.confirms(&incoming, m)));
        match existing {
            Some(pos) => timeline[pos] = incoming,
            None => timeline.push(incoming),
        }
    }

    /// Whether server message `msg` is the persisted copy of local `echo`.
    fn confirms(&self, msg: &Message, echo: &Message) -> bool {
        echo.is_local_echo()
            && !msg.is_local_echo()
            && msg.conversation_id == echo.conversation_id
            && msg.body == echo.body
            && direction(msg, &self.local_user) == Direction::Outbound
            && (msg.timestamp - echo.timestamp).abs() <= ECHO_CONFIRM_WINDOW_SECS
    }
}

/// Backend ids are not unique across sends in the same second, so an id
/// match only counts when the content agrees too.
fn same_message(existing: &Message, incoming: &Message) -> bool {
    !existing.is_local_echo()
        && identity(existing) == identity(incoming)
        && existing.conversation_id == incoming.conversation_id
        && existing.body == incoming.body
}

/// Ascending by timestamp; ties keep their relative order.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::DeliveryState;
    use serde_json::json;

    fn server(id: &str, ts: f64, body: &str) -> Message {
        Message::from_value(&json!({
            "id": id, "wa_id": "A", "from": "A", "name": "Alice",
            "text": {"body": body}, "timestamp": ts
        }))
    }

    fn persisted_send(ts: f64, body: &str) -> Message {
        Message::from_value(&json!({
            "id": format!("local_{ts}"), "wa_id": "A", "name": "You",
            "text": {"body": body}, "timestamp": ts, "status": "sent"
        }))
    }

    fn bodies(msgs: &[Message]) -> Vec<&str> {
        msgs.iter().map(|m| m.body.as_str()).collect()
    }

    #[test]
    fn replace_sorts_with_stable_ties() {
        let r = Reconciler::new("You");
        let out = r.reconcile(
            vec![server("old", 1.0, "discarded")],
            vec![
                server("c", 30.0, "c"),
                server("a1", 10.0, "a1"),
                server("b", 20.0, "b"),
                server("a2", 10.0, "a2"),
            ],
            Mode::Replace,
        );
        assert_eq!(bodies(&out), vec!["a1", "a2", "b", "c"]);
    }

    #[test]
    fn append_keeps_arrival_order_for_ties() {
        let r = Reconciler::new("You");
        let timeline = r.reconcile(Vec::new(), vec![server("x", 10.0, "x")], Mode::Replace);
        let out = r.reconcile(
            timeline,
            vec![server("y", 10.0, "y"), server("w", 5.0, "w")],
            Mode::Append,
        );
        assert_eq!(bodies(&out), vec!["w", "x", "y"]);
        assert!(out.windows(2).all(|p| p[0].timestamp <= p[1].timestamp));
    }

    #[test]
    fn same_message_over_two_channels_appears_once() {
        let r = Reconciler::new("You");
        let once = r.reconcile(Vec::new(), vec![server("m1", 10.0, "hello")], Mode::Append);
        let twice = r.reconcile(once, vec![server("m1", 10.0, "hello")], Mode::Append);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn delivery_state_transitions_replace_in_place() {
        let r = Reconciler::new("You");
        let mut read = server("m1", 10.0, "hello");
        read.delivery_state = DeliveryState::Read;
        let timeline = r.reconcile(
            Vec::new(),
            vec![server("m0", 5.0, "first"), server("m1", 10.0, "hello")],
            Mode::Replace,
        );
        let out = r.reconcile(timeline, vec![read], Mode::Append);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].delivery_state, DeliveryState::Read);
    }

    #[test]
    fn id_less_duplicates_collapse_on_composite_key() {
        let r = Reconciler::new("You");
        let msg = Message::from_value(&json!({"wa_id": "A", "from": "A", "text": {"body": "hey"}, "timestamp": 3}));
        let out = r.reconcile(vec![msg.clone()], vec![msg], Mode::Append);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn push_confirms_local_echo() {
        let r = Reconciler::new("You");
        let echo = Message::local_echo("A", "You", "hi", 100.0, 1);
        let timeline = r.reconcile(vec![server("m0", 50.0, "before")], vec![echo], Mode::Append);
        let out = r.reconcile(timeline, vec![persisted_send(101.5, "hi")], Mode::Append);
        assert_eq!(bodies(&out), vec!["before", "hi"]);
        assert!(!out[1].is_local_echo());
    }

    #[test]
    fn refetch_after_send_has_no_duplicate_bubble() {
        let r = Reconciler::new("You");
        let echo = Message::local_echo("A", "You", "hi", 100.0, 1);
        let timeline = r.reconcile(Vec::new(), vec![echo], Mode::Append);
        let out = r.reconcile(
            timeline,
            vec![server("m0", 50.0, "before"), persisted_send(100.2, "hi")],
            Mode::Replace,
        );
        assert_eq!(bodies(&out), vec!["before", "hi"]);
        assert!(out.iter().all(|m| !m.is_local_echo()));
    }

    #[test]
    fn unconfirmed_echo_survives_replace() {
        let r = Reconciler::new("You");
        let timeline = vec![Message::local_echo("A", "You", "in flight", 100.0, 7)];
        let out = r.reconcile(timeline, vec![server("m0", 50.0, "before")], Mode::Replace);
        assert_eq!(bodies(&out), vec!["before", "in flight"]);
        assert_eq!(out[1].echo_id(), Some(7));
    }

    #[test]
    fn inbound_message_with_same_text_is_not_a_confirmation() {
        let r = Reconciler::new("You");
        let timeline = vec![Message::local_echo("A", "You", "ok", 100.0, 1)];
        let out = r.reconcile(timeline, vec![server("m9", 100.0, "ok")], Mode::Append);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn one_server_copy_confirms_one_echo() {
        let r = Reconciler::new("You");
        let timeline = vec![
            Message::local_echo("A", "You", "ok", 100.0, 1),
            Message::local_echo("A", "You", "ok", 101.0, 2),
        ];
        let out = r.reconcile(timeline, vec![persisted_send(100.5, "ok")], Mode::Replace);
        assert_eq!(out.len(), 2);
        assert_eq!(out.iter().filter(|m| m.is_local_echo()).count(), 1);
    }

    #[test]
    fn sends_sharing_a_server_id_both_survive() {
        let r = Reconciler::new("You");
        let copy = |body: &str| {
            Message::from_value(&json!({
                "id": "local_20250805132000", "wa_id": "A", "name": "You",
                "text": {"body": body}, "timestamp": 1_754_400_000
            }))
        };
        let mut timeline = Vec::new();
        for (echo_id, body) in [(1, "first"), (2, "second")] {
            let echo = Message::local_echo("A", "You", body, 1_754_400_000.0, echo_id);
            timeline = r.reconcile(timeline, [echo], Mode::Append);
            timeline = r.reconcile(timeline, [copy(body)], Mode::Append);
        }
        let shown: Vec<_> = timeline
            .iter()
            .map(|m| (m.body.as_str(), m.is_local_echo()))
            .collect();
        assert_eq!(shown, vec![("first", false), ("second", false)]);
    }

    #[test]
    fn stale_echo_outside_window_is_kept() {
        let r = Reconciler::new("You");
        let timeline = vec![Message::local_echo("A", "You", "ok", 100.0, 1)];
        let far = persisted_send(100.0 + ECHO_CONFIRM_WINDOW_SECS + 1.0, "ok");
        let out = r.reconcile(timeline, vec![far], Mode::Append);
        assert_eq!(out.len(), 2);
    }
}
