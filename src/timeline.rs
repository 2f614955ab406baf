//! Display-ready projections of the timeline and the conversation list.

use chrono::{DateTime, Local, NaiveDate};

use crate::api::models::{Conversation, DeliveryState, Message, Provenance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Outbound iff sender and counterpart are both known and differ;
/// otherwise iff the sender is the local-user sentinel.
pub fn classify(sender: Option<&str>, counterpart: Option<&str>, local_user: &str) -> Direction {
    let outbound = match (sender, counterpart) {
        (Some(sender), Some(counterpart)) => sender != counterpart,
        (sender, _) => sender == Some(local_user),
    };
    if outbound {
        Direction::Outbound
    } else {
        Direction::Inbound
    }
}

pub fn direction(msg: &Message, local_user: &str) -> Direction {
    match msg.provenance {
        Provenance::LocalEcho { .. } => Direction::Outbound,
        Provenance::Server => match msg.sender.as_deref() {
            Some(from) => {
                let counterpart = Some(msg.conversation_id.as_str()).filter(|c| !c.is_empty());
                classify(Some(from), counterpart, local_user)
            }
            None => classify(msg.sender_name.as_deref(), None, local_user),
        },
    }
}

/// Delivery indicator drawn on outbound bubbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticks {
    Single,
    Double,
    DoubleRead,
}

impl Ticks {
    pub fn for_state(state: DeliveryState) -> Self {
        match state {
            DeliveryState::Sent => Ticks::Single,
            DeliveryState::Delivered => Ticks::Double,
            DeliveryState::Read => Ticks::DoubleRead,
        }
    }
}

/// Local calendar date of a unix-seconds timestamp.
pub fn day_of(timestamp: f64) -> NaiveDate {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
        .map(|utc| utc.with_timezone(&Local).date_naive())
        .unwrap_or_default()
}

/// `HH:MM` in local time; empty for a missing (zero) timestamp.
pub fn time_label(timestamp: f64) -> String {
    if timestamp == 0.0 {
        return String::new();
    }
    DateTime::from_timestamp(timestamp.floor() as i64, 0)
        .map(|utc| utc.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

pub fn day_label(day: NaiveDate) -> String {
    day.format("%a %b %d %Y").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub day: NaiveDate,
    pub messages: Vec<Message>,
}

/// Split an ascending timeline into runs sharing a local calendar date.
pub fn day_buckets(messages: &[Message]) -> Vec<DayBucket> {
    let mut buckets: Vec<DayBucket> = Vec::new();
    for msg in messages {
        let day = day_of(msg.timestamp);
        match buckets.last_mut() {
            Some(bucket) if bucket.day == day => bucket.messages.push(msg.clone()),
            _ => buckets.push(DayBucket {
                day,
                messages: vec![msg.clone()],
            }),
        }
    }
    buckets
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub body: String,
    pub timestamp: f64,
    pub time_label: String,
    pub direction: Direction,
    /// Only outbound bubbles carry ticks.
    pub ticks: Option<Ticks>,
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem {
    DaySeparator { day: NaiveDate, label: String },
    Bubble(DisplayMessage),
}

pub fn render_timeline(messages: &[Message], local_user: &str) -> Vec<TimelineItem> {
    let mut items = Vec::with_capacity(messages.len());
    for bucket in day_buckets(messages) {
        items.push(TimelineItem::DaySeparator {
            day: bucket.day,
            label: day_label(bucket.day),
        });
        for msg in &bucket.messages {
            let direction = direction(msg, local_user);
            items.push(TimelineItem::Bubble(DisplayMessage {
                body: msg.body.clone(),
                timestamp: msg.timestamp,
                time_label: time_label(msg.timestamp),
                direction,
                ticks: (direction == Direction::Outbound)
                    .then(|| Ticks::for_state(msg.delivery_state)),
                pending: msg.is_local_echo(),
            }));
        }
    }
    items
}

/// Most recent activity first; equal timestamps keep server order.
pub fn sort_conversations(list: &mut [Conversation]) {
    list.sort_by(|a, b| b.last_message_timestamp.total_cmp(&a.last_message_timestamp));
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: String,
    pub name: String,
    pub preview: String,
    pub time_label: String,
    pub pinned: bool,
    pub muted: bool,
    pub unread_count: u32,
}

/// Rows for an already sorted list, keeping names that contain `filter`
/// (case-insensitive).
pub fn conversation_rows(list: &[Conversation], filter: &str) -> Vec<ConversationRow> {
    let needle = filter.trim().to_lowercase();
    list.iter()
        .filter(|c| needle.is_empty() || c.display_name.to_lowercase().contains(&needle))
        .map(|c| ConversationRow {
            id: c.id.clone(),
            name: c.display_name.clone(),
            preview: c.last_message_preview.clone(),
            time_label: time_label(c.last_message_timestamp),
            pinned: c.pinned,
            muted: c.muted,
            unread_count: c.unread_count,
        })
        .collect()
}
