use crate::session::TimelineView;
use crate::timeline::{Direction, DisplayMessage, Ticks, TimelineItem};

pub fn render(view: Option<&TimelineView>) -> Vec<String> {
    let Some(view) = view else {
        return vec!["(select a conversation)".to_string()];
    };
    let mut lines = vec![format!("== {} ({}) ==", view.title, view.presence.label())];
    for item in &view.items {
        lines.push(match item {
            TimelineItem::DaySeparator { label, .. } => format!("--- {label} ---"),
            TimelineItem::Bubble(msg) => bubble(msg),
        });
    }
    lines
}

fn bubble(msg: &DisplayMessage) -> String {
    match msg.direction {
        Direction::Inbound => format!("  [{}] {}", msg.time_label, msg.body),
        Direction::Outbound => {
            let ticks = msg.ticks.map(tick_marks).unwrap_or_default();
            let pending = if msg.pending { " (sending)" } else { "" };
            format!("      {} [{}] {ticks}{pending}", msg.body, msg.time_label)
        }
    }
}

fn tick_marks(ticks: Ticks) -> &'static str {
    match ticks {
        Ticks::Single => "✓",
        Ticks::Double => "✓✓",
        Ticks::DoubleRead => "✓✓ read",
    }
}
