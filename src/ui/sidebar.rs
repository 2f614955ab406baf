use crate::session::ConversationListView;
use crate::timeline::ConversationRow;

pub fn render(view: &ConversationListView) -> Vec<String> {
    let mut lines = vec!["== Conversations ==".to_string()];
    if let Some(err) = &view.error {
        lines.push(format!("! {err}"));
        return lines;
    }
    if view.rows.is_empty() {
        lines.push("  (no conversations)".to_string());
    }
    for row in &view.rows {
        let active = view.active.as_deref() == Some(row.id.as_str());
        lines.push(row_line(row, active));
    }
    lines
}

fn row_line(row: &ConversationRow, active: bool) -> String {
    let mut line = String::from(if active { "> " } else { "  " });
    if row.pinned {
        line.push_str("[pin] ");
    }
    line.push_str(&row.name);
    if row.unread_count > 0 {
        line.push_str(&format!(" ({})", row.unread_count));
    }
    if row.muted {
        line.push_str(" [muted]");
    }
    if !row.time_label.is_empty() {
        line.push_str(&format!("  {}", row.time_label));
    }
    if !row.preview.is_empty() {
        line.push_str(&format!("  {}", row.preview));
    }
    line
}
