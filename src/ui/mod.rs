pub mod chat_view;
pub mod sidebar;

use std::io::Write;

use log::warn;

use crate::session::{ConversationListView, TimelineView};

/// Receives display-ready views whenever they change.
pub trait Renderer {
    fn conversations(&mut self, view: &ConversationListView);
    fn timeline(&mut self, view: Option<&TimelineView>);
}

/// Plain line renderer for a terminal.
pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn write_lines(&mut self, lines: &[String]) {
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(self.out, "{line}"))
            .and_then(|_| self.out.flush());
        if let Err(err) = result {
            warn!("failed to write to terminal: {err}");
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn conversations(&mut self, view: &ConversationListView) {
        let lines = sidebar::render(view);
        self.write_lines(&lines);
    }

    fn timeline(&mut self, view: Option<&TimelineView>) {
        let lines = chat_view::render(view);
        self.write_lines(&lines);
    }
}
