//! Line-oriented console front end.
//!
//! [`ConsolePresenter`] prints what the controller renders as plain text
//! lines; [`classify`] separates the local `:show`/`:hide`/`:quit` controls
//! from text meant for the chat box.

use std::fmt;
use std::io::Write;

use chrono::Local;
use tradechat_proto::envelope::{ChatLine, HistoryEntry, SharedTrade, Timestamp};

use crate::presentation::Presenter;

/// Escape sequence that clears the screen and homes the cursor.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// A line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// `:show`: open the chat surface.
    Show,
    /// `:hide`: close the chat surface.
    Hide,
    /// `:quit`: shut down.
    Quit,
    /// Anything else, for the chat input box.
    Text(String),
}

/// Classifies one console line.
#[must_use]
pub fn classify(line: &str) -> ConsoleInput {
    match line.trim() {
        ":show" => ConsoleInput::Show,
        ":hide" => ConsoleInput::Hide,
        ":quit" | ":q" => ConsoleInput::Quit,
        _ => ConsoleInput::Text(line.to_string()),
    }
}

/// Presenter that writes text lines to `out`.
///
/// History is printed newest first, as the web widget shows it.
pub struct ConsolePresenter<W> {
    out: W,
    timestamp_format: String,
}

impl<W: Write + Send> ConsolePresenter<W> {
    /// Creates a presenter writing to `out`, formatting times with
    /// `timestamp_format` (chrono syntax, local time zone).
    pub fn new(out: W, timestamp_format: impl Into<String>) -> Self {
        Self {
            out,
            timestamp_format: timestamp_format.into(),
        }
    }

    /// Consumes the presenter and returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn stamp(&self, timestamp: Option<Timestamp>) -> String {
        timestamp
            .and_then(Timestamp::to_datetime)
            .map(|at| {
                at.with_timezone(&Local)
                    .format(&self.timestamp_format)
                    .to_string()
            })
            .unwrap_or_default()
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{args}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    fn write_message(&mut self, line: &ChatLine) {
        let stamp = self.stamp(line.timestamp);
        self.line(format_args!("[{stamp}] {}: {}", line.username, line.text));
    }

    fn write_trade(&mut self, shared: &SharedTrade) {
        let stamp = self.stamp(shared.timestamp);
        let who = shared.username.as_deref().unwrap_or("someone");
        let trade = &shared.trade;
        let mut text = format!(
            "[{stamp}] {who} shared {} {}x | entry {:.2} | exit {:.2} | P&L {:+.2} USD",
            trade.trade_type, trade.leverage, trade.entry_price, trade.exit_price, trade.pnl
        );
        if !trade.note.is_empty() {
            text.push_str(" | ");
            text.push_str(&trade.note);
        }
        self.line(format_args!("{text}"));
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn render_message(&mut self, line: &ChatLine) {
        self.write_message(line);
    }

    fn render_system_notice(&mut self, text: &str) {
        self.line(format_args!("* {text}"));
    }

    fn render_trade_card(&mut self, trade: &SharedTrade) {
        self.write_trade(trade);
    }

    fn render_history(&mut self, entries: &[HistoryEntry]) {
        self.clear_messages();
        self.line(format_args!("--- recent messages ---"));
        for entry in entries.iter().rev() {
            match entry {
                HistoryEntry::Message(line) => self.write_message(line),
                HistoryEntry::Trade(trade) => self.write_trade(trade),
            }
        }
        self.line(format_args!("-----------------------"));
    }

    fn set_online_count(&mut self, count: u64) {
        self.line(format_args!("* {count} online"));
    }

    fn set_unread_badge(&mut self, count: u32) {
        if count > 0 {
            self.line(format_args!("* {count} unread"));
        }
    }

    fn clear_messages(&mut self) {
        if let Err(e) = self
            .out
            .write_all(CLEAR_SCREEN.as_bytes())
            .and_then(|()| self.out.flush())
        {
            tracing::warn!(error = %e, "console write failed");
        }
    }
}
