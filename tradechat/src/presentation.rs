//! Presentation boundary.
//!
//! The controller never renders anything itself; it tells a [`Presenter`]
//! what happened and moves on. All calls are fire-and-forget.

use std::sync::Arc;

use parking_lot::Mutex;
use tradechat_proto::envelope::{ChatLine, HistoryEntry, SharedTrade};

/// Receives rendering instructions from the chat controller.
pub trait Presenter: Send {
    /// Appends an attributed chat line.
    fn render_message(&mut self, line: &ChatLine);

    /// Appends a non-attributable notice (server or local).
    fn render_system_notice(&mut self, text: &str);

    /// Appends an attributed trade card.
    fn render_trade_card(&mut self, trade: &SharedTrade);

    /// Replaces the message list with replayed history.
    ///
    /// `entries` is in chronological order; newest-first display is the
    /// presenter's choice.
    fn render_history(&mut self, entries: &[HistoryEntry]);

    /// Updates the online-users indicator.
    fn set_online_count(&mut self, count: u64);

    /// Updates the unread badge; 0 hides it.
    fn set_unread_badge(&mut self, count: u32);

    /// Clears the rendered message list.
    fn clear_messages(&mut self);

    /// Moves keyboard focus to the chat input.
    fn focus_input(&mut self) {}
}

/// One call recorded by [`RecordingPresenter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// `render_message`.
    Message(ChatLine),
    /// `render_system_notice`.
    Notice(String),
    /// `render_trade_card`.
    TradeCard(SharedTrade),
    /// `render_history`.
    History(Vec<HistoryEntry>),
    /// `set_online_count`.
    OnlineCount(u64),
    /// `set_unread_badge`.
    UnreadBadge(u32),
    /// `clear_messages`.
    Cleared,
    /// `focus_input`.
    FocusInput,
}

/// Presenter that records every call, for tests and headless use.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    log: Arc<Mutex<Vec<Rendered>>>,
}

impl RecordingPresenter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything rendered so far, in call order.
    #[must_use]
    pub fn rendered(&self) -> Vec<Rendered> {
        self.log.lock().clone()
    }

    /// Only the notices, in call order.
    #[must_use]
    pub fn notices(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|r| match r {
                Rendered::Notice(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recent unread badge value, if one was set.
    #[must_use]
    pub fn last_unread_badge(&self) -> Option<u32> {
        self.log.lock().iter().rev().find_map(|r| match r {
            Rendered::UnreadBadge(n) => Some(*n),
            _ => None,
        })
    }

    /// Forgets everything recorded so far.
    pub fn reset(&self) {
        self.log.lock().clear();
    }

    fn push(&self, rendered: Rendered) {
        self.log.lock().push(rendered);
    }
}

impl Presenter for RecordingPresenter {
    fn render_message(&mut self, line: &ChatLine) {
        self.push(Rendered::Message(line.clone()));
    }

    fn render_system_notice(&mut self, text: &str) {
        self.push(Rendered::Notice(text.to_string()));
    }

    fn render_trade_card(&mut self, trade: &SharedTrade) {
        self.push(Rendered::TradeCard(trade.clone()));
    }

    fn render_history(&mut self, entries: &[HistoryEntry]) {
        self.push(Rendered::History(entries.to_vec()));
    }

    fn set_online_count(&mut self, count: u64) {
        self.push(Rendered::OnlineCount(count));
    }

    fn set_unread_badge(&mut self, count: u32) {
        self.push(Rendered::UnreadBadge(count));
    }

    fn clear_messages(&mut self) {
        self.push(Rendered::Cleared);
    }

    fn focus_input(&mut self) {
        self.push(Rendered::FocusInput);
    }
}
