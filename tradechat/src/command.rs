//! Chat input interpretation.
//!
//! Input starting with `/` is a slash command; the first whitespace-delimited
//! token names it (case-insensitive) and the rest is its argument. Anything
//! else is chat text, sent trimmed.

use tradechat_proto::envelope::Outbound;

use crate::trading::{TradeStats, TradingData, latest_settlement};

/// Prefix that marks a slash command.
pub const COMMAND_PREFIX: char = '/';

/// Notice shown by `/help`.
pub const HELP_TEXT: &str = "Available commands: \
/share [note] - share your most recent closed trade; \
/stats - show your trading performance; \
/clear - clear the chat window; \
/help - show this message";

/// Notice shown when `/share` finds nothing to share.
pub const NO_TRADES_NOTICE: &str = "No trades to share yet. Close a position first!";

/// Confirmation shown after `/clear`.
pub const CLEARED_NOTICE: &str = "Chat cleared.";

/// A recognized slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Share the most recent settled trade, with an optional note.
    Share {
        /// Text after the command name, trimmed.
        note: String,
    },
    /// Show the help notice.
    Help,
    /// Show trading statistics.
    Stats,
    /// Clear the local message list.
    Clear,
    /// Anything else starting with the prefix.
    Unknown(String),
}

/// Classified user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Nothing but whitespace.
    Empty,
    /// Chat text, already trimmed.
    Chat(String),
    /// A slash command.
    Command(Command),
}

/// What the controller should do for a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Show a local notice; no transport traffic.
    Notice(String),
    /// Clear the message list, then show a confirmation notice.
    Clear {
        /// Confirmation text.
        notice: String,
    },
    /// Send this envelope.
    Send(Outbound),
}

/// Classifies raw input from the chat box.
#[must_use]
pub fn parse_input(raw: &str) -> Input {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Input::Empty
    } else if trimmed.starts_with(COMMAND_PREFIX) {
        Input::Command(parse_command(trimmed))
    } else {
        Input::Chat(trimmed.to_string())
    }
}

fn parse_command(text: &str) -> Command {
    let (name, rest) = text
        .split_once(char::is_whitespace)
        .map_or((text, ""), |(name, rest)| (name, rest.trim()));

    match name.to_lowercase().as_str() {
        "/share" => Command::Share {
            note: rest.to_string(),
        },
        "/help" => Command::Help,
        "/stats" => Command::Stats,
        "/clear" => Command::Clear,
        _ => Command::Unknown(name.to_string()),
    }
}

/// Decides what `command` does, reading trading data where needed.
#[must_use]
pub fn interpret(command: &Command, trading: &dyn TradingData) -> Action {
    match command {
        Command::Share { note } => share(note, trading),
        Command::Help => Action::Notice(HELP_TEXT.to_string()),
        Command::Stats => Action::Notice(stats_notice(trading)),
        Command::Clear => Action::Clear {
            notice: CLEARED_NOTICE.to_string(),
        },
        Command::Unknown(name) => Action::Notice(format!(
            "Unknown command: {name}. Type /help for available commands."
        )),
    }
}

fn share(note: &str, trading: &dyn TradingData) -> Action {
    let transactions = trading.transactions();
    match latest_settlement(&transactions).and_then(|tx| tx.to_trade_share(note)) {
        Some(trade) => Action::Send(Outbound::TradeShare(trade)),
        None => Action::Notice(NO_TRADES_NOTICE.to_string()),
    }
}

fn stats_notice(trading: &dyn TradingData) -> String {
    let stats = TradeStats::compute(&trading.transactions());
    let balance = trading.usd_balance();
    if stats.trades == 0 {
        return format!("No closed trades yet. Balance: {balance:.2} USD");
    }
    format!(
        "Trading stats: {} trades, {} wins ({:.1}% win rate), total P&L {:.2} USD, \
         average P&L {:.2} USD, balance {balance:.2} USD",
        stats.trades,
        stats.winners,
        stats.win_rate(),
        stats.total_pnl,
        stats.average_pnl(),
    )
}
