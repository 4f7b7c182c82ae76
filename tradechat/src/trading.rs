//! Read-only view of the user's trading data.
//!
//! The chat only needs two things from the trading side of the application:
//! the transaction list (for `/share` and `/stats`) and the USD balance
//! (shown by `/stats`). [`TradingData`] is that boundary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tradechat_proto::envelope::Timestamp;
use tradechat_proto::trade::{TradeShare, trade_type_label};

/// Errors loading trading data from disk.
#[derive(Debug, thiserror::Error)]
pub enum TradingDataError {
    /// The file could not be read.
    #[error("failed to read trading data {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not a valid trading snapshot.
    #[error("failed to parse trading data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Kind of a recorded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionKind {
    /// Opened or added to a long position.
    Buy,
    /// Opened or added to a short position.
    Sell,
    /// Closed a long position.
    CloseLong,
    /// Closed a short position.
    CloseShort,
    /// Position was force-closed.
    Liquidation,
    /// Anything else the trading side records.
    Other(String),
}

impl TransactionKind {
    /// Wire name, e.g. `close_long`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::CloseLong => "close_long",
            Self::CloseShort => "close_short",
            Self::Liquidation => "liquidation",
            Self::Other(other) => other,
        }
    }

    /// Whether the transaction realized a profit or loss.
    #[must_use]
    pub const fn is_settlement(&self) -> bool {
        matches!(self, Self::CloseLong | Self::CloseShort | Self::Liquidation)
    }
}

impl From<String> for TransactionKind {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "buy" => Self::Buy,
            "sell" => Self::Sell,
            "close_long" => Self::CloseLong,
            "close_short" => Self::CloseShort,
            "liquidation" => Self::Liquidation,
            _ => Self::Other(raw),
        }
    }
}

impl From<TransactionKind> for String {
    fn from(kind: TransactionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One entry in the user's transaction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Position size.
    #[serde(default)]
    pub amount: Option<f64>,
    /// Execution price.
    #[serde(default)]
    pub price: Option<f64>,
    /// Realized P&L of a close.
    #[serde(default)]
    pub pnl: Option<f64>,
    /// Loss of a liquidation; its sign is not reliable upstream.
    #[serde(default)]
    pub loss: Option<f64>,
    /// Leverage multiplier.
    #[serde(default)]
    pub leverage: Option<f64>,
    /// Position entry price.
    #[serde(default)]
    pub entry_price: Option<f64>,
    /// Position exit price.
    #[serde(default)]
    pub exit_price: Option<f64>,
    /// When it happened.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl Transaction {
    /// Creates a transaction of `kind` with every numeric field unset.
    #[must_use]
    pub const fn new(kind: TransactionKind) -> Self {
        Self {
            kind,
            amount: None,
            price: None,
            pnl: None,
            loss: None,
            leverage: None,
            entry_price: None,
            exit_price: None,
            timestamp: None,
        }
    }

    /// Realized P&L for settlements; `None` for opening trades.
    ///
    /// A liquidation is always a loss: the magnitude of `loss` (or `pnl`
    /// when `loss` is absent) is reported as non-positive.
    #[must_use]
    pub fn realized_pnl(&self) -> Option<f64> {
        match self.kind {
            TransactionKind::CloseLong | TransactionKind::CloseShort => {
                Some(self.pnl.unwrap_or(0.0))
            }
            TransactionKind::Liquidation => Some(-self.loss.or(self.pnl).unwrap_or(0.0).abs()),
            _ => None,
        }
    }

    /// Builds the trade card for a settlement, or `None` for other kinds.
    #[must_use]
    pub fn to_trade_share(&self, note: &str) -> Option<TradeShare> {
        let pnl = self.realized_pnl()?;
        Some(
            TradeShare {
                trade_type: trade_type_label(self.kind.as_str()),
                leverage: self.leverage.unwrap_or(1.0),
                entry_price: self.entry_price.unwrap_or(0.0),
                exit_price: self.exit_price.or(self.price).unwrap_or(0.0),
                pnl,
                note: note.to_string(),
            }
            .normalized(),
        )
    }
}

/// Read access to the current user's trading data.
pub trait TradingData: Send {
    /// Transactions in chronological order (oldest first).
    fn transactions(&self) -> Vec<Transaction>;

    /// Current USD balance.
    fn usd_balance(&self) -> f64;
}

/// Most recent settlement (close or liquidation), if any.
#[must_use]
pub fn latest_settlement(transactions: &[Transaction]) -> Option<&Transaction> {
    transactions.iter().rev().find(|tx| tx.kind.is_settlement())
}

/// Aggregate performance over settled trades.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeStats {
    /// Number of closes and liquidations.
    pub trades: usize,
    /// Settlements with positive P&L.
    pub winners: usize,
    /// Sum of realized P&L.
    pub total_pnl: f64,
}

impl TradeStats {
    /// Computes statistics over `transactions`.
    #[must_use]
    pub fn compute(transactions: &[Transaction]) -> Self {
        transactions
            .iter()
            .filter_map(Transaction::realized_pnl)
            .fold(
                Self {
                    trades: 0,
                    winners: 0,
                    total_pnl: 0.0,
                },
                |mut stats, pnl| {
                    stats.trades += 1;
                    if pnl > 0.0 {
                        stats.winners += 1;
                    }
                    stats.total_pnl += pnl;
                    stats
                },
            )
    }

    /// Winners as a percentage of trades (0 when there are none).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.winners as f64 / self.trades as f64 * 100.0
    }

    /// Mean realized P&L (0 when there are no trades).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_pnl(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.total_pnl / self.trades as f64
    }
}

/// In-memory trading data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSnapshot {
    /// Transactions, oldest first.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// USD balance.
    #[serde(default)]
    pub usd_balance: f64,
}

impl TradingSnapshot {
    /// Creates a snapshot from its parts.
    #[must_use]
    pub const fn new(transactions: Vec<Transaction>, usd_balance: f64) -> Self {
        Self {
            transactions,
            usd_balance,
        }
    }

    /// Loads a snapshot from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`TradingDataError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, TradingDataError> {
        let contents = std::fs::read_to_string(path).map_err(|source| TradingDataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl TradingData for TradingSnapshot {
    fn transactions(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    fn usd_balance(&self) -> f64 {
        self.usd_balance
    }
}

/// Trading data backed by a JSON file that is re-read on every query, so
/// the chat always sees what the trading side last wrote.
///
/// A missing or unreadable file reads as an empty snapshot.
#[derive(Debug, Clone)]
pub struct FileTradingData {
    path: PathBuf,
}

impl FileTradingData {
    /// Creates a reader for `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn snapshot(&self) -> TradingSnapshot {
        TradingSnapshot::load(&self.path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "trading data unavailable");
            TradingSnapshot::default()
        })
    }
}

impl TradingData for FileTradingData {
    fn transactions(&self) -> Vec<Transaction> {
        self.snapshot().transactions
    }

    fn usd_balance(&self) -> f64 {
        self.snapshot().usd_balance
    }
}
