//! Envelope types exchanged over the chat transport.
//!
//! Outbound and inbound envelopes are modeled separately: the client only
//! ever writes [`Outbound`] and only ever reads [`Inbound`]. On the wire both
//! are JSON objects whose `type` field names the kind.

use serde::{Deserialize, Serialize};

use crate::trade::{TradeShare, lenient_f64};

/// Millisecond-precision UTC timestamp.
///
/// Deserializes from epoch milliseconds (integer or float) or an RFC 3339
/// string; always serializes as epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimestamp", into = "u64")]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Converts to a UTC date-time, if representable.
    #[must_use]
    pub fn to_datetime(self) -> Option<chrono::DateTime<chrono::Utc>> {
        let millis = i64::try_from(self.0).ok()?;
        chrono::DateTime::from_timestamp_millis(millis)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(u64),
    Float(f64),
    Text(String),
}

impl TryFrom<RawTimestamp> for Timestamp {
    type Error = String;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn try_from(raw: RawTimestamp) -> Result<Self, Self::Error> {
        match raw {
            RawTimestamp::Millis(millis) => Ok(Self(millis)),
            RawTimestamp::Float(value) if value.is_finite() && value >= 0.0 => {
                Ok(Self(value as u64))
            }
            RawTimestamp::Float(value) => Err(format!("invalid timestamp {value}")),
            RawTimestamp::Text(text) => {
                let parsed = chrono::DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| format!("invalid timestamp {text:?}: {e}"))?;
                u64::try_from(parsed.timestamp_millis())
                    .map(Self)
                    .map_err(|_| format!("timestamp before epoch: {text}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Envelopes written by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Session authentication; first and only once per connection.
    Auth {
        /// Bearer token held by the host application.
        token: String,
        /// Display name of the local user.
        username: String,
    },
    /// Plain chat text. The server adds `username` and `timestamp`.
    Message {
        /// Trimmed message text.
        message: String,
    },
    /// A structured trade summary.
    TradeShare(TradeShare),
}

impl Outbound {
    /// Wire name of this envelope's kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Message { .. } => "message",
            Self::TradeShare(_) => "trade_share",
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A chat line attributed to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Author display name.
    pub username: String,
    /// Message text.
    pub text: String,
    /// Server-side timestamp, when known.
    pub timestamp: Option<Timestamp>,
}

/// A trade card attributed to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedTrade {
    /// Author display name, when the server supplied one.
    pub username: Option<String>,
    /// Server-side timestamp, when known.
    pub timestamp: Option<Timestamp>,
    /// The trade summary, with P&L already normalized.
    pub trade: TradeShare,
}

/// One replayed history record.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    /// A plain chat line.
    Message(ChatLine),
    /// A trade card reconstructed from stored metadata.
    Trade(SharedTrade),
}

/// Envelopes read by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A chat message fanned out by the server (including our own).
    Message(ChatLine),
    /// A trade card shared by some participant.
    TradeShare(SharedTrade),
    /// Recent history, oldest first.
    History(Vec<HistoryEntry>),
    /// Number of users currently online.
    OnlineCount(u64),
    /// Server-originated informational text.
    System(String),
}

impl Inbound {
    /// Wire name of this envelope's kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::TradeShare(_) => "trade_share",
            Self::History(_) => "history",
            Self::OnlineCount(_) => "online_count",
            Self::System(_) => "system",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes (inbound)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct MessageFrame {
    username: String,
    message: String,
    timestamp: Timestamp,
}

impl From<MessageFrame> for ChatLine {
    fn from(frame: MessageFrame) -> Self {
        Self {
            username: frame.username,
            text: frame.message,
            timestamp: Some(frame.timestamp),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct TradeShareFrame {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    timestamp: Option<Timestamp>,
    #[serde(flatten)]
    trade: TradeShare,
}

impl From<TradeShareFrame> for SharedTrade {
    fn from(frame: TradeShareFrame) -> Self {
        Self {
            username: frame.username,
            timestamp: frame.timestamp,
            trade: frame.trade.normalized(),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct HistoryFrame {
    messages: Vec<serde_json::Value>,
}

impl HistoryFrame {
    /// Entries in server order. Records that are not objects of the
    /// expected shape are skipped rather than failing the whole batch.
    pub(crate) fn into_entries(self) -> Vec<HistoryEntry> {
        self.messages
            .into_iter()
            .filter_map(|record| serde_json::from_value::<HistoryRecord>(record).ok())
            .map(HistoryEntry::from)
            .collect()
    }
}

/// Trade fields stored next to a history record.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TradeMetadata {
    trade_type: String,
    #[serde(deserialize_with = "lenient_f64")]
    leverage: f64,
    #[serde(deserialize_with = "lenient_f64")]
    entry_price: f64,
    #[serde(deserialize_with = "lenient_f64")]
    exit_price: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pnl: f64,
}

#[derive(Deserialize)]
pub(crate) struct HistoryRecord {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    timestamp: Option<Timestamp>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl From<HistoryRecord> for HistoryEntry {
    /// Incomplete trade metadata degrades the record to a plain line.
    fn from(record: HistoryRecord) -> Self {
        let metadata = record
            .metadata
            .and_then(|meta| serde_json::from_value::<TradeMetadata>(meta).ok());
        match metadata {
            Some(meta) => Self::Trade(SharedTrade {
                username: record.username,
                timestamp: record.timestamp,
                trade: TradeShare {
                    trade_type: meta.trade_type,
                    leverage: meta.leverage,
                    entry_price: meta.entry_price,
                    exit_price: meta.exit_price,
                    pnl: meta.pnl,
                    note: record.message,
                }
                .normalized(),
            }),
            None => Self::Message(ChatLine {
                username: record.username.unwrap_or_default(),
                text: record.message,
                timestamp: record.timestamp,
            }),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct OnlineCountFrame {
    pub(crate) count: u64,
}

#[derive(Deserialize)]
pub(crate) struct SystemFrame {
    pub(crate) message: String,
}
