//! Structured trade summaries that users attach to the community chat.

use serde::{Deserialize, Deserializer, Serialize};

/// Substring (upper-case) that marks a liquidation trade type.
const LIQUIDATION_MARKER: &str = "LIQUIDATION";

/// A trade summary as it travels on the wire inside a `trade_share` envelope.
///
/// Numeric fields accept either JSON numbers or numeric strings, since some
/// backends store prices pre-formatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeShare {
    /// Display label of the trade, e.g. `"CLOSE LONG"` or `"LIQUIDATION"`.
    pub trade_type: String,
    /// Position leverage multiplier.
    #[serde(deserialize_with = "lenient_f64")]
    pub leverage: f64,
    /// Entry price of the position.
    #[serde(deserialize_with = "lenient_f64")]
    pub entry_price: f64,
    /// Exit (or liquidation) price of the position.
    #[serde(deserialize_with = "lenient_f64")]
    pub exit_price: f64,
    /// Realized profit and loss in USD.
    #[serde(deserialize_with = "lenient_f64")]
    pub pnl: f64,
    /// Free-form note sent alongside the card.
    #[serde(rename = "message", default)]
    pub note: String,
}

impl TradeShare {
    /// Whether the trade type denotes a liquidation.
    #[must_use]
    pub fn is_liquidation(&self) -> bool {
        self.trade_type
            .to_ascii_uppercase()
            .contains(LIQUIDATION_MARKER)
    }

    /// Returns the share with its P&L sign made consistent with its type.
    ///
    /// A liquidation can never display a gain: a positive figure recorded
    /// upstream is flipped to its negative.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.is_liquidation() && self.pnl > 0.0 {
            self.pnl = -self.pnl;
        }
        self
    }
}

/// Converts a transaction kind such as `close_long` into its card label
/// (`CLOSE LONG`).
#[must_use]
pub fn trade_type_label(kind: &str) -> String {
    kind.replace('_', " ").to_uppercase()
}

/// Deserializes an `f64` from either a JSON number or a numeric string.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Float(f64),
        Text(String),
    }

    match Number::deserialize(deserializer)? {
        Number::Float(value) => Ok(value),
        Number::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid number {text:?}: {e}"))),
    }
}
