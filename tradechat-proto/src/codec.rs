//! Serialization and deserialization for the `TradeChat` wire protocol.
//!
//! Envelopes are JSON text. Decoding validates the `type` discriminator
//! against the closed set of inbound kinds before parsing the body, so an
//! unknown kind can be told apart from a malformed payload.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::{
    HistoryFrame, Inbound, MessageFrame, OnlineCountFrame, Outbound, SystemFrame, TradeShareFrame,
};

/// Field carrying the envelope kind.
pub const KIND_FIELD: &str = "type";

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload is not JSON, or a known kind is missing required fields.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// Payload is a JSON value without a string `type` field.
    #[error("envelope has no kind")]
    MissingKind,
    /// Payload names a kind this client does not understand.
    #[error("unknown envelope kind: {0}")]
    UnknownKind(String),
    /// Serialization of an outbound envelope failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CodecError {
    /// Whether this error is an unrecognized-but-well-formed envelope.
    #[must_use]
    pub const fn is_unknown_kind(&self) -> bool {
        matches!(self, Self::UnknownKind(_))
    }
}

/// Encodes an [`Outbound`] envelope into JSON text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the envelope cannot be serialized
/// (for instance a non-finite price in a trade share).
pub fn encode(envelope: &Outbound) -> Result<String, CodecError> {
    let value =
        serde_json::to_value(envelope).map_err(|e| CodecError::Serialization(e.to_string()))?;
    if let Some(bad) = first_non_finite(&value) {
        return Err(CodecError::Serialization(format!(
            "field {bad} is not a finite number"
        )));
    }
    serde_json::to_string(&value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`Inbound`] envelope from JSON text.
///
/// # Errors
///
/// - `CodecError::Malformed` if the text is not JSON or a known kind lacks
///   required fields.
/// - `CodecError::MissingKind` if there is no string `type` field.
/// - `CodecError::UnknownKind` for kinds outside the inbound set.
pub fn decode(raw: &str) -> Result<Inbound, CodecError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let kind = value
        .get(KIND_FIELD)
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingKind)?
        .to_owned();

    match kind.as_str() {
        "message" => body::<MessageFrame>(value).map(|f| Inbound::Message(f.into())),
        "trade_share" => body::<TradeShareFrame>(value).map(|f| Inbound::TradeShare(f.into())),
        "history" => body::<HistoryFrame>(value).map(|f| Inbound::History(f.into_entries())),
        "online_count" => body::<OnlineCountFrame>(value).map(|f| Inbound::OnlineCount(f.count)),
        "system" => body::<SystemFrame>(value).map(|f| Inbound::System(f.message)),
        _ => Err(CodecError::UnknownKind(kind)),
    }
}

fn body<T: DeserializeOwned>(value: Value) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// `serde_json` turns NaN and infinities into `null`; catch that before the
/// envelope leaves the client.
fn first_non_finite(value: &Value) -> Option<&str> {
    let Value::Object(map) = value else {
        return None;
    };
    map.iter()
        .find(|(key, v)| v.is_null() && key.as_str() != KIND_FIELD)
        .map(|(key, _)| key.as_str())
}
