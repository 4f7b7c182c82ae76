//! Shared protocol definitions for the `TradeChat` wire format.
//!
//! Envelopes are JSON objects discriminated by a `type` field and carried as
//! WebSocket text frames.

pub mod codec;
pub mod envelope;
pub mod trade;
