//! `TradeChat`: community chat client for a simulated-trading platform.

pub mod chat;
pub mod command;
pub mod config;
pub mod console;
pub mod endpoint;
pub mod presentation;
pub mod session;
pub mod trading;
pub mod transport;
