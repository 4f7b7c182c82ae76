//! Transport layer abstraction for `TradeChat`.
//!
//! A [`Connector`] constructs one transport per session link and hands back
//! a [`TransportHandle`] for writing. Everything the transport observes
//! (open, frames, errors, close) is reported asynchronously through a
//! [`TransportSink`] into the controller's session event channel, so the
//! controller sees transport callbacks interleaved in delivery order with
//! UI events and timers.
//!
//! Implementations:
//! - [`ws::WsConnector`]: WebSocket transport (`tokio-tungstenite`)
//! - [`loopback::LoopbackConnector`]: in-process transport for testing

pub mod loopback;
pub mod ws;

use tokio::sync::mpsc;
use url::Url;

use crate::session::{LinkId, SessionEvent, TransportEvent, TransportEventKind};

/// Close code for a normal, intentional closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code sent when an endpoint is going away (page unload, server restart).
pub const GOING_AWAY: u16 = 1001;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when a close frame carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Whether a close code means the closure was intended.
#[must_use]
pub const fn is_intentional_close(code: u16) -> bool {
    matches!(code, NORMAL_CLOSURE | GOING_AWAY)
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL cannot be used by this transport.
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint {
        /// Offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reports transport callbacks for one link into the session event channel.
#[derive(Debug, Clone)]
pub struct TransportSink {
    link: LinkId,
    tx: mpsc::Sender<SessionEvent>,
}

impl TransportSink {
    /// Creates a sink that tags events with `link`.
    #[must_use]
    pub const fn new(link: LinkId, tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { link, tx }
    }

    /// The link this sink reports for.
    #[must_use]
    pub const fn link(&self) -> LinkId {
        self.link
    }

    /// Delivers one event. Returns `false` once the controller has gone away.
    pub async fn emit(&self, kind: TransportEventKind) -> bool {
        self.tx
            .send(SessionEvent::Transport(TransportEvent {
                link: self.link,
                kind,
            }))
            .await
            .is_ok()
    }
}

/// Constructs transports.
///
/// `open` must not block: it validates the endpoint, starts connecting in
/// the background and returns a handle immediately. The outcome arrives
/// later through `sink` as `Opened` or `Error` + `Closed`.
pub trait Connector: Send {
    /// Handle type returned for each link.
    type Handle: TransportHandle;

    /// Starts a new transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the transport cannot even be
    /// constructed (bad URL, no runtime). Connection failures after
    /// construction are reported through `sink` instead.
    fn open(&mut self, endpoint: &Url, sink: TransportSink) -> Result<Self::Handle, TransportError>;
}

/// Write side of one transport link.
pub trait TransportHandle: Send {
    /// Queues a text frame for sending. Fire-and-forget: `Ok` means the
    /// frame was handed to the transport, not that it was delivered.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the link is gone.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Closes the link with `code`. Idempotent.
    fn close(&self, code: u16);
}
