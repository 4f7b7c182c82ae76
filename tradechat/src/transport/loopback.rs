//! Loopback transport for testing.
//!
//! [`LoopbackConnector`] never touches the network. Each `open` records a
//! [`LoopbackLink`] that a test drives from the "server" side: it can report
//! the link open, deliver frames, close it with any code, and inspect what
//! the client wrote.
//!
//! ```rust,no_run
//! use tradechat::transport::loopback::LoopbackConnector;
//!
//! # async fn example() {
//! let connector = LoopbackConnector::new();
//! // ... hand a clone to a ChatController and call connect() ...
//! let link = connector.link(0).unwrap();
//! link.open().await;
//! link.deliver(r#"{"type":"online_count","count":3}"#).await;
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use super::{Connector, TransportError, TransportHandle, TransportSink};
use crate::session::{LinkId, TransportEventKind};

#[derive(Debug, Default)]
struct LinkState {
    sent: Vec<String>,
    closed_by_client: Option<u16>,
}

/// Server-side view of one loopback link.
#[derive(Debug, Clone)]
pub struct LoopbackLink {
    endpoint: Url,
    sink: TransportSink,
    state: Arc<Mutex<LinkState>>,
}

impl LoopbackLink {
    /// Link id assigned by the controller.
    #[must_use]
    pub const fn id(&self) -> LinkId {
        self.sink.link()
    }

    /// Endpoint the client asked for.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Reports the transport open.
    pub async fn open(&self) {
        self.sink.emit(TransportEventKind::Opened).await;
    }

    /// Delivers a raw text frame to the client.
    pub async fn deliver(&self, raw: &str) {
        self.sink
            .emit(TransportEventKind::Frame(raw.to_string()))
            .await;
    }

    /// Reports a transport error (without closing).
    pub async fn fail(&self, reason: &str) {
        self.sink
            .emit(TransportEventKind::Error(reason.to_string()))
            .await;
    }

    /// Closes the link from the server side with `code`.
    pub async fn close_with(&self, code: u16) {
        self.sink.emit(TransportEventKind::Closed { code }).await;
    }

    /// Frames the client wrote, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Close code the client used to close this link, if it did.
    #[must_use]
    pub fn closed_by_client(&self) -> Option<u16> {
        self.state.lock().closed_by_client
    }

    /// Whether the client still holds this link open.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.lock().closed_by_client.is_none()
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    links: Vec<LoopbackLink>,
    fail_next: Option<String>,
}

/// In-process [`Connector`] that records every link it opens.
///
/// Cloning shares the recorded state, so a test keeps one clone and gives
/// the other to the controller.
#[derive(Debug, Clone, Default)]
pub struct LoopbackConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl LoopbackConnector {
    /// Creates a connector with no links.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` fail as if the transport could not be built.
    pub fn fail_next_open(&self, reason: &str) {
        self.state.lock().fail_next = Some(reason.to_string());
    }

    /// Number of links opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// The `index`-th link opened, if any.
    #[must_use]
    pub fn link(&self, index: usize) -> Option<LoopbackLink> {
        self.state.lock().links.get(index).cloned()
    }

    /// The most recently opened link, if any.
    #[must_use]
    pub fn last_link(&self) -> Option<LoopbackLink> {
        self.state.lock().links.last().cloned()
    }

    /// Number of links the client has not closed.
    #[must_use]
    pub fn live_links(&self) -> usize {
        self.state
            .lock()
            .links
            .iter()
            .filter(|link| link.is_live())
            .count()
    }
}

impl Connector for LoopbackConnector {
    type Handle = LoopbackHandle;

    fn open(
        &mut self,
        endpoint: &Url,
        sink: TransportSink,
    ) -> Result<LoopbackHandle, TransportError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next.take() {
            return Err(TransportError::InvalidEndpoint {
                url: endpoint.to_string(),
                reason,
            });
        }

        let link_state = Arc::new(Mutex::new(LinkState::default()));
        state.links.push(LoopbackLink {
            endpoint: endpoint.clone(),
            sink,
            state: Arc::clone(&link_state),
        });
        Ok(LoopbackHandle { state: link_state })
    }
}

/// Client-side handle of a loopback link.
#[derive(Debug)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LinkState>>,
}

impl TransportHandle for LoopbackHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed_by_client.is_some() {
            return Err(TransportError::ConnectionClosed);
        }
        state.sent.push(text);
        Ok(())
    }

    fn close(&self, code: u16) {
        let mut state = self.state.lock();
        if state.closed_by_client.is_none() {
            state.closed_by_client = Some(code);
        }
    }
}
