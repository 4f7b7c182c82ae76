//! WebSocket transport for `TradeChat`.
//!
//! Each link runs as one background task that owns the socket: it connects,
//! reports `Opened`, then forwards text frames to the session channel and
//! writes queued outbound frames until either side closes. The final
//! `Closed` event carries the close code the peer sent, or 1006 when the
//! connection dropped without one.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use super::{
    ABNORMAL_CLOSURE, Connector, NO_STATUS_RECEIVED, NORMAL_CLOSURE, TransportError,
    TransportHandle, TransportSink,
};
use crate::session::TransportEventKind;

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands from the handle to the link task.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close(u16),
}

/// Opens WebSocket links with `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector with the given handshake timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Connector for WsConnector {
    type Handle = WsHandle;

    /// Validates the endpoint and spawns the link task.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidEndpoint`] for non-`ws`/`wss` URLs.
    /// - [`TransportError::Io`] when called outside a tokio runtime.
    fn open(&mut self, endpoint: &Url, sink: TransportSink) -> Result<WsHandle, TransportError> {
        match endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TransportError::InvalidEndpoint {
                    url: endpoint.to_string(),
                    reason: format!("unsupported scheme {other:?}"),
                });
            }
        }
        if endpoint.host_str().is_none() {
            return Err(TransportError::InvalidEndpoint {
                url: endpoint.to_string(),
                reason: "missing host".to_string(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(link = %sink.link(), host = endpoint.host_str(), "opening chat websocket");
        runtime.spawn(run_link(endpoint.clone(), self.connect_timeout, rx, sink));
        Ok(WsHandle { tx })
    }
}

/// Write side of a WebSocket link.
#[derive(Debug)]
pub struct WsHandle {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl TransportHandle for WsHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn close(&self, code: u16) {
        let _ = self.tx.send(Outgoing::Close(code));
    }
}

fn close_message(code: u16) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: String::new().into(),
    }))
}

/// Background task owning one WebSocket connection.
async fn run_link(
    endpoint: Url,
    connect_timeout: Duration,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    sink: TransportSink,
) {
    let link = sink.link();

    let ws_stream =
        match tokio::time::timeout(connect_timeout, connect_async(endpoint.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                tracing::warn!(%link, err = %e, "chat websocket connect failed");
                sink.emit(TransportEventKind::Error(e.to_string())).await;
                sink.emit(TransportEventKind::Closed {
                    code: ABNORMAL_CLOSURE,
                })
                .await;
                return;
            }
            Err(_) => {
                tracing::warn!(%link, "chat websocket connect timed out");
                sink.emit(TransportEventKind::Error(
                    TransportError::Timeout.to_string(),
                ))
                .await;
                sink.emit(TransportEventKind::Closed {
                    code: ABNORMAL_CLOSURE,
                })
                .await;
                return;
            }
        };

    if !sink.emit(TransportEventKind::Opened).await {
        return;
    }

    let (mut writer, mut reader) = ws_stream.split();

    let code = loop {
        tokio::select! {
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = writer.send(Message::text(text)).await {
                        tracing::warn!(%link, err = %e, "chat websocket send failed");
                        sink.emit(TransportEventKind::Error(e.to_string())).await;
                        break ABNORMAL_CLOSURE;
                    }
                }
                Some(Outgoing::Close(code)) => {
                    let _ = writer.send(close_message(code)).await;
                    break code;
                }
                None => {
                    // Handle dropped without an explicit close.
                    let _ = writer.send(close_message(NORMAL_CLOSURE)).await;
                    break NORMAL_CLOSURE;
                }
            },
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !sink.emit(TransportEventKind::Frame(text.as_str().to_owned())).await {
                        let _ = writer.send(close_message(NORMAL_CLOSURE)).await;
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if !sink.emit(TransportEventKind::Frame(text)).await {
                            let _ = writer.send(close_message(NORMAL_CLOSURE)).await;
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(%link, err = %e, "non-utf8 binary frame, skipping"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Pings are answered by tungstenite.
                }
                Some(Err(e)) => {
                    tracing::warn!(%link, err = %e, "chat websocket read error");
                    sink.emit(TransportEventKind::Error(e.to_string())).await;
                    break ABNORMAL_CLOSURE;
                }
                None => break ABNORMAL_CLOSURE,
            },
        }
    };

    tracing::info!(%link, code, "chat websocket closed");
    sink.emit(TransportEventKind::Closed { code }).await;
}
