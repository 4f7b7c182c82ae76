//! Chat connection manager for `TradeChat`.
//!
//! Contains the [`ChatController`], which owns the session and the current
//! transport link and reacts to every [`SessionEvent`] in the order it was
//! posted: UI actions, transport callbacks and timer firings all funnel
//! through one channel. UI code talks to the controller through a cloneable
//! [`ChatHandle`].
//!
//! Lifecycle of one link:
//! `connect()` → transport opened → `auth` written after a short delay →
//! first inbound envelope → `Open`. A close with any code other than
//! 1000/1001 while the surface is visible schedules one reconnect attempt
//! after the reconnect delay.

use std::time::Duration;

use tokio::sync::mpsc;
use tradechat_proto::codec::{self, CodecError};
use tradechat_proto::envelope::{Inbound, Outbound};

use crate::command::{Action, Input, interpret, parse_input};
use crate::endpoint::{EndpointError, chat_endpoint};
use crate::presentation::Presenter;
use crate::session::{
    ConnectionState, LinkId, Session, SessionEvent, Transition, TransportEvent,
    TransportEventKind,
};
use crate::trading::TradingData;
use crate::transport::{
    Connector, NORMAL_CLOSURE, TransportError, TransportHandle, TransportSink,
    is_intentional_close,
};

/// Notice shown when the transport drops and a retry is scheduled.
pub const RECONNECTING_NOTICE: &str = "Connection lost, reconnecting...";

/// Notice shown when a send is attempted without an open session.
pub const NOT_CONNECTED_NOTICE: &str = "Not connected to chat. Connecting...";

/// Notice shown when the reconnect ceiling is reached.
pub const GAVE_UP_NOTICE: &str = "Connection lost. Reopen the chat to try again.";

/// Errors surfaced by [`ChatController`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A send was attempted while the session is not open.
    #[error("chat is not connected")]
    NotConnected,

    /// `connect()` was called without a token and username.
    #[error("missing chat credentials")]
    MissingCredentials,

    /// The chat endpoint could not be derived from the origin.
    #[error("invalid chat endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// The transport could not be constructed.
    #[error("transport init failed: {0}")]
    TransportInit(#[source] TransportError),

    /// An outbound envelope could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Writing to the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Token and display name supplied by the host application.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    token: String,
    username: String,
}

impl Credentials {
    /// Creates credentials from a bearer token and a display name.
    #[must_use]
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }

    /// Bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Display name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether both token and username are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.username.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// When to retry after an abnormal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay before each attempt.
    pub delay: Duration,
    /// Ceiling on consecutive attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Whether the `attempt`-th consecutive retry (1-based) may go ahead.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Origin of the hosting page; the endpoint is derived from it.
    pub origin: String,
    /// Path of the chat socket.
    pub chat_path: String,
    /// Delay between transport open and the `auth` write.
    pub auth_delay: Duration,
    /// Retry behavior after abnormal closes.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the session event channel.
    pub channel_capacity: usize,
}

impl ChatSettings {
    /// Default settings for `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            chat_path: "/ws/chat".to_string(),
            auth_delay: Duration::from_millis(100),
            reconnect: ReconnectPolicy::default(),
            channel_capacity: 256,
        }
    }
}

/// Posts events to a running [`ChatController`].
///
/// Every method returns `false` once the controller has been dropped.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl ChatHandle {
    /// Posts a raw event.
    pub async fn post(&self, event: SessionEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// The user opened the chat surface.
    pub async fn open_surface(&self) -> bool {
        self.post(SessionEvent::SurfaceOpened).await
    }

    /// The user closed the chat surface.
    pub async fn close_surface(&self) -> bool {
        self.post(SessionEvent::SurfaceClosed).await
    }

    /// The user submitted text from the input box.
    pub async fn submit(&self, text: impl Into<String>) -> bool {
        self.post(SessionEvent::Submit(text.into())).await
    }

    /// Requests a fresh connection.
    pub async fn connect(&self) -> bool {
        self.post(SessionEvent::Connect).await
    }

    /// The user logged out.
    pub async fn logout(&self) -> bool {
        self.post(SessionEvent::Logout).await
    }

    /// Tears the session down and stops the controller loop.
    pub async fn shutdown(&self) -> bool {
        self.post(SessionEvent::Shutdown).await
    }
}

/// The link currently owned by the controller.
struct Link<H> {
    id: LinkId,
    handle: H,
    auth_sent: bool,
}

/// Owns the chat session and drives it from a single event channel.
pub struct ChatController<C: Connector, P: Presenter, D: TradingData> {
    connector: C,
    presenter: P,
    trading: D,
    credentials: Credentials,
    settings: ChatSettings,
    session: Session,
    link: Option<Link<C::Handle>>,
    last_link_id: LinkId,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    running: bool,
}

impl<C: Connector, P: Presenter, D: TradingData> ChatController<C, P, D> {
    /// Creates a disconnected controller with the surface closed.
    ///
    /// Returns the controller and a handle for posting UI events to it.
    pub fn new(
        connector: C,
        presenter: P,
        trading: D,
        credentials: Credentials,
        settings: ChatSettings,
    ) -> (Self, ChatHandle) {
        let (events_tx, events_rx) = mpsc::channel(settings.channel_capacity.max(1));
        let handle = ChatHandle {
            tx: events_tx.clone(),
        };
        let controller = Self {
            connector,
            presenter,
            trading,
            credentials,
            settings,
            session: Session::new(),
            link: None,
            last_link_id: LinkId::new(0),
            events_tx,
            events_rx,
            running: true,
        };
        (controller, handle)
    }

    /// Another handle to this controller.
    #[must_use]
    pub fn handle(&self) -> ChatHandle {
        ChatHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Session counters.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the loop is still accepting events (no `Shutdown` yet).
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Starts a new link, closing any link currently held.
    ///
    /// # Errors
    ///
    /// - [`ChatError::MissingCredentials`] without a token and username;
    ///   nothing changes.
    /// - [`ChatError::Endpoint`] or [`ChatError::TransportInit`] when the
    ///   transport cannot be built; a notice is shown and the session ends
    ///   up `Disconnected` with no retry.
    pub fn connect(&mut self) -> Result<(), ChatError> {
        if !self.credentials.is_complete() {
            return Err(ChatError::MissingCredentials);
        }

        self.drop_link(NORMAL_CLOSURE);
        self.apply(Transition::Connect);
        self.last_link_id = self.last_link_id.next();
        let id = self.last_link_id;

        let opened = chat_endpoint(
            &self.settings.origin,
            &self.settings.chat_path,
            self.credentials.token(),
        )
        .map_err(ChatError::from)
        .and_then(|endpoint| {
            let sink = TransportSink::new(id, self.events_tx.clone());
            self.connector
                .open(&endpoint, sink)
                .map_err(ChatError::TransportInit)
        });

        match opened {
            Ok(handle) => {
                tracing::info!(link = %id, attempt = self.session.retry_attempt(), "chat transport started");
                self.link = Some(Link {
                    id,
                    handle,
                    auth_sent: false,
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(link = %id, error = %e, "chat transport init failed");
                self.presenter
                    .render_system_notice(&format!("Could not connect to chat: {e}"));
                self.apply(Transition::InitFailed);
                Err(e)
            }
        }
    }

    /// Encodes and writes `envelope` on the open link. No local echo.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] unless the session is `Open`; a
    /// notice is shown and a connection attempt is started when the session
    /// is idle. Encoding and write failures are returned as-is.
    pub fn send(&mut self, envelope: &Outbound) -> Result<(), ChatError> {
        if self.session.state() != ConnectionState::Open {
            self.presenter.render_system_notice(NOT_CONNECTED_NOTICE);
            if self.session.state().wants_connect() {
                if let Err(e) = self.connect() {
                    tracing::debug!(error = %e, "connect after failed send did not start");
                }
            }
            return Err(ChatError::NotConnected);
        }
        let Some(link) = &self.link else {
            return Err(ChatError::NotConnected);
        };

        let text = codec::encode(envelope)?;
        link.handle.send_text(text)?;
        tracing::debug!(link = %link.id, kind = envelope.kind(), "envelope sent");
        Ok(())
    }

    /// Closes the link normally and stays `Disconnected` with no retry.
    pub fn teardown(&mut self) {
        self.drop_link(NORMAL_CLOSURE);
        self.apply(Transition::Teardown);
    }

    /// Reacts to one event.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(TransportEvent { link, kind }) => {
                self.on_transport(link, kind);
            }
            SessionEvent::AuthDue(link) => self.on_auth_due(link),
            SessionEvent::ReconnectDue => self.on_reconnect_due(),
            SessionEvent::SurfaceOpened => self.open_surface(),
            SessionEvent::SurfaceClosed => self.session.close_surface(),
            SessionEvent::Submit(text) => self.submit(&text),
            SessionEvent::Connect => {
                if let Err(e) = self.connect() {
                    tracing::warn!(error = %e, "connect request failed");
                }
            }
            SessionEvent::Logout => {
                tracing::info!("logout, closing chat session");
                self.teardown();
            }
            SessionEvent::Shutdown => {
                tracing::info!("chat controller shutting down");
                self.teardown();
                self.running = false;
            }
        }
    }

    /// Waits for the next event and handles it.
    ///
    /// Returns `false` once the controller has stopped.
    pub async fn step(&mut self) -> bool {
        if !self.running {
            return false;
        }
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event),
            None => self.running = false,
        }
        self.running
    }

    /// Handles every event already queued, without waiting.
    ///
    /// Returns the number of events handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while self.running {
            let Ok(event) = self.events_rx.try_recv() else {
                break;
            };
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Runs the event loop until `Shutdown`.
    pub async fn run(&mut self) {
        tracing::info!("chat controller started");
        while self.step().await {}
        tracing::info!("chat controller stopped");
    }

    // -- Surface and input ------------------------------------------------

    fn open_surface(&mut self) {
        self.session.open_surface();
        self.presenter.set_unread_badge(0);
        self.presenter.focus_input();
        if self.session.state().wants_connect() {
            if let Err(e) = self.connect() {
                tracing::debug!(error = %e, "surface opened without connecting");
            }
        }
    }

    fn submit(&mut self, raw: &str) {
        let envelope = match parse_input(raw) {
            Input::Empty => return,
            Input::Chat(message) => Outbound::Message { message },
            Input::Command(command) => {
                tracing::debug!(?command, "slash command");
                match interpret(&command, &self.trading) {
                    Action::Notice(text) => {
                        self.presenter.render_system_notice(&text);
                        return;
                    }
                    Action::Clear { notice } => {
                        self.presenter.clear_messages();
                        self.presenter.render_system_notice(&notice);
                        return;
                    }
                    Action::Send(envelope) => envelope,
                }
            }
        };

        if let Err(e) = self.send(&envelope) {
            tracing::debug!(kind = envelope.kind(), error = %e, "envelope not sent");
        }
    }

    // -- Transport events -------------------------------------------------

    fn on_transport(&mut self, link: LinkId, kind: TransportEventKind) {
        if self.link.as_ref().map(|l| l.id) != Some(link) {
            tracing::debug!(%link, ?kind, "ignoring event from superseded link");
            return;
        }

        match kind {
            TransportEventKind::Opened => {
                if self.apply(Transition::TransportOpened) {
                    tracing::info!(%link, "chat transport open");
                    self.schedule(self.settings.auth_delay, SessionEvent::AuthDue(link));
                }
            }
            TransportEventKind::Frame(raw) => self.on_frame(&raw),
            TransportEventKind::Error(reason) => {
                tracing::warn!(%link, %reason, "chat transport error");
            }
            TransportEventKind::Closed { code } => self.on_closed(link, code),
        }
    }

    fn on_auth_due(&mut self, link: LinkId) {
        if self.session.state() != ConnectionState::AuthPending {
            tracing::debug!(%link, state = %self.session.state(), "auth timer no longer relevant");
            return;
        }
        let Some(current) = self.link.as_mut().filter(|l| l.id == link && !l.auth_sent) else {
            tracing::debug!(%link, "auth timer for superseded or authenticated link");
            return;
        };

        let auth = Outbound::Auth {
            token: self.credentials.token.clone(),
            username: self.credentials.username.clone(),
        };
        let written = codec::encode(&auth)
            .map_err(ChatError::from)
            .and_then(|text| current.handle.send_text(text).map_err(ChatError::from));
        match written {
            Ok(()) => {
                current.auth_sent = true;
                tracing::debug!(%link, username = %self.credentials.username, "auth written");
            }
            Err(e) => tracing::warn!(%link, error = %e, "failed to write auth"),
        }
    }

    fn on_frame(&mut self, raw: &str) {
        // Any frame after `auth` acknowledges it, even one we cannot decode.
        let auth_sent = self.link.as_ref().is_some_and(|l| l.auth_sent);
        if self.session.state() == ConnectionState::AuthPending
            && auth_sent
            && self.apply(Transition::Authenticated)
        {
            tracing::info!("chat session authenticated");
        }

        let inbound = match codec::decode(raw) {
            Ok(inbound) => inbound,
            Err(e) if e.is_unknown_kind() => {
                tracing::debug!(error = %e, "ignoring unknown envelope kind");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, len = raw.len(), "dropping malformed chat frame");
                return;
            }
        };

        self.dispatch(inbound);
    }

    fn dispatch(&mut self, inbound: Inbound) {
        tracing::trace!(kind = inbound.kind(), "dispatching envelope");
        match inbound {
            Inbound::Message(line) => {
                self.presenter.render_message(&line);
                if let Some(unread) = self.session.record_inbound_message() {
                    self.presenter.set_unread_badge(unread);
                }
            }
            Inbound::TradeShare(trade) => self.presenter.render_trade_card(&trade),
            Inbound::History(entries) => self.presenter.render_history(&entries),
            Inbound::OnlineCount(count) => {
                self.session.set_online_peer_count(count);
                self.presenter.set_online_count(count);
            }
            Inbound::System(text) => self.presenter.render_system_notice(&text),
        }
    }

    fn on_closed(&mut self, link: LinkId, code: u16) {
        self.link = None;

        if is_intentional_close(code) {
            tracing::info!(%link, code, "chat transport closed");
            self.apply(Transition::NormalClose);
            return;
        }

        let surface_open = self.session.is_surface_open();
        let attempt = self.session.retry_attempt().saturating_add(1);
        let retry = surface_open && self.settings.reconnect.allows(attempt);
        tracing::warn!(%link, code, attempt, retry, "chat transport closed abnormally");

        if !self.apply(Transition::AbnormalClose { retry }) {
            return;
        }
        if retry {
            self.presenter.render_system_notice(RECONNECTING_NOTICE);
            self.schedule(self.settings.reconnect.delay, SessionEvent::ReconnectDue);
        } else if surface_open {
            self.presenter.render_system_notice(GAVE_UP_NOTICE);
        }
    }

    fn on_reconnect_due(&mut self) {
        if self.session.state() != ConnectionState::Reconnecting {
            tracing::debug!(state = %self.session.state(), "stale reconnect timer");
            return;
        }
        if !self.session.is_surface_open() {
            tracing::info!("surface closed, not reconnecting");
            self.apply(Transition::StandDown);
            return;
        }
        if let Err(e) = self.connect() {
            tracing::warn!(error = %e, "reconnect failed");
        }
    }

    // -- Helpers ----------------------------------------------------------

    fn apply(&mut self, transition: Transition) -> bool {
        match self.session.apply(transition) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "rejected session transition");
                false
            }
        }
    }

    fn drop_link(&mut self, code: u16) {
        if let Some(link) = self.link.take() {
            tracing::debug!(link = %link.id, code, "closing chat transport");
            link.handle.close(code);
        }
    }

    fn schedule(&self, delay: Duration, event: SessionEvent) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(event).await.is_err() {
                tracing::trace!("timer fired after controller dropped");
            }
        });
    }
}
