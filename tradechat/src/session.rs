//! Session state for one chat surface.
//!
//! [`ConnectionState`] is the explicit connection state machine; every
//! change goes through [`ConnectionState::transition`], which rejects
//! transitions that make no sense from the current state. [`Session`]
//! bundles that state with the counters the surface displays.
//!
//! [`SessionEvent`] is the single event type consumed by the
//! [`ChatController`](crate::chat::ChatController) loop: UI actions,
//! transport callbacks and timer firings all arrive through it, in order.

use std::fmt;

/// Connection lifecycle of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, no retry pending.
    #[default]
    Disconnected,
    /// Transport constructed, waiting for it to open.
    Connecting,
    /// Transport open; `auth` scheduled or written, no inbound seen yet.
    AuthPending,
    /// Authenticated; outbound traffic allowed.
    Open,
    /// Lost the transport abnormally; a retry is scheduled.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AuthPending => "auth-pending",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new transport is being constructed (prior one torn down).
    Connect,
    /// The transport reported open.
    TransportOpened,
    /// First inbound envelope after `auth` was written.
    Authenticated,
    /// Transport closed with 1000 or 1001.
    NormalClose,
    /// Transport closed with any other code.
    AbnormalClose {
        /// Whether a retry will be scheduled.
        retry: bool,
    },
    /// The transport could not be constructed.
    InitFailed,
    /// A scheduled retry found it should not reconnect.
    StandDown,
    /// Explicit logout or shutdown.
    Teardown,
}

/// A transition that is not valid from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {transition:?} from state {from}")]
pub struct InvalidTransition {
    /// State the machine was in.
    pub from: ConnectionState,
    /// Rejected input.
    pub transition: Transition,
}

impl ConnectionState {
    /// Computes the next state for `transition`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `transition` cannot happen in
    /// the current state; the state is left unchanged by the caller.
    pub const fn transition(self, transition: Transition) -> Result<Self, InvalidTransition> {
        use ConnectionState::{AuthPending, Connecting, Disconnected, Open, Reconnecting};

        let next = match (self, transition) {
            (_, Transition::Connect) => Some(Connecting),
            (Connecting, Transition::TransportOpened) => Some(AuthPending),
            (AuthPending, Transition::Authenticated) => Some(Open),
            (Connecting | AuthPending | Open, Transition::NormalClose) => Some(Disconnected),
            (Connecting | AuthPending | Open, Transition::AbnormalClose { retry: true }) => {
                Some(Reconnecting)
            }
            (Connecting | AuthPending | Open, Transition::AbnormalClose { retry: false })
            | (Connecting, Transition::InitFailed)
            | (Reconnecting, Transition::StandDown)
            | (_, Transition::Teardown) => Some(Disconnected),
            _ => None,
        };

        match next {
            Some(state) => Ok(state),
            None => Err(InvalidTransition {
                from: self,
                transition,
            }),
        }
    }

    /// Whether a `connect()` triggered by the UI should start a new attempt.
    #[must_use]
    pub const fn wants_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Reconnecting)
    }
}

/// Identifies one transport instance within a session.
///
/// Every `connect()` allocates a fresh id; events tagged with a superseded
/// id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    /// Creates a link id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// What a transport reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The transport finished opening.
    Opened,
    /// A text frame arrived.
    Frame(String),
    /// The transport reported an error; a `Closed` follows.
    Error(String),
    /// The transport closed with the given close code.
    Closed {
        /// WebSocket close code.
        code: u16,
    },
}

/// A transport callback tagged with its link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Link that produced the event.
    pub link: LinkId,
    /// The event itself.
    pub kind: TransportEventKind,
}

/// Everything the controller loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport callback.
    Transport(TransportEvent),
    /// The post-open delay elapsed; write `auth` on this link.
    AuthDue(LinkId),
    /// The reconnect delay elapsed.
    ReconnectDue,
    /// The user opened the chat surface.
    SurfaceOpened,
    /// The user closed the chat surface.
    SurfaceClosed,
    /// The user submitted text from the input box.
    Submit(String),
    /// Explicit connect request (e.g. page load with stored credentials).
    Connect,
    /// The user logged out; close the transport normally.
    Logout,
    /// Tear down and stop the controller loop.
    Shutdown,
}

/// Connection state plus the counters shown on the chat surface.
#[derive(Debug, Default)]
pub struct Session {
    state: ConnectionState,
    retry_attempt: u32,
    surface_open: bool,
    unread_count: u32,
    online_peer_count: Option<u64>,
}

impl Session {
    /// Creates a disconnected session with the surface closed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed (re)connections since the last `Open`.
    #[must_use]
    pub const fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    /// Whether the chat surface is visible.
    #[must_use]
    pub const fn is_surface_open(&self) -> bool {
        self.surface_open
    }

    /// Messages received while the surface was closed.
    #[must_use]
    pub const fn unread_count(&self) -> u32 {
        self.unread_count
    }

    /// Last online count reported by the server.
    #[must_use]
    pub const fn online_peer_count(&self) -> Option<u64> {
        self.online_peer_count
    }

    /// Applies a transition, updating the retry counter alongside.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the session untouched when
    /// the transition is not valid from the current state.
    pub fn apply(&mut self, transition: Transition) -> Result<ConnectionState, InvalidTransition> {
        let next = self.state.transition(transition)?;
        match transition {
            Transition::Authenticated => self.retry_attempt = 0,
            Transition::AbnormalClose { .. } => {
                self.retry_attempt = self.retry_attempt.saturating_add(1);
            }
            _ => {}
        }
        if next != self.state {
            tracing::debug!(from = %self.state, to = %next, ?transition, "session state change");
        }
        self.state = next;
        Ok(next)
    }

    /// Marks the surface visible and clears the unread counter.
    pub const fn open_surface(&mut self) {
        self.surface_open = true;
        self.unread_count = 0;
    }

    /// Marks the surface hidden. The transport is not affected.
    pub const fn close_surface(&mut self) {
        self.surface_open = false;
    }

    /// Counts one inbound chat message against the unread badge.
    ///
    /// Returns the new count, or `None` when the surface is open and the
    /// message is considered read.
    pub const fn record_inbound_message(&mut self) -> Option<u32> {
        if self.surface_open {
            return None;
        }
        self.unread_count = self.unread_count.saturating_add(1);
        Some(self.unread_count)
    }

    /// Stores the server-reported online count.
    pub const fn set_online_peer_count(&mut self, count: u64) {
        self.online_peer_count = Some(count);
    }
}
