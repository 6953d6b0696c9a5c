//! Session types: who a connection is, and how an identity is reachable.

use std::time::{Duration, Instant};

use gridlock_protocol::{Identity, RoomId, ServerMessage};
use gridlock_transport::ConnectionId;
use tokio::sync::mpsc;

/// Queue of outbound events for one connection. A writer task drains it
/// into the socket.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a disconnected identity stays reconnectable
    /// before it is expired and its rooms become eligible for retirement.
    pub reconnect_grace_secs: u64,

    /// Deadline for one call to the [`Authenticator`](crate::Authenticator).
    pub auth_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 30,
            auth_timeout: Duration::from_secs(5),
        }
    }
}

/// Lifecycle of an identity's presence.
///
/// ```text
///   Connected ──(last connection lost)──→ Disconnected ──(grace)──→ Expired
///       ↑                                      │
///       └──────────────(new bind)──────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// Lost its connection at `since`.
    Disconnected { since: Instant },
    /// Grace elapsed; removed by the next cleanup.
    Expired,
}

/// Presence record for one identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub state: SessionState,
    /// The identity's current binding. Last bind wins.
    pub connection: Option<ConnectionId>,
    /// The room the identity was last associated with.
    pub last_room: Option<RoomId>,
}

/// An authenticated connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub identity: Identity,
    pub display_name: String,
    pub outbox: Outbox,
    /// The room this connection currently receives broadcasts for.
    pub room: Option<RoomId>,
}

/// What [`unbind`](crate::SessionManager::unbind) found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unbound {
    pub identity: Identity,
    pub room: Option<RoomId>,
    /// `false` when a newer connection had already replaced this one, in
    /// which case presence was left alone.
    pub was_current: bool,
}

/// An identity whose grace period ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
    pub identity: Identity,
    pub last_room: Option<RoomId>,
}

pub(crate) fn grace(config: &SessionConfig) -> Duration {
    Duration::from_secs(config.reconnect_grace_secs)
}
