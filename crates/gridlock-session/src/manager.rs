//! The binding table between identities, connections, and rooms.
//!
//! Connectivity is never stored on a room. "Is this player connected" is
//! answered here by following identity → current connection → associated
//! room.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain data structure; the coordinator owns it
//! behind a mutex that is never held across an await.

use std::collections::HashMap;
use std::time::Instant;

use gridlock_protocol::{Identity, Recipient, RoomId, ServerMessage};
use gridlock_transport::ConnectionId;

use crate::session::grace;
use crate::{ConnectionEntry, Expired, Outbox, Session, SessionConfig, SessionState, Unbound};

/// Tracks every authenticated connection and every known identity.
///
/// ```text
/// bind() ──→ associate() ──→ unbind() ──→ expire_stale() ──→ cleanup_expired()
///              [Connected]    [Disconnected]     [Expired]
///                   ↑               │
///                   └─── bind() ────┘
/// ```
pub struct SessionManager {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    sessions: HashMap<Identity, Session>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            connections: HashMap::new(),
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Binds an authenticated connection to its identity.
    ///
    /// Last writer wins: a previous connection for the same identity stops
    /// receiving room broadcasts and is returned so the caller can log it.
    pub fn bind(
        &mut self,
        connection: ConnectionId,
        identity: Identity,
        display_name: String,
        outbox: Outbox,
    ) -> Option<ConnectionId> {
        let session = self
            .sessions
            .entry(identity.clone())
            .or_insert_with(|| Session {
                identity: identity.clone(),
                state: SessionState::Connected,
                connection: None,
                last_room: None,
            });
        let replaced = session.connection.replace(connection).filter(|&c| c != connection);
        session.state = SessionState::Connected;

        if let Some(stale) = replaced {
            if let Some(entry) = self.connections.get_mut(&stale) {
                entry.room = None;
            }
            tracing::info!(%identity, %stale, %connection, "binding replaced");
        }

        self.connections.insert(
            connection,
            ConnectionEntry {
                identity: identity.clone(),
                display_name,
                outbox,
                room: None,
            },
        );
        tracing::debug!(%identity, %connection, "connection bound");
        replaced
    }

    /// Forgets a closed connection.
    ///
    /// The identity only enters the grace period if this was still its
    /// current binding. A late disconnect of a replaced connection leaves
    /// the newer binding untouched.
    pub fn unbind(&mut self, connection: ConnectionId) -> Option<Unbound> {
        let entry = self.connections.remove(&connection)?;
        let was_current = match self.sessions.get_mut(&entry.identity) {
            Some(session) if session.connection == Some(connection) => {
                session.connection = None;
                session.state = SessionState::Disconnected {
                    since: Instant::now(),
                };
                if entry.room.is_some() {
                    session.last_room = entry.room.clone();
                }
                true
            }
            _ => false,
        };
        tracing::info!(identity = %entry.identity, %connection, was_current, "connection unbound");
        Some(Unbound {
            identity: entry.identity,
            room: entry.room,
            was_current,
        })
    }

    /// Points the connection at `room`. Returns the room it was associated
    /// with before, if any.
    pub fn associate(&mut self, connection: ConnectionId, room: RoomId) -> Option<RoomId> {
        let entry = self.connections.get_mut(&connection)?;
        if let Some(session) = self.sessions.get_mut(&entry.identity) {
            session.last_room = Some(room.clone());
        }
        entry.room.replace(room)
    }

    /// Clears the association if it still points at `room`.
    pub fn dissociate(&mut self, connection: ConnectionId, room: &RoomId) -> bool {
        match self.connections.get_mut(&connection) {
            Some(entry) if entry.room.as_ref() == Some(room) => {
                entry.room = None;
                true
            }
            _ => false,
        }
    }

    /// Moves every connection and session associated with `old` to `new`.
    pub fn rebind_room(&mut self, old: &RoomId, new: &RoomId) {
        for entry in self.connections.values_mut() {
            if entry.room.as_ref() == Some(old) {
                entry.room = Some(new.clone());
            }
        }
        for session in self.sessions.values_mut() {
            if session.last_room.as_ref() == Some(old) {
                session.last_room = Some(new.clone());
            }
        }
    }

    pub fn connection(&self, connection: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&connection)
    }

    /// The identity's current connection.
    pub fn current_connection(&self, identity: &Identity) -> Option<ConnectionId> {
        self.sessions.get(identity)?.connection
    }

    /// `true` if the identity's current connection is associated with `room`.
    pub fn is_connected(&self, identity: &Identity, room: &RoomId) -> bool {
        self.current_connection(identity)
            .and_then(|c| self.connections.get(&c))
            .is_some_and(|entry| entry.room.as_ref() == Some(room))
    }

    /// Outboxes of the connections in `room` selected by `recipient`.
    pub fn recipients(&self, room: &RoomId, recipient: &Recipient) -> Vec<Outbox> {
        self.connections
            .values()
            .filter(|e| e.room.as_ref() == Some(room) && recipient.includes(&e.identity))
            .map(|e| e.outbox.clone())
            .collect()
    }

    /// Queues `message` for one connection. `false` if it is gone.
    pub fn send_to(&self, connection: ConnectionId, message: ServerMessage) -> bool {
        self.connections
            .get(&connection)
            .is_some_and(|e| e.outbox.send(message).is_ok())
    }

    /// Queues `message` for every selected connection in `room`.
    pub fn broadcast(&self, room: &RoomId, recipient: &Recipient, message: &ServerMessage) {
        for outbox in self.recipients(room, recipient) {
            // A closed outbox means the writer already exited; unbind follows.
            let _ = outbox.send(message.clone());
        }
    }

    /// Expires identities whose grace period has elapsed.
    pub fn expire_stale(&mut self) -> Vec<Expired> {
        let grace = grace(&self.config);
        let mut expired = Vec::new();
        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    tracing::info!(identity = %session.identity, "session expired (grace period elapsed)");
                    expired.push(Expired {
                        identity: session.identity.clone(),
                        last_room: session.last_room.clone(),
                    });
                }
            }
        }
        expired
    }

    /// Drops expired sessions.
    pub fn cleanup_expired(&mut self) {
        self.sessions
            .retain(|_, session| !matches!(session.state, SessionState::Expired));
    }

    /// `true` if the identity has no session or only an expired one.
    pub fn is_gone(&self, identity: &Identity) -> bool {
        self.sessions
            .get(identity)
            .is_none_or(|s| s.state == SessionState::Expired)
    }

    pub fn get(&self, identity: &Identity) -> Option<&Session> {
        self.sessions.get(identity)
    }

    /// Number of known identities, in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
