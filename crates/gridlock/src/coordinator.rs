//! The room coordinator: every intent from every connection goes through
//! here.
//!
//! For each room-mutating intent the coordinator locks the room, runs the
//! pure transition from `gridlock_room`, writes the result back, fans the
//! events out to the connections bound to the room, and mirrors the
//! change to durable storage, all inside that one critical section.
//!
//! # Lock order
//!
//! matchmaking queue → room → {registry map, binding table}
//!
//! The registry map and the binding table are leaves: they are taken
//! briefly and never held while awaiting anything else.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use gridlock_protocol::{
    BoardSize, ClientMessage, Identity, ProtocolError, Recipient, RoomId, RoomSnapshot,
    ServerMessage, Symbol, now_millis, validate_invite_code,
};
use gridlock_room::{
    Intent, MatchmakingQueue, Player, Room, RoomError, RoomEvent, RoomRegistry, RoomSlot,
    RoomSpec, Ticket, Transition, apply,
};
use gridlock_session::{
    Authenticator, Outbox, SessionConfig, SessionError, SessionManager, declare_guest,
    resolve_identity,
};
use gridlock_store::{Store, Synchronizer};
use gridlock_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::{CoordinatorConfig, GridlockError};

/// An authenticated connection acting for its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub connection: ConnectionId,
    pub identity: Identity,
    pub display_name: String,
}

/// Owns the registry, the binding table, the matchmaking queue, and the
/// persistence synchronizer. Construct one per server.
pub struct Coordinator<A, S> {
    auth: Arc<A>,
    pub(crate) registry: RoomRegistry,
    pub(crate) sessions: Mutex<SessionManager>,
    queue: Mutex<MatchmakingQueue>,
    pub(crate) sync: Synchronizer<S>,
    auth_timeout: Duration,
    grace: TimeDelta,
}

impl<A: Authenticator, S: Store> Coordinator<A, S> {
    pub fn new(
        auth: Arc<A>,
        store: Arc<S>,
        session: SessionConfig,
        config: CoordinatorConfig,
    ) -> Self {
        let grace = i64::try_from(session.reconnect_grace_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            auth,
            registry: RoomRegistry::new(),
            auth_timeout: session.auth_timeout,
            sessions: Mutex::new(SessionManager::new(session)),
            queue: Mutex::new(MatchmakingQueue::new()),
            sync: Synchronizer::new(store, config.store_timeout),
            grace,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<S> {
        self.sync.store()
    }

    /// `true` if the identity's current connection is bound to the room.
    pub async fn is_connected(&self, identity: &Identity, room_id: &RoomId) -> bool {
        self.sessions.lock().await.is_connected(identity, room_id)
    }

    // =====================================================================
    // Connection lifecycle
    // =====================================================================

    /// Resolves the first message of a connection into an identity and
    /// binds the connection to it.
    ///
    /// # Errors
    /// - [`SessionError::NotAuthenticated`] if `message` is not an
    ///   authenticate intent
    /// - authentication failures from the [`Authenticator`], including
    ///   timeouts, which are never downgraded to a guest
    /// - [`SessionError::InvalidGuest`] for a bad guest declaration
    pub async fn authenticate(
        &self,
        connection: ConnectionId,
        outbox: Outbox,
        message: ClientMessage,
    ) -> Result<Actor, GridlockError> {
        let (identity, display_name) = match message {
            ClientMessage::Authenticate { token } => {
                let profile = resolve_identity(self.auth.as_ref(), &token, self.auth_timeout).await?;
                (Identity::Registered(profile.id), profile.display_name)
            }
            ClientMessage::AuthenticateGuest {
                guest_id,
                display_name,
            } => declare_guest(&guest_id, &display_name)?,
            other => {
                tracing::debug!(%connection, intent = other.kind(), "intent before authentication");
                return Err(SessionError::NotAuthenticated(connection).into());
            }
        };

        {
            let mut sessions = self.sessions.lock().await;
            sessions.bind(connection, identity.clone(), display_name.clone(), outbox);
            sessions.send_to(
                connection,
                ServerMessage::Authenticated {
                    identity: identity.clone(),
                    display_name: display_name.clone(),
                },
            );
        }
        self.sync.set_presence(&identity, true).await;
        tracing::info!(%connection, %identity, "authenticated");

        Ok(Actor {
            connection,
            identity,
            display_name,
        })
    }

    /// Forgets a closed connection. Game state is never touched.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let dropped = self.queue.lock().await.dequeue_connection(connection);
        if !dropped.is_empty() {
            tracing::debug!(%connection, tickets = dropped.len(), "queue tickets dropped");
        }

        let unbound = {
            let mut sessions = self.sessions.lock().await;
            let unbound = sessions.unbind(connection);
            if let Some(unbound) = &unbound {
                if let (true, Some(room_id)) = (unbound.was_current, &unbound.room) {
                    sessions.broadcast(
                        room_id,
                        &Recipient::AllExcept(unbound.identity.clone()),
                        &ServerMessage::PlayerDisconnected {
                            room_id: room_id.clone(),
                            identity: unbound.identity.clone(),
                        },
                    );
                }
            }
            unbound
        };

        if let Some(unbound) = unbound {
            if unbound.was_current {
                self.mark_offline(&unbound.identity).await;
            }
        }
    }

    /// Writes offline unless the identity has rebound meanwhile. A rebind
    /// that lands while the write is in flight is answered with online.
    async fn mark_offline(&self, identity: &Identity) {
        if self.has_connection(identity).await {
            return;
        }
        self.sync.set_presence(identity, false).await;
        if self.has_connection(identity).await {
            tracing::debug!(%identity, "rebound during offline write");
            self.sync.set_presence(identity, true).await;
        }
    }

    async fn has_connection(&self, identity: &Identity) -> bool {
        self.sessions
            .lock()
            .await
            .current_connection(identity)
            .is_some()
    }

    /// Expires sessions past their grace period and retires every room
    /// whose players are all gone. Returns the retired room ids.
    ///
    /// A room is never retired within one grace period of its creation,
    /// so a room opened before its host connects survives until they do.
    pub async fn sweep(&self) -> Vec<RoomId> {
        let expired = self.sessions.lock().await.expire_stale();
        let rooms = self.registry.list(|_| true).await;
        let now = Utc::now();

        let abandoned: Vec<RoomId> = {
            let mut sessions = self.sessions.lock().await;
            let abandoned = rooms
                .iter()
                .filter(|room| now.signed_duration_since(room.created_at) > self.grace)
                .filter(|room| room.players.iter().all(|p| sessions.is_gone(&p.identity)))
                .map(|room| room.id.clone())
                .collect();
            sessions.cleanup_expired();
            abandoned
        };

        for room_id in &abandoned {
            self.registry.remove(room_id).await;
        }
        if !expired.is_empty() || !abandoned.is_empty() {
            tracing::info!(
                expired = expired.len(),
                retired = abandoned.len(),
                "sweep finished"
            );
        }
        abandoned
    }

    // =====================================================================
    // Intents
    // =====================================================================

    /// Runs one intent from an authenticated connection.
    ///
    /// Results reach clients as events through the outboxes; the caller
    /// only has to report the error, if any, to `actor`.
    pub async fn handle(&self, actor: &Actor, message: ClientMessage) -> Result<(), GridlockError> {
        tracing::debug!(connection = %actor.connection, identity = %actor.identity, intent = message.kind(), "intent");
        let identity = actor.identity.clone();
        match message {
            ClientMessage::Authenticate { .. } | ClientMessage::AuthenticateGuest { .. } => {
                Err(ProtocolError::InvalidMessage("connection is already authenticated".into()).into())
            }
            ClientMessage::CreateRoom {
                board_size,
                is_private,
                custom_code,
            } => {
                let spec = RoomSpec {
                    board_size,
                    is_private,
                    custom_code,
                    host: identity,
                    host_name: actor.display_name.clone(),
                };
                self.open_room(spec, Some(actor.connection)).await.map(drop)
            }
            ClientMessage::JoinRoom { room_id } => {
                let intent = Intent::Join {
                    identity,
                    display_name: actor.display_name.clone(),
                };
                self.room_intent(actor, &room_id, intent).await
            }
            ClientMessage::FindMatch { board_size } => self.find_match(actor, board_size).await,
            ClientMessage::CancelMatchmaking => {
                if self.queue.lock().await.dequeue(&identity).is_some() {
                    tracing::debug!(%identity, "ticket withdrawn");
                }
                self.send(actor.connection, ServerMessage::MatchmakingCancelled).await;
                Ok(())
            }
            ClientMessage::MakeMove { room_id, position } => {
                self.room_intent(actor, &room_id, Intent::Move { identity, position })
                    .await
            }
            ClientMessage::ForfeitGame { room_id } => {
                self.room_intent(actor, &room_id, Intent::Forfeit { identity }).await
            }
            ClientMessage::RequestRematch { room_id } => {
                self.room_intent(actor, &room_id, Intent::RequestRematch { identity })
                    .await
            }
            ClientMessage::AcceptRematch { room_id } => {
                self.room_intent(actor, &room_id, Intent::AcceptRematch { identity })
                    .await
            }
            ClientMessage::DeclineRematch { room_id } => {
                self.room_intent(actor, &room_id, Intent::DeclineRematch { identity })
                    .await
            }
            ClientMessage::LeaveGame { room_id } => self.leave(actor, &room_id).await,
            ClientMessage::ReconnectGame { room_id } => self.reconnect(actor, &room_id).await,
            ClientMessage::Heartbeat { client_time } => {
                let ack = ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: now_millis(),
                };
                self.send(actor.connection, ack).await;
                Ok(())
            }
        }
    }

    /// Queues `message` for one connection.
    pub async fn send(&self, connection: ConnectionId, message: ServerMessage) {
        if !self.sessions.lock().await.send_to(connection, message) {
            tracing::debug!(%connection, "dropping event for unbound connection");
        }
    }

    /// Creates a room, optionally binding `host_connection` to it and
    /// sending it `room_created`.
    pub(crate) async fn open_room(
        &self,
        spec: RoomSpec,
        host_connection: Option<ConnectionId>,
    ) -> Result<RoomSnapshot, GridlockError> {
        if let Some(code) = spec.custom_code.as_deref() {
            self.check_stored_code(code).await?;
        }
        let created = self.registry.create(spec, Utc::now()).await?;
        let slot = self
            .registry
            .slot(&created.id)
            .await
            .ok_or_else(|| RoomError::NotFound(created.id.clone()))?;
        let room = slot.lock().await;

        let snapshot = {
            let mut sessions = self.sessions.lock().await;
            if let Some(connection) = host_connection {
                sessions.associate(connection, room.id.clone());
            }
            let snapshot = snapshot(&room, &sessions);
            if let Some(connection) = host_connection {
                sessions.send_to(
                    connection,
                    ServerMessage::RoomCreated {
                        room: snapshot.clone(),
                    },
                );
            }
            snapshot
        };
        self.sync.persist_room(&room).await;
        Ok(snapshot)
    }

    /// Refuses a custom code that a stored, still-live room holds, which
    /// covers rooms this registry has never seen. The holder is brought
    /// back into the registry on the way.
    ///
    /// All-guest rooms are never stored; the registry alone guards their
    /// codes.
    async fn check_stored_code(&self, code: &str) -> Result<(), GridlockError> {
        if validate_invite_code(code).is_err() {
            // Left for the registry to reject.
            return Ok(());
        }
        match self.sync.code_holder(code).await {
            Ok(None) => Ok(()),
            Ok(Some(holder)) => {
                tracing::debug!(room_id = %holder.id, code, "custom code held by stored room");
                self.registry.get_or_insert(holder).await;
                Err(RoomError::Conflict(format!("invite code {code} is in use")).into())
            }
            Err(e) => {
                tracing::warn!(code, error = %e, "cannot check custom code against store");
                Err(e.into())
            }
        }
    }

    /// One read-modify-write of a room under its lock.
    async fn room_intent(
        &self,
        actor: &Actor,
        room_id: &RoomId,
        intent: Intent,
    ) -> Result<(), GridlockError> {
        let joining = matches!(intent, Intent::Join { .. });
        let slot = self.locate(room_id).await?;
        let mut room = slot.lock().await;

        let transition = apply(&room, intent, Utc::now())?;
        *room = transition.room.clone();

        if let Some(successor) = &transition.spawned {
            // Written before it becomes reachable, so no later move on the
            // successor can be overwritten by this first version.
            if transition.persist {
                self.sync.persist_room(successor).await;
            }
            self.registry.upsert(successor.clone()).await;
        }

        self.deliver(&room, &transition, joining.then_some(actor.connection))
            .await;
        if transition.persist {
            self.sync.persist_room(&room).await;
        }
        self.sync.record_stats(&transition.stats).await;
        drop(room);

        if let Some(successor) = &transition.spawned {
            self.registry.remove(room_id).await;
            tracing::info!(previous = %room_id, room_id = %successor.id, "rematch started");
        }
        Ok(())
    }

    /// Fans a transition's events out to the room's connections.
    async fn deliver(&self, room: &Room, transition: &Transition, joiner: Option<ConnectionId>) {
        let mut sessions = self.sessions.lock().await;
        if let Some(connection) = joiner {
            sessions.associate(connection, room.id.clone());
        }
        for (recipient, event) in &transition.events {
            let target = match (event, &transition.spawned) {
                (RoomEvent::RematchStarted, Some(successor)) => {
                    sessions.rebind_room(&room.id, &successor.id);
                    successor.id.clone()
                }
                _ => room.id.clone(),
            };
            if let Some(message) = render(room, transition.spawned.as_ref(), event, &sessions) {
                sessions.broadcast(&target, recipient, &message);
            }
        }
    }

    /// The room's lock handle, restoring it from the store when it is not
    /// live.
    async fn locate(&self, room_id: &RoomId) -> Result<RoomSlot, RoomError> {
        if let Some(slot) = self.registry.slot(room_id).await {
            return Ok(slot);
        }
        match self.sync.restore_room(room_id).await {
            Some(room) if !room.is_superseded() => Ok(self.registry.get_or_insert(room).await),
            _ => Err(RoomError::NotFound(room_id.clone())),
        }
    }

    /// Pairs with the oldest compatible ticket or files a new one. Runs
    /// entirely under the queue lock.
    async fn find_match(&self, actor: &Actor, board_size: BoardSize) -> Result<(), GridlockError> {
        let mut queue = self.queue.lock().await;
        if queue.contains(&actor.identity) {
            return Err(RoomError::Conflict(format!(
                "{} is already in the matchmaking queue",
                actor.identity
            ))
            .into());
        }

        let Some(ticket) = queue.find_match(board_size, &actor.identity) else {
            let position = queue.enqueue(Ticket {
                identity: actor.identity.clone(),
                display_name: actor.display_name.clone(),
                board_size,
                connection: actor.connection,
                enqueued_at: Utc::now(),
            })?;
            drop(queue);
            self.send(actor.connection, ServerMessage::Queued { board_size, position })
                .await;
            return Ok(());
        };

        let paired = Room::paired(
            RoomId::generate(),
            board_size,
            Player::new(ticket.identity.clone(), ticket.display_name.clone(), Symbol::X),
            Player::new(actor.identity.clone(), actor.display_name.clone(), Symbol::O),
            Utc::now(),
        );
        let slot = self.registry.upsert(paired).await;
        let room = slot.lock().await;
        drop(queue);

        {
            let mut sessions = self.sessions.lock().await;
            let waiting = sessions
                .current_connection(&ticket.identity)
                .unwrap_or(ticket.connection);
            sessions.associate(waiting, room.id.clone());
            sessions.associate(actor.connection, room.id.clone());
            let found = ServerMessage::MatchFound {
                room: snapshot(&room, &sessions),
            };
            sessions.send_to(waiting, found.clone());
            sessions.send_to(actor.connection, found);
        }
        tracing::info!(room_id = %room.id, %board_size, x = %ticket.identity, o = %actor.identity, "match found");
        self.sync.persist_room(&room).await;
        Ok(())
    }

    /// Drops the connection's association with the room. Players keep
    /// their seats.
    async fn leave(&self, actor: &Actor, room_id: &RoomId) -> Result<(), GridlockError> {
        let slot = self
            .registry
            .slot(room_id)
            .await
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        let _room = slot.lock().await;

        let mut sessions = self.sessions.lock().await;
        if sessions.dissociate(actor.connection, room_id) {
            sessions.broadcast(
                room_id,
                &Recipient::AllExcept(actor.identity.clone()),
                &ServerMessage::PlayerLeft {
                    room_id: room_id.clone(),
                    identity: actor.identity.clone(),
                },
            );
            tracing::info!(%room_id, identity = %actor.identity, "player left");
        }
        Ok(())
    }

    /// Re-binds a returning player and sends a fresh snapshot.
    async fn reconnect(&self, actor: &Actor, room_id: &RoomId) -> Result<(), GridlockError> {
        let slot = self.locate(room_id).await?;
        let room = slot.lock().await;
        if room.is_superseded() {
            return Err(RoomError::NotFound(room_id.clone()).into());
        }
        if !room.is_participant(&actor.identity) {
            return Err(RoomError::NotAuthorized {
                identity: actor.identity.clone(),
                room_id: room_id.clone(),
            }
            .into());
        }

        let mut sessions = self.sessions.lock().await;
        sessions.associate(actor.connection, room.id.clone());
        sessions.send_to(
            actor.connection,
            ServerMessage::RoomState {
                room: snapshot(&room, &sessions),
            },
        );
        sessions.broadcast(
            &room.id,
            &Recipient::AllExcept(actor.identity.clone()),
            &ServerMessage::PlayerReconnected {
                room_id: room.id.clone(),
                identity: actor.identity.clone(),
            },
        );
        tracing::info!(%room_id, identity = %actor.identity, "player reconnected");
        Ok(())
    }
}

/// The client view of `room` with connectivity from the binding table.
pub(crate) fn snapshot(room: &Room, sessions: &SessionManager) -> RoomSnapshot {
    room.snapshot(|identity| sessions.is_connected(identity, &room.id))
}

/// Turns a room event into its wire message.
fn render(
    room: &Room,
    spawned: Option<&Room>,
    event: &RoomEvent,
    sessions: &SessionManager,
) -> Option<ServerMessage> {
    let room_id = room.id.clone();
    let message = match event.clone() {
        RoomEvent::Joined => ServerMessage::RoomJoined {
            room: snapshot(room, sessions),
        },
        RoomEvent::PlayerJoined { identity } => ServerMessage::PlayerJoined {
            room: snapshot(room, sessions),
            identity,
        },
        RoomEvent::PlayerReconnected { identity } => {
            ServerMessage::PlayerReconnected { room_id, identity }
        }
        RoomEvent::GameStarted => ServerMessage::GameStarted {
            room: snapshot(room, sessions),
        },
        RoomEvent::MoveMade { last_move } => ServerMessage::MoveMade {
            room: snapshot(room, sessions),
            last_move,
        },
        RoomEvent::GameFinished => ServerMessage::GameFinished {
            room_id,
            winner: room.winner?,
            winning_line: room.winning_line.clone(),
        },
        RoomEvent::GameForfeited {
            forfeited_by,
            winner,
        } => ServerMessage::GameForfeited {
            room_id,
            forfeited_by,
            winner,
        },
        RoomEvent::RematchRequested { by } => ServerMessage::RematchRequested { room_id, by },
        RoomEvent::RematchAccepted { by } => ServerMessage::RematchAccepted { room_id, by },
        RoomEvent::RematchDeclined { by } => ServerMessage::RematchDeclined { room_id, by },
        RoomEvent::RematchStarted => ServerMessage::RematchStarted {
            previous_room_id: room_id,
            room: snapshot(spawned?, sessions),
        },
    };
    Some(message)
}
