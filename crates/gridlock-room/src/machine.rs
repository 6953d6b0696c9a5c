//! The room state machine as pure functions.
//!
//! [`apply`] takes the current room and an intent and either rejects the
//! intent or returns a [`Transition`]: the updated room, the events to
//! emit, the stat deltas to record, and an optional successor room. It
//! never performs I/O, so every rule here is tested without a socket or
//! a store.
//!
//! ```text
//!   waiting ──(second join)──→ playing ──(win / draw / forfeit)──→ finished
//!                                 ↑                                   │
//!                                 └──────(both vote rematch: new room)┘
//! ```

use chrono::{DateTime, Utc};
use gridlock_protocol::{Identity, MoveRecord, Recipient, RoomId, RoomStatus, Symbol, UserId, Winner};

use crate::stats::{self, StatsDelta};
use crate::{Player, Room, RoomError};

/// A player action against one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Join {
        identity: Identity,
        display_name: String,
    },
    Move {
        identity: Identity,
        position: usize,
    },
    Forfeit {
        identity: Identity,
    },
    RequestRematch {
        identity: Identity,
    },
    AcceptRematch {
        identity: Identity,
    },
    DeclineRematch {
        identity: Identity,
    },
}

impl Intent {
    pub fn identity(&self) -> &Identity {
        match self {
            Self::Join { identity, .. }
            | Self::Move { identity, .. }
            | Self::Forfeit { identity }
            | Self::RequestRematch { identity }
            | Self::AcceptRematch { identity }
            | Self::DeclineRematch { identity } => identity,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Move { .. } => "move",
            Self::Forfeit { .. } => "forfeit",
            Self::RequestRematch { .. } => "request a rematch",
            Self::AcceptRematch { .. } => "accept a rematch",
            Self::DeclineRematch { .. } => "decline a rematch",
        }
    }
}

/// Something that happened to a room, before it is rendered for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// The addressee is now seated (or re-seated) in the room.
    Joined,
    PlayerJoined { identity: Identity },
    PlayerReconnected { identity: Identity },
    GameStarted,
    MoveMade { last_move: MoveRecord },
    GameFinished,
    GameForfeited { forfeited_by: Identity, winner: Symbol },
    RematchRequested { by: Identity },
    RematchAccepted { by: Identity },
    RematchDeclined { by: Identity },
    /// The successor room is live; rendered from [`Transition::spawned`].
    RematchStarted,
}

/// The result of a successful intent.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The room after the intent.
    pub room: Room,
    /// Events in emission order, addressed relative to the room.
    pub events: Vec<(Recipient, RoomEvent)>,
    /// Stat deltas for registered players, non-empty only when the game
    /// finished on this intent.
    pub stats: Vec<(UserId, StatsDelta)>,
    /// The rematch room, when both players have voted.
    pub spawned: Option<Room>,
    /// Whether `room` changed in a way worth writing to durable storage.
    pub persist: bool,
}

impl Transition {
    fn new(room: Room) -> Self {
        Self {
            room,
            events: Vec::new(),
            stats: Vec::new(),
            spawned: None,
            persist: false,
        }
    }

    fn emit(mut self, to: Recipient, event: RoomEvent) -> Self {
        self.events.push((to, event));
        self
    }

    fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }
}

/// Applies one intent to a room.
///
/// # Errors
/// Any [`RoomError`]; the input room is left untouched either way.
pub fn apply(room: &Room, intent: Intent, now: DateTime<Utc>) -> Result<Transition, RoomError> {
    if room.is_superseded() {
        return Err(RoomError::NotFound(room.id.clone()));
    }
    match intent {
        Intent::Join {
            identity,
            display_name,
        } => join(room, identity, display_name),
        Intent::Move { identity, position } => make_move(room, identity, position, now),
        Intent::Forfeit { ref identity } => {
            require_status(room, RoomStatus::Playing, &intent)?;
            require_participant(room, identity)?;
            forfeit(room, identity.clone(), now)
        }
        Intent::RequestRematch { ref identity } | Intent::AcceptRematch { ref identity } => {
            require_status(room, RoomStatus::Finished, &intent)?;
            require_participant(room, identity)?;
            let accepting = matches!(intent, Intent::AcceptRematch { .. });
            vote_rematch(room, identity.clone(), accepting, now)
        }
        Intent::DeclineRematch { ref identity } => {
            require_status(room, RoomStatus::Finished, &intent)?;
            require_participant(room, identity)?;
            let mut next = room.clone();
            next.rematch_votes.clear();
            Ok(Transition::new(next).emit(
                Recipient::All,
                RoomEvent::RematchDeclined {
                    by: identity.clone(),
                },
            ))
        }
    }
}

fn require_status(room: &Room, status: RoomStatus, intent: &Intent) -> Result<(), RoomError> {
    if room.status == status {
        Ok(())
    } else {
        Err(RoomError::InvalidState {
            room_id: room.id.clone(),
            status: room.status,
            action: intent.action(),
        })
    }
}

fn require_participant<'r>(room: &'r Room, identity: &Identity) -> Result<&'r Player, RoomError> {
    room.player(identity).ok_or_else(|| RoomError::NotAuthorized {
        identity: identity.clone(),
        room_id: room.id.clone(),
    })
}

fn join(room: &Room, identity: Identity, display_name: String) -> Result<Transition, RoomError> {
    // Already seated: this is a reconnection and the game is untouched.
    if room.is_participant(&identity) {
        return Ok(Transition::new(room.clone())
            .emit(Recipient::Player(identity.clone()), RoomEvent::Joined)
            .emit(
                Recipient::AllExcept(identity.clone()),
                RoomEvent::PlayerReconnected { identity },
            ));
    }
    if room.is_full() {
        return Err(RoomError::RoomFull(room.id.clone()));
    }
    if room.status != RoomStatus::Waiting {
        return Err(RoomError::InvalidState {
            room_id: room.id.clone(),
            status: room.status,
            action: "join",
        });
    }

    let mut next = room.clone();
    let symbol = match next.players.first() {
        Some(host) => host.symbol.other(),
        None => Symbol::X,
    };
    next.players.push(Player::new(identity.clone(), display_name, symbol));

    let transition = if next.is_full() {
        next.status = RoomStatus::Playing;
        next.current_symbol = Symbol::X;
        Transition::new(next)
            .emit(Recipient::Player(identity), RoomEvent::Joined)
            .emit(Recipient::All, RoomEvent::GameStarted)
    } else {
        Transition::new(next)
            .emit(Recipient::Player(identity.clone()), RoomEvent::Joined)
            .emit(
                Recipient::AllExcept(identity.clone()),
                RoomEvent::PlayerJoined { identity },
            )
    };
    Ok(transition.persisted())
}

fn make_move(
    room: &Room,
    identity: Identity,
    position: usize,
    now: DateTime<Utc>,
) -> Result<Transition, RoomError> {
    if room.status != RoomStatus::Playing {
        return Err(RoomError::InvalidState {
            room_id: room.id.clone(),
            status: room.status,
            action: "move",
        });
    }
    let symbol = require_participant(room, &identity)?.symbol;
    if symbol != room.current_symbol {
        return Err(RoomError::NotYourTurn {
            expected: room.current_symbol,
        });
    }
    match room.board.get(position) {
        None => {
            return Err(RoomError::InvalidMove {
                position,
                reason: "out of bounds",
            });
        }
        Some(Some(_)) => {
            return Err(RoomError::InvalidMove {
                position,
                reason: "cell occupied",
            });
        }
        Some(None) => {}
    }

    let mut next = room.clone();
    next.board.place(position, symbol);
    let last_move = MoveRecord {
        symbol,
        position,
        timestamp: now,
    };
    next.moves.push(last_move.clone());

    // Win is checked before fullness: the move that fills the last cell
    // may also complete a line.
    let finished = if let Some((winner, line)) = next.board.winning_line() {
        finish(&mut next, Winner::from(winner), line, now);
        true
    } else if next.board.is_full() {
        finish(&mut next, Winner::Draw, Vec::new(), now);
        true
    } else {
        next.current_symbol = symbol.other();
        false
    };

    let mut transition =
        Transition::new(next).emit(Recipient::All, RoomEvent::MoveMade { last_move });
    if finished {
        transition.stats = stats::outcome(&transition.room);
        transition = transition.emit(Recipient::All, RoomEvent::GameFinished);
    }
    Ok(transition.persisted())
}

fn finish(room: &mut Room, winner: Winner, line: Vec<usize>, now: DateTime<Utc>) {
    room.status = RoomStatus::Finished;
    room.winner = Some(winner);
    room.winning_line = line;
    room.finished_at = Some(now);
}

fn forfeit(room: &Room, identity: Identity, now: DateTime<Utc>) -> Result<Transition, RoomError> {
    let Some(opponent) = room.opponent(&identity) else {
        return Err(RoomError::InvalidState {
            room_id: room.id.clone(),
            status: room.status,
            action: "forfeit without an opponent",
        });
    };
    let winner = opponent.symbol;

    let mut next = room.clone();
    finish(&mut next, Winner::from(winner), Vec::new(), now);
    next.forfeited_by = Some(identity.clone());

    let mut transition = Transition::new(next)
        .emit(
            Recipient::All,
            RoomEvent::GameForfeited {
                forfeited_by: identity,
                winner,
            },
        )
        .emit(Recipient::All, RoomEvent::GameFinished);
    transition.stats = stats::outcome(&transition.room);
    Ok(transition.persisted())
}

fn vote_rematch(
    room: &Room,
    identity: Identity,
    accepting: bool,
    now: DateTime<Utc>,
) -> Result<Transition, RoomError> {
    let mut next = room.clone();
    let fresh_vote = next.rematch_votes.insert(identity.clone());

    let everyone_agreed = next
        .players
        .iter()
        .all(|p| next.rematch_votes.contains(&p.identity));

    if everyone_agreed {
        let successor = spawn_rematch(&next, now)?;
        next.rematch_votes.clear();
        next.superseded_by = Some(successor.id.clone());
        let mut transition = Transition::new(next);
        if accepting {
            transition = transition.emit(Recipient::All, RoomEvent::RematchAccepted { by: identity });
        }
        transition.spawned = Some(successor);
        return Ok(transition
            .emit(Recipient::All, RoomEvent::RematchStarted)
            .persisted());
    }

    let transition = Transition::new(next);
    if !fresh_vote {
        return Ok(transition);
    }
    Ok(if accepting {
        transition.emit(Recipient::All, RoomEvent::RematchAccepted { by: identity })
    } else {
        transition.emit(
            Recipient::AllExcept(identity.clone()),
            RoomEvent::RematchRequested { by: identity },
        )
    })
}

/// Same seats, symbols swapped, fresh board, already playing.
fn spawn_rematch(room: &Room, now: DateTime<Utc>) -> Result<Room, RoomError> {
    let mut players: Vec<Player> = room
        .players
        .iter()
        .map(|p| Player::new(p.identity.clone(), p.display_name.clone(), p.symbol.other()))
        .collect();
    players.sort_by_key(|p| p.symbol != Symbol::X);
    let mut seats = players.into_iter();
    match (seats.next(), seats.next()) {
        (Some(x), Some(o)) => {
            let mut successor = Room::paired(RoomId::generate(), room.board_size(), x, o, now);
            successor.is_private = room.is_private;
            Ok(successor)
        }
        _ => Err(RoomError::InvalidState {
            room_id: room.id.clone(),
            status: room.status,
            action: "rematch without two players",
        }),
    }
}
