//! The room aggregate: one authoritative match.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use gridlock_protocol::{
    BoardSize, Identity, MoveRecord, PlayerView, RoomId, RoomSnapshot, RoomStatus, Symbol,
    Winner,
};

use crate::board::Board;

/// Seats per room.
pub const MAX_PLAYERS: usize = 2;

/// A seated player. Connectivity lives in the session layer, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub identity: Identity,
    pub display_name: String,
    pub symbol: Symbol,
}

impl Player {
    pub fn new(identity: Identity, display_name: impl Into<String>, symbol: Symbol) -> Self {
        Self {
            identity,
            display_name: display_name.into(),
            symbol,
        }
    }
}

/// One match instance.
///
/// Fields are public so the store can rebuild rooms from documents, but
/// every change after construction goes through [`crate::apply`], which
/// keeps these invariants:
///
/// - at most [`MAX_PLAYERS`] players, appended in join order
/// - `status` only moves forward: waiting → playing → finished
/// - `winner` is `Some` exactly when `status` is finished
/// - `current_symbol` only changes on a successful move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub board: Board,
    pub players: Vec<Player>,
    pub current_symbol: Symbol,
    pub status: RoomStatus,
    pub winner: Option<Winner>,
    pub winning_line: Vec<usize>,
    pub moves: Vec<MoveRecord>,
    pub is_private: bool,
    pub forfeited_by: Option<Identity>,
    /// Identities that currently consent to a rematch.
    pub rematch_votes: BTreeSet<Identity>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set once a rematch has replaced this room.
    pub superseded_by: Option<RoomId>,
    /// Invite alias chosen by the host, as typed.
    pub custom_code: Option<String>,
}

impl Room {
    /// A room waiting for its second player, with the host at `X`.
    pub fn new(
        id: RoomId,
        board_size: BoardSize,
        is_private: bool,
        host: Identity,
        host_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            board: Board::new(board_size),
            players: vec![Player::new(host, host_name, Symbol::X)],
            current_symbol: Symbol::X,
            status: RoomStatus::Waiting,
            winner: None,
            winning_line: Vec::new(),
            moves: Vec::new(),
            is_private,
            forfeited_by: None,
            rematch_votes: BTreeSet::new(),
            created_at: now,
            finished_at: None,
            superseded_by: None,
            custom_code: None,
        }
    }

    /// A room with both seats filled that starts in `playing`.
    ///
    /// Used by matchmaking and rematches. `x` opens.
    pub fn paired(id: RoomId, board_size: BoardSize, x: Player, o: Player, now: DateTime<Utc>) -> Self {
        debug_assert!(x.symbol == Symbol::X && o.symbol == Symbol::O);
        Self {
            id,
            board: Board::new(board_size),
            players: vec![x, o],
            current_symbol: Symbol::X,
            status: RoomStatus::Playing,
            winner: None,
            winning_line: Vec::new(),
            moves: Vec::new(),
            is_private: false,
            forfeited_by: None,
            rematch_votes: BTreeSet::new(),
            created_at: now,
            finished_at: None,
            superseded_by: None,
            custom_code: None,
        }
    }

    pub fn board_size(&self) -> BoardSize {
        self.board.size()
    }

    pub fn with_custom_code(mut self, code: Option<String>) -> Self {
        self.custom_code = code;
        self
    }

    /// The custom code upper-cased, else the id's derived code.
    pub fn invite_code(&self) -> String {
        match &self.custom_code {
            Some(code) => code.to_uppercase(),
            None => self.id.invite_code(),
        }
    }

    pub fn player(&self, identity: &Identity) -> Option<&Player> {
        self.players.iter().find(|p| &p.identity == identity)
    }

    pub fn is_participant(&self, identity: &Identity) -> bool {
        self.player(identity).is_some()
    }

    /// The other seated player, if any.
    pub fn opponent(&self, identity: &Identity) -> Option<&Player> {
        self.players.iter().find(|p| &p.identity != identity)
    }

    pub fn player_with(&self, symbol: Symbol) -> Option<&Player> {
        self.players.iter().find(|p| p.symbol == symbol)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// `true` when no seat belongs to a durable account.
    pub fn all_guests(&self) -> bool {
        self.players.iter().all(|p| p.identity.is_guest())
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// Renders the client view. `connected` answers whether an identity
    /// currently has a live connection associated with this room.
    pub fn snapshot(&self, connected: impl Fn(&Identity) -> bool) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            invite_code: self.invite_code(),
            board_size: self.board_size(),
            board: self.board.cells().to_vec(),
            players: self
                .players
                .iter()
                .map(|p| PlayerView {
                    identity: p.identity.clone(),
                    display_name: p.display_name.clone(),
                    symbol: p.symbol,
                    connected: connected(&p.identity),
                })
                .collect(),
            current_symbol: self.current_symbol,
            status: self.status,
            winner: self.winner,
            winning_line: self.winning_line.clone(),
            moves: self.moves.clone(),
            is_private: self.is_private,
            forfeited_by: self.forfeited_by.clone(),
            rematch_votes: self.rematch_votes.iter().cloned().collect(),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}
