//! The persisted form of a room.
//!
//! Guests have no durable identity, so a guest seat is written as a null
//! identity with `is_guest = true`. Reading the document back gives each
//! guest seat a fresh unguessable id, which means nobody can reclaim it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use gridlock_protocol::{
    BoardSize, GuestId, Identity, MoveRecord, RoomId, RoomStatus, Symbol, UserId, Winner,
};
use gridlock_room::{Board, Player, Room};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// One seat as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatDocument {
    /// `None` for guests.
    pub identity: Option<UserId>,
    pub is_guest: bool,
    pub display_name: String,
    pub symbol: Symbol,
}

/// A room as written to the document store, keyed by `room_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDocument {
    pub room_id: RoomId,
    pub board_size: BoardSize,
    pub board: Vec<Option<Symbol>>,
    pub players: Vec<SeatDocument>,
    pub current_symbol: Symbol,
    pub status: RoomStatus,
    pub winner: Option<Winner>,
    pub winning_line: Vec<usize>,
    /// Authoritative for replay.
    pub moves: Vec<MoveRecord>,
    pub is_private: bool,
    /// Seat of the forfeiting player. Stored by symbol so it survives the
    /// guest-id rewrite on restore.
    pub forfeited_by: Option<Symbol>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub superseded_by: Option<RoomId>,
    /// Invite alias while the room holds it. Never the key.
    #[serde(default)]
    pub custom_code: Option<String>,
}

impl RoomDocument {
    /// Builds the document for `room`, or `None` when every seat is a
    /// guest and nothing may be written.
    pub fn from_room(room: &Room) -> Option<Self> {
        if room.all_guests() {
            return None;
        }
        let players = room
            .players
            .iter()
            .map(|p| SeatDocument {
                identity: p.identity.user_id().cloned(),
                is_guest: p.identity.is_guest(),
                display_name: p.display_name.clone(),
                symbol: p.symbol,
            })
            .collect();
        let forfeited_by = room
            .forfeited_by
            .as_ref()
            .and_then(|who| room.player(who))
            .map(|p| p.symbol);

        Some(Self {
            room_id: room.id.clone(),
            board_size: room.board_size(),
            board: room.board.cells().to_vec(),
            players,
            current_symbol: room.current_symbol,
            status: room.status,
            winner: room.winner,
            winning_line: room.winning_line.clone(),
            moves: room.moves.clone(),
            is_private: room.is_private,
            forfeited_by,
            created_at: room.created_at,
            finished_at: room.finished_at,
            superseded_by: room.superseded_by.clone(),
            custom_code: room.custom_code.clone(),
        })
    }

    /// Whether this document still claims `code` as its invite alias.
    ///
    /// Finished and superseded rooms have released their code.
    pub fn holds_code(&self, code: &str) -> bool {
        self.status != RoomStatus::Finished
            && self.superseded_by.is_none()
            && self
                .custom_code
                .as_deref()
                .is_some_and(|held| held.to_uppercase() == code.to_uppercase())
    }

    /// Whether `user` sat in this room.
    pub fn has_player(&self, user: &UserId) -> bool {
        self.players.iter().any(|seat| seat.identity.as_ref() == Some(user))
    }

    /// Rebuilds the live room.
    ///
    /// # Errors
    /// [`StoreError::Corrupt`] if the board length does not match the
    /// size, or a registered seat has no identity.
    pub fn into_room(self) -> Result<Room, StoreError> {
        let board = Board::from_cells(self.board_size, self.board).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "room {} board does not have {} cells",
                self.room_id,
                self.board_size.cells()
            ))
        })?;

        let mut players = Vec::with_capacity(self.players.len());
        for seat in self.players {
            let identity = match (seat.identity, seat.is_guest) {
                (_, true) => Identity::Guest(GuestId::restored()),
                (Some(user), false) => Identity::Registered(user),
                (None, false) => {
                    return Err(StoreError::Corrupt(format!(
                        "room {} has a registered seat without an identity",
                        self.room_id
                    )));
                }
            };
            players.push(Player::new(identity, seat.display_name, seat.symbol));
        }

        let forfeited_by = self.forfeited_by.and_then(|symbol| {
            players
                .iter()
                .find(|p| p.symbol == symbol)
                .map(|p| p.identity.clone())
        });

        Ok(Room {
            id: self.room_id,
            board,
            players,
            current_symbol: self.current_symbol,
            status: self.status,
            winner: self.winner,
            winning_line: self.winning_line,
            moves: self.moves,
            is_private: self.is_private,
            forfeited_by,
            rematch_votes: BTreeSet::new(),
            created_at: self.created_at,
            finished_at: self.finished_at,
            superseded_by: self.superseded_by,
            custom_code: self.custom_code,
        })
    }
}
