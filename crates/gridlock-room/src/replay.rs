//! Move-by-move reconstruction of a room's game from its move log.

use chrono::{DateTime, Utc};
use gridlock_protocol::{BoardSize, RoomId, Symbol, Winner};
use serde::Serialize;

use crate::Room;
use crate::board::Cell;

/// The board right after one move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayStep {
    /// 1-based.
    pub move_number: usize,
    pub symbol: Symbol,
    pub position: usize,
    pub timestamp: DateTime<Utc>,
    pub board: Vec<Cell>,
    pub was_winning_move: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSummary {
    pub display_name: String,
    pub symbol: Symbol,
    pub moves: usize,
}

/// Post-game analysis of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    pub room_id: RoomId,
    pub board_size: BoardSize,
    pub total_moves: usize,
    /// Seconds from creation to finish; `None` while unfinished.
    pub duration_secs: Option<i64>,
    pub winner: Option<Winner>,
    pub winning_line: Vec<usize>,
    pub players: Vec<PlayerSummary>,
    pub steps: Vec<ReplayStep>,
}

/// Replays the move log onto an empty board.
///
/// Only the final move of a game won on the board is flagged as the
/// winning move; forfeits and draws have none.
pub fn replay(room: &Room) -> Analysis {
    let size = room.board_size();
    let won_on_board = !room.winning_line.is_empty();
    let last = room.moves.len().checked_sub(1);

    let mut board: Vec<Cell> = vec![None; size.cells()];
    let steps = room
        .moves
        .iter()
        .enumerate()
        .map(|(index, record)| {
            if let Some(cell) = board.get_mut(record.position) {
                *cell = Some(record.symbol);
            }
            ReplayStep {
                move_number: index + 1,
                symbol: record.symbol,
                position: record.position,
                timestamp: record.timestamp,
                board: board.clone(),
                was_winning_move: won_on_board && Some(index) == last,
            }
        })
        .collect();

    Analysis {
        room_id: room.id.clone(),
        board_size: size,
        total_moves: room.moves.len(),
        duration_secs: room
            .finished_at
            .map(|end| (end - room.created_at).num_seconds()),
        winner: room.winner,
        winning_line: room.winning_line.clone(),
        players: room
            .players
            .iter()
            .map(|p| PlayerSummary {
                display_name: p.display_name.clone(),
                symbol: p.symbol,
                moves: room.moves.iter().filter(|m| m.symbol == p.symbol).count(),
            })
            .collect(),
        steps,
    }
}
