//! Error types for the room layer.

use gridlock_protocol::{ErrorKind, Identity, RoomId, RoomStatus, Symbol};

/// Why a room or queue operation was rejected.
///
/// A rejected intent never changes room state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist, or was superseded by a rematch.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// A custom code is taken, or the identity is already queued or seated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A custom invite code that cannot be used as a room id.
    #[error("invalid invite code: {0}")]
    InvalidCode(String),

    /// No private waiting room answers to this invite code.
    #[error("no open private room for invite code {0}")]
    InviteNotFound(String),

    /// Both seats are taken.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The mover's symbol is not the one to play.
    #[error("not your turn: {expected} to play")]
    NotYourTurn { expected: Symbol },

    /// Position out of bounds or already occupied.
    #[error("invalid move at position {position}: {reason}")]
    InvalidMove { position: usize, reason: &'static str },

    /// The identity is not a participant of the room.
    #[error("{identity} is not a player in room {room_id}")]
    NotAuthorized { identity: Identity, room_id: RoomId },

    /// The room's status does not allow this intent.
    #[error("room {room_id} is {status}, cannot {action}")]
    InvalidState {
        room_id: RoomId,
        status: RoomStatus,
        action: &'static str,
    },
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidCode(_) => ErrorKind::BadRequest,
            Self::InviteNotFound(_) => ErrorKind::NotFound,
            Self::RoomFull(_) => ErrorKind::RoomFull,
            Self::NotYourTurn { .. } => ErrorKind::NotYourTurn,
            Self::InvalidMove { .. } => ErrorKind::InvalidMove,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }
}
