//! Unified error type for Gridlock.

use gridlock_protocol::{ErrorKind, ProtocolError};
use gridlock_room::RoomError;
use gridlock_session::SessionError;
use gridlock_store::StoreError;
use gridlock_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` conversions let `?` lift sub-crate errors, and
/// [`kind`](Self::kind) maps any of them onto the wire taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum GridlockError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A malformed configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GridlockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transient,
            Self::Protocol(_) | Self::Config(_) => ErrorKind::BadRequest,
            Self::Session(e) => e.kind(),
            Self::Room(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}
