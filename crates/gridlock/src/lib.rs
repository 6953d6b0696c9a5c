//! # Gridlock
//!
//! Real-time coordinator for turn-based grid games: tic-tac-toe on 3×3,
//! 4×4 and 5×5 boards across many concurrent rooms.
//!
//! The [`Coordinator`] owns authoritative room state. Connections reach
//! it through [`GridlockServer`] over WebSockets; an HTTP layer can call
//! its request/response methods ([`Coordinator::room_snapshot`],
//! [`Coordinator::list_public_rooms`], …) directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gridlock::prelude::*;
//!
//! # async fn run() -> Result<(), GridlockError> {
//! let store = Arc::new(MemoryStore::new());
//! let server = GridlockServer::<MemoryStore, MemoryStore, JsonCodec>::builder()
//!     .bind("127.0.0.1:8080")
//!     .build(Arc::clone(&store), store)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod handler;
mod queries;
mod server;

pub use config::{CoordinatorConfig, ServerConfig};
pub use coordinator::{Actor, Coordinator};
pub use error::GridlockError;
pub use queries::{
    BoardSizeWins, MAX_PAGE_LIMIT, PrivateRoom, RECENT_GAMES, RecentGame, RoomPage, StatsOverview,
    StatsSummary,
};
pub use server::{GridlockServer, GridlockServerBuilder};

/// Everything needed to run a server or drive a coordinator.
pub mod prelude {
    pub use crate::{
        Actor, Coordinator, CoordinatorConfig, GridlockError, GridlockServer,
        GridlockServerBuilder, PrivateRoom, RecentGame, RoomPage, ServerConfig, StatsOverview,
        StatsSummary,
    };
    pub use gridlock_protocol::{
        BoardSize, ClientMessage, Codec, Envelope, ErrorKind, GuestId, Identity, JsonCodec,
        Recipient, RoomId, RoomSnapshot, RoomStatus, ServerMessage, Symbol, UserId, Winner,
    };
    pub use gridlock_room::{Analysis, GameResult, StatsDelta, UserStats};
    pub use gridlock_session::{Authenticator, SessionConfig, SessionError, UserProfile};
    pub use gridlock_store::{MemoryStore, RoomDocument, RoomStore, Store, StoreError, UserStore};
    pub use gridlock_transport::ConnectionId;
}
