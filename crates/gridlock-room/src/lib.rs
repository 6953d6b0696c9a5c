//! Rooms for Gridlock.
//!
//! # Key types
//!
//! - [`board`]: pure win/draw detection
//! - [`Room`]: the match aggregate
//! - [`apply`] / [`Intent`] / [`Transition`]: the state machine
//! - [`RoomRegistry`]: all live rooms, one lock per room
//! - [`MatchmakingQueue`]: FIFO pairing by board size
//! - [`UserStats`] / [`StatsDelta`]: result bookkeeping
//! - [`replay`]: post-game analysis

pub mod board;
mod error;
mod machine;
mod matchmaking;
mod registry;
mod replay;
mod room;
mod stats;

pub use board::Board;
pub use error::RoomError;
pub use machine::{Intent, RoomEvent, Transition, apply};
pub use matchmaking::{MatchmakingQueue, Ticket};
pub use registry::{RoomRegistry, RoomSlot, RoomSpec};
pub use replay::{Analysis, PlayerSummary, ReplayStep, replay};
pub use room::{MAX_PLAYERS, Player, Room};
pub use stats::{GameResult, StatsDelta, UserStats, outcome};
