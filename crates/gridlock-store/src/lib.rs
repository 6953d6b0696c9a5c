//! Durable storage for Gridlock.
//!
//! - [`RoomStore`] / [`UserStore`]: what the coordinator needs from a
//!   durable store
//! - [`RoomDocument`]: the persisted room, with guests as null identities
//! - [`Synchronizer`]: bounded, best-effort writes
//! - [`MemoryStore`]: every collaborator in memory, including an
//!   [`Authenticator`](gridlock_session::Authenticator)

mod document;
mod error;
mod memory;
mod store;
mod sync;

pub use document::{RoomDocument, SeatDocument};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{RoomStore, Store, UserStore};
pub use sync::{Persisted, Synchronizer};
