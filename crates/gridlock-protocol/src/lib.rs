//! Wire protocol for Gridlock.
//!
//! This crate defines the language clients and the coordinator speak:
//!
//! - **Types** ([`Identity`], [`RoomId`], [`Symbol`], [`RoomSnapshot`], …):
//!   the values that appear in messages and in stored documents.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Envelope`]):
//!   intents in, events out.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Coordinator (intents)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, Envelope, ServerMessage, now_millis};
pub use types::{
    BoardSize, ErrorKind, GUEST_PREFIX, GuestId, Identity, MAX_NAME_LEN, MoveRecord,
    PlayerView, Recipient, RoomId, RoomSnapshot, RoomStatus, Symbol, UserId, Winner,
    validate_invite_code,
};
