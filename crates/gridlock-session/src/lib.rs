//! Identity and presence for Gridlock.
//!
//! # What's in here
//!
//! - [`Authenticator`]: the seam to the account system, plus
//!   [`resolve_identity`] which bounds it with a timeout
//! - [`declare_guest`]: client-declared guest identities
//! - [`SessionManager`]: identity ↔ connection ↔ room bindings, with a
//!   reconnection grace period

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, UserProfile, declare_guest, resolve_identity};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{
    ConnectionEntry, Expired, Outbox, Session, SessionConfig, SessionState, Unbound,
};
