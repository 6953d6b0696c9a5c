//! Core value types shared by every Gridlock layer.
//!
//! Everything here travels on the wire or into the durable store, so the
//! serde attributes are part of the contract: changing a rename here
//! changes what clients parse.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Prefix reserved for guest identities.
///
/// Registered ids may not start with it, which keeps the two id spaces
/// disjoint even when both end up as plain strings in logs or keys.
pub const GUEST_PREFIX: &str = "guest:";

/// Longest display name or guest id accepted from a client.
pub const MAX_NAME_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A durable user id issued by the account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps an account id.
    ///
    /// # Errors
    /// Rejects empty ids and ids that collide with the guest namespace.
    pub fn new(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage("user id is empty".into()));
        }
        if raw.starts_with(GUEST_PREFIX) {
            return Err(ProtocolError::InvalidMessage(format!(
                "user id may not start with {GUEST_PREFIX:?}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ephemeral, client-declared guest id. Always carries [`GUEST_PREFIX`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(String);

impl GuestId {
    /// Accepts a guest id as declared by a client.
    ///
    /// The value is trimmed and namespaced. Declaring an id that already
    /// carries the prefix is accepted as-is, so a client can echo back the
    /// id it was given.
    ///
    /// # Errors
    /// Rejects empty or overlong declarations.
    pub fn declare(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        let bare = trimmed.strip_prefix(GUEST_PREFIX).unwrap_or(trimmed);
        if bare.is_empty() {
            return Err(ProtocolError::InvalidMessage("guest id is empty".into()));
        }
        if bare.len() > MAX_NAME_LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "guest id longer than {MAX_NAME_LEN} bytes"
            )));
        }
        Ok(Self(format!("{GUEST_PREFIX}{bare}")))
    }

    /// A fresh guest id nobody can declare by accident.
    ///
    /// Used for guest seats of rooms restored from durable storage, where
    /// the original guest id was never written.
    pub fn restored() -> Self {
        Self(format!("{GUEST_PREFIX}restored-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is acting: a durable account or a guest.
///
/// All guest/registered branching happens by matching on this enum.
///
/// ```json
/// { "kind": "registered", "id": "u-17" }
/// { "kind": "guest", "id": "guest:owl" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Registered(UserId),
    Guest(GuestId),
}

impl Identity {
    pub fn is_guest(&self) -> bool {
        matches!(self, Self::Guest(_))
    }

    /// The durable account id, if there is one.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Registered(id) => Some(id),
            Self::Guest(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered(id) => fmt::Display::fmt(id, f),
            Self::Guest(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl From<UserId> for Identity {
    fn from(id: UserId) -> Self {
        Self::Registered(id)
    }
}

impl From<GuestId> for Identity {
    fn from(id: GuestId) -> Self {
        Self::Guest(id)
    }
}

/// The key of a room: a UUID v4 generated at creation and never reused.
///
/// Custom invite codes are aliases kept beside the id, not ids themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Length of the derived invite code.
    pub const INVITE_CODE_LEN: usize = 8;

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps a caller-chosen id, validated like an invite code.
    ///
    /// # Errors
    /// See [`validate_invite_code`].
    pub fn custom(code: &str) -> Result<Self, ProtocolError> {
        validate_invite_code(code).map(|code| Self(code.to_owned()))
    }

    /// Short shareable alias: the first eight characters, upper-cased.
    ///
    /// Not guaranteed unique; lookups fall back to a prefix scan.
    pub fn invite_code(&self) -> String {
        self.0
            .chars()
            .take(Self::INVITE_CODE_LEN)
            .collect::<String>()
            .to_uppercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trims a custom invite code and checks it.
///
/// # Errors
/// Rejects codes that are empty, overlong, or contain whitespace.
pub fn validate_invite_code(code: &str) -> Result<&str, ProtocolError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ProtocolError::InvalidMessage("invite code is empty".into()));
    }
    if code.len() > MAX_NAME_LEN || code.chars().any(char::is_whitespace) {
        return Err(ProtocolError::InvalidMessage(format!(
            "invalid invite code {code:?}"
        )));
    }
    Ok(code)
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Game vocabulary
// ---------------------------------------------------------------------------

/// A mark on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("X"),
            Self::O => f.write_str("O"),
        }
    }
}

/// Supported board edge lengths. Serialized as the plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BoardSize {
    Three,
    Four,
    Five,
}

impl BoardSize {
    pub const ALL: [BoardSize; 3] = [Self::Three, Self::Four, Self::Five];

    /// Edge length.
    pub fn get(self) -> usize {
        match self {
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }

    /// Number of cells on the board.
    pub fn cells(self) -> usize {
        self.get() * self.get()
    }
}

impl TryFrom<u8> for BoardSize {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            5 => Ok(Self::Five),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unsupported board size {other}"
            ))),
        }
    }
}

impl From<BoardSize> for u8 {
    fn from(size: BoardSize) -> Self {
        // Edge lengths are at most 5.
        size.get() as u8
    }
}

impl fmt::Display for BoardSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{0}x{0}", self.get())
    }
}

/// Room lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Playing => f.write_str("playing"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    X,
    O,
    #[serde(rename = "draw")]
    Draw,
}

impl Winner {
    /// The winning symbol, or `None` for a draw.
    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Self::X => Some(Symbol::X),
            Self::O => Some(Symbol::O),
            Self::Draw => None,
        }
    }
}

impl From<Symbol> for Winner {
    fn from(symbol: Symbol) -> Self {
        match symbol {
            Symbol::X => Self::X,
            Symbol::O => Self::O,
        }
    }
}

/// One entry of a room's append-only move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub symbol: Symbol,
    pub position: usize,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A seat as clients see it. `connected` is computed from the live
/// connection bindings at the moment the snapshot is taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub identity: Identity,
    pub display_name: String,
    pub symbol: Symbol,
    pub connected: bool,
}

/// The full authoritative state of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub invite_code: String,
    pub board_size: BoardSize,
    pub board: Vec<Option<Symbol>>,
    pub players: Vec<PlayerView>,
    pub current_symbol: Symbol,
    pub status: RoomStatus,
    pub winner: Option<Winner>,
    pub winning_line: Vec<usize>,
    pub moves: Vec<MoveRecord>,
    pub is_private: bool,
    pub forfeited_by: Option<Identity>,
    pub rematch_votes: Vec<Identity>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who an event produced by a transition is addressed to. Resolved
/// against the connections currently associated with the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connection bound to the room.
    All,
    /// Only this identity's connection.
    Player(Identity),
    /// Everyone bound to the room except this identity.
    AllExcept(Identity),
}

impl Recipient {
    pub fn includes(&self, identity: &Identity) -> bool {
        match self {
            Self::All => true,
            Self::Player(target) => target == identity,
            Self::AllExcept(excluded) => excluded != identity,
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// The error taxonomy exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Authentication,
    NotAuthorized,
    NotFound,
    Conflict,
    RoomFull,
    NotYourTurn,
    InvalidMove,
    InvalidState,
    Transient,
}

impl ErrorKind {
    /// HTTP-style status code sent alongside the kind.
    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Authentication => 401,
            Self::NotAuthorized => 403,
            Self::NotFound => 404,
            Self::Conflict | Self::RoomFull => 409,
            Self::NotYourTurn | Self::InvalidMove | Self::InvalidState => 422,
            Self::Transient => 503,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
