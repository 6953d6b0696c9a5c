//! Error types for the storage layer.

use std::time::Duration;

use gridlock_protocol::ErrorKind;

/// Errors raised by a storage collaborator or while translating its
/// documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing service refused or dropped the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within the store timeout.
    #[error("store call `{op}` exceeded {}ms", .timeout.as_millis())]
    Timeout { op: &'static str, timeout: Duration },

    /// No record under that key.
    #[error("{0} not found")]
    NotFound(String),

    /// A stored document cannot be turned back into a room.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_)
            | Self::Timeout { .. }
            | Self::Corrupt(_)
            | Self::Serialization(_) => ErrorKind::Transient,
        }
    }
}
