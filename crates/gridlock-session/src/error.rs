//! Error types for the session layer.

use gridlock_protocol::ErrorKind;
use gridlock_transport::ConnectionId;

/// Errors raised while establishing who a connection is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The credential was rejected by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The identity collaborator timed out or is down. Reported to the
    /// client as an authentication failure; never downgraded to guest.
    #[error("identity service unavailable: {0}")]
    Transient(String),

    /// A guest declaration that cannot be accepted.
    #[error("invalid guest declaration: {0}")]
    InvalidGuest(String),

    /// The connection has not authenticated yet.
    #[error("{0} is not authenticated")]
    NotAuthenticated(ConnectionId),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthFailed(_) | Self::Transient(_) | Self::NotAuthenticated(_) => {
                ErrorKind::Authentication
            }
            Self::InvalidGuest(_) => ErrorKind::BadRequest,
        }
    }
}
