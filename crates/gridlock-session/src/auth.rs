//! Turning credentials into identities.
//!
//! Gridlock does not manage accounts. The [`Authenticator`] trait is the
//! seam to whatever does: it takes a durable token and returns the
//! account behind it. Guests skip the trait entirely and are accepted as
//! declared.

use std::time::Duration;

use gridlock_protocol::{GuestId, Identity, MAX_NAME_LEN, UserId};

use crate::SessionError;

/// The account behind a durable credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
}

/// Validates a durable credential.
///
/// # Example
///
/// ```rust
/// use gridlock_protocol::UserId;
/// use gridlock_session::{Authenticator, SessionError, UserProfile};
///
/// /// Treats the token as the user id. Development only.
/// struct TrustingAuthenticator;
///
/// impl Authenticator for TrustingAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<UserProfile, SessionError> {
///         let id = UserId::new(token).map_err(|e| SessionError::AuthFailed(e.to_string()))?;
///         Ok(UserProfile { display_name: token.to_owned(), id })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the account for `token`.
    ///
    /// # Errors
    /// - `SessionError::AuthFailed` for bad or expired tokens
    /// - `SessionError::Transient` if the backing service is unreachable
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserProfile, SessionError>> + Send;
}

/// Runs the authenticator with a deadline.
///
/// # Errors
/// Whatever the authenticator returns, or `SessionError::Transient` when
/// it does not answer within `timeout`.
pub async fn resolve_identity<A: Authenticator>(
    authenticator: &A,
    token: &str,
    timeout: Duration,
) -> Result<UserProfile, SessionError> {
    match tokio::time::timeout(timeout, authenticator.authenticate(token)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?timeout, "identity lookup timed out");
            Err(SessionError::Transient(format!(
                "identity lookup exceeded {}ms",
                timeout.as_millis()
            )))
        }
    }
}

/// Accepts a client-declared guest.
///
/// An empty display name falls back to the bare guest id.
///
/// # Errors
/// `SessionError::InvalidGuest` for an empty or overlong id or name.
pub fn declare_guest(guest_id: &str, display_name: &str) -> Result<(Identity, String), SessionError> {
    let id = GuestId::declare(guest_id).map_err(|e| SessionError::InvalidGuest(e.to_string()))?;
    let name = display_name.trim();
    if name.len() > MAX_NAME_LEN {
        return Err(SessionError::InvalidGuest(format!(
            "display name longer than {MAX_NAME_LEN} bytes"
        )));
    }
    let name = if name.is_empty() {
        guest_id.trim().to_owned()
    } else {
        name.to_owned()
    };
    Ok((Identity::Guest(id), name))
}
