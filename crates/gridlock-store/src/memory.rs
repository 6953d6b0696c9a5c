//! In-memory implementation of every collaborator.
//!
//! Room documents are kept as serialized JSON so that whatever goes
//! through [`MemoryStore`] has survived the same encode/decode a real
//! document store would apply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use gridlock_protocol::{RoomId, RoomStatus, UserId};
use gridlock_room::{StatsDelta, UserStats};
use gridlock_session::{Authenticator, SessionError, UserProfile};
use rand::Rng;
use tokio::sync::Mutex;

use crate::{RoomDocument, RoomStore, StoreError, UserStore};

#[derive(Debug, Clone)]
struct UserRecord {
    display_name: String,
    online: bool,
    stats: UserStats,
}

#[derive(Debug, Default)]
struct Inner {
    rooms: HashMap<RoomId, String>,
    users: HashMap<UserId, UserRecord>,
    tokens: HashMap<String, UserId>,
    room_writes: usize,
}

/// Accounts, tokens, stats, and room documents in one process.
///
/// ```rust
/// use gridlock_store::MemoryStore;
///
/// let store = MemoryStore::new();
/// assert!(!store.is_failing());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account and returns a fresh opaque token for it.
    ///
    /// Registering an existing id issues an additional token and keeps
    /// its stats.
    pub async fn register_user(&self, id: UserId, display_name: impl Into<String>) -> String {
        let token = generate_token();
        let mut inner = self.inner.lock().await;
        let display_name = display_name.into();
        inner
            .users
            .entry(id.clone())
            .and_modify(|u| u.display_name.clone_from(&display_name))
            .or_insert_with(|| UserRecord {
                display_name,
                online: false,
                stats: UserStats::default(),
            });
        inner.tokens.insert(token.clone(), id.clone());
        tracing::debug!(user_id = %id, "user registered");
        token
    }

    /// While set, every call fails with [`StoreError::Unavailable`] and
    /// authentication fails as transient.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }

    /// Number of successful room writes so far.
    pub async fn room_writes(&self) -> usize {
        self.inner.lock().await.room_writes
    }

    pub async fn is_online(&self, id: &UserId) -> bool {
        self.inner
            .lock()
            .await
            .users
            .get(id)
            .is_some_and(|u| u.online)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.is_failing() {
            Err(StoreError::Unavailable("memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

impl RoomStore for MemoryStore {
    async fn save_room(&self, document: &RoomDocument) -> Result<(), StoreError> {
        self.check()?;
        let encoded = serde_json::to_string(document)?;
        let mut inner = self.inner.lock().await;
        inner.rooms.insert(document.room_id.clone(), encoded);
        inner.room_writes += 1;
        Ok(())
    }

    async fn load_room(&self, id: &RoomId) -> Result<Option<RoomDocument>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().await;
        match inner.rooms.get(id) {
            Some(encoded) => Ok(Some(serde_json::from_str(encoded)?)),
            None => Ok(None),
        }
    }

    async fn find_room_by_code(&self, code: &str) -> Result<Option<RoomDocument>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().await;
        for encoded in inner.rooms.values() {
            let document: RoomDocument = serde_json::from_str(encoded)?;
            if document.holds_code(code) {
                return Ok(Some(document));
            }
        }
        Ok(None)
    }

    async fn finished_rooms_for(&self, user: &UserId) -> Result<Vec<RoomDocument>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().await;
        let mut finished = Vec::new();
        for encoded in inner.rooms.values() {
            let document: RoomDocument = serde_json::from_str(encoded)?;
            if document.status == RoomStatus::Finished && document.has_player(user) {
                finished.push(document);
            }
        }
        finished.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        Ok(finished)
    }
}

impl UserStore for MemoryStore {
    async fn set_online(&self, user: &UserId, online: bool) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let record = inner
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(format!("user {user}")))?;
        record.online = online;
        Ok(())
    }

    async fn apply_stats(&self, user: &UserId, delta: StatsDelta) -> Result<UserStats, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let record = inner
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(format!("user {user}")))?;
        record.stats.apply(delta);
        Ok(record.stats)
    }

    async fn stats(&self, user: &UserId) -> Result<UserStats, StoreError> {
        self.check()?;
        self.inner
            .lock()
            .await
            .users
            .get(user)
            .map(|u| u.stats)
            .ok_or_else(|| StoreError::NotFound(format!("user {user}")))
    }
}

impl Authenticator for MemoryStore {
    async fn authenticate(&self, token: &str) -> Result<UserProfile, SessionError> {
        if self.is_failing() {
            return Err(SessionError::Transient("memory store switched off".into()));
        }
        let inner = self.inner.lock().await;
        let id = inner
            .tokens
            .get(token)
            .ok_or_else(|| SessionError::AuthFailed("unknown token".into()))?;
        let display_name = inner
            .users
            .get(id)
            .map(|u| u.display_name.clone())
            .unwrap_or_else(|| id.to_string());
        Ok(UserProfile {
            id: id.clone(),
            display_name,
        })
    }
}

/// A random 32-character hex token (128 bits).
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
