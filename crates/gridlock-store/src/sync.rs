//! Best-effort mirroring of in-memory state to the durable collaborators.
//!
//! The registry is always the source of truth. Every call here is bounded
//! by the store timeout. Writes log and swallow failures so that a slow or
//! broken store never fails an intent. Reads that gate a decision, such as
//! [`Synchronizer::code_holder`], return the error instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gridlock_protocol::{Identity, RoomId, UserId};
use gridlock_room::{Room, StatsDelta, UserStats};

use crate::{RoomDocument, Store, StoreError};

/// What [`Synchronizer::persist_room`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Written,
    /// Every seat is a guest.
    Skipped,
    /// The store failed or timed out; already logged.
    Failed,
}

/// Writes rooms, stats, and presence through a [`Store`].
pub struct Synchronizer<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: Store> Synchronizer<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Writes the room's document unless every seat is a guest.
    pub async fn persist_room(&self, room: &Room) -> Persisted {
        let Some(document) = RoomDocument::from_room(room) else {
            tracing::debug!(room_id = %room.id, "all-guest room, not persisted");
            return Persisted::Skipped;
        };
        match self.bounded("save_room", self.store.save_room(&document)).await {
            Ok(()) => {
                tracing::debug!(room_id = %room.id, status = %room.status, "room persisted");
                Persisted::Written
            }
            Err(e) => {
                tracing::warn!(room_id = %room.id, error = %e, "room write failed");
                Persisted::Failed
            }
        }
    }

    /// Applies each delta. Failures for one user do not stop the rest.
    pub async fn record_stats(&self, deltas: &[(UserId, StatsDelta)]) {
        for (user, delta) in deltas {
            match self
                .bounded("apply_stats", self.store.apply_stats(user, *delta))
                .await
            {
                Ok(stats) => {
                    tracing::debug!(user_id = %user, ?delta, wins = stats.wins, "stats recorded");
                }
                Err(e) => tracing::warn!(user_id = %user, error = %e, "stats update failed"),
            }
        }
    }

    /// Marks a registered identity online or offline. Guests are ignored.
    pub async fn set_presence(&self, identity: &Identity, online: bool) {
        let Some(user) = identity.user_id() else {
            return;
        };
        if let Err(e) = self
            .bounded("set_online", self.store.set_online(user, online))
            .await
        {
            tracing::warn!(user_id = %user, online, error = %e, "presence update failed");
        }
    }

    /// Loads a room that is not in the registry.
    ///
    /// `None` when the store has no such document, fails, or holds a
    /// document that cannot be rebuilt.
    pub async fn restore_room(&self, id: &RoomId) -> Option<Room> {
        let document = match self.bounded("load_room", self.store.load_room(id)).await {
            Ok(document) => document?,
            Err(e) => {
                tracing::warn!(room_id = %id, error = %e, "room load failed");
                return None;
            }
        };
        match document.into_room() {
            Ok(room) => {
                tracing::info!(room_id = %id, status = %room.status, "room restored from store");
                Some(room)
            }
            Err(e) => {
                tracing::warn!(room_id = %id, error = %e, "stored room unusable");
                None
            }
        }
    }

    /// The stored room that still holds custom `code`.
    ///
    /// Unlike [`restore_room`](Self::restore_room) this surfaces failures.
    ///
    /// # Errors
    /// Whatever the store reports, including [`StoreError::Timeout`], and
    /// [`StoreError::Corrupt`] for a holder that cannot be rebuilt.
    pub async fn code_holder(&self, code: &str) -> Result<Option<Room>, StoreError> {
        let found = self
            .bounded("find_room_by_code", self.store.find_room_by_code(code))
            .await?;
        found.map(RoomDocument::into_room).transpose()
    }

    /// Finished room documents for `user`, newest first.
    ///
    /// # Errors
    /// Whatever the store reports, including [`StoreError::Timeout`].
    pub async fn finished_rooms(&self, user: &UserId) -> Result<Vec<RoomDocument>, StoreError> {
        self.bounded("finished_rooms_for", self.store.finished_rooms_for(user))
            .await
    }

    /// A user's stats, with errors surfaced to the caller.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for an unknown user, or whatever the store
    /// reports, including [`StoreError::Timeout`].
    pub async fn stats(&self, user: &UserId) -> Result<UserStats, StoreError> {
        self.bounded("stats", self.store.stats(user)).await
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout: self.timeout,
            }),
        }
    }
}
