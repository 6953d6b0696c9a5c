//! Contracts for the durable collaborators.
//!
//! The coordinator never talks to a database directly. It is handed
//! something that implements these traits and calls it through the
//! [`Synchronizer`](crate::Synchronizer), which bounds every call with a
//! timeout.

use std::future::Future;

use gridlock_protocol::{RoomId, UserId};
use gridlock_room::{StatsDelta, UserStats};

use crate::{RoomDocument, StoreError};

/// Key-value storage for room documents.
pub trait RoomStore: Send + Sync + 'static {
    /// Writes the whole document under its room id, replacing any
    /// previous version.
    fn save_room(&self, document: &RoomDocument)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads a document back. `Ok(None)` if nothing is stored under `id`.
    fn load_room(
        &self,
        id: &RoomId,
    ) -> impl Future<Output = Result<Option<RoomDocument>, StoreError>> + Send;

    /// The waiting or playing room whose custom code matches `code`,
    /// compared case-insensitively.
    fn find_room_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<RoomDocument>, StoreError>> + Send;

    /// Every finished room `user` was seated in, most recently finished
    /// first.
    fn finished_rooms_for(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<RoomDocument>, StoreError>> + Send;
}

/// Account-side data the coordinator updates but does not own.
pub trait UserStore: Send + Sync + 'static {
    fn set_online(
        &self,
        user: &UserId,
        online: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Applies one game result and returns the updated totals.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for an unknown user.
    fn apply_stats(
        &self,
        user: &UserId,
        delta: StatsDelta,
    ) -> impl Future<Output = Result<UserStats, StoreError>> + Send;

    /// # Errors
    /// [`StoreError::NotFound`] for an unknown user.
    fn stats(&self, user: &UserId) -> impl Future<Output = Result<UserStats, StoreError>> + Send;
}

/// Both collaborators behind one value.
pub trait Store: RoomStore + UserStore {}

impl<T: RoomStore + UserStore> Store for T {}
