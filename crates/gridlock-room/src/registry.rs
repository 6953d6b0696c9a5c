//! Room registry: the in-memory source of truth for every live room.
//!
//! # Locking
//!
//! The id → slot map sits behind a short-lived `RwLock` that is never held
//! while awaiting a room's mutex. Each room has its own `Mutex`; holding
//! it is what makes an intent's read-modify-write atomic. A task holding a
//! room lock may still touch the map, never the other way round.
//!
//! Custom invite codes live in a second map, code → id. When both maps are
//! held the code map is taken first.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gridlock_protocol::{BoardSize, Identity, RoomId, RoomStatus, validate_invite_code};
use tokio::sync::{Mutex, RwLock};

use crate::{Room, RoomError};

/// Shared handle to one room. Lock it for the whole of an intent.
pub type RoomSlot = Arc<Mutex<Room>>;

/// Parameters for a room opened by a host.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub board_size: BoardSize,
    pub is_private: bool,
    /// Custom invite code, kept as an alias of the generated id.
    pub custom_code: Option<String>,
    pub host: Identity,
    pub host_name: String,
}

/// All live rooms, keyed by id.
///
/// Construct one per coordinator; nothing here is global.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, RoomSlot>>,
    /// Upper-cased custom code → the room that last claimed it. Only a
    /// live holder counts.
    codes: RwLock<HashMap<String, RoomId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a room in `waiting` with the host seated at `X`, under a
    /// freshly generated id.
    ///
    /// # Errors
    /// - [`RoomError::InvalidCode`] for a malformed custom code
    /// - [`RoomError::Conflict`] if the custom code is held by a room that
    ///   is still waiting or playing
    pub async fn create(&self, spec: RoomSpec, now: DateTime<Utc>) -> Result<Room, RoomError> {
        let code = spec
            .custom_code
            .as_deref()
            .map(|code| {
                validate_invite_code(code)
                    .map(str::to_owned)
                    .map_err(|e| RoomError::InvalidCode(e.to_string()))
            })
            .transpose()?;

        let room = Room::new(
            RoomId::generate(),
            spec.board_size,
            spec.is_private,
            spec.host,
            spec.host_name,
            now,
        )
        .with_custom_code(code.clone());
        let slot = Arc::new(Mutex::new(room.clone()));

        match &code {
            Some(code) => {
                let key = code_key(code);
                let seen = self.codes.read().await.get(&key).cloned();
                if let Some(holder) = &seen {
                    if self.is_live(holder).await {
                        return Err(in_use(code));
                    }
                }
                // The alias must still name the holder checked above. A
                // change in between is a concurrent create.
                if !self.claim(key, seen.as_ref(), &room.id, slot).await {
                    return Err(in_use(code));
                }
            }
            None => {
                self.rooms.write().await.insert(room.id.clone(), slot);
            }
        }

        tracing::info!(
            room_id = %room.id,
            board_size = %spec.board_size,
            custom_code = ?code,
            "room created"
        );
        Ok(room)
    }

    /// The room currently holding a custom code, compared
    /// case-insensitively.
    ///
    /// `None` unless a live room here holds it.
    pub async fn room_for_code(&self, code: &str) -> Option<RoomId> {
        self.live_holder(&code_key(code.trim())).await
    }

    /// A copy of the room's current state.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no live room has this id.
    pub async fn get(&self, id: &RoomId) -> Result<Room, RoomError> {
        let slot = self
            .slot(id)
            .await
            .ok_or_else(|| RoomError::NotFound(id.clone()))?;
        let room = slot.lock().await.clone();
        Ok(room)
    }

    /// The lock handle for read-modify-write access.
    pub async fn slot(&self, id: &RoomId) -> Option<RoomSlot> {
        self.rooms.read().await.get(id).cloned()
    }

    /// Inserts a room with a fresh slot, replacing any previous slot for
    /// the same id.
    ///
    /// Used for rooms built outside [`create`](Self::create): matchmaking
    /// pairs and rematch successors.
    pub async fn upsert(&self, room: Room) -> RoomSlot {
        let id = room.id.clone();
        let slot = Arc::new(Mutex::new(room));
        self.rooms.write().await.insert(id, Arc::clone(&slot));
        slot
    }

    /// Inserts a restored room unless a live one already exists, and
    /// returns whichever slot is registered afterwards.
    ///
    /// A restored room that still holds its custom code takes the alias
    /// back unless another registered room has claimed it since.
    pub async fn get_or_insert(&self, room: Room) -> RoomSlot {
        let key = room
            .custom_code
            .as_deref()
            .filter(|_| room.status != RoomStatus::Finished && !room.is_superseded())
            .map(code_key);
        let id = room.id.clone();
        let mut codes = self.codes.write().await;
        let mut rooms = self.rooms.write().await;
        let slot = Arc::clone(
            rooms
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(room))),
        );
        if let Some(key) = key {
            if codes.get(&key).is_none_or(|holder| !rooms.contains_key(holder)) {
                codes.insert(key, id);
            }
        }
        slot
    }

    /// Retires a room and frees the custom code it held.
    pub async fn remove(&self, id: &RoomId) -> Option<RoomSlot> {
        let removed = self.rooms.write().await.remove(id);
        if removed.is_some() {
            self.codes.write().await.retain(|_, holder| holder != id);
            tracing::info!(room_id = %id, "room retired");
        }
        removed
    }

    /// Copies of every room matching `predicate`.
    ///
    /// Rooms are inspected one lock at a time, so the result is a series
    /// of per-room consistent views, not a global snapshot.
    pub async fn list(&self, predicate: impl Fn(&Room) -> bool) -> Vec<Room> {
        let slots: Vec<RoomSlot> = self.rooms.read().await.values().cloned().collect();
        let mut matching = Vec::new();
        for slot in slots {
            let room = slot.lock().await;
            if predicate(&room) {
                matching.push(room.clone());
            }
        }
        matching
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// The id behind `key` if that room is still live.
    async fn live_holder(&self, key: &str) -> Option<RoomId> {
        let id = self.codes.read().await.get(key).cloned()?;
        self.is_live(&id).await.then_some(id)
    }

    /// Registered and neither finished nor superseded.
    async fn is_live(&self, id: &RoomId) -> bool {
        let Some(slot) = self.slot(id).await else {
            return false;
        };
        let room = slot.lock().await;
        room.status != RoomStatus::Finished && !room.is_superseded()
    }

    /// Points `key` at `id` and registers `slot`, provided the alias still
    /// names `seen`. Returns whether it did.
    async fn claim(&self, key: String, seen: Option<&RoomId>, id: &RoomId, slot: RoomSlot) -> bool {
        let mut codes = self.codes.write().await;
        if codes.get(&key) != seen {
            return false;
        }
        codes.insert(key, id.clone());
        self.rooms.write().await.insert(id.clone(), slot);
        true
    }
}

fn code_key(code: &str) -> String {
    code.to_uppercase()
}

fn in_use(code: &str) -> RoomError {
    RoomError::Conflict(format!("invite code {code} is in use"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlock_protocol::UserId;

    fn spec(code: Option<&str>) -> RoomSpec {
        RoomSpec {
            board_size: BoardSize::Three,
            is_private: code.is_some(),
            custom_code: code.map(str::to_owned),
            host: Identity::Registered(UserId::new("host").unwrap()),
            host_name: "Host".into(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_returns_waiting_room() {
        let registry = RoomRegistry::new();
        let room = registry.create(spec(None), Utc::now()).await.unwrap();
        let fetched = registry.get(&room.id).await.unwrap();
        assert_eq!(fetched, room);
        assert_eq!(fetched.status, RoomStatus::Waiting);
    }

    #[tokio::test]
    async fn test_create_custom_code_keeps_generated_id() {
        let registry = RoomRegistry::new();
        let room = registry.create(spec(Some("friday")), Utc::now()).await.unwrap();
        assert_ne!(room.id.as_str(), "friday");
        assert_eq!(room.invite_code(), "FRIDAY");
        assert_eq!(registry.room_for_code("Friday").await, Some(room.id.clone()));
        assert_eq!(registry.room_for_code(" FRIDAY ").await, Some(room.id));
    }

    #[tokio::test]
    async fn test_create_custom_code_in_use_conflicts() {
        let registry = RoomRegistry::new();
        registry.create(spec(Some("friday")), Utc::now()).await.unwrap();
        let err = registry
            .create(spec(Some("FRIDAY")), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Conflict(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_custom_code_of_finished_room_gets_fresh_id() {
        let registry = RoomRegistry::new();
        let first = registry.create(spec(Some("friday")), Utc::now()).await.unwrap();
        {
            let slot = registry.slot(&first.id).await.unwrap();
            let mut room = slot.lock().await;
            room.status = RoomStatus::Finished;
        }
        assert_eq!(registry.room_for_code("friday").await, None);

        let second = registry.create(spec(Some("friday")), Utc::now()).await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(registry.get(&first.id).await.unwrap().status, RoomStatus::Finished);
        assert_eq!(registry.room_for_code("friday").await, Some(second.id));
    }

    #[tokio::test]
    async fn test_create_concurrent_same_code_one_wins() {
        let registry = Arc::new(RoomRegistry::new());
        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.create(spec(Some("race")), Utc::now()).await })
            })
            .collect();
        let mut created = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, RoomError::Conflict(_))),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_frees_custom_code() {
        let registry = RoomRegistry::new();
        let room = registry.create(spec(Some("friday")), Utc::now()).await.unwrap();
        registry.remove(&room.id).await;
        assert_eq!(registry.room_for_code("friday").await, None);
        assert!(registry.create(spec(Some("friday")), Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_or_insert_restored_holder_reclaims_code() {
        let registry = RoomRegistry::new();
        let restored = Room::new(
            RoomId::generate(),
            BoardSize::Three,
            true,
            Identity::Registered(UserId::new("host").unwrap()),
            "Host",
            Utc::now(),
        )
        .with_custom_code(Some("lobby".into()));
        registry.get_or_insert(restored.clone()).await;
        assert_eq!(registry.room_for_code("LOBBY").await, Some(restored.id));
        let err = registry.create(spec(Some("lobby")), Utc::now()).await.unwrap_err();
        assert!(matches!(err, RoomError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_malformed_code_rejected() {
        let registry = RoomRegistry::new();
        let err = registry.create(spec(Some("a b")), Utc::now()).await.unwrap_err();
        assert!(matches!(err, RoomError::InvalidCode(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_room_not_found() {
        let registry = RoomRegistry::new();
        let id = RoomId::generate();
        assert_eq!(registry.get(&id).await.unwrap_err(), RoomError::NotFound(id.clone()));
    }

    #[tokio::test]
    async fn test_get_or_insert_keeps_live_room() {
        let registry = RoomRegistry::new();
        let live = registry.create(spec(Some("keep")), Utc::now()).await.unwrap();
        let mut stale = live.clone();
        stale.is_private = false;
        stale.players.clear();
        let slot = registry.get_or_insert(stale).await;
        assert_eq!(slot.lock().await.players.len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let registry = RoomRegistry::new();
        let public = registry.create(spec(None), Utc::now()).await.unwrap();
        registry.create(spec(Some("hidden")), Utc::now()).await.unwrap();

        let listed = registry.list(|r| !r.is_private).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, public.id);

        assert!(registry.remove(&public.id).await.is_some());
        assert!(registry.remove(&public.id).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_registries_are_isolated() {
        let a = RoomRegistry::new();
        let b = RoomRegistry::new();
        let room = a.create(spec(Some("solo")), Utc::now()).await.unwrap();
        assert!(b.get(&room.id).await.is_err());
        assert!(b.is_empty().await);
    }
}
