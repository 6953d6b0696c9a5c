//! Request/response reads and the private-room endpoints an HTTP layer
//! calls directly on the coordinator.
//!
//! None of these need a live connection. Reads fall back to the durable
//! store without re-registering what they load; invite resolution is the
//! exception, since a join follows it.

use chrono::{DateTime, Utc};
use gridlock_protocol::{
    BoardSize, Identity, RoomId, RoomSnapshot, RoomStatus, UserId, Winner, validate_invite_code,
};
use gridlock_room::{Analysis, GameResult, Room, RoomError, RoomSpec, UserStats, replay};
use gridlock_session::Authenticator;
use gridlock_store::{RoomDocument, Store};
use serde::Serialize;

use crate::coordinator::snapshot;
use crate::{Coordinator, GridlockError};

/// Largest page [`Coordinator::list_public_rooms`] returns.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Games listed in [`StatsOverview::recent_games`].
pub const RECENT_GAMES: usize = 10;

/// One page of public waiting rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomPage {
    pub rooms: Vec<RoomSnapshot>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

/// A private room and the code to share for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateRoom {
    pub room_id: RoomId,
    pub invite_code: String,
    pub room: RoomSnapshot,
}

/// A user's totals with the derived figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub user_id: UserId,
    #[serde(flatten)]
    pub stats: UserStats,
    pub total_games: u32,
    pub win_rate: f64,
}

/// A user's record rebuilt from their finished rooms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsOverview {
    pub user_id: UserId,
    pub total_games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// One entry per board size, smallest first.
    pub wins_by_board_size: Vec<BoardSizeWins>,
    /// `None` until a game with a finish time exists.
    pub average_duration_ms: Option<f64>,
    pub longest_duration_ms: Option<i64>,
    pub shortest_duration_ms: Option<i64>,
    /// Newest first, at most [`RECENT_GAMES`].
    pub recent_games: Vec<RecentGame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardSizeWins {
    pub board_size: BoardSize,
    pub wins: u32,
}

/// One finished game from the user's side of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentGame {
    pub room_id: RoomId,
    pub board_size: BoardSize,
    /// The other seat's display name, `"Unknown"` when it was never
    /// filled.
    pub opponent: String,
    pub result: GameResult,
    pub total_moves: usize,
    pub forfeited: bool,
    pub created_at: DateTime<Utc>,
    pub duration_ms: Option<i64>,
}

impl StatsOverview {
    /// Folds `documents`, newest first, into an overview for `user`.
    /// Rooms without a winner or without the user are ignored.
    pub fn from_documents(user: &UserId, documents: &[RoomDocument]) -> Self {
        let mut overview = Self {
            user_id: user.clone(),
            total_games: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            wins_by_board_size: BoardSize::ALL
                .iter()
                .map(|&board_size| BoardSizeWins { board_size, wins: 0 })
                .collect(),
            average_duration_ms: None,
            longest_duration_ms: None,
            shortest_duration_ms: None,
            recent_games: Vec::new(),
        };
        let mut durations = Vec::new();

        for document in documents {
            let Some(game) = recent_game(user, document) else {
                continue;
            };
            overview.total_games += 1;
            match game.result {
                GameResult::Win => {
                    overview.wins += 1;
                    if let Some(entry) = overview
                        .wins_by_board_size
                        .iter_mut()
                        .find(|entry| entry.board_size == game.board_size)
                    {
                        entry.wins += 1;
                    }
                }
                GameResult::Loss => overview.losses += 1,
                GameResult::Draw => overview.draws += 1,
            }
            durations.extend(game.duration_ms);
            if overview.recent_games.len() < RECENT_GAMES {
                overview.recent_games.push(game);
            }
        }

        if !durations.is_empty() {
            let total: i64 = durations.iter().sum();
            overview.average_duration_ms = Some(total as f64 / durations.len() as f64);
            overview.longest_duration_ms = durations.iter().copied().max();
            overview.shortest_duration_ms = durations.iter().copied().min();
        }
        overview
    }
}

fn recent_game(user: &UserId, document: &RoomDocument) -> Option<RecentGame> {
    let seat = document
        .players
        .iter()
        .find(|seat| seat.identity.as_ref() == Some(user))?;
    let result = match document.winner? {
        Winner::Draw => GameResult::Draw,
        winner if winner.symbol() == Some(seat.symbol) => GameResult::Win,
        _ => GameResult::Loss,
    };
    let opponent = document
        .players
        .iter()
        .find(|other| other.symbol != seat.symbol)
        .map_or_else(|| "Unknown".to_owned(), |other| other.display_name.clone());
    Some(RecentGame {
        room_id: document.room_id.clone(),
        board_size: document.board_size,
        opponent,
        result,
        total_moves: document.moves.len(),
        forfeited: document.forfeited_by.is_some(),
        created_at: document.created_at,
        duration_ms: document
            .finished_at
            .map(|finished| finished.signed_duration_since(document.created_at).num_milliseconds()),
    })
}

impl<A: Authenticator, S: Store> Coordinator<A, S> {
    /// The room as `requester` may see it.
    ///
    /// # Errors
    /// - [`RoomError::NotFound`] if neither the registry nor the store
    ///   has it
    /// - [`RoomError::NotAuthorized`] for a private room the requester
    ///   does not play in
    pub async fn room_snapshot(
        &self,
        requester: &Identity,
        room_id: &RoomId,
    ) -> Result<RoomSnapshot, GridlockError> {
        let room = self.fetch(room_id).await?;
        if room.is_private && !room.is_participant(requester) {
            return Err(not_authorized(requester, room_id));
        }
        Ok(self.render_snapshot(&room).await)
    }

    /// Public rooms still waiting for an opponent, newest first.
    ///
    /// `page` is 1-based; 0 is read as 1. `limit` is clamped to
    /// `1..=MAX_PAGE_LIMIT`.
    pub async fn list_public_rooms(
        &self,
        board_size: Option<BoardSize>,
        page: usize,
        limit: usize,
    ) -> RoomPage {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let mut rooms = self
            .registry
            .list(|room| {
                !room.is_private
                    && room.status == RoomStatus::Waiting
                    && board_size.is_none_or(|size| room.board_size() == size)
            })
            .await;
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rooms.len();
        let pages = total.div_ceil(limit);
        let sessions = self.sessions.lock().await;
        let rooms = rooms
            .iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .map(|room| snapshot(room, &sessions))
            .collect();

        RoomPage {
            rooms,
            page,
            limit,
            total,
            pages,
        }
    }

    /// Opens a private room for `requester`, who joins it later over a
    /// connection.
    ///
    /// # Errors
    /// - [`RoomError::InvalidCode`] for a malformed custom code
    /// - [`RoomError::Conflict`] if the code is held by a live room
    pub async fn create_private_room(
        &self,
        requester: &Identity,
        display_name: &str,
        board_size: BoardSize,
        custom_code: Option<String>,
    ) -> Result<PrivateRoom, GridlockError> {
        let spec = RoomSpec {
            board_size,
            is_private: true,
            custom_code,
            host: requester.clone(),
            host_name: display_name.to_owned(),
        };
        let room = self.open_room(spec, None).await?;
        Ok(PrivateRoom {
            room_id: room.room_id.clone(),
            invite_code: room.invite_code.clone(),
            room,
        })
    }

    /// Finds the private waiting room behind an invite code.
    ///
    /// Lookups run in order: custom codes held in the registry, the code
    /// as a room id, then a case-insensitive comparison with every private
    /// waiting room's invite code. On a collision the first room scanned
    /// wins. A custom code nobody here holds is finally looked up in the
    /// store, and a holder found there is registered again.
    ///
    /// # Errors
    /// - [`RoomError::InviteNotFound`] if no private waiting room matches
    /// - [`RoomError::RoomFull`] if both seats are taken
    /// - [`RoomError::Conflict`] if the requester already plays in it
    /// - a store error if the final lookup fails
    pub async fn resolve_invite(
        &self,
        requester: &Identity,
        code: &str,
    ) -> Result<PrivateRoom, GridlockError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RoomError::InvalidCode("invite code is required".into()).into());
        }
        let joinable = |room: &Room| room.is_private && room.status == RoomStatus::Waiting;

        let aliased = match self.registry.room_for_code(code).await {
            Some(id) => self.registry.get(&id).await.ok().filter(|r| joinable(r)),
            None => None,
        };
        let direct = match aliased {
            Some(room) => Some(room),
            None => match RoomId::custom(code) {
                Ok(id) => self.registry.get(&id).await.ok().filter(|r| joinable(r)),
                Err(_) => None,
            },
        };
        let scanned = match direct {
            Some(room) => Some(room),
            None => {
                let wanted = code.to_uppercase();
                self.registry
                    .list(|room| joinable(room) && room.invite_code() == wanted)
                    .await
                    .into_iter()
                    .next()
            }
        };
        let room = match scanned {
            Some(room) => room,
            None => self
                .stored_invite(code)
                .await?
                .filter(|r| joinable(r))
                .ok_or_else(|| RoomError::InviteNotFound(code.to_owned()))?,
        };

        if room.is_full() {
            return Err(RoomError::RoomFull(room.id.clone()).into());
        }
        if room.is_participant(requester) {
            return Err(RoomError::Conflict(format!("{requester} already plays in room {}", room.id)).into());
        }
        let snapshot = self.render_snapshot(&room).await;
        Ok(PrivateRoom {
            room_id: room.id.clone(),
            invite_code: room.invite_code(),
            room: snapshot,
        })
    }

    /// Move-by-move replay of a room, for its players only.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] or [`RoomError::NotAuthorized`].
    pub async fn room_analysis(
        &self,
        requester: &Identity,
        room_id: &RoomId,
    ) -> Result<Analysis, GridlockError> {
        let room = self.fetch(room_id).await?;
        if !room.is_participant(requester) {
            return Err(not_authorized(requester, room_id));
        }
        Ok(replay(&room))
    }

    /// # Errors
    /// Whatever the user store reports, bounded by the store timeout.
    pub async fn user_stats(&self, user: &UserId) -> Result<StatsSummary, GridlockError> {
        let stats = self.sync.stats(user).await?;
        Ok(StatsSummary {
            user_id: user.clone(),
            total_games: stats.total_games(),
            win_rate: stats.win_rate(),
            stats,
        })
    }

    /// A record computed from the user's finished rooms in the store.
    ///
    /// Guests have no stored rooms; ask with a registered id.
    ///
    /// # Errors
    /// Whatever the room store reports, bounded by the store timeout.
    pub async fn stats_overview(&self, user: &UserId) -> Result<StatsOverview, GridlockError> {
        let documents = self.sync.finished_rooms(user).await?;
        tracing::debug!(user_id = %user, rooms = documents.len(), "stats overview");
        Ok(StatsOverview::from_documents(user, &documents))
    }

    /// The stored room still holding custom `code`, registered again so
    /// the join that follows finds it.
    async fn stored_invite(&self, code: &str) -> Result<Option<Room>, GridlockError> {
        if validate_invite_code(code).is_err() {
            return Ok(None);
        }
        let Some(holder) = self.sync.code_holder(code).await? else {
            return Ok(None);
        };
        let slot = self.registry.get_or_insert(holder).await;
        let room = slot.lock().await.clone();
        Ok(Some(room))
    }

    /// A live room, or a read-only copy from the store.
    async fn fetch(&self, room_id: &RoomId) -> Result<Room, GridlockError> {
        match self.registry.get(room_id).await {
            Ok(room) => Ok(room),
            Err(not_found) => match self.sync.restore_room(room_id).await {
                Some(room) => Ok(room),
                None => Err(not_found.into()),
            },
        }
    }

    async fn render_snapshot(&self, room: &Room) -> RoomSnapshot {
        let sessions = self.sessions.lock().await;
        snapshot(room, &sessions)
    }
}

fn not_authorized(requester: &Identity, room_id: &RoomId) -> GridlockError {
    RoomError::NotAuthorized {
        identity: requester.clone(),
        room_id: room_id.clone(),
    }
    .into()
}
