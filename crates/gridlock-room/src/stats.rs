//! Per-player result deltas and the streak arithmetic applied to them.

use gridlock_protocol::{UserId, Winner};
use serde::{Deserialize, Serialize};

use crate::Room;

/// How one game ended for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

/// A change to one player's durable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub result: GameResult,
    /// The loss came from forfeiting.
    pub forfeited: bool,
}

impl StatsDelta {
    pub fn win() -> Self {
        Self {
            result: GameResult::Win,
            forfeited: false,
        }
    }

    pub fn loss() -> Self {
        Self {
            result: GameResult::Loss,
            forfeited: false,
        }
    }

    pub fn draw() -> Self {
        Self {
            result: GameResult::Draw,
            forfeited: false,
        }
    }

    pub fn forfeit() -> Self {
        Self {
            result: GameResult::Loss,
            forfeited: true,
        }
    }
}

/// A registered user's lifetime record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub forfeits: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl UserStats {
    /// Folds one game into the record.
    pub fn apply(&mut self, delta: StatsDelta) {
        match delta.result {
            GameResult::Win => {
                self.wins += 1;
                self.current_streak += 1;
                self.longest_streak = self.longest_streak.max(self.current_streak);
            }
            GameResult::Loss => {
                self.losses += 1;
                self.current_streak = 0;
            }
            GameResult::Draw => {
                self.draws += 1;
                self.current_streak = 0;
            }
        }
        if delta.forfeited {
            self.forfeits += 1;
        }
    }

    pub fn total_games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Win percentage rounded to one decimal, `0.0` before the first game.
    pub fn win_rate(&self) -> f64 {
        match self.total_games() {
            0 => 0.0,
            total => (f64::from(self.wins) * 1000.0 / f64::from(total)).round() / 10.0,
        }
    }
}

/// The deltas a finished room produces, registered players only.
///
/// Returns nothing for rooms that are not finished.
pub fn outcome(room: &Room) -> Vec<(UserId, StatsDelta)> {
    let Some(winner) = room.winner else {
        return Vec::new();
    };
    room.players
        .iter()
        .filter_map(|p| {
            let user = p.identity.user_id()?.clone();
            let delta = match winner.symbol() {
                None => StatsDelta::draw(),
                Some(symbol) if symbol == p.symbol => StatsDelta::win(),
                Some(_) if room.forfeited_by.as_ref() == Some(&p.identity) => StatsDelta::forfeit(),
                Some(_) => StatsDelta::loss(),
            };
            Some((user, delta))
        })
        .collect()
}
