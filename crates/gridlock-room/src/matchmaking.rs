//! FIFO matchmaking by board size.
//!
//! `MatchmakingQueue` is a plain data structure. The coordinator keeps it
//! behind one mutex and holds that mutex across "find ticket, pop it,
//! create the room", which is what makes pairing atomic.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use gridlock_protocol::{BoardSize, Identity};
use gridlock_transport::ConnectionId;

use crate::RoomError;

/// A player waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub identity: Identity,
    pub display_name: String,
    pub board_size: BoardSize,
    /// The connection that asked; match notifications go here.
    pub connection: ConnectionId,
    pub enqueued_at: DateTime<Utc>,
}

/// Waiting tickets, oldest first.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    tickets: VecDeque<Ticket>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ticket and returns its 1-based position among tickets for
    /// the same board size.
    ///
    /// # Errors
    /// [`RoomError::Conflict`] if the identity already holds a ticket.
    pub fn enqueue(&mut self, ticket: Ticket) -> Result<usize, RoomError> {
        if self.contains(&ticket.identity) {
            return Err(RoomError::Conflict(format!(
                "{} is already in the matchmaking queue",
                ticket.identity
            )));
        }
        let identity = ticket.identity.clone();
        tracing::debug!(%identity, board_size = %ticket.board_size, "ticket enqueued");
        self.tickets.push_back(ticket);
        Ok(self.position(&identity).unwrap_or(self.tickets.len()))
    }

    /// Pops the oldest ticket for `board_size`.
    ///
    /// Never returns the ticket of `requester`, so a player cannot be
    /// paired with themselves.
    pub fn find_match(&mut self, board_size: BoardSize, requester: &Identity) -> Option<Ticket> {
        let index = self
            .tickets
            .iter()
            .position(|t| t.board_size == board_size && &t.identity != requester)?;
        self.tickets.remove(index)
    }

    /// Withdraws the identity's ticket. Absent tickets are a no-op.
    pub fn dequeue(&mut self, identity: &Identity) -> Option<Ticket> {
        let index = self.tickets.iter().position(|t| &t.identity == identity)?;
        self.tickets.remove(index)
    }

    /// Drops every ticket that was filed from `connection`.
    pub fn dequeue_connection(&mut self, connection: ConnectionId) -> Vec<Ticket> {
        let (gone, kept): (Vec<_>, Vec<_>) = self
            .tickets
            .drain(..)
            .partition(|t| t.connection == connection);
        self.tickets = kept.into();
        gone
    }

    /// 1-based position of the identity among tickets of its board size.
    pub fn position(&self, identity: &Identity) -> Option<usize> {
        let ticket = self.tickets.iter().find(|t| &t.identity == identity)?;
        let ahead = self
            .tickets
            .iter()
            .take_while(|t| &t.identity != identity)
            .filter(|t| t.board_size == ticket.board_size)
            .count();
        Some(ahead + 1)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.tickets.iter().any(|t| &t.identity == identity)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
