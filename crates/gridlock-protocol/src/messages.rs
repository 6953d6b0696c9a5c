//! Client intents, server events, and the envelope that carries them.
//!
//! Both enums are internally tagged with a snake_case `type` field:
//!
//! ```json
//! {"seq": 4, "timestamp": 1718000000000,
//!  "message": {"type": "make_move", "room_id": "…", "position": 4}}
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    BoardSize, ErrorKind, Identity, MoveRecord, RoomId, RoomSnapshot, Symbol, Winner,
};

/// An inbound request from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sign in with a durable credential issued by the account system.
    Authenticate { token: String },

    /// Play as a guest under a client-chosen id.
    AuthenticateGuest {
        guest_id: String,
        display_name: String,
    },

    CreateRoom {
        board_size: BoardSize,
        #[serde(default)]
        is_private: bool,
        /// Becomes the room id when present.
        #[serde(default)]
        custom_code: Option<String>,
    },

    JoinRoom { room_id: RoomId },

    FindMatch { board_size: BoardSize },

    CancelMatchmaking,

    MakeMove { room_id: RoomId, position: usize },

    ForfeitGame { room_id: RoomId },

    RequestRematch { room_id: RoomId },

    AcceptRematch { room_id: RoomId },

    DeclineRematch { room_id: RoomId },

    LeaveGame { room_id: RoomId },

    ReconnectGame { room_id: RoomId },

    /// Keep-alive; answered with [`ServerMessage::HeartbeatAck`].
    Heartbeat { client_time: u64 },
}

impl ClientMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::AuthenticateGuest { .. } => "authenticate_guest",
            Self::CreateRoom { .. } => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::FindMatch { .. } => "find_match",
            Self::CancelMatchmaking => "cancel_matchmaking",
            Self::MakeMove { .. } => "make_move",
            Self::ForfeitGame { .. } => "forfeit_game",
            Self::RequestRematch { .. } => "request_rematch",
            Self::AcceptRematch { .. } => "accept_rematch",
            Self::DeclineRematch { .. } => "decline_rematch",
            Self::LeaveGame { .. } => "leave_game",
            Self::ReconnectGame { .. } => "reconnect_game",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// An outbound event, either broadcast to a room or sent to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Authenticated {
        identity: Identity,
        display_name: String,
    },

    RoomCreated { room: RoomSnapshot },

    /// Sent to the joining connection, including on reconnection via join.
    RoomJoined { room: RoomSnapshot },

    /// Fresh snapshot after `reconnect_game`.
    RoomState { room: RoomSnapshot },

    GameStarted { room: RoomSnapshot },

    MatchFound { room: RoomSnapshot },

    Queued { board_size: BoardSize, position: usize },

    MatchmakingCancelled,

    MoveMade {
        room: RoomSnapshot,
        last_move: MoveRecord,
    },

    GameFinished {
        room_id: RoomId,
        winner: Winner,
        winning_line: Vec<usize>,
    },

    GameForfeited {
        room_id: RoomId,
        forfeited_by: Identity,
        winner: Symbol,
    },

    PlayerJoined {
        room: RoomSnapshot,
        identity: Identity,
    },

    PlayerReconnected { room_id: RoomId, identity: Identity },

    PlayerDisconnected { room_id: RoomId, identity: Identity },

    PlayerLeft { room_id: RoomId, identity: Identity },

    RematchRequested { room_id: RoomId, by: Identity },

    RematchAccepted { room_id: RoomId, by: Identity },

    RematchDeclined { room_id: RoomId, by: Identity },

    RematchStarted {
        previous_room_id: RoomId,
        room: RoomSnapshot,
    },

    HeartbeatAck { client_time: u64, server_time: u64 },

    Error {
        kind: ErrorKind,
        code: u16,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            code: kind.code(),
            message: message.into(),
        }
    }
}

/// Wraps every frame with a per-sender sequence number and a send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    /// Monotonic per connection and per direction.
    pub seq: u64,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
    pub message: M,
}

impl<M> Envelope<M> {
    /// Stamps a message with the current wall-clock time.
    pub fn new(seq: u64, message: M) -> Self {
        Self {
            seq,
            timestamp: now_millis(),
            message,
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GuestId, UserId};

    #[test]
    fn test_client_message_create_room_defaults_optional_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"create_room","board_size":3}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                board_size: BoardSize::Three,
                is_private: false,
                custom_code: None,
            }
        );
    }

    #[test]
    fn test_client_message_unit_variant_json_format() {
        let json = serde_json::to_value(ClientMessage::CancelMatchmaking).unwrap();
        assert_eq!(json, serde_json::json!({"type": "cancel_matchmaking"}));
    }

    #[test]
    fn test_client_message_make_move_json_format() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"make_move","room_id":"r-1","position":4}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), "make_move");
        assert!(matches!(msg, ClientMessage::MakeMove { position: 4, .. }));
    }

    #[test]
    fn test_server_message_error_carries_code() {
        let json = serde_json::to_value(ServerMessage::error(
            ErrorKind::NotYourTurn,
            "wait for O",
        ))
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "not_your_turn");
        assert_eq!(json["code"], 422);
        assert_eq!(json["message"], "wait for O");
    }

    #[test]
    fn test_server_message_game_forfeited_json_format() {
        let msg = ServerMessage::GameForfeited {
            room_id: RoomId::custom("r-1").unwrap(),
            forfeited_by: Identity::Registered(UserId::new("u-1").unwrap()),
            winner: Symbol::O,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "game_forfeited");
        assert_eq!(json["forfeited_by"]["id"], "u-1");
        assert_eq!(json["winner"], "O");
    }

    #[test]
    fn test_server_message_player_left_round_trip() {
        let msg = ServerMessage::PlayerLeft {
            room_id: RoomId::custom("r-2").unwrap(),
            identity: Identity::Guest(GuestId::declare("owl").unwrap()),
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: ServerMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_envelope_timestamp_defaults_when_missing() {
        let envelope: Envelope<ClientMessage> = serde_json::from_str(
            r#"{"seq":1,"message":{"type":"heartbeat","client_time":5}}"#,
        )
        .unwrap();
        assert_eq!(envelope.timestamp, 0);
        assert_eq!(envelope.message, ClientMessage::Heartbeat { client_time: 5 });
    }

    #[test]
    fn test_envelope_new_stamps_current_time() {
        let before = now_millis();
        let envelope = Envelope::new(9, ServerMessage::MatchmakingCancelled);
        assert_eq!(envelope.seq, 9);
        assert!(envelope.timestamp >= before);
    }
}
