//! End-to-end tests over real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gridlock::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns its address and store.
async fn start_server() -> (String, Arc<MemoryStore>) {
    start_server_with(GridlockServerBuilder::new()).await
}

async fn start_server_with(builder: GridlockServerBuilder) -> (String, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let server = builder
        .bind("127.0.0.1:0")
        .build(Arc::clone(&store), Arc::clone(&store))
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, store)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, seq: u64, message: ClientMessage) {
    let text = serde_json::to_string(&Envelope::new(seq, message)).expect("encode");
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// The next server envelope, or `None` once the server closed the socket.
async fn next_envelope(ws: &mut ClientWs) -> Option<Envelope<ServerMessage>> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("server should answer in time");
        match frame {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                return Some(serde_json::from_slice(&msg.into_data()).expect("decode"));
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn recv(ws: &mut ClientWs) -> ServerMessage {
    next_envelope(ws)
        .await
        .expect("connection should stay open")
        .message
}

/// Receives until a message matching `pred` arrives.
async fn recv_until(ws: &mut ClientWs, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        let message = recv(ws).await;
        if pred(&message) {
            return message;
        }
    }
}

async fn sign_in(addr: &str, token: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    send(
        &mut ws,
        1,
        ClientMessage::Authenticate {
            token: token.to_owned(),
        },
    )
    .await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Authenticated { .. }));
    ws
}

async fn registered(addr: &str, store: &MemoryStore, name: &str) -> ClientWs {
    let token = store.register_user(UserId::new(name).unwrap(), name).await;
    sign_in(addr, &token).await
}

fn error_kind(message: &ServerMessage) -> Option<ErrorKind> {
    match message {
        ServerMessage::Error { kind, .. } => Some(*kind),
        _ => None,
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_guest_authenticates_and_gets_heartbeat_ack() {
    let (addr, _store) = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        1,
        ClientMessage::AuthenticateGuest {
            guest_id: "owl".into(),
            display_name: "Owl".into(),
        },
    )
    .await;
    match recv(&mut ws).await {
        ServerMessage::Authenticated {
            identity,
            display_name,
        } => {
            assert_eq!(identity.to_string(), "guest:owl");
            assert_eq!(display_name, "Owl");
        }
        other => panic!("expected authenticated, got {other:?}"),
    }

    send(&mut ws, 2, ClientMessage::Heartbeat { client_time: 77 }).await;
    assert!(matches!(
        recv(&mut ws).await,
        ServerMessage::HeartbeatAck { client_time: 77, .. }
    ));
}

#[tokio::test]
async fn test_first_message_must_authenticate() {
    let (addr, _store) = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        1,
        ClientMessage::CreateRoom {
            board_size: BoardSize::Three,
            is_private: false,
            custom_code: None,
        },
    )
    .await;
    let reply = recv(&mut ws).await;
    assert_eq!(error_kind(&reply), Some(ErrorKind::Authentication));
    assert!(next_envelope(&mut ws).await.is_none(), "server closes the socket");
}

#[tokio::test]
async fn test_unknown_token_is_rejected() {
    let (addr, _store) = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        1,
        ClientMessage::Authenticate {
            token: "forged".into(),
        },
    )
    .await;
    let reply = recv(&mut ws).await;
    assert_eq!(error_kind(&reply), Some(ErrorKind::Authentication));
    assert!(next_envelope(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_undecodable_frame_keeps_connection_open() {
    let (addr, store) = start_server().await;
    let mut ws = registered(&addr, &store, "a").await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    assert_eq!(error_kind(&recv(&mut ws).await), Some(ErrorKind::BadRequest));

    ws.send(Message::Text(r#"{"seq":3,"message":{"type":"make_move"}}"#.into()))
        .await
        .unwrap();
    assert_eq!(error_kind(&recv(&mut ws).await), Some(ErrorKind::BadRequest));

    send(&mut ws, 4, ClientMessage::Heartbeat { client_time: 1 }).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::HeartbeatAck { .. }));
}

#[tokio::test]
async fn test_server_envelopes_are_sequenced() {
    let (addr, _store) = start_server().await;
    let mut ws = connect(&addr).await;
    send(
        &mut ws,
        1,
        ClientMessage::AuthenticateGuest {
            guest_id: "seq".into(),
            display_name: String::new(),
        },
    )
    .await;
    send(&mut ws, 2, ClientMessage::Heartbeat { client_time: 0 }).await;

    let first = next_envelope(&mut ws).await.unwrap();
    let second = next_envelope(&mut ws).await.unwrap();
    assert_eq!((first.seq, second.seq), (1, 2));
    assert!(second.timestamp >= first.timestamp);
}

#[tokio::test]
async fn test_idle_timeout_pings_alone_close_connection() {
    let builder = GridlockServerBuilder::new().idle_timeout(Duration::from_millis(300));
    let (addr, store) = start_server_with(builder).await;
    let mut pinger = registered(&addr, &store, "a").await;
    let mut beater = registered(&addr, &store, "b").await;

    for n in 0..6 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The socket may already be gone on the last rounds.
        let _ = pinger.send(Message::Ping(vec![1].into())).await;
        send(&mut beater, n + 2, ClientMessage::Heartbeat { client_time: n }).await;
        assert!(matches!(recv(&mut beater).await, ServerMessage::HeartbeatAck { .. }));
    }

    assert!(
        next_envelope(&mut pinger).await.is_none(),
        "pings do not count as activity"
    );
    send(&mut beater, 9, ClientMessage::Heartbeat { client_time: 9 }).await;
    assert!(matches!(recv(&mut beater).await, ServerMessage::HeartbeatAck { .. }));
}

// =========================================================================
// Game flow
// =========================================================================

#[tokio::test]
async fn test_two_sockets_play_to_a_win() {
    let (addr, store) = start_server().await;
    let mut a = registered(&addr, &store, "a").await;
    let mut b = registered(&addr, &store, "b").await;

    send(
        &mut a,
        2,
        ClientMessage::CreateRoom {
            board_size: BoardSize::Three,
            is_private: false,
            custom_code: None,
        },
    )
    .await;
    let room_id = match recv(&mut a).await {
        ServerMessage::RoomCreated { room } => room.room_id,
        other => panic!("expected room_created, got {other:?}"),
    };

    send(&mut b, 2, ClientMessage::JoinRoom { room_id: room_id.clone() }).await;
    assert!(matches!(recv(&mut b).await, ServerMessage::RoomJoined { .. }));
    assert!(matches!(recv(&mut a).await, ServerMessage::GameStarted { .. }));

    let moves = [(0, true), (3, false), (1, true), (4, false), (2, true)];
    for (seq, (position, by_a)) in (3..).zip(moves) {
        let ws = if by_a { &mut a } else { &mut b };
        send(
            ws,
            seq,
            ClientMessage::MakeMove {
                room_id: room_id.clone(),
                position,
            },
        )
        .await;
        // Wait for the move to land before the other socket plays.
        recv_until(ws, |m| matches!(m, ServerMessage::MoveMade { .. } | ServerMessage::GameFinished { .. })).await;
    }

    let finished = recv_until(&mut b, |m| matches!(m, ServerMessage::GameFinished { .. })).await;
    assert!(matches!(
        finished,
        ServerMessage::GameFinished { winner: Winner::X, ref winning_line, .. } if *winning_line == vec![0, 1, 2]
    ));
    recv_until(&mut a, |m| matches!(m, ServerMessage::GameFinished { .. })).await;

    assert_eq!(store.stats(&UserId::new("a").unwrap()).await.unwrap().wins, 1);
}

#[tokio::test]
async fn test_rejected_move_answers_only_the_mover() {
    let (addr, store) = start_server().await;
    let mut a = registered(&addr, &store, "a").await;
    let mut b = registered(&addr, &store, "b").await;

    send(
        &mut a,
        2,
        ClientMessage::CreateRoom {
            board_size: BoardSize::Four,
            is_private: true,
            custom_code: Some("den".into()),
        },
    )
    .await;
    let room_id = match recv(&mut a).await {
        ServerMessage::RoomCreated { room } => {
            assert_eq!(room.invite_code, "DEN");
            room.room_id
        }
        other => panic!("expected room_created, got {other:?}"),
    };
    send(&mut b, 2, ClientMessage::JoinRoom { room_id: room_id.clone() }).await;
    recv(&mut b).await;
    recv(&mut a).await;

    send(&mut b, 3, ClientMessage::MakeMove { room_id, position: 0 }).await;
    let reply = recv_until(&mut b, |m| error_kind(m).is_some()).await;
    assert_eq!(error_kind(&reply), Some(ErrorKind::NotYourTurn));
    if let ServerMessage::Error { code, .. } = reply {
        assert_eq!(code, ErrorKind::NotYourTurn.code());
    }

    send(&mut a, 3, ClientMessage::Heartbeat { client_time: 5 }).await;
    assert!(
        matches!(recv(&mut a).await, ServerMessage::HeartbeatAck { .. }),
        "a saw nothing of b's rejected move"
    );
}

#[tokio::test]
async fn test_closed_socket_then_reconnect_on_new_socket() {
    let (addr, store) = start_server().await;
    let mut a = registered(&addr, &store, "a").await;
    let token = store.register_user(UserId::new("b").unwrap(), "b").await;
    let mut b = sign_in(&addr, &token).await;

    send(
        &mut a,
        2,
        ClientMessage::CreateRoom {
            board_size: BoardSize::Three,
            is_private: false,
            custom_code: None,
        },
    )
    .await;
    let room_id = match recv(&mut a).await {
        ServerMessage::RoomCreated { room } => room.room_id,
        other => panic!("expected room_created, got {other:?}"),
    };
    send(&mut b, 2, ClientMessage::JoinRoom { room_id: room_id.clone() }).await;
    recv(&mut b).await;
    recv(&mut a).await;

    b.close(None).await.unwrap();
    let left = recv(&mut a).await;
    assert!(matches!(left, ServerMessage::PlayerDisconnected { ref identity, .. } if identity.to_string() == "b"));

    let mut b = sign_in(&addr, &token).await;
    send(&mut b, 2, ClientMessage::ReconnectGame { room_id: room_id.clone() }).await;
    match recv(&mut b).await {
        ServerMessage::RoomState { room } => {
            assert_eq!(room.status, RoomStatus::Playing);
            assert!(room.players.iter().all(|p| p.connected));
        }
        other => panic!("expected room_state, got {other:?}"),
    }
    assert!(matches!(recv(&mut a).await, ServerMessage::PlayerReconnected { .. }));
}

#[tokio::test]
async fn test_matchmaking_pairs_two_sockets() {
    let (addr, _store) = start_server().await;
    let mut guests = Vec::new();
    for name in ["fox", "elk"] {
        let mut ws = connect(&addr).await;
        send(
            &mut ws,
            1,
            ClientMessage::AuthenticateGuest {
                guest_id: name.into(),
                display_name: name.into(),
            },
        )
        .await;
        recv(&mut ws).await;
        guests.push(ws);
    }

    send(&mut guests[0], 2, ClientMessage::FindMatch { board_size: BoardSize::Five }).await;
    assert!(matches!(
        recv(&mut guests[0]).await,
        ServerMessage::Queued { position: 1, .. }
    ));
    send(&mut guests[1], 2, ClientMessage::FindMatch { board_size: BoardSize::Five }).await;

    for ws in &mut guests {
        match recv(ws).await {
            ServerMessage::MatchFound { room } => {
                assert_eq!(room.board_size, BoardSize::Five);
                assert_eq!(room.status, RoomStatus::Playing);
            }
            other => panic!("expected match_found, got {other:?}"),
        }
    }
}
