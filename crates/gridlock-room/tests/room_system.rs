//! Integration tests for the room system: registry, state machine, and
//! matchmaking driven together the way the coordinator drives them.

use std::sync::Arc;

use chrono::Utc;
use gridlock_protocol::{
    BoardSize, GuestId, Identity, Recipient, RoomStatus, Symbol, UserId, Winner,
};
use gridlock_room::{
    Intent, MatchmakingQueue, Player, Room, RoomError, RoomEvent, RoomRegistry, RoomSpec,
    StatsDelta, Ticket, UserStats, apply,
};
use gridlock_transport::ConnectionId;
use tokio::sync::Mutex;

// =========================================================================
// Helpers
// =========================================================================

fn user(id: &str) -> Identity {
    Identity::Registered(UserId::new(id).unwrap())
}

fn guest(id: &str) -> Identity {
    Identity::Guest(GuestId::declare(id).unwrap())
}

fn host_spec(host: &Identity) -> RoomSpec {
    RoomSpec {
        board_size: BoardSize::Three,
        is_private: false,
        custom_code: None,
        host: host.clone(),
        host_name: host.to_string(),
    }
}

/// Applies an intent under the room's lock and writes the result back,
/// exactly like one coordinator critical section.
async fn act(registry: &RoomRegistry, room: &Room, intent: Intent) -> Result<Room, RoomError> {
    let slot = registry.slot(&room.id).await.expect("room registered");
    let mut guard = slot.lock().await;
    let transition = apply(&guard, intent, Utc::now())?;
    *guard = transition.room.clone();
    Ok(transition.room)
}

fn mv(who: &Identity, position: usize) -> Intent {
    Intent::Move {
        identity: who.clone(),
        position,
    }
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test]
async fn test_create_join_and_win_top_row() {
    let registry = RoomRegistry::new();
    let (a, b) = (user("a"), user("b"));

    let room = registry.create(host_spec(&a), Utc::now()).await.unwrap();
    let room = act(
        &registry,
        &room,
        Intent::Join {
            identity: b.clone(),
            display_name: "B".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(room.status, RoomStatus::Playing);

    let mut room = room;
    for (who, pos) in [(&a, 0), (&b, 4), (&a, 1), (&b, 5), (&a, 2)] {
        room = act(&registry, &room, mv(who, pos)).await.unwrap();
    }

    let stored = registry.get(&room.id).await.unwrap();
    assert_eq!(stored.status, RoomStatus::Finished);
    assert_eq!(stored.winner, Some(Winner::X));
    assert_eq!(stored.winning_line, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_concurrent_moves_on_same_room_only_one_wins() {
    let registry = Arc::new(RoomRegistry::new());
    let (a, b) = (user("a"), user("b"));
    let room = registry.create(host_spec(&a), Utc::now()).await.unwrap();
    let room = act(
        &registry,
        &room,
        Intent::Join {
            identity: b.clone(),
            display_name: "B".into(),
        },
    )
    .await
    .unwrap();

    // A double-click: the same move sent twice at once.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let registry = Arc::clone(&registry);
        let room = room.clone();
        let a = a.clone();
        handles.push(tokio::spawn(async move {
            act(&registry, &room, mv(&a, 0)).await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(RoomError::NotYourTurn { .. }))));
    assert_eq!(registry.get(&room.id).await.unwrap().moves.len(), 1);
}

#[tokio::test]
async fn test_matchmaking_pairing_is_atomic() {
    let queue = Arc::new(Mutex::new(MatchmakingQueue::new()));
    queue
        .lock()
        .await
        .enqueue(Ticket {
            identity: guest("waiting"),
            display_name: "W".into(),
            board_size: BoardSize::Four,
            connection: ConnectionId::new(1),
            enqueued_at: Utc::now(),
        })
        .unwrap();

    let mut handles = Vec::new();
    for name in ["x", "y"] {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            queue.lock().await.find_match(BoardSize::Four, &guest(name))
        }));
    }
    let mut paired = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            paired += 1;
        }
    }
    assert_eq!(paired, 1, "one ticket can only be consumed once");
}

#[tokio::test]
async fn test_matchmade_guest_room_skips_waiting() {
    let registry = RoomRegistry::new();
    let room = Room::paired(
        gridlock_protocol::RoomId::generate(),
        BoardSize::Four,
        Player::new(guest("a"), "A", Symbol::X),
        Player::new(guest("b"), "B", Symbol::O),
        Utc::now(),
    );
    registry.upsert(room.clone()).await;
    let stored = registry.get(&room.id).await.unwrap();
    assert_eq!(stored.status, RoomStatus::Playing);
    assert_eq!(stored.players.len(), 2);
    assert!(stored.all_guests());
}

#[tokio::test]
async fn test_forfeit_then_stats_record_loss_and_forfeit() {
    let registry = RoomRegistry::new();
    let (a, b) = (user("a"), user("b"));
    let room = registry.create(host_spec(&a), Utc::now()).await.unwrap();
    let room = act(
        &registry,
        &room,
        Intent::Join {
            identity: b.clone(),
            display_name: "B".into(),
        },
    )
    .await
    .unwrap();

    let slot = registry.slot(&room.id).await.unwrap();
    let transition = {
        let guard = slot.lock().await;
        apply(&guard, Intent::Forfeit { identity: b.clone() }, Utc::now()).unwrap()
    };
    assert_eq!(transition.room.forfeited_by, Some(b.clone()));
    assert_eq!(transition.room.winner, Some(Winner::X));

    let mut b_stats = UserStats::default();
    for (id, delta) in &transition.stats {
        if Some(id) == b.user_id() {
            b_stats.apply(*delta);
        }
    }
    assert_eq!(b_stats.losses, 1);
    assert_eq!(b_stats.forfeits, 1);
    assert!(transition.stats.contains(&(UserId::new("a").unwrap(), StatsDelta::win())));
}

#[tokio::test]
async fn test_rematch_is_addressed_to_whole_room() {
    let (a, b) = (user("a"), user("b"));
    let mut room = Room::paired(
        gridlock_protocol::RoomId::generate(),
        BoardSize::Three,
        Player::new(a.clone(), "A", Symbol::X),
        Player::new(b.clone(), "B", Symbol::O),
        Utc::now(),
    );
    room = apply(&room, Intent::Forfeit { identity: a.clone() }, Utc::now())
        .unwrap()
        .room;
    room = apply(&room, Intent::AcceptRematch { identity: b.clone() }, Utc::now())
        .unwrap()
        .room;
    let t = apply(&room, Intent::RequestRematch { identity: a.clone() }, Utc::now()).unwrap();
    let spawned = t.spawned.unwrap();
    assert_eq!(spawned.player_with(Symbol::X).unwrap().identity, b);
    assert!(
        t.events
            .iter()
            .any(|(to, e)| *to == Recipient::All && *e == RoomEvent::RematchStarted)
    );
}
