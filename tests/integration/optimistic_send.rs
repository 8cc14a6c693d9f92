// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for optimistic sends.
//!
//! A sent message shows up as pending straight away, becomes confirmed in
//! place when the server copy arrives, and is flagged failed (without
//! retry) when the send request errors.

use std::sync::Arc;
use std::time::Duration;

use mentorchat::room::RoomError;
use mentorchat::room::memory::InMemoryRoomService;
use mentorchat::session::{ChatSession, SessionConfig, SessionError, TranscriptSnapshot};
use mentorchat::transcript::DeliveryState;
use mentorchat::transport::loopback::{LoopbackConnector, LoopbackServer};
use mentorchat_proto::channel::{ClientFrame, ServerFrame, room_topic};
use mentorchat_proto::message::{
    ClientRef, ConversationId, MAX_MESSAGE_SIZE, MessageId, MessageKind, Origin, Sequence,
    Timestamp, UserId, ValidationError, WireMessage,
};

const ROOM: ConversationId = ConversationId::new(42);
const WAIT: Duration = Duration::from_secs(5);

fn viewer() -> UserId {
    UserId::new("mentee-1")
}

fn mentor() -> UserId {
    UserId::new("mentor-7")
}

/// The server's copy of a message the viewer sent.
fn echo(id: i64, seq: u64, body: &str, client_ref: Option<ClientRef>) -> ServerFrame {
    ServerFrame::Message {
        topic: room_topic(ROOM),
        payload: WireMessage {
            id: Some(MessageId::new(id)),
            room_id: Some(ROOM),
            sender_id: Some(viewer()),
            sender_name: Some("Sam".into()),
            content: body.into(),
            kind: MessageKind::Chat,
            sent_at: Some(Timestamp::from_millis(1_700_000_000_000)),
            sequence_number: Some(Sequence::new(seq)),
            client_ref,
        },
    }
}

async fn setup() -> (ChatSession, Arc<InMemoryRoomService>, LoopbackServer) {
    let rooms = InMemoryRoomService::new();
    rooms.set_room(&viewer(), &mentor(), ROOM);
    let rooms = Arc::new(rooms);
    let (connector, server) = LoopbackConnector::create(64);
    let config = SessionConfig {
        reconnect_delay: Duration::from_millis(50),
        ..SessionConfig::new(viewer())
    };
    let session = ChatSession::open(config, Arc::clone(&rooms), Arc::new(connector), &mentor())
        .await
        .unwrap();
    server
        .wait_for(WAIT, |frames| {
            frames
                .iter()
                .any(|f| matches!(f, ClientFrame::Subscribe { .. }))
        })
        .await
        .unwrap();
    (session, rooms, server)
}

async fn wait_transcript<F>(session: &ChatSession, pred: F) -> TranscriptSnapshot
where
    F: Fn(&TranscriptSnapshot) -> bool,
{
    let mut rx = session.transcript();
    tokio::time::timeout(WAIT, rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for transcript")
        .expect("session ended")
        .clone()
}

async fn wait_sent(rooms: &InMemoryRoomService, count: usize) {
    tokio::time::timeout(WAIT, async {
        while rooms.sent().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("send request should be made");
}

#[tokio::test]
async fn sent_message_is_pending_then_confirmed_in_place() {
    let (session, rooms, server) = setup().await;

    let token = session.send("hello").await.unwrap();

    let pending = session.transcript().borrow().clone();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].state, DeliveryState::Pending);
    assert_eq!(pending[0].message.origin, Origin::LocalUser);
    assert_eq!(pending[0].message.body, "hello");
    assert_eq!(pending[0].local_key, Some(token));
    assert!(pending[0].message.identity.is_none());

    wait_sent(&rooms, 1).await;
    let sent = rooms.sent();
    assert_eq!(sent[0].conversation, ROOM);
    assert_eq!(sent[0].sender, viewer());
    assert_eq!(sent[0].body, "hello");
    assert_eq!(sent[0].client_ref, token);

    server.push(echo(900, 1, "hello", Some(token)));
    let confirmed = wait_transcript(&session, |s| {
        s.first().is_some_and(|e| e.state == DeliveryState::Confirmed)
    })
    .await;
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].message.identity, Some(MessageId::new(900)));
    assert_eq!(confirmed[0].message.sequence, Some(Sequence::new(1)));
    assert_eq!(confirmed[0].local_key, Some(token));

    // The viewer's own message is never acknowledged.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.acks().is_empty());

    session.close().await;
}

#[tokio::test]
async fn echo_without_token_confirms_the_oldest_pending_entry() {
    let (session, _rooms, server) = setup().await;

    let first = session.send("one").await.unwrap();
    let second = session.send("two").await.unwrap();

    server.push(echo(10, 1, "one", None));
    let snapshot =
        wait_transcript(&session, |s| s.iter().any(|e| e.state == DeliveryState::Confirmed))
            .await;

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].local_key, Some(first));
    assert_eq!(snapshot[0].state, DeliveryState::Confirmed);
    assert_eq!(snapshot[1].local_key, Some(second));
    assert_eq!(snapshot[1].state, DeliveryState::Pending);

    session.close().await;
}

#[tokio::test]
async fn echoes_reconcile_their_own_entries_out_of_order() {
    let (session, rooms, server) = setup().await;

    let first = session.send("one").await.unwrap();
    let second = session.send("two").await.unwrap();
    let third = session.send("three").await.unwrap();
    wait_sent(&rooms, 3).await;

    server.push(echo(12, 2, "two", Some(second)));
    server.push(echo(11, 1, "one", Some(first)));
    server.push(echo(13, 3, "three", Some(third)));

    let snapshot = wait_transcript(&session, |s| {
        s.iter().all(|e| e.state == DeliveryState::Confirmed)
    })
    .await;
    assert_eq!(snapshot.len(), 3);
    let bodies: Vec<_> = snapshot.iter().map(|e| e.message.body.as_str()).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);

    session.close().await;
}

#[tokio::test]
async fn failed_send_is_flagged_and_not_retried() {
    let (session, rooms, _server) = setup().await;
    rooms.fail_send(Some(RoomError::Unavailable("HTTP 503".into())));

    let token = session.send("are you there?").await.unwrap();

    let snapshot = wait_transcript(&session, |s| {
        s.first().is_some_and(|e| matches!(e.state, DeliveryState::Failed(_)))
    })
    .await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].local_key, Some(token));
    let DeliveryState::Failed(reason) = &snapshot[0].state else {
        unreachable!();
    };
    assert!(reason.contains("503"));

    rooms.fail_send(None);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rooms.sent().is_empty());
    assert!(matches!(
        session.transcript().borrow()[0].state,
        DeliveryState::Failed(_)
    ));

    session.close().await;
}

#[tokio::test]
async fn invalid_bodies_are_rejected_without_an_entry() {
    let (session, rooms, _server) = setup().await;

    let empty = session.send("   ").await;
    assert!(matches!(
        empty,
        Err(SessionError::Validation(ValidationError::Empty))
    ));

    let large = session.send("x".repeat(MAX_MESSAGE_SIZE + 1)).await;
    assert!(matches!(
        large,
        Err(SessionError::Validation(ValidationError::TooLarge { .. }))
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.transcript().borrow().is_empty());
    assert!(rooms.sent().is_empty());

    session.close().await;
}

#[tokio::test]
async fn late_failure_after_confirmation_is_ignored() {
    let (session, rooms, server) = setup().await;
    rooms.set_send_latency(Some(Duration::from_millis(200)));
    rooms.fail_send(Some(RoomError::Unavailable("gateway timeout".into())));

    let token = session.send("hi").await.unwrap();
    server.push(echo(5, 1, "hi", Some(token)));
    wait_transcript(&session, |s| {
        s.first().is_some_and(|e| e.state == DeliveryState::Confirmed)
    })
    .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let snapshot = session.transcript().borrow().clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, DeliveryState::Confirmed);

    session.close().await;
}

#[tokio::test]
async fn echo_for_a_failed_entry_is_shown_separately() {
    let (session, rooms, server) = setup().await;
    rooms.fail_send(Some(RoomError::Unavailable("timeout".into())));

    let token = session.send("maybe").await.unwrap();
    wait_transcript(&session, |s| {
        s.first().is_some_and(|e| matches!(e.state, DeliveryState::Failed(_)))
    })
    .await;

    // The request timed out on our side but the server stored it anyway.
    server.push(echo(8, 1, "maybe", Some(token)));
    let snapshot = wait_transcript(&session, |s| s.len() == 2).await;

    assert_eq!(snapshot[0].state, DeliveryState::Confirmed);
    assert_eq!(snapshot[0].message.identity, Some(MessageId::new(8)));
    assert!(matches!(snapshot[1].state, DeliveryState::Failed(_)));
    assert_eq!(snapshot[1].local_key, Some(token));

    session.close().await;
}

#[tokio::test]
async fn send_while_offline_still_posts() {
    let rooms = InMemoryRoomService::new();
    rooms.set_room(&viewer(), &mentor(), ROOM);
    let rooms = Arc::new(rooms);
    let (connector, server) = LoopbackConnector::create(64);
    server.set_refuse(true);
    let session = ChatSession::open(
        SessionConfig::new(viewer()),
        Arc::clone(&rooms),
        Arc::new(connector),
        &mentor(),
    )
    .await
    .unwrap();

    let token = session.send("offline hello").await.unwrap();
    wait_sent(&rooms, 1).await;

    assert_eq!(rooms.sent()[0].client_ref, token);
    let snapshot = session.transcript().borrow().clone();
    assert_eq!(snapshot[0].state, DeliveryState::Pending);

    session.close().await;
}
