// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::cast_possible_wrap
)]

//! Integration tests for gap recovery after a reconnect.
//!
//! Messages stored by the room service while the live channel was down must
//! be fetched once the channel is back, merged in sequence order, and never
//! duplicated by a live redelivery of the same message.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use mentorchat::room::memory::InMemoryRoomService;
use mentorchat::room::{RoomError, RoomService};
use mentorchat::session::{ChatSession, SessionConfig, TranscriptSnapshot};
use mentorchat::transport::loopback::{LoopbackConnector, LoopbackServer};
use mentorchat_proto::channel::{ClientFrame, ServerFrame, room_topic};
use mentorchat_proto::message::{
    ClientRef, ConversationId, MessageId, MessageKind, Sequence, Timestamp, UserId, WireMessage,
};

const ROOM: ConversationId = ConversationId::new(42);
const WAIT: Duration = Duration::from_secs(5);

fn viewer() -> UserId {
    UserId::new("mentee-1")
}

fn mentor() -> UserId {
    UserId::new("mentor-7")
}

fn from_mentor(seq: u64) -> WireMessage {
    WireMessage {
        id: Some(MessageId::new(seq as i64)),
        room_id: Some(ROOM),
        sender_id: Some(mentor()),
        sender_name: Some("Dana".into()),
        content: format!("message {seq}"),
        kind: MessageKind::Chat,
        sent_at: Some(Timestamp::from_millis(1_700_000_000_000 + seq)),
        sequence_number: Some(Sequence::new(seq)),
        client_ref: None,
    }
}

fn deliver(payload: WireMessage) -> ServerFrame {
    ServerFrame::Message {
        topic: room_topic(ROOM),
        payload,
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
    (
        ChatSession::open(config, Arc::clone(&rooms), Arc::new(connector), &mentor())
            .await
            .unwrap(),
        rooms,
        server,
    )
}

async fn wait_subscribed(server: &LoopbackServer, times: usize) {
    server
        .wait_for(WAIT, |frames| {
            frames
                .iter()
                .filter(|f| matches!(f, ClientFrame::Subscribe { .. }))
                .count()
                >= times
        })
        .await
        .expect("client should subscribe");
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

async fn wait_missed_calls(rooms: &InMemoryRoomService, count: usize) {
    tokio::time::timeout(WAIT, async {
        while rooms.missed_calls().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("recovery request should be made");
}

/// Room service whose `hold`-th missed-messages reply (counting from 0)
/// is computed when the request arrives but only returned after
/// [`GatedRooms::release`].
struct GatedRooms {
    inner: InMemoryRoomService,
    hold: usize,
    calls: AtomicUsize,
    gate: Notify,
}

impl GatedRooms {
    fn new(hold: usize) -> Self {
        let inner = InMemoryRoomService::new();
        inner.set_room(&viewer(), &mentor(), ROOM);
        Self {
            inner,
            hold,
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        }
    }

    fn release(&self) {
        self.gate.notify_one();
    }
}

impl RoomService for GatedRooms {
    async fn resolve_room(
        &self,
        counterpart: &UserId,
        viewer: &UserId,
    ) -> Result<ConversationId, RoomError> {
        self.inner.resolve_room(counterpart, viewer).await
    }

    async fn recent_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<WireMessage>, RoomError> {
        self.inner.recent_messages(conversation).await
    }

    async fn missed_messages(
        &self,
        conversation: ConversationId,
        since: Sequence,
    ) -> Result<Vec<WireMessage>, RoomError> {
        let result = self.inner.missed_messages(conversation, since).await;
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.hold {
            self.gate.notified().await;
        }
        result
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        body: &str,
        client_ref: ClientRef,
    ) -> Result<(), RoomError> {
        self.inner
            .send_message(conversation, sender, body, client_ref)
            .await
    }
}

async fn open_gated(rooms: &Arc<GatedRooms>) -> (ChatSession, LoopbackServer) {
    let (connector, server) = LoopbackConnector::create(64);
    let config = SessionConfig {
        reconnect_delay: Duration::from_millis(50),
        ..SessionConfig::new(viewer())
    };
    let session = ChatSession::open(config, Arc::clone(rooms), Arc::new(connector), &mentor())
        .await
        .unwrap();
    (session, server)
}

fn sequences(snapshot: &TranscriptSnapshot) -> Vec<u64> {
    snapshot
        .iter()
        .filter_map(|e| e.message.sequence.map(Sequence::get))
        .collect()
}

/// Waits until at least `count` acknowledgments have arrived.
async fn wait_acks(server: &LoopbackServer, count: usize) {
    server
        .wait_for(WAIT, |frames| {
            frames
                .iter()
                .filter(|f| matches!(f, ClientFrame::Ack(_)))
                .count()
                >= count
        })
        .await
        .expect("acknowledgments should arrive");
}

fn acked_ids(server: &LoopbackServer) -> Vec<i64> {
    server.acks().iter().map(|a| a.message_id.get()).collect()
}

#[tokio::test]
async fn messages_missed_while_offline_are_recovered_once() {
    // The first request (after the initial connect) answers at once; the
    // one after the reconnect is held until the live redelivery is in.
    let rooms = Arc::new(GatedRooms::new(1));
    for seq in 1..=10 {
        rooms.inner.add_history(ROOM, from_mentor(seq));
    }
    let (session, server) = open_gated(&rooms).await;

    assert_eq!(session.transcript().borrow().len(), 10);
    wait_subscribed(&server, 1).await;
    wait_missed_calls(&rooms.inner, 1).await;
    wait_acks(&server, 10).await;

    // Two messages are stored while the channel is down.
    server.disconnect();
    rooms.inner.add_history(ROOM, from_mentor(11));
    rooms.inner.add_history(ROOM, from_mentor(12));

    wait_subscribed(&server, 2).await;
    wait_missed_calls(&rooms.inner, 2).await;

    // The server redelivers 11 live before recovery has answered.
    server.push(deliver(from_mentor(11)));
    let live = wait_transcript(&session, |s| s.len() == 11).await;
    assert_eq!(sequences(&live), (1..=11).collect::<Vec<_>>());

    rooms.release();
    let snapshot = wait_transcript(&session, |s| s.len() == 12).await;
    assert_eq!(sequences(&snapshot), (1..=12).collect::<Vec<_>>());

    // Both requests start from the watermark set by the history page.
    assert_eq!(
        rooms.inner.missed_calls(),
        vec![(ROOM, Sequence::new(10)), (ROOM, Sequence::new(10))]
    );

    wait_acks(&server, 12).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(acked_ids(&server), (1..=12).collect::<Vec<_>>());

    // A late redelivery changes nothing.
    server.push(deliver(from_mentor(12)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.transcript().borrow().len(), 12);
    assert_eq!(server.acks().len(), 12);

    session.close().await;
}

#[tokio::test]
async fn reconnect_during_recovery_runs_a_follow_up_request() {
    // The request after the first connect is held past a reconnect.
    let rooms = Arc::new(GatedRooms::new(0));
    rooms.inner.add_history(ROOM, from_mentor(1));
    let (session, server) = open_gated(&rooms).await;

    wait_subscribed(&server, 1).await;
    wait_missed_calls(&rooms.inner, 1).await;

    server.disconnect();
    rooms.inner.add_history(ROOM, from_mentor(2));
    wait_subscribed(&server, 2).await;

    // The held reply was computed before 2 existed.
    rooms.release();
    let snapshot = wait_transcript(&session, |s| s.len() == 2).await;
    assert_eq!(sequences(&snapshot), vec![1, 2]);
    assert_eq!(
        rooms.inner.missed_calls(),
        vec![(ROOM, Sequence::new(1)), (ROOM, Sequence::new(1))]
    );

    wait_acks(&server, 2).await;
    assert_eq!(acked_ids(&server), vec![1, 2]);

    session.close().await;
}

#[tokio::test]
async fn no_follow_up_request_without_a_reconnect() {
    let rooms = Arc::new(GatedRooms::new(0));
    rooms.inner.add_history(ROOM, from_mentor(1));
    let (session, server) = open_gated(&rooms).await;

    wait_subscribed(&server, 1).await;
    wait_missed_calls(&rooms.inner, 1).await;
    rooms.release();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(rooms.inner.missed_calls().len(), 1);
    session.close().await;
}

#[tokio::test]
async fn empty_transcript_skips_recovery() {
    let (session, rooms, server) = setup().await;
    wait_subscribed(&server, 1).await;

    server.disconnect();
    wait_subscribed(&server, 2).await;

    assert!(rooms.missed_calls().is_empty());
    session.close().await;
}

#[tokio::test]
async fn recovery_asks_from_the_highest_live_sequence() {
    let (session, rooms, server) = setup().await;
    wait_subscribed(&server, 1).await;

    server.push(deliver(from_mentor(4)));
    server.push(deliver(from_mentor(7)));
    wait_transcript(&session, |s| s.len() == 2).await;

    server.disconnect();
    wait_missed_calls(&rooms, 1).await;

    assert_eq!(rooms.missed_calls(), vec![(ROOM, Sequence::new(7))]);
    session.close().await;
}

#[tokio::test]
async fn recovered_messages_are_merged_in_sequence_order() {
    let rooms = InMemoryRoomService::new();
    rooms.set_room(&viewer(), &mentor(), ROOM);
    rooms.add_history(ROOM, from_mentor(1));
    let rooms = Arc::new(rooms);
    let (connector, server) = LoopbackConnector::create(64);
    let config = SessionConfig {
        reconnect_delay: Duration::from_millis(50),
        ..SessionConfig::new(viewer())
    };
    let session = ChatSession::open(config, Arc::clone(&rooms), Arc::new(connector), &mentor())
        .await
        .unwrap();
    wait_subscribed(&server, 1).await;

    server.disconnect();
    for seq in [4, 2, 3] {
        rooms.add_history(ROOM, from_mentor(seq));
    }

    let snapshot = wait_transcript(&session, |s| s.len() == 4).await;
    assert_eq!(sequences(&snapshot), vec![1, 2, 3, 4]);

    wait_acks(&server, 4).await;
    assert_eq!(acked_ids(&server), vec![1, 2, 3, 4]);

    session.close().await;
}

#[tokio::test]
async fn failed_recovery_waits_for_the_next_reconnect() {
    let rooms = InMemoryRoomService::new();
    rooms.set_room(&viewer(), &mentor(), ROOM);
    rooms.add_history(ROOM, from_mentor(1));
    rooms.fail_missed(Some(RoomError::Unavailable("HTTP 503".into())));
    let rooms = Arc::new(rooms);
    let (connector, server) = LoopbackConnector::create(64);
    let config = SessionConfig {
        reconnect_delay: Duration::from_millis(50),
        ..SessionConfig::new(viewer())
    };
    let session = ChatSession::open(config, Arc::clone(&rooms), Arc::new(connector), &mentor())
        .await
        .unwrap();
    wait_subscribed(&server, 1).await;
    wait_missed_calls(&rooms, 1).await;

    rooms.add_history(ROOM, from_mentor(2));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The live channel stays up and no new request is made on its own.
    assert_eq!(rooms.missed_calls().len(), 1);
    assert_eq!(session.transcript().borrow().len(), 1);
    assert!(server.is_connected());

    rooms.fail_missed(None);
    server.disconnect();
    wait_missed_calls(&rooms, 2).await;

    let snapshot = wait_transcript(&session, |s| s.len() == 2).await;
    assert_eq!(sequences(&snapshot), vec![1, 2]);
    assert_eq!(rooms.missed_calls()[1], (ROOM, Sequence::new(1)));

    session.close().await;
}
