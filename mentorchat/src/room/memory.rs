//! In-memory room service for testing.
//!
//! Holds rooms and their history in process memory. Tests seed history,
//! decide which counterparts are off limits, and inject failures per
//! operation; every call is recorded for later inspection.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use mentorchat_proto::message::{ClientRef, ConversationId, Sequence, UserId, WireMessage};

use super::{RoomError, RoomService};

/// A message accepted by [`InMemoryRoomService::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Target conversation.
    pub conversation: ConversationId,
    /// Author.
    pub sender: UserId,
    /// Text payload.
    pub body: String,
    /// Correlation token supplied by the client.
    pub client_ref: ClientRef,
}

#[derive(Debug, Default)]
struct State {
    rooms: HashMap<(UserId, UserId), ConversationId>,
    next_room: i64,
    denied: HashSet<UserId>,
    history: HashMap<ConversationId, Vec<WireMessage>>,
    resolve_error: Option<RoomError>,
    recent_error: Option<RoomError>,
    missed_error: Option<RoomError>,
    send_error: Option<RoomError>,
    send_latency: Option<Duration>,
    resolve_calls: usize,
    missed_calls: Vec<(ConversationId, Sequence)>,
    sent: Vec<SentMessage>,
}

/// Scripted [`RoomService`].
#[derive(Debug, Default)]
pub struct InMemoryRoomService {
    state: Mutex<State>,
}

impl InMemoryRoomService {
    /// Create a service with no rooms and no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the room id returned for this viewer/counterpart pair.
    pub fn set_room(&self, viewer: &UserId, counterpart: &UserId, conversation: ConversationId) {
        self.state
            .lock()
            .rooms
            .insert((viewer.clone(), counterpart.clone()), conversation);
    }

    /// Reject every resolve against `counterpart` as not authorized.
    pub fn deny(&self, counterpart: &UserId) {
        self.state.lock().denied.insert(counterpart.clone());
    }

    /// Append a message to a room's stored history.
    pub fn add_history(&self, conversation: ConversationId, message: WireMessage) {
        self.state
            .lock()
            .history
            .entry(conversation)
            .or_default()
            .push(message);
    }

    /// Make `resolve_room` fail until cleared with `None`.
    pub fn fail_resolve(&self, error: Option<RoomError>) {
        self.state.lock().resolve_error = error;
    }

    /// Make `recent_messages` fail until cleared with `None`.
    pub fn fail_recent(&self, error: Option<RoomError>) {
        self.state.lock().recent_error = error;
    }

    /// Make `missed_messages` fail until cleared with `None`.
    pub fn fail_missed(&self, error: Option<RoomError>) {
        self.state.lock().missed_error = error;
    }

    /// Make `send_message` fail until cleared with `None`.
    pub fn fail_send(&self, error: Option<RoomError>) {
        self.state.lock().send_error = error;
    }

    /// Delay every `send_message` by `latency` before it completes.
    pub fn set_send_latency(&self, latency: Option<Duration>) {
        self.state.lock().send_latency = latency;
    }

    /// Number of `resolve_room` calls so far.
    #[must_use]
    pub fn resolve_calls(&self) -> usize {
        self.state.lock().resolve_calls
    }

    /// Arguments of every `missed_messages` call so far.
    #[must_use]
    pub fn missed_calls(&self) -> Vec<(ConversationId, Sequence)> {
        self.state.lock().missed_calls.clone()
    }

    /// Messages accepted by `send_message` so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }
}

impl RoomService for InMemoryRoomService {
    async fn resolve_room(
        &self,
        counterpart: &UserId,
        viewer: &UserId,
    ) -> Result<ConversationId, RoomError> {
        let mut state = self.state.lock();
        state.resolve_calls += 1;
        if let Some(err) = state.resolve_error.clone() {
            return Err(err);
        }
        if state.denied.contains(counterpart) {
            return Err(RoomError::NotAuthorized);
        }

        let key = (viewer.clone(), counterpart.clone());
        if let Some(id) = state.rooms.get(&key) {
            return Ok(*id);
        }
        state.next_room += 1;
        let id = ConversationId::new(state.next_room);
        state.rooms.insert(key, id);
        Ok(id)
    }

    async fn recent_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<WireMessage>, RoomError> {
        let state = self.state.lock();
        if let Some(err) = state.recent_error.clone() {
            return Err(err);
        }
        Ok(state.history.get(&conversation).cloned().unwrap_or_default())
    }

    async fn missed_messages(
        &self,
        conversation: ConversationId,
        since: Sequence,
    ) -> Result<Vec<WireMessage>, RoomError> {
        let mut state = self.state.lock();
        state.missed_calls.push((conversation, since));
        if let Some(err) = state.missed_error.clone() {
            return Err(err);
        }
        Ok(state
            .history
            .get(&conversation)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.sequence_number.is_some_and(|s| s > since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        body: &str,
        client_ref: ClientRef,
    ) -> Result<(), RoomError> {
        let latency = self.state.lock().send_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        state.sent.push(SentMessage {
            conversation,
            sender: sender.clone(),
            body: body.to_string(),
            client_ref,
        });
        Ok(())
    }
}
