//! Room resolution and history collaborator.
//!
//! The chat server exposes conversations through a small REST surface:
//! resolve-or-create the room shared with a counterpart, fetch the most
//! recent page of history, fetch everything after a sequence number, and
//! post a new message. [`RoomService`] abstracts that surface.
//!
//! Implementations:
//! - [`http::HttpRoomService`] — `reqwest` client for the real server
//! - [`memory::InMemoryRoomService`] — scripted fake for testing

pub mod http;
pub mod memory;

use mentorchat_proto::message::{ClientRef, ConversationId, Sequence, UserId, WireMessage};

/// Errors returned by a [`RoomService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The viewer may not access this conversation.
    #[error("not authorized to access this conversation")]
    NotAuthorized,

    /// The service could not be reached or answered with an error.
    #[error("room service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a body that could not be decoded.
    #[error("malformed room service response: {0}")]
    Malformed(String),
}

/// Room lookup, history, and send operations.
pub trait RoomService: Send + Sync + 'static {
    /// Resolve the conversation shared by `viewer` and `counterpart`,
    /// creating it if needed. Idempotent.
    ///
    /// # Errors
    ///
    /// [`RoomError::NotAuthorized`] if the viewer may not talk to the
    /// counterpart; [`RoomError::Unavailable`] for any other failure.
    fn resolve_room(
        &self,
        counterpart: &UserId,
        viewer: &UserId,
    ) -> impl std::future::Future<Output = Result<ConversationId, RoomError>> + Send;

    /// Fetch the most recent page of messages.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError`] if the page cannot be fetched.
    fn recent_messages(
        &self,
        conversation: ConversationId,
    ) -> impl std::future::Future<Output = Result<Vec<WireMessage>, RoomError>> + Send;

    /// Fetch every message with a sequence number greater than `since`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError`] if the messages cannot be fetched.
    fn missed_messages(
        &self,
        conversation: ConversationId,
        since: Sequence,
    ) -> impl std::future::Future<Output = Result<Vec<WireMessage>, RoomError>> + Send;

    /// Post a message. The stored copy comes back over the live channel.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError`] if the server did not accept the message.
    fn send_message(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        body: &str,
        client_ref: ClientRef,
    ) -> impl std::future::Future<Output = Result<(), RoomError>> + Send;
}
