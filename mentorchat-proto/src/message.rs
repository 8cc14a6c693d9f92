//! Message model for the `MentorChat` protocol.
//!
//! [`WireMessage`] is the shape the chat server produces, both on the live
//! channel and from the history endpoints. [`ChatMessage`] is the client's
//! canonical transcript entry, derived from a wire message relative to the
//! viewing user, or created locally as an optimistic write.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed message body size in bytes (4 KB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024;

/// Server-assigned identifier of a two-party chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(i64);

impl ConversationId {
    /// Creates a `ConversationId` from the server's numeric room id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric room id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identity of a confirmed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Creates a `MessageId` from the server's numeric message id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric message id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-conversation sequence number assigned by the server.
///
/// Strictly increasing within one conversation; used for ordering and gap
/// detection. `Sequence::ZERO` means "nothing observed yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// The sequence value before any message has been observed.
    pub const ZERO: Self = Self(0);

    /// Creates a sequence number.
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a user of the mentoring product (mentor or mentee).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identity from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-generated correlation token attached to an outgoing message.
///
/// Based on UUID v7 so tokens sort by creation time. The server echoes it
/// back on the confirmed copy when it supports correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientRef(Uuid);

impl ClientRef {
    /// Creates a new time-ordered correlation token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `ClientRef` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Who a transcript entry belongs to, from the viewer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Written by the viewing user (rendered on the right, never acknowledged).
    LocalUser,
    /// Written by the other party of the conversation.
    RemotePeer,
    /// Generated by the server (room created, mentor joined, ...).
    System,
}

/// The `type` discriminator carried by every wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    /// An ordinary chat message written by a participant.
    Chat,
    /// A server-generated notice.
    System,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server identity; `None` while the message only exists locally.
    pub identity: Option<MessageId>,
    /// Rendering side and acknowledgment eligibility.
    pub origin: Origin,
    /// The text payload.
    pub body: String,
    /// Display name of the author, present for remote-peer messages.
    pub author_label: Option<String>,
    /// Server send time once confirmed; client placeholder while pending.
    pub timestamp: Timestamp,
    /// Server-assigned ordering key; `None` until confirmed.
    pub sequence: Option<Sequence>,
}

impl ChatMessage {
    /// Creates an unconfirmed message authored by the viewing user.
    pub fn local(body: impl Into<String>) -> Self {
        Self {
            identity: None,
            origin: Origin::LocalUser,
            body: body.into(),
            author_label: None,
            timestamp: Timestamp::now(),
            sequence: None,
        }
    }

    /// Returns `true` if the server has confirmed this message.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.identity.is_some()
    }
}

/// Error returned when a message body fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message body is empty or whitespace only.
    #[error("message content is empty")]
    Empty,
    /// Message body exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the body in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates an outgoing message body.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] if the body is blank, or
/// [`ValidationError::TooLarge`] if it exceeds [`MAX_MESSAGE_SIZE`].
pub fn validate_body(body: &str) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = body.len();
    if size > MAX_MESSAGE_SIZE {
        return Err(ValidationError::TooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// A chat message as produced by the server.
///
/// Field names follow the server's JSON (`camelCase`). Everything except the
/// discriminator is optional on the wire so that a partially-filled event
/// can still be decoded and then rejected with a precise diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Server identity of the message.
    #[serde(default)]
    pub id: Option<MessageId>,
    /// Room the message belongs to.
    #[serde(default)]
    pub room_id: Option<ConversationId>,
    /// Author of the message (absent for some system notices).
    #[serde(default)]
    pub sender_id: Option<UserId>,
    /// Author display name.
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Text payload.
    #[serde(default)]
    pub content: String,
    /// Ordinary chat message or system notice.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Server send time in milliseconds since the UNIX epoch.
    #[serde(default)]
    pub sent_at: Option<Timestamp>,
    /// Per-room sequence number.
    #[serde(default)]
    pub sequence_number: Option<Sequence>,
    /// Correlation token echoed from the originating send, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<ClientRef>,
}

/// Error returned when a wire message cannot become a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    /// The server identity is missing.
    #[error("message has no id")]
    MissingId,
    /// The sequence number is missing.
    #[error("message {0} has no sequence number")]
    MissingSequence(MessageId),
    /// A chat message carries no text.
    #[error("chat message {0} has empty content")]
    EmptyContent(MessageId),
}

impl WireMessage {
    /// Converts this wire message into a transcript entry as seen by `viewer`.
    ///
    /// `type = SYSTEM` maps to [`Origin::System`]; a message whose sender is
    /// the viewer maps to [`Origin::LocalUser`]; anything else is
    /// [`Origin::RemotePeer`] and keeps the sender's display name.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedMessage`] if the id or sequence number is missing,
    /// or if a chat message has empty content.
    pub fn to_chat(&self, viewer: &UserId) -> Result<ChatMessage, MalformedMessage> {
        let id = self.id.ok_or(MalformedMessage::MissingId)?;
        let sequence = self
            .sequence_number
            .ok_or(MalformedMessage::MissingSequence(id))?;

        let origin = match self.kind {
            MessageKind::System => Origin::System,
            MessageKind::Chat if self.sender_id.as_ref() == Some(viewer) => Origin::LocalUser,
            MessageKind::Chat => Origin::RemotePeer,
        };
        if self.kind == MessageKind::Chat && self.content.is_empty() {
            return Err(MalformedMessage::EmptyContent(id));
        }

        let author_label = match origin {
            Origin::RemotePeer => self.sender_name.clone(),
            Origin::LocalUser | Origin::System => None,
        };

        Ok(ChatMessage {
            identity: Some(id),
            origin,
            body: self.content.clone(),
            author_label,
            timestamp: self.sent_at.unwrap_or_else(Timestamp::now),
            sequence: Some(sequence),
        })
    }
}
