//! Live-channel frame types.
//!
//! The live channel is a single WebSocket per open conversation. The client
//! subscribes to one topic scoped to the conversation and publishes
//! acknowledgments; the server pushes [`WireMessage`] events on that topic.
//! Frames are JSON objects discriminated by a `type` field.

use serde::{Deserialize, Serialize};

use crate::message::{ConversationId, MessageId, UserId, WireMessage};

/// Returns the subscription topic for a conversation.
#[must_use]
pub fn room_topic(conversation: ConversationId) -> String {
    format!("/topic/rooms/{conversation}")
}

/// Receipt for a message observed by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckReceipt {
    /// Conversation the acknowledged message belongs to.
    pub room_id: ConversationId,
    /// Identity of the acknowledged message.
    pub message_id: MessageId,
    /// The acknowledging party.
    pub user_id: UserId,
}

/// Frames sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Start receiving events for a topic.
    ///
    /// Sent once after every (re)connect; the server forgets subscriptions
    /// when a socket closes.
    Subscribe {
        /// Topic returned by [`room_topic`].
        topic: String,
    },
    /// Stop receiving events for a topic.
    Unsubscribe {
        /// Topic returned by [`room_topic`].
        topic: String,
    },
    /// Acknowledge a received message.
    Ack(AckReceipt),
}

/// Frames sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// The server accepted a subscription.
    Subscribed {
        /// The subscribed topic.
        topic: String,
    },
    /// A chat event published on a topic.
    Message {
        /// Topic the event was published on.
        topic: String,
        /// The event itself.
        payload: WireMessage,
    },
    /// The server reports a protocol error. The socket stays open.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}
