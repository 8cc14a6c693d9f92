//! Request and response bodies of the room resolution/history service.

use serde::{Deserialize, Serialize};

use crate::message::{ClientRef, ConversationId, UserId};

/// Body of `POST /api/chat/rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRoomRequest {
    /// The other party of the conversation.
    pub counterpart_id: UserId,
    /// The viewing user, when the server cannot infer it from credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_id: Option<UserId>,
}

/// Response of `POST /api/chat/rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRoomResponse {
    /// The existing or newly created room.
    pub room_id: ConversationId,
}

/// Body of `POST /api/chat/rooms/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Author of the message.
    pub sender_id: UserId,
    /// Text payload.
    pub content: String,
    /// Correlation token the server echoes on the confirmed copy.
    pub client_ref: ClientRef,
}
