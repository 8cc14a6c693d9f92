//! Conversation resolution and initial history load.

use mentorchat_proto::message::UserId;

use crate::room::{RoomError, RoomService};

use super::{ConversationSession, OpenError};

/// Resolves the conversation with `counterpart` and seeds it with the most
/// recent history page.
///
/// Only resolution failures are fatal. A failed history fetch leaves the
/// transcript empty.
pub(super) async fn bootstrap<R: RoomService>(
    rooms: &R,
    viewer: &UserId,
    counterpart: &UserId,
) -> Result<ConversationSession, OpenError> {
    let conversation = rooms
        .resolve_room(counterpart, viewer)
        .await
        .map_err(|e| {
            tracing::warn!(counterpart = %counterpart, err = %e, "room resolution failed");
            match e {
                RoomError::NotAuthorized => OpenError::NotAuthorized,
                other => OpenError::Unavailable(other.to_string()),
            }
        })?;

    let mut state = ConversationSession::new(conversation, viewer.clone());
    match rooms.recent_messages(conversation).await {
        Ok(mut page) => {
            page.sort_by_key(|m| m.sequence_number);
            let accepted = page.iter().filter(|m| state.accept(m).is_some()).count();
            tracing::info!(
                conversation = %conversation,
                accepted,
                highest = %state.transcript().highest_seen_sequence(),
                "loaded recent history"
            );
        }
        Err(e) => {
            tracing::warn!(conversation = %conversation, err = %e, "recent history unavailable, starting empty");
        }
    }
    Ok(state)
}
