//! Per-conversation state owned by the session actor.

use mentorchat_proto::message::{ChatMessage, ClientRef, ConversationId, UserId, WireMessage};

use crate::ack::AckEmitter;
use crate::transcript::{IngestOutcome, Transcript};
use crate::transport::{ChannelLink, TransportError};

use super::{ChannelState, TranscriptSnapshot};

/// Everything a session knows about its conversation.
///
/// Mutated only by the session actor; never persisted.
#[derive(Debug)]
pub struct ConversationSession {
    conversation: ConversationId,
    viewer: UserId,
    transcript: Transcript,
    acks: AckEmitter,
    channel_state: ChannelState,
}

impl ConversationSession {
    /// Fresh state for a resolved conversation.
    #[must_use]
    pub fn new(conversation: ConversationId, viewer: UserId) -> Self {
        Self {
            conversation,
            acks: AckEmitter::new(conversation, viewer.clone()),
            viewer,
            transcript: Transcript::new(),
            channel_state: ChannelState::Disconnected,
        }
    }

    /// The resolved conversation.
    #[must_use]
    pub const fn conversation(&self) -> ConversationId {
        self.conversation
    }

    /// The user this session acts for.
    #[must_use]
    pub const fn viewer(&self) -> &UserId {
        &self.viewer
    }

    /// The merged transcript.
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Current channel state.
    #[must_use]
    pub const fn channel_state(&self) -> ChannelState {
        self.channel_state
    }

    /// Records a channel state change; returns `false` if nothing changed.
    pub fn set_channel_state(&mut self, state: ChannelState) -> bool {
        if self.channel_state == state {
            return false;
        }
        self.channel_state = state;
        true
    }

    /// Merges a server message into the transcript.
    ///
    /// Messages for another room and malformed messages are discarded with
    /// a warning and yield `None`. Accepted messages from the other party
    /// are queued for acknowledgment.
    pub fn accept(&mut self, wire: &WireMessage) -> Option<IngestOutcome> {
        if let Some(room) = wire.room_id
            && room != self.conversation
        {
            tracing::warn!(
                conversation = %self.conversation,
                room = %room,
                "discarding message for another room"
            );
            return None;
        }

        let message = match wire.to_chat(&self.viewer) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(conversation = %self.conversation, err = %e, "discarding malformed message");
                return None;
            }
        };

        let outcome = self.transcript.ingest(message.clone(), wire.client_ref);
        match outcome {
            IngestOutcome::Duplicate => {
                tracing::trace!(id = ?message.identity, "duplicate delivery ignored");
            }
            IngestOutcome::Reconciled { local_key } => {
                tracing::debug!(id = ?message.identity, %local_key, "local write confirmed");
            }
            IngestOutcome::Appended => {
                self.acks.observe(&message);
            }
        }
        Some(outcome)
    }

    /// Adds an optimistic entry for an outgoing message.
    pub fn push_pending(&mut self, body: String, local_key: ClientRef) {
        self.transcript
            .push_pending(ChatMessage::local(body), local_key);
    }

    /// Flags a pending entry as failed; `false` if it is no longer pending.
    pub fn mark_failed(&mut self, local_key: ClientRef, reason: impl Into<String>) -> bool {
        self.transcript.mark_failed(local_key, reason)
    }

    /// Number of acknowledgments waiting for the channel.
    #[must_use]
    pub fn queued_acks(&self) -> usize {
        self.acks.queued()
    }

    /// Sends queued acknowledgments over `link`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the link has closed; unsent receipts
    /// stay queued.
    pub fn flush_acks(&mut self, link: &ChannelLink) -> Result<usize, TransportError> {
        self.acks.flush(link)
    }

    /// Copies the transcript into an immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.transcript.entries().into()
    }

    /// Drops all conversation data.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.acks.clear();
        self.channel_state = ChannelState::Disconnected;
    }
}
