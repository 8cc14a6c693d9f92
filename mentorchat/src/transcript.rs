//! In-memory conversation transcript with idempotent merge.
//!
//! [`Transcript`] is the single ordering authority for a conversation.
//! Messages from the live channel, from gap recovery, and from the initial
//! history page all enter through [`Transcript::ingest`], which
//!
//! 1. drops re-deliveries of an identity already present,
//! 2. reconciles a server echo of the viewer's own message with its pending
//!    optimistic entry (in place, no duplicate),
//! 3. otherwise appends and re-sorts,
//! 4. advances the highest observed sequence number.
//!
//! Confirmed entries are ordered by sequence number; entries without one
//! (pending or failed local writes) follow them in the order they were
//! appended.

use mentorchat_proto::message::{ChatMessage, ClientRef, Origin, Sequence};

/// Delivery lifecycle of a transcript entry.
///
/// Local writes start as `Pending` and end as `Confirmed` (server echo
/// reconciled) or `Failed` (the send request errored). Entries that arrive
/// from the server are `Confirmed` from the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    /// Shown optimistically, awaiting the server copy.
    Pending,
    /// Carries a server identity and sequence number.
    Confirmed,
    /// The send request failed; terminal.
    Failed(String),
}

/// One rendered line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// The message as currently known.
    pub message: ChatMessage,
    /// Where the entry is in its delivery lifecycle.
    pub state: DeliveryState,
    /// Correlation token of an optimistic write, kept after confirmation.
    pub local_key: Option<ClientRef>,
}

/// What [`Transcript::ingest`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The identity was already present; nothing changed.
    Duplicate,
    /// A pending local write was replaced by its confirmed copy.
    Reconciled {
        /// Token of the entry that was confirmed.
        local_key: ClientRef,
    },
    /// The message was added as a new entry.
    Appended,
}

/// Ordered, deduplicated transcript of one conversation.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    highest_seen: Sequence,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in display order.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the transcript has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest sequence number observed so far; never decreases.
    #[must_use]
    pub const fn highest_seen_sequence(&self) -> Sequence {
        self.highest_seen
    }

    /// Number of local writes still awaiting confirmation.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == DeliveryState::Pending)
            .count()
    }

    /// Appends an optimistic local write.
    ///
    /// The entry is placed after every confirmed entry and after earlier
    /// local writes.
    pub fn push_pending(&mut self, message: ChatMessage, local_key: ClientRef) {
        self.entries.push(TranscriptEntry {
            message,
            state: DeliveryState::Pending,
            local_key: Some(local_key),
        });
    }

    /// Merges a message from the server into the transcript.
    ///
    /// `client_ref` is the correlation token echoed by the server, if any.
    /// When present it selects the local write to reconcile exactly; when
    /// absent, the oldest pending local write is reconciled (sends are
    /// assumed to be confirmed in the order they were issued).
    pub fn ingest(&mut self, message: ChatMessage, client_ref: Option<ClientRef>) -> IngestOutcome {
        if let Some(identity) = message.identity
            && self
                .entries
                .iter()
                .any(|e| e.message.identity == Some(identity))
        {
            return IngestOutcome::Duplicate;
        }

        if let Some(seq) = message.sequence {
            self.highest_seen = self.highest_seen.max(seq);
        }

        let outcome = match self.reconcile_target(&message, client_ref) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.message = message;
                entry.state = DeliveryState::Confirmed;
                // reconcile_target only returns entries with a key
                let local_key = entry.local_key.unwrap_or_default();
                IngestOutcome::Reconciled { local_key }
            }
            None => {
                self.entries.push(TranscriptEntry {
                    message,
                    state: DeliveryState::Confirmed,
                    local_key: None,
                });
                IngestOutcome::Appended
            }
        };

        self.restore_order();
        outcome
    }

    /// Flags a pending local write as failed.
    ///
    /// Returns `false` if no pending entry has this key (it was already
    /// confirmed, already failed, or the transcript was cleared).
    pub fn mark_failed(&mut self, local_key: ClientRef, reason: impl Into<String>) -> bool {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.local_key == Some(local_key) && e.state == DeliveryState::Pending)
        else {
            return false;
        };
        entry.state = DeliveryState::Failed(reason.into());
        true
    }

    /// Looks up an entry by the token returned from a send.
    #[must_use]
    pub fn find_local(&self, local_key: ClientRef) -> Option<&TranscriptEntry> {
        self.entries
            .iter()
            .find(|e| e.local_key == Some(local_key))
    }

    /// Drops every entry and resets the sequence watermark.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.highest_seen = Sequence::ZERO;
    }

    fn reconcile_target(&self, message: &ChatMessage, client_ref: Option<ClientRef>) -> Option<usize> {
        if message.origin != Origin::LocalUser {
            return None;
        }
        match client_ref {
            Some(token) => self.entries.iter().position(|e| {
                e.local_key == Some(token) && e.state == DeliveryState::Pending
            }),
            None => self.entries.iter().position(|e| {
                e.state == DeliveryState::Pending && e.message.identity.is_none()
            }),
        }
    }

    fn restore_order(&mut self) {
        // Stable: unsequenced entries keep their append order.
        self.entries
            .sort_by_key(|e| e.message.sequence.map_or((1, 0), |s| (0, s.get())));
    }
}
