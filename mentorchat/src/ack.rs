//! Acknowledgment emission for observed messages.
//!
//! Every message the transcript accepts that was written by someone other
//! than the viewer, and that carries a server identity, is acknowledged
//! once over the live channel. System notices and the viewer's own
//! messages are never acknowledged.
//!
//! Receipts produced while the channel is down (initial history, a gap
//! recovery that completes after a drop) wait in an outbox and are flushed
//! in order right after the next subscribe.

use std::collections::VecDeque;

use mentorchat_proto::channel::{AckReceipt, ClientFrame};
use mentorchat_proto::message::{ChatMessage, ConversationId, Origin, UserId};

use crate::transport::{ChannelLink, TransportError};

/// Builds the receipt for `message`, or `None` if it must not be acknowledged.
#[must_use]
pub fn receipt_for(
    conversation: ConversationId,
    acknowledger: &UserId,
    message: &ChatMessage,
) -> Option<AckReceipt> {
    if message.origin != Origin::RemotePeer {
        return None;
    }
    let message_id = message.identity?;
    Some(AckReceipt {
        room_id: conversation,
        message_id,
        user_id: acknowledger.clone(),
    })
}

/// Queues and sends acknowledgments for one conversation.
#[derive(Debug)]
pub struct AckEmitter {
    conversation: ConversationId,
    acknowledger: UserId,
    outbox: VecDeque<AckReceipt>,
}

impl AckEmitter {
    /// Creates an emitter acknowledging on behalf of `acknowledger`.
    #[must_use]
    pub const fn new(conversation: ConversationId, acknowledger: UserId) -> Self {
        Self {
            conversation,
            acknowledger,
            outbox: VecDeque::new(),
        }
    }

    /// Queues a receipt for `message` if it qualifies.
    ///
    /// Call this only for messages the transcript accepted, never for
    /// duplicates, so that each message is acknowledged once.
    pub fn observe(&mut self, message: &ChatMessage) -> bool {
        match receipt_for(self.conversation, &self.acknowledger, message) {
            Some(receipt) => {
                self.outbox.push_back(receipt);
                true
            }
            None => false,
        }
    }

    /// Number of receipts waiting to be sent.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Writes queued receipts to the channel, oldest first.
    ///
    /// Stops at the first receipt the link cannot take; it stays queued.
    /// Returns how many receipts were handed to the link.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the link has closed.
    pub fn flush(&mut self, link: &ChannelLink) -> Result<usize, TransportError> {
        let mut sent = 0;
        while let Some(receipt) = self.outbox.pop_front() {
            match link.try_send(ClientFrame::Ack(receipt.clone())) {
                Ok(()) => {
                    tracing::debug!(
                        conversation = %receipt.room_id,
                        message_id = %receipt.message_id,
                        "acknowledged message"
                    );
                    sent += 1;
                }
                Err(TransportError::Busy) => {
                    self.outbox.push_front(receipt);
                    break;
                }
                Err(e) => {
                    self.outbox.push_front(receipt);
                    return Err(e);
                }
            }
        }
        Ok(sent)
    }

    /// Drops every queued receipt.
    pub fn clear(&mut self) {
        self.outbox.clear();
    }
}
