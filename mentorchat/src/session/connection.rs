//! Live-channel lifecycle for the session actor.
//!
//! `Disconnected → Connecting → Connected`, and back to `Connecting` when
//! the link drops or an attempt fails. A failed or lost connection arms a
//! single reconnect timer; nothing else is reset.

use std::sync::Arc;
use std::time::Duration;

use mentorchat_proto::channel::{ClientFrame, ServerFrame};
use mentorchat_proto::message::Sequence;

use crate::room::RoomService;
use crate::transcript::IngestOutcome;
use crate::transport::{ChannelLink, Connector, TransportError};

use super::ChannelState;
use super::actor::{Completion, SessionActor};

/// How long acknowledgments wait before retrying a full outbound queue.
const ACK_RETRY_DELAY: Duration = Duration::from_millis(20);

impl<R: RoomService, C: Connector> SessionActor<R, C> {
    /// Spawns a connection attempt unless one is running or a link is up.
    pub(super) fn start_connect(&mut self) {
        if self.connecting || self.link.is_some() {
            return;
        }
        self.connecting = true;
        self.set_channel_state(ChannelState::Connecting);

        let connector = Arc::clone(&self.connector);
        let timeout = self.connect_timeout;
        self.tasks.spawn(async move {
            let result = tokio::time::timeout(timeout, connector.connect())
                .await
                .unwrap_or(Err(TransportError::Timeout));
            Completion::Connected(result)
        });
    }

    pub(super) fn on_connect_result(&mut self, result: Result<ChannelLink, TransportError>) {
        self.connecting = false;
        let link = match result {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(
                    conversation = %self.state.conversation(),
                    err = %e,
                    retry_in = ?self.reconnect_delay,
                    "live channel connect failed"
                );
                self.schedule_retry();
                return;
            }
        };

        self.link = Some(link);
        self.set_channel_state(ChannelState::Connected);
        tracing::info!(conversation = %self.state.conversation(), "live channel connected");

        // Recovery starts only once the subscribe is queued.
        self.subscribe();
        if self.link.is_none() {
            return;
        }
        if self.state.transcript().highest_seen_sequence() > Sequence::ZERO {
            self.start_recovery();
        }
        self.flush_acks();
    }

    fn subscribe(&mut self) {
        let frame = ClientFrame::Subscribe {
            topic: self.topic.clone(),
        };
        let result = match &self.link {
            Some(link) => link.try_send(frame),
            None => return,
        };
        if let Err(e) = result {
            tracing::warn!(topic = %self.topic, err = %e, "subscribe failed");
            self.on_link_lost();
        }
    }

    /// Writes queued acknowledgments if the channel is up.
    ///
    /// Receipts the outbound queue has no room for are retried after
    /// [`ACK_RETRY_DELAY`].
    pub(super) fn flush_acks(&mut self) {
        let Some(link) = &self.link else {
            return;
        };
        match self.state.flush_acks(link) {
            Ok(sent) => {
                if sent > 0 {
                    tracing::debug!(conversation = %self.state.conversation(), sent, "flushed acknowledgments");
                }
                if self.state.queued_acks() > 0 && self.ack_retry.is_none() {
                    tracing::debug!(
                        queued = self.state.queued_acks(),
                        "outbound queue full; acknowledgments deferred"
                    );
                    self.ack_retry = Some(Box::pin(tokio::time::sleep(ACK_RETRY_DELAY)));
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, "acknowledgment write failed");
                self.on_link_lost();
            }
        }
    }

    pub(super) fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Subscribed { topic } => {
                tracing::debug!(topic = %topic, "subscription confirmed");
            }
            ServerFrame::Error { reason } => {
                tracing::warn!(conversation = %self.state.conversation(), reason = %reason, "server reported a protocol error");
            }
            ServerFrame::Message { topic, payload } => {
                if topic != self.topic {
                    tracing::warn!(topic = %topic, "ignoring message for unsubscribed topic");
                    return;
                }
                match self.state.accept(&payload) {
                    Some(IngestOutcome::Appended | IngestOutcome::Reconciled { .. }) => {
                        self.publish_transcript();
                        self.flush_acks();
                    }
                    Some(IngestOutcome::Duplicate) | None => {}
                }
            }
        }
    }

    /// Drops the link and schedules a reconnect. The transcript is kept.
    pub(super) fn on_link_lost(&mut self) {
        self.ack_retry = None;
        if self.link.take().is_some() {
            tracing::warn!(
                conversation = %self.state.conversation(),
                retry_in = ?self.reconnect_delay,
                "live channel lost"
            );
        }
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        self.set_channel_state(ChannelState::Connecting);
        self.retry = Some(Box::pin(tokio::time::sleep(self.reconnect_delay)));
    }
}
