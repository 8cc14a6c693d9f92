//! Optimistic sends.

use std::sync::Arc;

use tokio::sync::oneshot;

use mentorchat_proto::message::ClientRef;

use crate::room::{RoomError, RoomService};
use crate::transport::Connector;

use super::actor::{Completion, SessionActor};

impl<R: RoomService, C: Connector> SessionActor<R, C> {
    /// Shows the message as pending, replies with its token, and posts it.
    ///
    /// The body has already been validated by the handle.
    pub(super) fn handle_send(&mut self, body: String, reply: oneshot::Sender<ClientRef>) {
        let local_key = ClientRef::new();
        self.state.push_pending(body.clone(), local_key);
        self.publish_transcript();
        let _ = reply.send(local_key);

        let rooms = Arc::clone(&self.rooms);
        let conversation = self.state.conversation();
        let sender = self.state.viewer().clone();
        tracing::debug!(conversation = %conversation, %local_key, "sending message");
        self.tasks.spawn(async move {
            let result = rooms
                .send_message(conversation, &sender, &body, local_key)
                .await;
            Completion::Sent { local_key, result }
        });
    }

    /// Flags the entry failed if the request errored. Success needs no
    /// action: the server copy reconciles the entry when it arrives.
    pub(super) fn on_sent(&mut self, local_key: ClientRef, result: Result<(), RoomError>) {
        let Err(e) = result else {
            return;
        };
        if self.state.mark_failed(local_key, e.to_string()) {
            tracing::warn!(conversation = %self.state.conversation(), %local_key, err = %e, "message send failed");
            self.publish_transcript();
        } else {
            tracing::debug!(%local_key, err = %e, "send error for an entry that is no longer pending");
        }
    }
}
