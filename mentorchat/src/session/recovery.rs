//! Gap recovery after a (re)connect.

use std::sync::Arc;

use mentorchat_proto::message::{Sequence, WireMessage};

use crate::room::{RoomError, RoomService};
use crate::transcript::IngestOutcome;
use crate::transport::Connector;

use super::actor::{Completion, SessionActor};

impl<R: RoomService, C: Connector> SessionActor<R, C> {
    /// Asks for everything after the highest sequence seen so far.
    ///
    /// At most one request is in flight. A reconnect while one is running
    /// is remembered and served by a follow-up request once it completes.
    pub(super) fn start_recovery(&mut self) {
        if self.recovering {
            tracing::debug!("gap recovery already running; follow-up queued");
            self.recovery_again = true;
            return;
        }
        self.recovering = true;

        let rooms = Arc::clone(&self.rooms);
        let conversation = self.state.conversation();
        let since = self.state.transcript().highest_seen_sequence();
        tracing::debug!(conversation = %conversation, since = %since, "recovering missed messages");
        self.tasks.spawn(async move {
            let result = rooms.missed_messages(conversation, since).await;
            Completion::Recovered { since, result }
        });
    }

    /// Merges recovered messages in sequence order, then runs a follow-up
    /// request if a reconnect happened meanwhile and the link is still up.
    ///
    /// A failure is only logged; the next reconnect tries again.
    pub(super) fn on_recovered(
        &mut self,
        since: Sequence,
        result: Result<Vec<WireMessage>, RoomError>,
    ) {
        self.recovering = false;
        match result {
            Ok(missed) => self.merge_recovered(since, missed),
            Err(e) => tracing::warn!(
                conversation = %self.state.conversation(),
                since = %since,
                err = %e,
                "gap recovery failed"
            ),
        }

        if std::mem::take(&mut self.recovery_again) && self.link.is_some() {
            self.start_recovery();
        }
    }

    fn merge_recovered(&mut self, since: Sequence, mut missed: Vec<WireMessage>) {
        missed.sort_by_key(|m| m.sequence_number);
        let mut added = 0_usize;
        for message in &missed {
            if matches!(
                self.state.accept(message),
                Some(IngestOutcome::Appended | IngestOutcome::Reconciled { .. })
            ) {
                added += 1;
            }
        }
        tracing::info!(
            conversation = %self.state.conversation(),
            since = %since,
            fetched = missed.len(),
            added,
            "gap recovery complete"
        );

        if added > 0 {
            self.publish_transcript();
            self.flush_acks();
        }
    }
}
