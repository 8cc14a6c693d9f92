//! The session actor: one task per open conversation.
//!
//! The actor owns the [`ConversationSession`] and handles one event at a
//! time: consumer commands, inbound channel frames, completions of spawned
//! I/O, the reconnect timer, and the acknowledgment re-flush timer. Because nothing
//! else touches the state, no locking is needed and every mutation is
//! ordered.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::Sleep;

use mentorchat_proto::channel::{ServerFrame, room_topic};
use mentorchat_proto::message::{ClientRef, Sequence, WireMessage};

use crate::room::{RoomError, RoomService};
use crate::transport::{ChannelLink, Connector, TransportError};

use super::{ChannelState, ConversationSession, SessionConfig, TranscriptSnapshot};

/// Requests from the [`ChatSession`](super::ChatSession) handle.
#[derive(Debug)]
pub(super) enum Command {
    /// Write a pending entry and post the message.
    Send {
        body: String,
        reply: oneshot::Sender<ClientRef>,
    },
    /// Tear the session down.
    Close,
}

/// Results of I/O the actor spawned.
#[derive(Debug)]
pub(super) enum Completion {
    Connected(Result<ChannelLink, TransportError>),
    Sent {
        local_key: ClientRef,
        result: Result<(), RoomError>,
    },
    Recovered {
        since: Sequence,
        result: Result<Vec<WireMessage>, RoomError>,
    },
}

pub(super) struct SessionActor<R, C> {
    pub(super) state: ConversationSession,
    pub(super) rooms: Arc<R>,
    pub(super) connector: Arc<C>,
    pub(super) topic: String,
    pub(super) reconnect_delay: Duration,
    pub(super) connect_timeout: Duration,
    pub(super) link: Option<ChannelLink>,
    pub(super) retry: Option<Pin<Box<Sleep>>>,
    /// Armed while acknowledgments wait for room in the outbound queue.
    pub(super) ack_retry: Option<Pin<Box<Sleep>>>,
    pub(super) tasks: JoinSet<Completion>,
    pub(super) connecting: bool,
    pub(super) recovering: bool,
    /// A reconnect asked for recovery while a request was in flight.
    pub(super) recovery_again: bool,
    transcript_tx: watch::Sender<TranscriptSnapshot>,
    state_tx: watch::Sender<ChannelState>,
}

impl<R: RoomService, C: Connector> SessionActor<R, C> {
    pub(super) fn new(
        state: ConversationSession,
        rooms: Arc<R>,
        connector: Arc<C>,
        config: &SessionConfig,
        transcript_tx: watch::Sender<TranscriptSnapshot>,
        state_tx: watch::Sender<ChannelState>,
    ) -> Self {
        Self {
            topic: room_topic(state.conversation()),
            state,
            rooms,
            connector,
            reconnect_delay: config.reconnect_delay,
            connect_timeout: config.connect_timeout,
            link: None,
            retry: None,
            ack_retry: None,
            tasks: JoinSet::new(),
            connecting: false,
            recovering: false,
            recovery_again: false,
            transcript_tx,
            state_tx,
        }
    }

    /// Runs until a close command arrives or every handle is gone.
    pub(super) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.start_connect();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Send { body, reply }) => self.handle_send(body, reply),
                    Some(Command::Close) | None => break,
                },
                frame = next_frame(&mut self.link) => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => self.on_link_lost(),
                },
                Some(done) = self.tasks.join_next() => match done {
                    Ok(completion) => self.on_completion(completion),
                    Err(e) => tracing::error!(conversation = %self.state.conversation(), err = %e, "session task failed"),
                },
                () = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    self.start_connect();
                }
                () = retry_elapsed(&mut self.ack_retry) => {
                    self.ack_retry = None;
                    self.flush_acks();
                }
            }
        }

        self.teardown();
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connected(result) => self.on_connect_result(result),
            Completion::Sent { local_key, result } => self.on_sent(local_key, result),
            Completion::Recovered { since, result } => self.on_recovered(since, result),
        }
    }

    pub(super) fn publish_transcript(&self) {
        self.transcript_tx.send_replace(self.state.snapshot());
    }

    pub(super) fn set_channel_state(&mut self, state: ChannelState) {
        if self.state.set_channel_state(state) {
            tracing::debug!(conversation = %self.state.conversation(), ?state, "channel state changed");
            self.state_tx.send_replace(state);
        }
    }

    /// Releases every resource and clears the conversation.
    ///
    /// After this returns no spawned work can reach the state: in-flight
    /// tasks are aborted, the link is closed, and the timer is gone.
    fn teardown(&mut self) {
        self.tasks.abort_all();
        self.retry = None;
        self.ack_retry = None;
        self.link = None;
        self.connecting = false;
        self.recovering = false;
        self.recovery_again = false;
        self.state.clear();
        self.publish_transcript();
        self.state_tx.send_replace(ChannelState::Disconnected);
        tracing::debug!(conversation = %self.state.conversation(), "session torn down");
    }
}

/// Next frame from the link, or never if there is no link.
async fn next_frame(link: &mut Option<ChannelLink>) -> Option<ServerFrame> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

/// Completes when `retry` fires, or never if it is not armed.
async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
