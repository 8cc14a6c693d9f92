//! Conversation sessions.
//!
//! A [`ChatSession`] is the consumer handle for one open conversation.
//! Opening it resolves the conversation with the room service and loads the
//! latest history page; it then spawns a session actor that owns the
//! [`ConversationSession`] state and drives the live channel:
//!
//! - connect, subscribe, and reconnect after a fixed delay on loss
//! - merge live frames and recovered gaps into the transcript
//! - acknowledge messages from the other party
//! - run optimistic sends and flag the ones that fail
//!
//! The transcript and channel state are published on `watch` channels, so
//! readers always see the latest snapshot without locking.
//!
//! Closing the session, or dropping the handle, tears the actor down: the
//! link is closed, the reconnect timer is cancelled, in-flight requests are
//! aborted, and the state is cleared.

mod actor;
mod bootstrap;
mod connection;
mod recovery;
mod send;
mod state;

pub use state::ConversationSession;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use mentorchat_proto::message::{ClientRef, ConversationId, UserId, ValidationError, validate_body};

use crate::room::RoomService;
use crate::transcript::TranscriptEntry;
use crate::transport::Connector;

use actor::{Command, SessionActor};

/// Default delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the command queue into the session actor.
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Immutable view of the transcript at one point in time.
pub type TranscriptSnapshot = Arc<[TranscriptEntry]>;

/// Whether the live channel is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and none being attempted.
    Disconnected,
    /// A connection attempt is running or scheduled.
    Connecting,
    /// Subscribed to the conversation topic.
    Connected,
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The user this client acts for.
    pub viewer: UserId,
    /// Wait between a lost or failed connection and the next attempt.
    pub reconnect_delay: Duration,
    /// Bound on one connection attempt; exceeding it counts as a failure.
    pub connect_timeout: Duration,
    /// Capacity of the command queue.
    pub command_buffer: usize,
}

impl SessionConfig {
    /// Configuration with default timings for `viewer`.
    #[must_use]
    pub const fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

/// Errors from [`ChatSession::open`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    /// The viewer may not talk to this counterpart.
    #[error("not authorized to open this conversation")]
    NotAuthorized,

    /// The conversation could not be resolved.
    #[error("conversation unavailable: {0}")]
    Unavailable(String),
}

/// Errors from [`ChatSession::send`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The message body was rejected before anything was written.
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The session has been closed.
    #[error("session closed")]
    Closed,
}

/// Handle to an open conversation.
#[derive(Debug)]
pub struct ChatSession {
    conversation: ConversationId,
    commands: mpsc::Sender<Command>,
    transcript: watch::Receiver<TranscriptSnapshot>,
    channel_state: watch::Receiver<ChannelState>,
    actor: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Open the conversation with `counterpart`.
    ///
    /// Resolves the conversation and loads the most recent history page
    /// before returning; the live channel is then opened in the background.
    /// A history failure is not fatal: the session starts empty.
    ///
    /// # Errors
    ///
    /// - [`OpenError::NotAuthorized`] if the room service refuses access.
    /// - [`OpenError::Unavailable`] if the conversation cannot be resolved.
    pub async fn open<R: RoomService, C: Connector>(
        config: SessionConfig,
        rooms: Arc<R>,
        connector: Arc<C>,
        counterpart: &UserId,
    ) -> Result<Self, OpenError> {
        let state = bootstrap::bootstrap(rooms.as_ref(), &config.viewer, counterpart).await?;
        let conversation = state.conversation();

        let (transcript_tx, transcript) = watch::channel(state.snapshot());
        let (state_tx, channel_state) = watch::channel(ChannelState::Disconnected);
        let (commands, command_rx) = mpsc::channel(config.command_buffer.max(1));

        let actor = SessionActor::new(
            state,
            rooms,
            connector,
            &config,
            transcript_tx,
            state_tx,
        );
        let handle = tokio::spawn(actor.run(command_rx));

        tracing::info!(conversation = %conversation, counterpart = %counterpart, "session opened");
        Ok(Self {
            conversation,
            commands,
            transcript,
            channel_state,
            actor: Some(handle),
        })
    }

    /// The resolved conversation.
    #[must_use]
    pub const fn conversation(&self) -> ConversationId {
        self.conversation
    }

    /// Send a message.
    ///
    /// The message appears in the transcript as pending before this returns.
    /// The returned token identifies that entry; it turns confirmed when the
    /// server copy arrives, or failed if the send request errors.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Validation`] if the body is empty or too large; no
    ///   entry is created.
    /// - [`SessionError::Closed`] if the session has shut down.
    pub async fn send(&self, body: impl Into<String>) -> Result<ClientRef, SessionError> {
        let body = body.into();
        validate_body(&body)?;

        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Send { body, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Subscribe to transcript snapshots.
    #[must_use]
    pub fn transcript(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.transcript.clone()
    }

    /// Subscribe to channel state changes.
    #[must_use]
    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.channel_state.clone()
    }

    /// Close the session and wait for teardown to finish.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close).await;
        if let Some(actor) = self.actor.take()
            && let Err(e) = actor.await
        {
            tracing::warn!(conversation = %self.conversation, err = %e, "session actor ended abnormally");
        }
        tracing::info!(conversation = %self.conversation, "session closed");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(actor) = self.actor.take() {
            actor.abort();
        }
    }
}
