//! Live-channel transport abstraction.
//!
//! A [`Connector`] opens one persistent connection to the chat server and
//! hands back a [`ChannelLink`]: an outbound frame queue and an inbound
//! frame stream. Implementations:
//! - [`websocket::WsConnector`] — JSON frames over a WebSocket
//! - [`loopback::LoopbackConnector`] — in-process channels for testing
//!
//! Lifecycle callbacks map onto the link: a successful `connect` is
//! on-connected, the inbound stream ending is on-disconnected, and a
//! [`ServerFrame::Error`] is on-protocol-error.

pub mod loopback;
pub mod websocket;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use mentorchat_proto::channel::{ClientFrame, ServerFrame};

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The outbound queue is full; the frame was not written.
    #[error("outbound queue full")]
    Busy,

    /// The server could not be reached.
    #[error("server {0} is unreachable")]
    Unreachable(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open connection to the chat server.
///
/// Dropping the link closes the connection: background tasks registered via
/// [`with_tasks`](Self::with_tasks) are aborted.
#[derive(Debug)]
pub struct ChannelLink {
    outbound: mpsc::Sender<ClientFrame>,
    inbound: mpsc::Receiver<ServerFrame>,
    tasks: Vec<AbortHandle>,
}

impl ChannelLink {
    /// Creates a link from its two frame queues.
    #[must_use]
    pub const fn new(
        outbound: mpsc::Sender<ClientFrame>,
        inbound: mpsc::Receiver<ServerFrame>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            tasks: Vec::new(),
        }
    }

    /// Ties background tasks to the link's lifetime.
    #[must_use]
    pub fn with_tasks(mut self, handles: impl IntoIterator<Item = JoinHandle<()>>) -> Self {
        self.tasks
            .extend(handles.into_iter().map(|h| h.abort_handle()));
        self
    }

    /// Queues a frame for sending without waiting.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Busy`] if the outbound queue is full.
    /// - [`TransportError::ConnectionClosed`] if the connection is gone.
    pub fn try_send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Busy,
            mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed,
        })
    }

    /// Receives the next frame; `None` once the connection is lost.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.inbound.recv().await
    }

    /// Returns `true` while the outbound side still accepts frames.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

impl Drop for ChannelLink {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Opens live-channel connections.
///
/// Each call to [`connect`](Self::connect) is one attempt; retry policy
/// belongs to the caller.
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the server cannot be reached or the
    /// handshake fails.
    fn connect(&self) -> impl std::future::Future<Output = Result<ChannelLink, TransportError>> + Send;
}
