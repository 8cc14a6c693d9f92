//! Loopback connector for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to stand in for the chat
//! server. [`LoopbackConnector::create`] returns the connector a session
//! uses and a [`LoopbackServer`] handle the test drives: push server frames,
//! inspect what the client sent, sever the connection, refuse new ones.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use mentorchat_proto::channel::{AckReceipt, ClientFrame, ServerFrame};

use super::{ChannelLink, Connector, TransportError};

#[derive(Debug, Default)]
struct Shared {
    /// Sender into the current client's inbound stream.
    to_client: Option<mpsc::Sender<ServerFrame>>,
    /// Every frame any connection has sent, in order.
    received: Vec<ClientFrame>,
    attempts: usize,
    refuse: bool,
}

/// Client side of a loopback pair.
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    shared: Arc<Mutex<Shared>>,
    notify: Arc<Notify>,
    buffer: usize,
}

/// Server side of a loopback pair, driven by tests.
#[derive(Debug, Clone)]
pub struct LoopbackServer {
    shared: Arc<Mutex<Shared>>,
    notify: Arc<Notify>,
}

impl LoopbackConnector {
    /// Create a connected connector/server pair.
    ///
    /// `buffer` is the channel capacity in each direction.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use mentorchat::transport::Connector;
    /// use mentorchat::transport::loopback::LoopbackConnector;
    ///
    /// # async fn example() {
    /// let (connector, server) = LoopbackConnector::create(32);
    /// let _link = connector.connect().await.unwrap();
    /// assert!(server.is_connected());
    /// # }
    /// ```
    #[must_use]
    pub fn create(buffer: usize) -> (Self, LoopbackServer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let notify = Arc::new(Notify::new());
        let connector = Self {
            shared: Arc::clone(&shared),
            notify: Arc::clone(&notify),
            buffer,
        };
        (connector, LoopbackServer { shared, notify })
    }
}

impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<ChannelLink, TransportError> {
        let (to_client, inbound) = mpsc::channel(self.buffer);
        {
            let mut shared = self.shared.lock();
            shared.attempts += 1;
            if shared.refuse {
                return Err(TransportError::Unreachable("loopback".into()));
            }
            shared.to_client = Some(to_client);
        }

        let (outbound, mut from_client) = mpsc::channel::<ClientFrame>(self.buffer);
        let shared = Arc::clone(&self.shared);
        let notify = Arc::clone(&self.notify);
        let collector = tokio::spawn(async move {
            while let Some(frame) = from_client.recv().await {
                shared.lock().received.push(frame);
                notify.notify_one();
            }
        });

        Ok(ChannelLink::new(outbound, inbound).with_tasks([collector]))
    }
}

impl LoopbackServer {
    /// Push a frame to the connected client.
    ///
    /// Returns `false` if no client is connected.
    pub fn push(&self, frame: ServerFrame) -> bool {
        let shared = self.shared.lock();
        shared
            .to_client
            .as_ref()
            .is_some_and(|tx| tx.try_send(frame).is_ok())
    }

    /// Sever the current connection, as a network partition would.
    pub fn disconnect(&self) {
        self.shared.lock().to_client = None;
    }

    /// Make subsequent connection attempts fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.shared.lock().refuse = refuse;
    }

    /// Whether a client currently holds an open connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared
            .lock()
            .to_client
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Number of connection attempts seen so far, including refused ones.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.shared.lock().attempts
    }

    /// Every frame received from clients so far.
    #[must_use]
    pub fn received(&self) -> Vec<ClientFrame> {
        self.shared.lock().received.clone()
    }

    /// Acknowledgments received so far, in arrival order.
    #[must_use]
    pub fn acks(&self) -> Vec<AckReceipt> {
        self.shared
            .lock()
            .received
            .iter()
            .filter_map(|f| match f {
                ClientFrame::Ack(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wait until the received frames satisfy `pred`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if `timeout` elapses first.
    pub async fn wait_for<F>(&self, timeout: Duration, pred: F) -> Result<(), TransportError>
    where
        F: Fn(&[ClientFrame]) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                if pred(&self.shared.lock().received) {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await
        .map_err(|_| TransportError::Timeout)
    }
}
