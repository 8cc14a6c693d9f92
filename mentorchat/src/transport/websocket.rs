//! WebSocket live channel.
//!
//! Implements [`Connector`] over a WebSocket connection to the chat server.
//! Frames are JSON text messages encoded with [`mentorchat_proto::codec`].
//! Each link owns two background tasks: a writer draining the outbound
//! queue into the socket and a reader decoding server frames. When the
//! reader exits the link's inbound stream ends, which the session treats
//! as a lost connection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use mentorchat_proto::channel::{ClientFrame, ServerFrame};
use mentorchat_proto::codec;

use super::{ChannelLink, Connector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// Capacity of the per-link frame queues.
const FRAME_BUFFER: usize = 256;

/// Opens WebSocket connections to a fixed server URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector for `url` (`ws://` or `wss://`).
    #[must_use]
    pub const fn new(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
        }
    }

    /// The server URL this connector dials.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for WsConnector {
    /// Dial the server and start the reader and writer tasks.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if the handshake exceeds the connect timeout.
    /// - [`TransportError::Unreachable`] if the server refuses the connection.
    /// - [`TransportError::Io`] for TLS, HTTP upgrade, or other socket failures.
    async fn connect(&self) -> Result<ChannelLink, TransportError> {
        let url = self.url.as_str();
        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(url))
                .await
                .map_err(|_| {
                    tracing::warn!(url, "WebSocket connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url, err = %e, "WebSocket connect failed");
                    map_ws_connect_error(&self.url, e)
                })?;
        tracing::info!(url, "live channel connected");

        let (ws_sink, ws_reader) = ws_stream.split();
        let (outbound, out_rx) = mpsc::channel(FRAME_BUFFER);
        let (in_tx, inbound) = mpsc::channel(FRAME_BUFFER);

        let writer = tokio::spawn(writer_loop(ws_sink, out_rx));
        let reader = tokio::spawn(reader_loop(ws_reader, in_tx));

        Ok(ChannelLink::new(outbound, inbound).with_tasks([writer, reader]))
    }
}

/// Drains queued client frames into the socket.
///
/// Frames that fail to encode are logged and dropped. Exits when the link
/// is dropped or the socket rejects a write.
async fn writer_loop(mut ws_sink: WsSink, mut frames: mpsc::Receiver<ClientFrame>) {
    while let Some(frame) = frames.recv().await {
        let text = match codec::encode_client(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(err = %e, "dropping unencodable frame");
                continue;
            }
        };
        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
            tracing::warn!(err = %e, "WebSocket write failed");
            break;
        }
    }
    let _ = ws_sink.close().await;
    tracing::debug!("WebSocket writer exiting");
}

/// Decodes server frames and forwards them to the link.
///
/// Malformed frames are logged and skipped; the connection stays up.
/// Exits on close, read error, or when the link is dropped.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<ServerFrame>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match codec::decode_server(text.as_str()) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed server frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket closed by server");
                break;
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!("ignoring binary frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    tracing::info!("WebSocket reader exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(url: &Url, err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::AddrNotAvailable => {
                TransportError::Unreachable(url.to_string())
            }
            _ => TransportError::Io(io_err),
        },
        WsError::Tls(_) => TransportError::Io(std::io::Error::other(format!("TLS error: {err}"))),
        WsError::Http(response) => TransportError::Io(std::io::Error::other(format!(
            "WebSocket upgrade rejected: status {}",
            response.status()
        ))),
        other => TransportError::Io(std::io::Error::other(format!(
            "WebSocket connection error: {other}"
        ))),
    }
}
