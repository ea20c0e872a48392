//! WebSocket transport.
//!
//! A [`Connector`] opens one socket and hands back a [`Connection`]: an
//! outbound text queue plus a stream of [`SocketEvent`]s. Reconnection
//! policy lives above this layer; a `Connection` is single-use and ends
//! with exactly one [`SocketEvent::Closed`].
//!
//! # Example
//!
//! ```rust,ignore
//! use apsim_api::websocket::{Connector, SocketEvent, WebSocketConnector};
//! use url::Url;
//!
//! let url = Url::parse("ws://localhost:8000/ws")?;
//! let mut conn = WebSocketConnector.connect(&url).await?;
//! conn.outgoing.send(r#"{"type":"get_state"}"#.into())?;
//!
//! while let Some(event) = conn.incoming.recv().await {
//!     match event {
//!         SocketEvent::Text(text) => println!("{text}"),
//!         SocketEvent::Error(e) => eprintln!("{e}"),
//!         SocketEvent::Closed => break,
//!     }
//! }
//! ```

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::Error;

// ── SocketEvent ──────────────────────────────────────────────────────

/// What the transport reports for an open connection.
#[derive(Debug)]
pub enum SocketEvent {
    /// One inbound text frame.
    Text(String),
    /// Transport failure. Always followed by [`SocketEvent::Closed`].
    Error(Error),
    /// The socket is gone. Nothing follows.
    Closed,
}

// ── Connection ───────────────────────────────────────────────────────

/// Both halves of an open socket.
///
/// Dropping `outgoing` closes the socket from our side.
#[derive(Debug)]
pub struct Connection {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<SocketEvent>,
}

/// The far side of an in-memory [`Connection`].
#[derive(Debug)]
pub struct Peer {
    /// Frames the client wrote.
    pub sent: mpsc::UnboundedReceiver<String>,
    /// Feed events to the client.
    pub events: mpsc::UnboundedSender<SocketEvent>,
}

impl Connection {
    /// A connection backed by channels instead of a socket.
    pub fn in_memory() -> (Self, Peer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
            },
            Peer {
                sent: out_rx,
                events: in_tx,
            },
        )
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Opens connections to an endpoint.
pub trait Connector: Send + 'static {
    fn connect(&mut self, url: &Url) -> impl Future<Output = Result<Connection, Error>> + Send;
}

/// Real WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&mut self, url: &Url) -> impl Future<Output = Result<Connection, Error>> + Send {
        let url = url.clone();
        async move { open(&url).await }
    }
}

/// Reject anything that is not `ws://` or `wss://`.
pub fn validate_endpoint(url: &Url) -> Result<(), Error> {
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(Error::UnsupportedScheme(other.to_owned())),
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Handshake, then split the socket into a reader task and a writer task.
async fn open(url: &Url) -> Result<Connection, Error> {
    validate_endpoint(url)?;
    tracing::info!(url = %url, "Connecting to WebSocket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");

    let (mut write, mut read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = write.send(Message::text(text)).await {
                tracing::warn!(error = %e, "WebSocket send failed");
                break;
            }
        }
        // Sender dropped: close from our side.
        let _ = write.close().await;
        tracing::debug!("WebSocket writer exiting");
    });

    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if in_tx.send(SocketEvent::Text(text.as_str().to_owned())).is_err() {
                        return;
                    }
                }
                Ok(Message::Close(frame)) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "WebSocket close frame received"
                        );
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // tungstenite answers pings itself
                    tracing::trace!("WebSocket ping");
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = in_tx.send(SocketEvent::Error(Error::WebSocket(e.to_string())));
                    break;
                }
            }
        }
        let _ = in_tx.send(SocketEvent::Closed);
        tracing::debug!("WebSocket reader exiting");
    });

    Ok(Connection {
        outgoing: out_tx,
        incoming: in_rx,
    })
}

// ── Tests ────────────────────────────────────────────────────────────
