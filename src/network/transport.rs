//! Transport Seam
//!
//! The connection manager never touches a socket type directly. It asks a
//! [`Connector`] for a [`Transport`] and pumps text frames through it. The
//! production pair is backed by tokio-tungstenite; tests script their own.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// How a transport ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Close handshake completed.
    Clean,
    /// Stream ended without a close handshake.
    Unclean,
}

/// One item read from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame.
    Text(String),
    /// The peer went away.
    Closed(CloseKind),
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection refused or unreachable.
    #[error("Connection refused: {0}")]
    Refused(String),

    /// Connection attempt did not finish in time.
    #[error("Connection attempt timed out")]
    TimedOut,

    /// Connection dropped mid-stream.
    #[error("Connection dropped: {0}")]
    Dropped(String),
}

/// A single open, bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next text frame or the end of the connection.
    async fn recv(&mut self) -> Result<Incoming, TransportError>;

    /// Start a clean close.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to a relay URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

// =============================================================================
// WEBSOCKET IMPLEMENTATION
// =============================================================================

/// Connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, response) = connect_async(url).await?;
        debug!("WebSocket handshake finished with status {}", response.status());
        Ok(Box::new(WsTransport { stream }))
    }
}

/// Transport over a tungstenite WebSocket stream.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Incoming, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Incoming::Text(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Incoming::Text(text)),
                    Err(e) => debug!("Dropping non-UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!("Relay closed connection: {:?}", frame);
                    return Ok(Incoming::Closed(CloseKind::Clean));
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Incoming::Closed(CloseKind::Unclean)),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream.close(None).await?;
        Ok(())
    }
}

// =============================================================================
// SCRIPTED TRANSPORT (tests)
// =============================================================================
