//! Network Layer
//!
//! Everything between the player intents and the relay socket: wire format,
//! transport seam, connection recovery, send pacing and state reduction.
//! Game values themselves live in `game/`.

pub mod connection;
pub mod protocol;
pub mod queue;
pub mod reducer;
pub mod session;
pub mod transport;

pub use connection::{
    ConnectOutcome, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionPhase,
    ConnectionState, LinkEvent, LinkOutcome,
};
pub use protocol::{Envelope, InboundMessage, OutboundMessage, ProtocolError, RelayError};
pub use queue::OutboundQueue;
pub use reducer::{Effect, SessionNotice};
pub use session::{SessionError, SessionSnapshot, SessionStore};
pub use transport::{CloseKind, Connector, Incoming, Transport, TransportError, WsConnector, WsTransport};
