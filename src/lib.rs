//! # Durak Session
//!
//! Resilient relay session layer for the two-player Durak card game client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DURAK SESSION                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Session primitives                      │
//! │  ├── room.rs       - Room ids and random room tokens         │
//! │  └── timer.rs      - Cancellable deadlines                   │
//! │                                                              │
//! │  game/             - Values the relay sends                  │
//! │  ├── card.rs       - Cards, suits, ranks                     │
//! │  └── state.rs      - Game state and partial updates          │
//! │                                                              │
//! │  network/          - Relay communication                     │
//! │  ├── protocol.rs   - Wire envelope and message types         │
//! │  ├── transport.rs  - Connector/transport seam (WebSocket)    │
//! │  ├── connection.rs - Connect, debounce, bounded reconnect    │
//! │  ├── queue.rs      - Paced FIFO outbound queue               │
//! │  ├── reducer.rs    - Inbound message reduction               │
//! │  └── session.rs    - Session store and event loop            │
//! │                                                              │
//! │  config.rs         - Relay address and timing                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - At most one live relay connection per session.
//! - Unclean drops are retried a bounded number of times at a fixed delay;
//!   clean closes are never retried.
//! - Outbound intents go out in submission order, spaced by at least the
//!   throttle interval, and survive reconnects.
//! - Malformed or unknown inbound messages never break the session.
//!
//! The relay owns the game rules. Nothing here validates a move.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::RelayConfig;
pub use core::room::{RoomId, RoomIdError};
pub use game::card::{Card, Rank, Suit};
pub use game::state::{GameState, GameStateUpdate};
pub use network::reducer::SessionNotice;
pub use network::session::{SessionError, SessionSnapshot, SessionStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
