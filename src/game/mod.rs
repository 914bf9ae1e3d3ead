//! Game Domain Module
//!
//! Values the relay sends about a match. No rules are evaluated here.
//!
//! ## Module Structure
//!
//! - `card`: Card, suit and rank values
//! - `state`: Client game state and partial relay updates

pub mod card;
pub mod state;

// Re-export key types
pub use card::{Card, Rank, Suit};
pub use state::{FieldPair, GameState, GameStateUpdate};
