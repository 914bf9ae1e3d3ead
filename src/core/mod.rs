//! Core session primitives.
//!
//! Small value types shared by the game and network layers.

pub mod room;
pub mod timer;

pub use room::{RoomId, RoomIdError};
pub use timer::Timer;
