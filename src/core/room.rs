//! Room Identifiers
//!
//! A room id binds one session to one relay match. Ids created locally are
//! short random base-36 tokens; uniqueness is best-effort and collisions are
//! the relay's problem.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of a freshly generated room token.
pub const ROOM_TOKEN_LEN: usize = 7;

/// Longest room id accepted from a user or the relay.
pub const MAX_ROOM_ID_LEN: usize = 64;

const TOKEN_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of a relay room.
///
/// Restricted to ASCII letters, digits, `-` and `_` so it can be placed in
/// the relay URL query without escaping.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Validate and wrap a room id.
    pub fn parse(raw: impl Into<String>) -> Result<Self, RoomIdError> {
        let raw = raw.into();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(RoomIdError::Empty);
        }
        if trimmed.len() > MAX_ROOM_ID_LEN {
            return Err(RoomIdError::TooLong(trimmed.len()));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(RoomIdError::InvalidChar(bad));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh random room token.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generate a room token from the given RNG.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let token = (0..ROOM_TOKEN_LEN)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl std::str::FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Room id validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomIdError {
    /// Nothing left after trimming.
    #[error("Room id is empty")]
    Empty,

    /// Longer than [`MAX_ROOM_ID_LEN`].
    #[error("Room id is too long ({0} characters)")]
    TooLong(usize),

    /// Contains a character outside `[A-Za-z0-9_-]`.
    #[error("Room id contains invalid character {0:?}")]
    InvalidChar(char),
}
