//! Protocol Messages
//!
//! Wire format for client-relay communication over WebSocket.
//! Every frame in both directions is a JSON envelope
//! `{ "type": <kind>, "payload"?: <data> }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::card::Card;
use crate::game::state::GameStateUpdate;

// =============================================================================
// ENVELOPE
// =============================================================================

/// Untyped wire envelope, used to read the declared kind before the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Declared message kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

// =============================================================================
// CLIENT -> RELAY MESSAGES
// =============================================================================

/// Player intents sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Ready to start the match.
    Ready,

    /// Give up the current match.
    Surrender,

    /// Ask for another match in the same room.
    Rematch,

    /// Put a card on the table.
    PlayCard {
        /// The card to play.
        card: Card,
    },
}

impl OutboundMessage {
    /// Wire kind of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Ready => "ready",
            OutboundMessage::Surrender => "surrender",
            OutboundMessage::Rematch => "rematch",
            OutboundMessage::PlayCard { .. } => "playCard",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// RELAY -> CLIENT MESSAGES
// =============================================================================

/// Messages pushed by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Partial game state to merge.
    GameState(GameStateUpdate),

    /// The opponent declared ready.
    PlayerReady,

    /// The match has started.
    GameStarted,

    /// Relay-side error to show the player.
    Error(RelayError),

    /// Match finished. Shape belongs to the relay.
    GameOver(Value),

    /// A kind this client does not know. Ignored.
    Unknown(String),
}

/// Payload of an `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayError {
    /// Human-readable message.
    pub message: String,
}

impl InboundMessage {
    /// Decode a raw text frame.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Self::try_from(Envelope::from_json(s)?)
    }

    /// Wire kind of this message.
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::GameState(_) => "gameState",
            InboundMessage::PlayerReady => "playerReady",
            InboundMessage::GameStarted => "gameStarted",
            InboundMessage::Error(_) => "error",
            InboundMessage::GameOver(_) => "gameOver",
            InboundMessage::Unknown(kind) => kind.as_str(),
        }
    }
}

impl TryFrom<Envelope> for InboundMessage {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { kind, payload } = envelope;

        let message = match kind.as_str() {
            "gameState" => InboundMessage::GameState(typed_payload(&kind, payload)?),
            "playerReady" => InboundMessage::PlayerReady,
            "gameStarted" => InboundMessage::GameStarted,
            "error" => InboundMessage::Error(typed_payload(&kind, payload)?),
            "gameOver" => InboundMessage::GameOver(payload.unwrap_or(Value::Null)),
            _ => InboundMessage::Unknown(kind),
        };

        Ok(message)
    }
}

fn typed_payload<T: serde::de::DeserializeOwned>(
    kind: &str,
    payload: Option<Value>,
) -> Result<T, ProtocolError> {
    let payload = payload.ok_or_else(|| ProtocolError::MissingPayload(kind.to_string()))?;
    serde_json::from_value(payload).map_err(|source| ProtocolError::Payload {
        kind: kind.to_string(),
        source,
    })
}

/// Inbound decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not a JSON envelope.
    #[error("Malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// Known kind without its required payload.
    #[error("Message {0:?} is missing its payload")]
    MissingPayload(String),

    /// Known kind whose payload has the wrong shape.
    #[error("Invalid {kind:?} payload: {source}")]
    Payload {
        /// Declared kind.
        kind: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
}
