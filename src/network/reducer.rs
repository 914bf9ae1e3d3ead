//! Inbound Reducer
//!
//! Folds one decoded relay message into the session state. Each message
//! kind maps to exactly one transition; unknown kinds change nothing.

use serde_json::Value;
use tracing::debug;

use crate::game::state::GameState;
use crate::network::connection::ConnectionState;
use crate::network::protocol::InboundMessage;

/// Events surfaced to the presentation layer outside the published state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// The match ended. Payload shape is owned by the relay.
    GameOver(Value),
}

/// What applying a message did.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Published state changed.
    Updated,
    /// No state change; pass this on to observers.
    Notice(SessionNotice),
    /// Nothing to do.
    Ignored,
}

/// Apply one relay message.
pub fn apply(
    message: InboundMessage,
    game: &mut GameState,
    connection: &mut ConnectionState,
) -> Effect {
    match message {
        InboundMessage::GameState(update) => {
            game.apply(update);
            Effect::Updated
        }
        InboundMessage::PlayerReady => {
            game.opponent_ready = true;
            Effect::Updated
        }
        InboundMessage::GameStarted => {
            game.game_started = true;
            Effect::Updated
        }
        InboundMessage::Error(error) => {
            connection.connection_error = Some(error.message);
            Effect::Updated
        }
        InboundMessage::GameOver(result) => {
            debug!("Game over: {}", result);
            Effect::Notice(SessionNotice::GameOver(result))
        }
        InboundMessage::Unknown(kind) => {
            debug!("Ignoring unknown message kind {:?}", kind);
            Effect::Ignored
        }
    }
}
