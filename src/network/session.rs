//! Session Store
//!
//! The one externally visible state container and the player intents.
//!
//! ```text
//!  SessionStore (handle)                 session loop (one task)
//!  ─────────────────────                 ───────────────────────
//!  create_room / join_room ──Command──▶  ConnectionManager ◀──LinkEvent── link task
//!  set_ready / play_card   ──Command──▶  OutboundQueue ──frames──▶ link task
//!  subscribe()  ◀──────── watch ───────  InboundReducer
//!  notices()    ◀────── broadcast ─────
//! ```
//!
//! All mutation of the connection, queue and published snapshot happens on
//! the loop. The only exceptions are the synchronous parts of an intent
//! (the optimistic ready flag and the `playCard` guard), which go through
//! the same watch channel and so are atomic for readers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::RelayConfig;
use crate::core::room::RoomId;
use crate::game::card::Card;
use crate::game::state::GameState;
use crate::network::connection::{
    ConnectOutcome, ConnectionManager, ConnectionState, LinkEvent, LinkOutcome,
};
use crate::network::protocol::{InboundMessage, OutboundMessage};
use crate::network::queue::OutboundQueue;
use crate::network::reducer::{self, Effect, SessionNotice};
use crate::network::transport::{Connector, WsConnector};

/// Capacity of the notice channel. Slow observers lose the oldest notices.
const NOTICE_CAPACITY: usize = 16;

/// Everything the presentation layer reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Game state.
    pub game: GameState,
    /// Connection status.
    pub connection: ConnectionState,
}

impl SessionSnapshot {
    /// Transport open?
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected
    }

    /// Status string to show, if any.
    pub fn connection_error(&self) -> Option<&str> {
        self.connection.connection_error.as_deref()
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session loop is gone.
    #[error("Session has shut down")]
    Closed,
}

#[derive(Debug)]
enum Command {
    Connect(RoomId),
    Send(OutboundMessage),
    Disconnect,
    Shutdown,
}

// =============================================================================
// HANDLE
// =============================================================================

/// Handle to a running session.
///
/// Dropping the handle stops the session and closes the connection cleanly.
pub struct SessionStore {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    notices: broadcast::Sender<SessionNotice>,
    task: JoinHandle<()>,
}

impl SessionStore {
    /// Start a session talking WebSocket to the configured relay.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: RelayConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Start a session over a custom connector.
    pub fn with_connector(config: RelayConfig, connector: Arc<dyn Connector>) -> Self {
        let config = Arc::new(config);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionSnapshot::default());
        let state = Arc::new(state);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let driver = SessionDriver {
            connection: ConnectionManager::new(Arc::clone(&config), connector, event_tx),
            queue: OutboundQueue::new(config.message_throttle),
            state: Arc::clone(&state),
            notices: notices.clone(),
            commands: command_rx,
            events: event_rx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands,
            state,
            notices,
            task,
        }
    }

    /// Create a room with a fresh random id and connect to it.
    pub fn create_room(&self) -> Result<RoomId, SessionError> {
        let room = RoomId::generate();
        info!("Creating room {}", room);
        self.join_room(room.clone())?;
        Ok(room)
    }

    /// Connect to an existing room.
    ///
    /// Once a connection to a different room actually starts, the game
    /// state starts fresh. A connect dropped by the debounce leaves it alone.
    pub fn join_room(&self, room: RoomId) -> Result<(), SessionError> {
        self.command(Command::Connect(room))
    }

    /// Declare ready. `is_ready` is set locally straight away.
    ///
    /// The loop sets it again when it takes the command, so a room switch
    /// queued just before does not wipe it.
    pub fn set_ready(&self) -> Result<(), SessionError> {
        self.command(Command::Send(OutboundMessage::Ready))?;
        self.state.send_if_modified(mark_ready);
        Ok(())
    }

    /// Give up the current match.
    pub fn surrender(&self) -> Result<(), SessionError> {
        self.command(Command::Send(OutboundMessage::Surrender))
    }

    /// Offer another match in the same room.
    pub fn offer_rematch(&self) -> Result<(), SessionError> {
        self.command(Command::Send(OutboundMessage::Rematch))
    }

    /// Play a card. Ignored before the match has started.
    ///
    /// Returns whether the card was queued.
    pub fn play_card(&self, card: Card) -> Result<bool, SessionError> {
        self.ensure_running()?;

        let started = self.state.borrow().game.game_started;
        if !started {
            debug!("Ignoring play of {}: game has not started", card);
            return Ok(false);
        }

        self.command(Command::Send(OutboundMessage::PlayCard { card }))?;
        Ok(true)
    }

    /// Close the connection cleanly. No automatic reconnect follows;
    /// a later `join_room` connects again.
    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.command(Command::Disconnect)
    }

    /// Stop the session and wait for the loop to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            error!("Session loop ended abnormally: {}", e);
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Current game state.
    pub fn game_state(&self) -> GameState {
        self.state.borrow().game.clone()
    }

    /// Transport open?
    pub fn is_connected(&self) -> bool {
        self.state.borrow().connection.is_connected
    }

    /// Status string to show, if any.
    pub fn connection_error(&self) -> Option<String> {
        self.state.borrow().connection.connection_error.clone()
    }

    /// Watch every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Receive notices such as game over.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.commands.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }
}

fn mark_ready(snapshot: &mut SessionSnapshot) -> bool {
    let changed = !snapshot.game.is_ready;
    snapshot.game.is_ready = true;
    changed
}

// =============================================================================
// SESSION LOOP
// =============================================================================

struct SessionDriver {
    connection: ConnectionManager,
    queue: OutboundQueue,
    state: Arc<watch::Sender<SessionSnapshot>>,
    notices: broadcast::Sender<SessionNotice>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

enum Step {
    Command(Option<Command>),
    Link(LinkEvent),
    Reconnect,
    Drain,
}

impl SessionDriver {
    async fn run(mut self) {
        debug!("Session loop started");

        loop {
            let reconnect = self.connection.reconnect_timer().wait();
            let drain = self.queue.drain_timer().wait();

            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(event) = self.events.recv() => Step::Link(event),
                _ = reconnect => Step::Reconnect,
                _ = drain => Step::Drain,
            };

            match step {
                Step::Command(None) | Step::Command(Some(Command::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Link(event) => self.handle_link(event),
                Step::Reconnect => {
                    self.connection.reconnect_now();
                }
                Step::Drain => {
                    self.queue.drain(&self.connection);
                }
            }

            self.publish(|_, _| false);
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(room) => {
                let ConnectOutcome::Started { previous } = self.connection.connect(room.clone())
                else {
                    return;
                };
                if let Some(previous) = previous.filter(|previous| *previous != room) {
                    info!("Switched from room {} to {}", previous, room);
                }
                self.publish(|game, _| {
                    if game.room_id.as_ref() == Some(&room) {
                        return false;
                    }
                    *game = GameState::for_room(room);
                    true
                });
            }
            Command::Send(message) => {
                if message == OutboundMessage::Ready {
                    self.publish(|game, _| {
                        let changed = !game.is_ready;
                        game.is_ready = true;
                        changed
                    });
                }
                self.queue.enqueue(message);
            }
            Command::Disconnect => self.connection.close(),
            Command::Shutdown => {}
        }
    }

    fn handle_link(&mut self, event: LinkEvent) {
        match self.connection.handle_event(event) {
            LinkOutcome::Opened(room) => {
                self.publish(|game, _| {
                    let changed = game.room_id.as_ref() != Some(&room);
                    game.room_id = Some(room);
                    changed
                });
                self.queue.resume();
            }
            LinkOutcome::Inbound(message) => self.apply_inbound(message),
            LinkOutcome::Closed { .. } | LinkOutcome::Nothing => {}
        }
    }

    fn apply_inbound(&mut self, message: InboundMessage) {
        let mut notice = None;
        self.publish(|game, connection| match reducer::apply(message, game, connection) {
            Effect::Updated => true,
            Effect::Notice(n) => {
                notice = Some(n);
                false
            }
            Effect::Ignored => false,
        });

        if let Some(notice) = notice {
            // No subscribers is fine
            let _ = self.notices.send(notice);
        }
    }

    /// Publish one transition: `update` runs against the game state and the
    /// live connection status, then the status is copied into the snapshot.
    fn publish(&mut self, update: impl FnOnce(&mut GameState, &mut ConnectionState) -> bool) {
        let connection = self.connection.state_mut();
        self.state.send_if_modified(|snapshot| {
            let mut changed = update(&mut snapshot.game, connection);
            if snapshot.connection != *connection {
                snapshot.connection = connection.clone();
                changed = true;
            }
            changed
        });
    }

    fn teardown(&mut self) {
        self.connection.close();
        let dropped = self.queue.discard();
        if dropped > 0 {
            debug!("Dropped {} unsent messages on shutdown", dropped);
        }
        self.publish(|_, _| false);
        info!("Session closed");
    }
}
