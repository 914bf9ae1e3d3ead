//! Relay Connection Management
//!
//! Keeps exactly one live transport to the relay for the bound room and
//! recovers it after unclean drops with a bounded number of fixed-delay
//! retries.
//!
//! ```text
//! Idle → Connecting → Open → ClosedClean
//!                        ↘ (unclean) ReconnectScheduled → Connecting → …
//!                                    ↘ (attempts exhausted) Exhausted
//! ```
//!
//! Each physical socket is pumped by a link task that forwards tagged
//! [`ConnectionEvent`]s to the session loop. Events carry the generation of
//! the attempt that produced them; anything from a superseded attempt is
//! ignored.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::RelayConfig;
use crate::core::room::RoomId;
use crate::core::timer::Timer;
use crate::network::protocol::InboundMessage;
use crate::network::transport::{CloseKind, Connector, Incoming, TransportError};

/// Status shown after a transport-level error.
pub const CONNECTION_FAILED_MESSAGE: &str = "Connection to the server failed";

/// Status shown while an automatic reconnect is pending.
pub fn reconnecting_message(attempt: u32, max: u32) -> String {
    format!("Reconnecting... attempt {}/{}", attempt, max)
}

/// Status shown once automatic reconnects are exhausted.
pub fn exhausted_message(max: u32) -> String {
    format!("Could not connect to the server after {} attempts", max)
}

// =============================================================================
// EVENTS AND STATE
// =============================================================================

/// What a link reports about its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport is open.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// Transport-level failure. A `Closed` event follows if the link died.
    Error(String),
    /// Transport ended.
    Closed {
        /// Close handshake completed (or we asked for the close).
        clean: bool,
    },
}

/// A [`ConnectionEvent`] tagged with the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    /// Connection attempt number.
    pub generation: u64,
    /// The event.
    pub event: ConnectionEvent,
}

/// Where the connection state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Never connected.
    Idle,
    /// Waiting for the transport to open.
    Connecting,
    /// Transport open.
    Open,
    /// Closed on purpose. No retry.
    ClosedClean,
    /// Dropped; a reconnect is scheduled.
    ReconnectScheduled,
    /// Dropped and out of retries. Only a manual connect leaves this state.
    Exhausted,
}

/// Connection status published to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Transport open.
    pub is_connected: bool,
    /// Most recent notable condition, for display.
    pub connection_error: Option<String>,
    /// Automatic reconnects since the last successful open.
    pub reconnect_attempts: u32,
    /// Room the connection is bound to.
    pub bound_room_id: Option<RoomId>,
}

/// Result of a connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Already open to that room; nothing done.
    AlreadyConnected,
    /// Another attempt happened inside the debounce window; dropped.
    Debounced,
    /// A new attempt is under way.
    Started {
        /// Room bound before this attempt.
        previous: Option<RoomId>,
    },
}

/// What a handled link event means for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOutcome {
    /// Transport opened for this room.
    Opened(RoomId),
    /// A decoded relay message.
    Inbound(InboundMessage),
    /// Transport closed.
    Closed {
        /// Whether the close was clean.
        clean: bool,
    },
    /// Nothing for the session to do.
    Nothing,
}

/// Send failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// No open transport.
    #[error("No open connection to the relay")]
    NotOpen,

    /// The link task is gone.
    #[error("Connection link has shut down")]
    LinkGone,
}

// =============================================================================
// CONNECTION MANAGER
// =============================================================================

/// Owns the lifecycle of the relay connection.
pub struct ConnectionManager {
    config: Arc<RelayConfig>,
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<LinkEvent>,
    link: Option<Link>,
    generation: u64,
    phase: ConnectionPhase,
    state: ConnectionState,
    last_attempt: Option<Instant>,
    reconnect: Timer,
}

impl ConnectionManager {
    /// Create a manager that reports link events on `events`.
    pub fn new(
        config: Arc<RelayConfig>,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            config,
            connector,
            events,
            link: None,
            generation: 0,
            phase: ConnectionPhase::Idle,
            state: ConnectionState::default(),
            last_attempt: None,
            reconnect: Timer::new(),
        }
    }

    /// Connect to `room`, replacing any other connection.
    ///
    /// A no-op when already open to `room`, and dropped when another attempt
    /// started less than the throttle interval ago.
    pub fn connect(&mut self, room: RoomId) -> ConnectOutcome {
        if self.is_open() && self.state.bound_room_id.as_ref() == Some(&room) {
            debug!("Already connected to room {}", room);
            return ConnectOutcome::AlreadyConnected;
        }

        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            let elapsed = now.duration_since(last);
            if elapsed < self.config.message_throttle {
                debug!("Dropping connect to room {}: last attempt {:?} ago", room, elapsed);
                return ConnectOutcome::Debounced;
            }
        }
        self.last_attempt = Some(now);

        if let Some(link) = self.link.take() {
            debug!("Closing link {} before reconnecting", link.generation);
            link.close();
        }

        self.generation += 1;
        self.phase = ConnectionPhase::Connecting;
        self.state.is_connected = false;
        let previous = self.state.bound_room_id.replace(room.clone());

        let url = self.config.relay_url(&room);
        info!("Connecting to {}", url);
        self.link = Some(Link::spawn(
            self.generation,
            url,
            Arc::clone(&self.connector),
            self.config.connect_timeout,
            self.events.clone(),
        ));

        ConnectOutcome::Started { previous }
    }

    /// Fire the scheduled reconnect.
    ///
    /// Goes through [`connect`](Self::connect), debounce included.
    pub fn reconnect_now(&mut self) -> Option<ConnectOutcome> {
        self.reconnect.cancel();
        let room = self.state.bound_room_id.clone()?;

        info!(
            "Reconnecting to room {} (attempt {}/{})",
            room, self.state.reconnect_attempts, self.config.max_reconnect_attempts
        );
        let outcome = self.connect(room);
        if outcome == ConnectOutcome::Debounced {
            warn!("Scheduled reconnect fell inside the throttle window and was dropped");
        }
        Some(outcome)
    }

    /// Close cleanly without triggering a reconnect.
    pub fn close(&mut self) {
        self.reconnect.cancel();
        self.generation += 1;

        if let Some(link) = self.link.take() {
            info!("Closing connection to room {:?}", self.state.bound_room_id);
            link.close();
        }

        self.state.is_connected = false;
        if self.phase != ConnectionPhase::Idle {
            self.phase = ConnectionPhase::ClosedClean;
        }
    }

    /// Apply one link event.
    pub fn handle_event(&mut self, event: LinkEvent) -> LinkOutcome {
        if event.generation != self.generation {
            trace!("Ignoring {:?} from superseded link {}", event.event, event.generation);
            return LinkOutcome::Nothing;
        }

        match event.event {
            ConnectionEvent::Opened => self.on_open(),
            ConnectionEvent::Message(text) => match InboundMessage::from_json(&text) {
                Ok(message) => LinkOutcome::Inbound(message),
                Err(e) => {
                    warn!("Dropping malformed relay message: {} - {}", e, text);
                    LinkOutcome::Nothing
                }
            },
            ConnectionEvent::Error(reason) => {
                warn!("Relay connection error: {}", reason);
                self.state.connection_error = Some(CONNECTION_FAILED_MESSAGE.to_string());
                LinkOutcome::Nothing
            }
            ConnectionEvent::Closed { clean } => {
                self.on_closed(clean);
                LinkOutcome::Closed { clean }
            }
        }
    }

    fn on_open(&mut self) -> LinkOutcome {
        self.phase = ConnectionPhase::Open;
        self.state.is_connected = true;
        self.state.connection_error = None;
        self.state.reconnect_attempts = 0;
        self.reconnect.cancel();

        match self.state.bound_room_id.clone() {
            Some(room) => {
                info!("Connected to room {}", room);
                LinkOutcome::Opened(room)
            }
            None => LinkOutcome::Nothing,
        }
    }

    fn on_closed(&mut self, clean: bool) {
        self.state.is_connected = false;
        self.link = None;

        if clean {
            info!("Connection closed cleanly");
            self.phase = ConnectionPhase::ClosedClean;
            return;
        }

        let max = self.config.max_reconnect_attempts;
        if self.state.reconnect_attempts < max {
            self.state.reconnect_attempts += 1;
            let attempt = self.state.reconnect_attempts;
            self.state.connection_error = Some(reconnecting_message(attempt, max));
            self.reconnect.schedule_in(self.config.reconnect_delay);
            self.phase = ConnectionPhase::ReconnectScheduled;
            info!(
                "Connection lost, reconnect {}/{} in {:?}",
                attempt, max, self.config.reconnect_delay
            );
        } else {
            self.state.connection_error = Some(exhausted_message(max));
            self.phase = ConnectionPhase::Exhausted;
            warn!("Giving up on the relay after {} reconnect attempts", max);
        }
    }

    /// Hand a frame to the open transport.
    pub fn send(&self, text: String) -> Result<(), ConnectionError> {
        match &self.link {
            Some(link) if self.phase == ConnectionPhase::Open => link
                .commands
                .send(LinkCommand::Send(text))
                .map_err(|_| ConnectionError::LinkGone),
            _ => Err(ConnectionError::NotOpen),
        }
    }

    /// Is the transport open?
    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open && self.link.is_some()
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Published connection status.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Mutable status, for relay-reported errors.
    pub(crate) fn state_mut(&mut self) -> &mut ConnectionState {
        &mut self.state
    }

    /// Room the connection is bound to.
    pub fn bound_room(&self) -> Option<&RoomId> {
        self.state.bound_room_id.as_ref()
    }

    /// The reconnect timer.
    pub fn reconnect_timer(&self) -> &Timer {
        &self.reconnect
    }
}

// =============================================================================
// LINK TASK
// =============================================================================

enum LinkCommand {
    Send(String),
    Close,
}

/// Handle to the task pumping one transport.
///
/// Dropping the handle closes the transport cleanly.
struct Link {
    generation: u64,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl Link {
    fn spawn(
        generation: u64,
        url: String,
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_link(
            generation,
            url,
            connector,
            connect_timeout,
            command_rx,
            events,
        ));
        Self { generation, commands }
    }

    fn close(self) {
        let _ = self.commands.send(LinkCommand::Close);
    }
}

async fn run_link(
    generation: u64,
    url: String,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let emit = |event: ConnectionEvent| {
        let _ = events.send(LinkEvent { generation, event });
    };
    let fail = |error: TransportError| {
        emit(ConnectionEvent::Error(error.to_string()));
        emit(ConnectionEvent::Closed { clean: false });
    };

    let connected = tokio::select! {
        result = tokio::time::timeout(connect_timeout, connector.connect(&url)) => result,
        _ = commands.recv() => {
            debug!("Link {} cancelled while connecting", generation);
            return;
        }
    };

    let mut transport = match connected {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => return fail(e),
        Err(_) => return fail(TransportError::TimedOut),
    };
    emit(ConnectionEvent::Opened);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Send(text)) => {
                    if let Err(e) = transport.send(text).await {
                        return fail(e);
                    }
                }
                Some(LinkCommand::Close) | None => {
                    if let Err(e) = transport.close().await {
                        debug!("Error while closing link {}: {}", generation, e);
                    }
                    emit(ConnectionEvent::Closed { clean: true });
                    return;
                }
            },
            incoming = transport.recv() => match incoming {
                Ok(Incoming::Text(text)) => emit(ConnectionEvent::Message(text)),
                Ok(Incoming::Closed(kind)) => {
                    emit(ConnectionEvent::Closed { clean: kind == CloseKind::Clean });
                    return;
                }
                Err(e) => return fail(e),
            },
        }
    }
}
