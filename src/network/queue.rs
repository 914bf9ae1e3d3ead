//! Paced Outbound Queue
//!
//! Player intents leave in the order they were submitted, at most one per
//! throttle interval. Messages submitted while the connection is down stay
//! queued and go out once it reopens.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::core::timer::Timer;
use crate::network::connection::ConnectionManager;
use crate::network::protocol::OutboundMessage;

/// FIFO of outbound messages with a minimum spacing between sends.
#[derive(Debug)]
pub struct OutboundQueue {
    pending: VecDeque<OutboundMessage>,
    min_interval: Duration,
    last_sent: Option<Instant>,
    drain: Timer,
}

impl OutboundQueue {
    /// Create an empty queue.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            min_interval,
            last_sent: None,
            drain: Timer::new(),
        }
    }

    /// Append a message. Arms a drain check if none is pending.
    pub fn enqueue(&mut self, message: OutboundMessage) {
        trace!("Queued {} ({} pending)", message.kind(), self.pending.len() + 1);
        self.pending.push_back(message);
        if !self.drain.is_scheduled() {
            self.drain.schedule_at(Instant::now());
        }
    }

    /// Run one drain check, sending at most one message.
    ///
    /// Returns the message handed to the connection, if any. When nothing
    /// can go out yet the next check is rescheduled; while the connection is
    /// down the queue parks until [`resume`](Self::resume).
    pub fn drain(&mut self, connection: &ConnectionManager) -> Option<OutboundMessage> {
        self.drain.cancel();

        if self.pending.is_empty() {
            return None;
        }
        if !connection.is_open() {
            debug!("Holding {} queued messages until the connection opens", self.pending.len());
            return None;
        }

        let now = Instant::now();
        if let Some(last) = self.last_sent {
            let ready_at = last + self.min_interval;
            if now < ready_at {
                self.drain.schedule_at(ready_at);
                return None;
            }
        }

        let message = self.pending.pop_front()?;
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind(), e);
                if !self.pending.is_empty() {
                    self.drain.schedule_at(now);
                }
                return None;
            }
        };

        match connection.send(json) {
            Ok(()) => {
                debug!("Sent {} ({} still queued)", message.kind(), self.pending.len());
                self.last_sent = Some(now);
                if !self.pending.is_empty() {
                    self.drain.schedule_at(now + self.min_interval);
                }
                Some(message)
            }
            Err(e) => {
                debug!("Holding {}: {}", message.kind(), e);
                self.pending.push_front(message);
                None
            }
        }
    }

    /// Connection reopened: pick up where draining stopped.
    pub fn resume(&mut self) {
        if !self.pending.is_empty() && !self.drain.is_scheduled() {
            self.drain.schedule_at(Instant::now());
        }
    }

    /// Drop everything and disarm the drain check. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        self.drain.cancel();
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Messages waiting to go out.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Nothing waiting?
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// When the last message went out.
    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// The drain timer.
    pub fn drain_timer(&self) -> &Timer {
        &self.drain
    }
}
