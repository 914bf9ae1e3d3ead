//! Cancellable Deadlines
//!
//! Every delayed callback in the session (reconnect, queue drain) is a
//! [`Timer`] owned by the component it belongs to. The event loop waits on
//! the deadline; cancelling clears it, so nothing can fire once the owner
//! has been torn down.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// A single optional deadline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Create an idle timer.
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer for an absolute instant, replacing any earlier deadline.
    pub fn schedule_at(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    /// Arm the timer `delay` from now.
    pub fn schedule_in(&mut self, delay: Duration) {
        self.schedule_at(Instant::now() + delay);
    }

    /// Disarm the timer. Returns whether it was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Is a deadline pending?
    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Future that completes at the current deadline, or never if idle.
    ///
    /// The future owns a copy of the deadline, so re-arming the timer
    /// afterwards does not affect it.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        }
    }
}
