//! Inactivity supervision for one live connection.
//!
//! The connection runtime arms one [`HeartbeatMonitor`] per attempt and
//! installs its `reset` as the catch-all inbound hook: every decoded frame
//! pushes the deadline out by a fresh jittered timeout. When the deadline is
//! reached with no traffic, `expired` resolves and the runtime force-closes
//! the connection.
//!
//! The connection-age rotation needs no dedicated type: it is armed once and
//! never reset, so a plain jittered `sleep` in the runtime's `select!` covers
//! it.

use crate::jitter::jittered;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Resettable inactivity deadline. Cloning yields another handle to the same
/// deadline, so the inbound hook and the waiting runtime share state.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    deadline: Arc<Mutex<Instant>>,
    timeout: Duration,
    jitter: Duration,
}

impl HeartbeatMonitor {
    /// Arm a monitor whose deadline starts `timeout + [0, jitter]` from now.
    pub fn new(timeout: Duration, jitter: Duration) -> Self {
        let deadline = Instant::now() + jittered(timeout, jitter);
        Self { deadline: Arc::new(Mutex::new(deadline)), timeout, jitter }
    }

    /// Push the deadline out by a fresh jittered timeout.
    pub fn reset(&self) {
        let next = Instant::now() + jittered(self.timeout, self.jitter);
        *self.deadline.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }

    fn deadline(&self) -> Instant {
        *self.deadline.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Resolve once the deadline passes without a reset. Resets while waiting
    /// extend the wait; the future only completes on true inactivity.
    pub async fn expired(&self) {
        loop {
            let deadline = self.deadline();
            tokio::time::sleep_until(deadline).await;
            // A reset may have moved the deadline while we slept.
            if self.deadline() <= Instant::now() {
                return;
            }
        }
    }
}
