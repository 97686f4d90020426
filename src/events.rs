//! Instance-status event stream.
//!
//! When the control endpoint reports the instance deactivated, the session
//! publishes a [`InstanceEvent::Deregistered`] event. Delivery is
//! best-effort: a subscriber that never started listening, or that cannot
//! keep up, must not block publication or abort the session. Its events are
//! dropped with a warning.

use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Buffered events per subscriber before drops begin.
const SUBSCRIBER_BUFFER: usize = 8;

/// Instance-level status changes published by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    /// The control endpoint no longer recognizes this instance's
    /// registration. Expect one per inactive reconnect cycle.
    Deregistered,
}

struct Subscriber {
    name: String,
    tx: mpsc::Sender<InstanceEvent>,
}

/// Fan-out publisher for [`InstanceEvent`]s.
#[derive(Default)]
pub struct InstanceEventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl InstanceEventBus {
    /// A bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named subscriber and return its event stream.
    pub fn subscribe(&self, name: impl Into<String>) -> mpsc::Receiver<InstanceEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subscribers.push(Subscriber { name: name.into(), tx });
        rx
    }

    /// Deliver `event` to every live subscriber, dropping it for any that is
    /// full or gone.
    pub fn publish(&self, event: InstanceEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = %sub.name, ?event, "subscriber full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(subscriber = %sub.name, "subscriber gone, removing");
                false
            }
        });
    }
}
