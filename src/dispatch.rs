//! Inbound message routing.
//!
//! A [`HandlerRegistry`] maps each [`MessageKind`] to one handler, plus an
//! optional catch-all hook invoked for every decoded frame (the session uses
//! it to reset the inactivity timer). Handler failures are logged and
//! dropped: a misbehaving handler must never end the session.

use crate::error::{ClientError, HandlerError};
use crate::messages::{ControlMessage, MessageKind, OutboundMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Write side of the channel, as seen by handlers sending acknowledgements.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send one frame. Safe for concurrent callers.
    async fn send(&self, msg: OutboundMessage) -> Result<(), ClientError>;
}

/// A routed handler for one message kind.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The message kind this handler owns.
    fn kind(&self) -> MessageKind;

    /// Handle one inbound message. `outbound` is the live connection the
    /// message arrived on, for acknowledgements.
    async fn handle(
        &self,
        msg: &ControlMessage,
        outbound: &dyn Outbound,
    ) -> Result<(), HandlerError>;
}

/// Catch-all hook invoked for every decoded frame, before the routed handler.
pub type InboundHook = Arc<dyn Fn(&ControlMessage) + Send + Sync>;

#[derive(Default)]
struct Inner {
    by_kind: HashMap<MessageKind, Arc<dyn MessageHandler>>,
    any: Option<InboundHook>,
}

/// Registry of routed handlers, shared between the session and the clients
/// it creates. Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for its message kind, replacing any previous one.
    pub fn register(&self, handler: Arc<dyn MessageHandler>) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.by_kind.insert(handler.kind(), handler);
    }

    /// Install the catch-all hook, replacing any previous one.
    pub fn set_any_message_hook(&self, hook: InboundHook) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.any = Some(hook);
    }

    /// Whether a handler is registered for `kind`.
    pub fn contains(&self, kind: MessageKind) -> bool {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner.by_kind.contains_key(&kind)
    }

    /// Route one decoded frame: catch-all hook first, then the handler
    /// registered for the frame's kind. Handler errors are logged, not
    /// propagated.
    pub async fn dispatch(&self, msg: &ControlMessage, outbound: &dyn Outbound) {
        let (hook, handler) = {
            let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
            (inner.any.clone(), inner.by_kind.get(&msg.kind()).cloned())
        };
        if let Some(hook) = hook {
            hook(msg);
        }
        match handler {
            Some(handler) => {
                if let Err(e) = handler.handle(msg, outbound).await {
                    warn!(kind = %msg.kind(), error = %e, "message handler failed");
                }
            }
            None => warn!(kind = %msg.kind(), "no handler registered for inbound message"),
        }
    }
}
