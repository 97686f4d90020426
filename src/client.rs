//! Transport contract for one bidirectional control channel.
//!
//! The session loop never touches the wire: it drives a [`ClientServer`]
//! produced by a [`ConnectionFactory`]. The production implementation
//! ([`websocket::WebsocketClientServer`]) frames messages over a websocket;
//! tests substitute scripted fakes.

pub mod websocket;

use crate::config::SessionConfig;
use crate::credentials::Credentials;
use crate::dispatch::{HandlerRegistry, InboundHook, MessageHandler};
use crate::error::ClientError;
use crate::messages::OutboundMessage;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// One bidirectional framed connection to the control endpoint.
///
/// Lifecycle: register handlers, `connect`, then exactly one `serve` pumping
/// inbound frames until the connection ends. `make_request` may be called
/// from any task while `serve` runs; writes are serialized internally.
/// `close` is idempotent and promptly unblocks a blocked `serve`.
#[async_trait]
pub trait ClientServer: Send + Sync {
    /// Register a routed handler for its message kind.
    fn register_handler(&self, handler: Arc<dyn MessageHandler>);

    /// Install the catch-all hook invoked for every decoded inbound frame.
    fn set_any_message_hook(&self, hook: InboundHook);

    /// Perform the transport handshake.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Read frames until the connection terminates. Returns `Ok(())` on
    /// clean end-of-stream, an error otherwise. Honors `cancel`.
    async fn serve(&self, cancel: CancellationToken) -> Result<(), ClientError>;

    /// Send one frame. Safe for concurrent callers.
    async fn make_request(&self, msg: OutboundMessage) -> Result<(), ClientError>;

    /// Politely signal shutdown to the peer.
    async fn write_close_message(&self) -> Result<(), ClientError>;

    /// Force-close the underlying transport. Idempotent.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Produces a fresh [`ClientServer`] per connection attempt.
pub trait ConnectionFactory: Send + Sync {
    /// Build a client for `url`, authenticated with `credentials`, routing
    /// inbound frames through `handlers`.
    fn new_client(
        &self,
        url: Url,
        credentials: Credentials,
        config: &SessionConfig,
        handlers: HandlerRegistry,
    ) -> Arc<dyn ClientServer>;
}

/// Production factory building websocket clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebsocketConnectionFactory;

impl ConnectionFactory for WebsocketConnectionFactory {
    fn new_client(
        &self,
        url: Url,
        credentials: Credentials,
        _config: &SessionConfig,
        handlers: HandlerRegistry,
    ) -> Arc<dyn ClientServer> {
        Arc::new(websocket::WebsocketClientServer::new(url, credentials, handlers))
    }
}
