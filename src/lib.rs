#![forbid(unsafe_code)]

//! # tether
//!
//! Agent-side control-plane session manager: one durable, authenticated,
//! bidirectional websocket channel to a remote control endpoint, kept alive
//! across reconnects and deliberate rotations, demultiplexing in-band control
//! messages (task assignments, credential refreshes, heartbeats) into local
//! handlers.
//!
//! ## What the crate owns
//!
//! - A reconnection state machine with error-class-dependent backoff: clean
//!   closes reconnect immediately, inactive-instance errors wait out a long
//!   delay and publish a deregistration event, everything else backs off
//!   exponentially with jitter.
//! - Endpoint discovery retries, through a caller-supplied
//!   [`EndpointResolver`].
//! - A connection lifecycle bounded by inactivity (heartbeat timeout) and by
//!   maximum age (rotation), with no worker carryover between attempts.
//! - The session URL contract: per-session state (manifest cursor, one-shot
//!   `sendCredentials` flag, protocol version) encoded as query parameters.
//!
//! Task interpretation, credential storage, and container lifecycle belong to
//! collaborators behind the [`TaskEngine`], [`CredentialsManager`], and
//! [`CredentialsProvider`] seams.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::{
//!     AgentIdentity, Credentials, SessionBuilder, StaticCredentialsProvider, StaticEndpoint,
//! };
//!
//! struct Engine;
//!
//! #[async_trait::async_trait]
//! impl tether::TaskEngine for Engine {
//!     fn version(&self) -> String {
//!         "25.0.3".into()
//!     }
//!
//!     async fn dispatch(
//!         &self,
//!         _tasks: Vec<tether::TaskPayload>,
//!     ) -> Result<(), tether::EngineError> {
//!         Ok(())
//!     }
//!
//!     fn assign_credentials(&self, _task: &str, _id: &str) -> Result<(), tether::EngineError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tether::ConfigError> {
//!     let session = SessionBuilder::new(
//!         AgentIdentity::new("my-cluster", "my-instance", env!("CARGO_PKG_VERSION"), "deadbeef"),
//!         Box::new(StaticEndpoint::new("https://control.example.com")),
//!         Arc::new(Engine),
//!         Arc::new(StaticCredentialsProvider(Credentials::default())),
//!     )
//!     .build()?;
//!
//!     let cancel = session.cancellation_token();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         cancel.cancel();
//!     });
//!
//!     session.start().await;
//!     Ok(())
//! }
//! ```

mod backoff;
mod client;
mod config;
mod credentials;
mod dispatch;
mod endpoint;
mod engine;
mod error;
mod events;
mod handlers;
mod jitter;
mod messages;
mod session;
mod sleeper;
mod timer;

// Re-exports
pub use backoff::{BackoffError, ExponentialBackoff};
pub use client::websocket::{WebsocketClientServer, DEFAULT_NO_PROXY};
pub use client::{ClientServer, ConnectionFactory, WebsocketConnectionFactory};
pub use config::{AgentIdentity, ConfigError, SessionConfig, PROTOCOL_VERSION};
pub use credentials::{
    Credentials, CredentialsError, CredentialsManager, CredentialsProvider,
    StaticCredentialsProvider, TaskCredentials,
};
pub use dispatch::{HandlerRegistry, InboundHook, MessageHandler, Outbound};
pub use endpoint::{
    session_url, EndpointResolver, ResolveError, SessionState, StaticEndpoint, UrlError,
};
pub use engine::{EngineError, TaskEngine};
pub use error::{ClientError, HandlerError, INACTIVE_INSTANCE_MARKER};
pub use events::{InstanceEvent, InstanceEventBus};
pub use handlers::{HeartbeatHandler, PayloadHandler, RefreshCredentialsHandler};
pub use jitter::{jittered, jittered_with_rng};
pub use messages::{
    decode_frame, encode_frame, AckRequest, ControlMessage, CredentialsAckRequest,
    CredentialsGrant, HeartbeatAckRequest, HeartbeatMessage, MessageKind, OutboundMessage,
    PayloadMessage, RefreshCredentialsMessage, RoleCredentials, TaskPayload,
};
pub use session::{Session, SessionBuilder};
pub use sleeper::{InstantSleeper, RecordingSleeper, Sleeper, TokioSleeper};
pub use timer::HeartbeatMonitor;

pub mod prelude;
