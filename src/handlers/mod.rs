//! Routed handlers for the inbound message taxonomy.
//!
//! Each handler owns one [`MessageKind`](crate::messages::MessageKind):
//! heartbeats are acknowledged, payloads are handed to the task engine,
//! credential refreshes go to the credentials manager. The session registers
//! all three by default; embedders may replace any of them through the
//! registry.

mod heartbeat;
mod payload;
mod refresh_credentials;

pub use heartbeat::HeartbeatHandler;
pub use payload::PayloadHandler;
pub use refresh_credentials::RefreshCredentialsHandler;
