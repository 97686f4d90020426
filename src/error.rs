//! Error taxonomy for the control channel.
//!
//! The session loop never surfaces these to its caller; it classifies them
//! into a reconnect policy (see `session`). The variants therefore exist to
//! be *classified*, not matched by embedders: clean closes reset backoff,
//! inactive-instance errors trigger deregistration, everything else backs
//! off.

use tokio::task::JoinError;

/// Marker the control endpoint embeds when this instance's registration has
/// been revoked. Matched by substring over the rendered error, preserving the
/// wire contract of the control service.
pub const INACTIVE_INSTANCE_MARKER: &str = "InactiveInstanceException";

/// Errors produced by a [`ClientServer`](crate::client::ClientServer).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The peer ended the stream cleanly. The reconnect policy treats this as
    /// the normal case: reset backoff, reconnect immediately.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The peer closed with an abnormal close code.
    #[error("unexpected close (code {code}): {reason}")]
    UnexpectedClose {
        /// Close code from the wire.
        code: u16,
        /// Reason text from the close frame, possibly empty.
        reason: String,
    },
    /// The transport upgrade handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The underlying transport failed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),
    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(String),
    /// An outbound frame could not be encoded.
    #[error("frame encoding failed: {0}")]
    Encode(String),
    /// An operation needed a live connection and there was none.
    #[error("client is not connected")]
    NotConnected,
    /// `serve` was invoked while a serve pump already owns the read half.
    #[error("serve already running for this connection")]
    AlreadyServing,
}

impl ClientError {
    /// Clean end-of-stream: the peer hung up without complaint.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    /// Whether the control endpoint reported this instance as deactivated.
    pub fn is_inactive_instance(&self) -> bool {
        self.to_string().contains(INACTIVE_INSTANCE_MARKER)
    }
}

impl From<JoinError> for ClientError {
    fn from(err: JoinError) -> Self {
        ClientError::Transport(format!("serve task failed: {err}"))
    }
}

/// Errors returned by routed message handlers. Logged and dropped by the
/// dispatcher; a failing handler never ends the session.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The task engine rejected the routed work.
    #[error("task engine: {0}")]
    Engine(#[from] crate::engine::EngineError),
    /// The credentials manager rejected a credential update.
    #[error("credentials: {0}")]
    Credentials(#[from] crate::credentials::CredentialsError),
    /// An acknowledgement could not be written back to the channel.
    #[error("ack send failed: {0}")]
    Send(#[from] ClientError),
    /// The frame was missing a field the handler requires.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}
