//! Wire message model and envelope codec.
//!
//! Frames on the channel are JSON envelopes of the shape
//! `{"type": "<MessageName>", "message": {...}}`. Decoding a frame into a
//! [`ControlMessage`] happens here; what each message *means* is the business
//! of the registered handlers.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator used to route inbound messages to handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Liveness probe from the control endpoint.
    Heartbeat,
    /// Task state to hand to the task engine.
    Payload,
    /// Refreshed task credentials.
    RefreshCredentials,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Payload => "payload",
            MessageKind::RefreshCredentials => "refresh_credentials",
        };
        f.write_str(name)
    }
}

/// Liveness probe. Its arrival (like any frame's) resets the inactivity
/// timer; the registered handler answers with [`HeartbeatAckRequest`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMessage {
    /// Identifier echoed back in the acknowledgement.
    pub message_id: String,
}

/// One task's worth of state inside a payload frame. The session treats it
/// opaquely beyond the fields it needs for routing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    /// Task ARN.
    pub arn: String,
    /// Desired lifecycle state, e.g. `RUNNING` or `STOPPED`.
    pub desired_status: String,
}

/// Task assignment frame.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMessage {
    /// Identifier echoed back in the acknowledgement.
    pub message_id: String,
    /// Cluster the payload targets.
    pub cluster_arn: String,
    /// Container instance the payload targets.
    pub container_instance_arn: String,
    /// Tasks to hand to the engine.
    pub tasks: Vec<TaskPayload>,
    /// Manifest cursor; the next session URL resumes from the highest seen.
    pub seq_num: i64,
}

/// Credentials for one role, as rendered on the wire.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleCredentials {
    /// Identifier workloads use to fetch these credentials locally.
    pub credentials_id: String,
    /// Role the credentials were vended for.
    pub role_arn: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Expiration timestamp.
    pub expiration: String,
}

impl fmt::Debug for RoleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleCredentials")
            .field("credentials_id", &self.credentials_id)
            .field("role_arn", &self.role_arn)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Pairing of a task with its refreshed credentials.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsGrant {
    /// ARN of the task the credentials belong to.
    pub arn: String,
    /// The credentials themselves.
    pub role_credentials: RoleCredentials,
}

/// Credential-refresh frame.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshCredentialsMessage {
    /// Identifier echoed back in the per-grant acknowledgements.
    pub message_id: String,
    /// One grant per task being refreshed.
    pub tasks: Vec<CredentialsGrant>,
}

/// Every inbound message the session routes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "message")]
pub enum ControlMessage {
    /// Liveness probe.
    #[serde(rename = "HeartbeatMessage")]
    Heartbeat(HeartbeatMessage),
    /// Task assignment.
    #[serde(rename = "PayloadMessage")]
    Payload(PayloadMessage),
    /// Credential refresh.
    #[serde(rename = "IAMRoleCredentialsMessage")]
    RefreshCredentials(RefreshCredentialsMessage),
}

impl ControlMessage {
    /// Routing discriminator for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            ControlMessage::Heartbeat(_) => MessageKind::Heartbeat,
            ControlMessage::Payload(_) => MessageKind::Payload,
            ControlMessage::RefreshCredentials(_) => MessageKind::RefreshCredentials,
        }
    }
}

/// Acknowledgement of a payload frame.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
    /// Identifier of the frame being acknowledged.
    pub message_id: String,
    /// Cluster, echoed from the session identity.
    pub cluster_arn: String,
    /// Container instance, echoed from the session identity.
    pub container_instance_arn: String,
}

/// Acknowledgement of a heartbeat.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAckRequest {
    /// Identifier of the heartbeat being acknowledged.
    pub message_id: String,
}

/// Per-grant acknowledgement of a credential refresh.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsAckRequest {
    /// Identifier of the refresh frame.
    pub message_id: String,
    /// Credentials id the grant carried.
    pub credentials_id: String,
    /// Expiration the grant carried.
    pub expiration: String,
}

/// Every outbound message the session or its handlers emit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "message")]
pub enum OutboundMessage {
    /// Payload acknowledgement.
    #[serde(rename = "AckRequest")]
    Ack(AckRequest),
    /// Heartbeat acknowledgement.
    #[serde(rename = "HeartbeatAckRequest")]
    HeartbeatAck(HeartbeatAckRequest),
    /// Credential-refresh acknowledgement.
    #[serde(rename = "IAMRoleCredentialsAckRequest")]
    CredentialsAck(CredentialsAckRequest),
}

/// Decode one inbound frame.
pub fn decode_frame(raw: &str) -> Result<ControlMessage, ClientError> {
    serde_json::from_str(raw).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Encode one outbound frame.
pub fn encode_frame(msg: &OutboundMessage) -> Result<String, ClientError> {
    serde_json::to_string(msg).map_err(|e| ClientError::Encode(e.to_string()))
}
