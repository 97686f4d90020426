//! Heartbeat acknowledgement.
//!
//! The inactivity-timer reset is the catch-all hook's job; this handler only
//! answers the probe so the control endpoint sees the channel is live in
//! both directions.

use crate::dispatch::{MessageHandler, Outbound};
use crate::error::HandlerError;
use crate::messages::{ControlMessage, HeartbeatAckRequest, MessageKind, OutboundMessage};
use async_trait::async_trait;
use tracing::trace;

/// Answers each heartbeat with an acknowledgement echoing its message id.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeartbeatHandler;

#[async_trait]
impl MessageHandler for HeartbeatHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::Heartbeat
    }

    async fn handle(
        &self,
        msg: &ControlMessage,
        outbound: &dyn Outbound,
    ) -> Result<(), HandlerError> {
        let ControlMessage::Heartbeat(heartbeat) = msg else {
            return Err(HandlerError::MalformedMessage(format!(
                "heartbeat handler routed a {} message",
                msg.kind()
            )));
        };
        trace!(message_id = %heartbeat.message_id, "heartbeat");
        outbound
            .send(OutboundMessage::HeartbeatAck(HeartbeatAckRequest {
                message_id: heartbeat.message_id.clone(),
            }))
            .await?;
        Ok(())
    }
}
