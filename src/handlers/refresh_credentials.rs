//! Credential-refresh routing.

use crate::credentials::{CredentialsManager, TaskCredentials};
use crate::dispatch::{MessageHandler, Outbound};
use crate::engine::TaskEngine;
use crate::error::HandlerError;
use crate::messages::{
    ControlMessage, CredentialsAckRequest, CredentialsGrant, MessageKind, OutboundMessage,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Stores refreshed task credentials and associates each grant with its task.
///
/// Grants are independent: one failing grant is logged and skipped, the rest
/// are still applied and acknowledged.
pub struct RefreshCredentialsHandler {
    manager: Arc<dyn CredentialsManager>,
    engine: Arc<dyn TaskEngine>,
}

impl RefreshCredentialsHandler {
    /// Handler feeding `manager` and associating grants through `engine`.
    pub fn new(manager: Arc<dyn CredentialsManager>, engine: Arc<dyn TaskEngine>) -> Self {
        Self { manager, engine }
    }

    fn apply(&self, grant: &CredentialsGrant) -> Result<(), HandlerError> {
        let role = &grant.role_credentials;
        self.manager.set_task_credentials(TaskCredentials {
            arn: grant.arn.clone(),
            credentials_id: role.credentials_id.clone(),
            role_arn: role.role_arn.clone(),
            access_key_id: role.access_key_id.clone(),
            secret_access_key: role.secret_access_key.clone(),
            session_token: role.session_token.clone(),
            expiration: role.expiration.clone(),
        })?;
        self.engine.assign_credentials(&grant.arn, &role.credentials_id)?;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for RefreshCredentialsHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::RefreshCredentials
    }

    async fn handle(
        &self,
        msg: &ControlMessage,
        outbound: &dyn Outbound,
    ) -> Result<(), HandlerError> {
        let ControlMessage::RefreshCredentials(refresh) = msg else {
            return Err(HandlerError::MalformedMessage(format!(
                "credentials handler routed a {} message",
                msg.kind()
            )));
        };

        for grant in &refresh.tasks {
            if let Err(e) = self.apply(grant) {
                warn!(task = %grant.arn, error = %e, "credential refresh failed for task");
                continue;
            }
            outbound
                .send(OutboundMessage::CredentialsAck(CredentialsAckRequest {
                    message_id: refresh.message_id.clone(),
                    credentials_id: grant.role_credentials.credentials_id.clone(),
                    expiration: grant.role_credentials.expiration.clone(),
                }))
                .await?;
        }
        Ok(())
    }
}
