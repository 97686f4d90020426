//! Credential types and the collaborator seams that consume them.
//!
//! The session reads agent credentials from a [`CredentialsProvider`] on
//! every connect, and routes refreshed task credentials into a
//! [`CredentialsManager`]. Both are supplied by the embedding process; the
//! crate only defines the contract.
//!
//! Secret fields never appear in `Debug` output.

use std::fmt;

/// Agent-level credentials presented during the connection handshake.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token, empty when not using temporary credentials.
    pub session_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// Source of agent credentials, read once per connection attempt.
pub trait CredentialsProvider: Send + Sync {
    /// A snapshot of the current credentials.
    fn credentials(&self) -> Credentials;
}

/// Fixed credentials, for embeddings without rotation and for tests.
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider(pub Credentials);

impl CredentialsProvider for StaticCredentialsProvider {
    fn credentials(&self) -> Credentials {
        self.0.clone()
    }
}

/// Task-scoped credentials delivered by a credential-refresh frame.
#[derive(Clone, PartialEq, Eq)]
pub struct TaskCredentials {
    /// ARN of the task the credentials belong to.
    pub arn: String,
    /// Identifier the workload uses to fetch these credentials locally.
    pub credentials_id: String,
    /// Role the credentials were vended for.
    pub role_arn: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Expiration timestamp, as rendered on the wire.
    pub expiration: String,
}

impl fmt::Debug for TaskCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCredentials")
            .field("arn", &self.arn)
            .field("credentials_id", &self.credentials_id)
            .field("role_arn", &self.role_arn)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Failures from the credentials manager collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// The manager refused to store the credentials.
    #[error("failed to store credentials {credentials_id}: {reason}")]
    Rejected {
        /// Credentials id from the frame.
        credentials_id: String,
        /// Collaborator-supplied reason.
        reason: String,
    },
}

/// Store for task-scoped credentials, keyed by credentials id.
pub trait CredentialsManager: Send + Sync {
    /// Insert or replace the credentials for `credentials.credentials_id`.
    fn set_task_credentials(&self, credentials: TaskCredentials) -> Result<(), CredentialsError>;
}
