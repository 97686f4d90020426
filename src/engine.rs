//! Task-engine collaborator seam.
//!
//! The session routes task payloads into the engine and asks it to associate
//! refreshed credentials with their tasks; it never interprets the payloads
//! itself.

use crate::messages::TaskPayload;
use async_trait::async_trait;

/// Failures from the task engine collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No task with the given ARN is known to the engine.
    #[error("unknown task: {0}")]
    UnknownTask(String),
    /// The engine could not apply the routed work.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

/// The subsystem that owns task lifecycle on this instance.
#[async_trait]
pub trait TaskEngine: Send + Sync {
    /// Version string of the underlying container runtime, reported to the
    /// control endpoint in the session URL.
    fn version(&self) -> String;

    /// Apply a batch of task state from a payload frame.
    async fn dispatch(&self, tasks: Vec<TaskPayload>) -> Result<(), EngineError>;

    /// Associate refreshed credentials with the task that owns them. Fails
    /// with [`EngineError::UnknownTask`] when the task ARN is not known.
    fn assign_credentials(&self, task_arn: &str, credentials_id: &str) -> Result<(), EngineError>;
}
