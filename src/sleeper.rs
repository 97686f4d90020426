//! Pluggable delay source for the session loop.
//!
//! Reconnect policy is expressed as "sleep this long, then try again"; making
//! the sleep injectable lets tests assert the chosen delays without paying
//! them in wall-clock time.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of delays between connection attempts.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Wait for `duration` to elapse.
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test sleeper that returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Test sleeper that records every requested delay without waiting.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    durations: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create an empty recording sleeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays requested so far, in order.
    pub fn durations(&self) -> Vec<Duration> {
        self.durations.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Number of delays requested so far.
    pub fn len(&self) -> usize {
        self.durations.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether no delay has been requested yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.durations.lock().unwrap_or_else(|p| p.into_inner()).push(duration);
    }
}
