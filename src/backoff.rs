//! Stateful exponential backoff for the reconnect loop.
//!
//! Unlike a per-call `delay(attempt)` strategy, the session loop carries one
//! backoff instance across an unbounded stream of connection attempts and
//! resets it whenever the control endpoint closes a connection cleanly. State
//! therefore lives in the backoff itself: `duration()` returns the next delay
//! and advances, `reset()` drops back to the configured minimum.
//!
//! Invariants:
//! - Every returned delay is in `[current, current * (1 + jitter)]`.
//! - `current` never exceeds `max` and never drops below `min`.
//! - The session loop is the sole caller; no internal synchronization.

use rand::Rng;
use std::time::Duration;

/// Errors rejected at backoff construction time.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum BackoffError {
    /// Multiplier below 1 would shrink instead of grow.
    #[error("multiplier must be >= 1.0 (got {0})")]
    InvalidMultiplier(f64),
    /// Jitter is a fraction of the current delay.
    #[error("jitter must be in [0.0, 1.0) (got {0})")]
    InvalidJitter(f64),
    /// An empty or inverted range leaves nowhere to grow.
    #[error("min must be nonzero and <= max (got min={min:?}, max={max:?})")]
    InvalidRange {
        /// Configured minimum delay.
        min: Duration,
        /// Configured maximum delay.
        max: Duration,
    },
}

/// Exponential backoff with additive jitter and a cap.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min: Duration,
    max: Duration,
    jitter: f64,
    multiplier: f64,
    current: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `min`, growing by `multiplier` per call
    /// up to `max`, with up to `jitter * current` added per returned delay.
    pub fn new(
        min: Duration,
        max: Duration,
        jitter: f64,
        multiplier: f64,
    ) -> Result<Self, BackoffError> {
        if multiplier < 1.0 || !multiplier.is_finite() {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        if !(0.0..1.0).contains(&jitter) {
            return Err(BackoffError::InvalidJitter(jitter));
        }
        if min.is_zero() || min > max {
            return Err(BackoffError::InvalidRange { min, max });
        }
        Ok(Self { min, max, jitter, multiplier, current: min })
    }

    /// Next delay. Advances the internal state.
    pub fn duration(&mut self) -> Duration {
        self.duration_with_rng(&mut rand::rng())
    }

    /// Next delay using a caller-supplied RNG (for deterministic tests).
    pub fn duration_with_rng<R: Rng>(&mut self, rng: &mut R) -> Duration {
        let jitter_cap = self.current.mul_f64(self.jitter);
        let delay = crate::jitter::jittered_with_rng(self.current, jitter_cap, rng);
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
        delay
    }

    /// Return to the configured minimum.
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// The un-jittered delay the next `duration()` call starts from.
    pub fn current(&self) -> Duration {
        self.current
    }
}
