//! Additive jitter for reconnect delays and timer deadlines.
//!
//! Every delay in the session loop is jittered so a fleet of agents that lost
//! the same endpoint does not reconnect in lockstep.

use rand::Rng;
use std::time::Duration;

/// Add random jitter to a base duration.
///
/// Returns a duration in `[base, base + jitter]`.
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    jittered_with_rng(base, jitter, &mut rand::rng())
}

/// Apply jitter with a caller-supplied RNG (for deterministic tests).
pub fn jittered_with_rng<R: Rng>(base: Duration, jitter: Duration, rng: &mut R) -> Duration {
    let span = jitter.as_nanos() as u64;
    if span == 0 {
        return base;
    }
    base + Duration::from_nanos(rng.random_range(0..=span))
}
