//! Session tunables and agent identity.

use crate::backoff::BackoffError;
use std::time::Duration;

/// Wire protocol version advertised in the session URL.
pub const PROTOCOL_VERSION: u32 = 2;

/// Invalid tunable combinations rejected by [`SessionConfig::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A timeout tunable was zero.
    #[error("{name} must be nonzero")]
    ZeroDuration {
        /// Name of the offending tunable.
        name: &'static str,
    },
    /// The backoff parameters do not form a valid policy.
    #[error(transparent)]
    Backoff(#[from] BackoffError),
}

/// Identity the agent presents to the control endpoint.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    /// Cluster this agent is registered into.
    pub cluster_arn: String,
    /// Container instance this agent manages.
    pub container_instance_arn: String,
    /// Semantic agent version.
    pub agent_version: String,
    /// Build hash of the running agent.
    pub agent_hash: String,
}

impl AgentIdentity {
    /// Identity for cluster + instance with this build's version metadata.
    pub fn new(
        cluster_arn: impl Into<String>,
        container_instance_arn: impl Into<String>,
        agent_version: impl Into<String>,
        agent_hash: impl Into<String>,
    ) -> Self {
        Self {
            cluster_arn: cluster_arn.into(),
            container_instance_arn: container_instance_arn.into(),
            agent_version: agent_version.into(),
            agent_hash: agent_hash.into(),
        }
    }
}

/// Tunables for one control-plane session.
///
/// The defaults are production values; tests shrink them to milliseconds.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Force a disconnect when no inbound frame arrives for this long.
    pub heartbeat_timeout: Duration,
    /// Random extension added to each armed heartbeat deadline.
    pub heartbeat_jitter: Duration,
    /// Maximum connection age before a deliberate rotation.
    pub connection_time: Duration,
    /// Random extension added to the connection age.
    pub connection_jitter: Duration,
    /// Reconnect delay after the control endpoint reports the instance
    /// deactivated.
    pub inactive_instance_reconnect_delay: Duration,
    /// Backoff floor between failed connection attempts.
    pub connection_backoff_min: Duration,
    /// Backoff ceiling between failed connection attempts.
    pub connection_backoff_max: Duration,
    /// Fraction of the current backoff added as jitter.
    pub connection_backoff_jitter: f64,
    /// Backoff growth factor per consecutive failure.
    pub connection_backoff_multiplier: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(60),
            heartbeat_jitter: Duration::from_secs(20),
            connection_time: Duration::from_secs(15 * 60),
            connection_jitter: Duration::from_secs(30 * 60),
            inactive_instance_reconnect_delay: Duration::from_secs(60 * 60),
            connection_backoff_min: Duration::from_millis(250),
            connection_backoff_max: Duration::from_secs(2 * 60),
            connection_backoff_jitter: 0.2,
            connection_backoff_multiplier: 1.5,
        }
    }
}

impl SessionConfig {
    /// Reject tunable combinations the session loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, d) in [
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("connection_time", self.connection_time),
            ("inactive_instance_reconnect_delay", self.inactive_instance_reconnect_delay),
        ] {
            if d.is_zero() {
                return Err(ConfigError::ZeroDuration { name });
            }
        }
        // Constructing the backoff checks min/max/jitter/multiplier.
        self.backoff()?;
        Ok(())
    }

    pub(crate) fn backoff(&self) -> Result<crate::backoff::ExponentialBackoff, BackoffError> {
        crate::backoff::ExponentialBackoff::new(
            self.connection_backoff_min,
            self.connection_backoff_max,
            self.connection_backoff_jitter,
            self.connection_backoff_multiplier,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SessionConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn zero_heartbeat_timeout_is_rejected() {
        let cfg = SessionConfig { heartbeat_timeout: Duration::ZERO, ..Default::default() };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration { name: "heartbeat_timeout" })
        ));
    }

    #[test]
    fn bad_backoff_parameters_are_rejected() {
        let cfg = SessionConfig { connection_backoff_multiplier: 0.5, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Backoff(_))));
    }
}
