//! Endpoint discovery and session URL composition.
//!
//! Discovery is a collaborator: the session loop calls [`EndpointResolver`]
//! once per attempt and applies its own backoff between failures. The
//! resolved endpoint is then turned into the session URL, which encodes the
//! agent identity and the per-session state (sequence cursor, one-shot
//! `sendCredentials` flag, protocol version).

use crate::config::{AgentIdentity, PROTOCOL_VERSION};
use async_trait::async_trait;
use url::Url;

/// Failure to discover the control endpoint.
#[derive(Debug, thiserror::Error)]
#[error("endpoint discovery failed: {0}")]
pub struct ResolveError(pub String);

/// Control-endpoint discovery. No internal retry: the session loop owns the
/// retry policy.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// The control endpoint for this container instance, e.g.
    /// `https://control.region.example.com`.
    async fn resolve(&self, container_instance_arn: &str) -> Result<String, ResolveError>;
}

/// Fixed endpoint, for embeddings without discovery and for tests.
#[derive(Debug, Clone)]
pub struct StaticEndpoint(String);

impl StaticEndpoint {
    /// Always resolve to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }
}

#[async_trait]
impl EndpointResolver for StaticEndpoint {
    async fn resolve(&self, _container_instance_arn: &str) -> Result<String, ResolveError> {
        Ok(self.0.clone())
    }
}

/// A session URL could not be built from the resolved endpoint.
#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    /// The resolved endpoint is not a URL.
    #[error("endpoint is not a valid url: {0}")]
    Parse(#[from] url::ParseError),
    /// Only `http` and `https` endpoints can carry a websocket upgrade.
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
}

/// Map an http(s) endpoint onto the websocket scheme family.
fn to_websocket_scheme(url: &mut Url) -> Result<(), UrlError> {
    let mapped = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(UrlError::UnsupportedScheme(other.to_string())),
    };
    // http/https and ws/wss are all "special" schemes, so this cannot fail.
    url.set_scheme(mapped)
        .map_err(|()| UrlError::UnsupportedScheme(url.scheme().to_string()))?;
    Ok(())
}

/// Per-attempt inputs to the session URL, beyond the fixed identity.
#[derive(Debug, Clone, Copy)]
pub struct SessionState<'a> {
    /// Raw runtime version string from the task engine.
    pub runtime_version: &'a str,
    /// Whether the control endpoint should push credentials after connect.
    pub send_credentials: bool,
    /// Task-manifest cursor to resume from.
    pub seq_num: i64,
}

/// Compose the session URL for one connection attempt.
///
/// Path is `/ws`; query parameters are appended in canonical (sorted) order.
pub fn session_url(
    endpoint: &str,
    identity: &AgentIdentity,
    state: SessionState<'_>,
) -> Result<Url, UrlError> {
    let mut url = Url::parse(endpoint)?;
    to_websocket_scheme(&mut url)?;
    url.set_path("/ws");
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("agentHash", &identity.agent_hash);
        query.append_pair("agentVersion", &identity.agent_version);
        query.append_pair("clusterArn", &identity.cluster_arn);
        query.append_pair("containerInstanceArn", &identity.container_instance_arn);
        query.append_pair("dockerVersion", &format!("DockerVersion: {}", state.runtime_version));
        query.append_pair("protocolVersion", &PROTOCOL_VERSION.to_string());
        query.append_pair("sendCredentials", if state.send_credentials { "true" } else { "false" });
        query.append_pair("seqNum", &state.seq_num.to_string());
    }
    Ok(url)
}
