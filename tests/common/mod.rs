//! Scripted collaborators for session scenario tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tether::{
    AgentIdentity, ClientError, ClientServer, ConnectionFactory, ControlMessage, Credentials,
    CredentialsError, CredentialsManager, CredentialsProvider, EndpointResolver, EngineError,
    HandlerRegistry, InboundHook, MessageHandler, OutboundMessage, Outbound, ResolveError,
    SessionConfig, TaskCredentials, TaskEngine, TaskPayload,
};
use tokio_util::sync::CancellationToken;
use url::Url;

pub fn test_identity() -> AgentIdentity {
    AgentIdentity::new("someCluster", "myContainerInstance", "1.2.3", "abc123")
}

/// Tunables shrunk so scenarios finish in milliseconds. Individual tests
/// override the fields they exercise.
pub fn quick_config() -> SessionConfig {
    SessionConfig {
        heartbeat_timeout: Duration::from_secs(5),
        heartbeat_jitter: Duration::ZERO,
        connection_time: Duration::from_secs(5),
        connection_jitter: Duration::ZERO,
        inactive_instance_reconnect_delay: Duration::from_millis(40),
        connection_backoff_min: Duration::from_millis(20),
        connection_backoff_max: Duration::from_millis(200),
        connection_backoff_jitter: 0.0,
        connection_backoff_multiplier: 2.0,
    }
}

/// What one `serve` call should do. Scripts unblock on `close` only, the way
/// a real read pump unblocks when its transport is torn down; the session is
/// responsible for closing on cancellation.
pub enum ServeScript {
    /// Return this result immediately (a server-side close).
    End(Result<(), ClientError>),
    /// Block until `close`, then return this result.
    BlockUntilClose(Result<(), ClientError>),
    /// Block for the duration (or until closed, whichever first), then
    /// return.
    BlockFor(Duration, Result<(), ClientError>),
    /// Feed frames through the registry at `spacing` intervals (aborting on
    /// close), then return.
    Frames {
        frames: Vec<ControlMessage>,
        spacing: Duration,
        then: Result<(), ClientError>,
    },
}

/// Shared script + observation state behind every [`ScriptedFactory`] client.
#[derive(Default)]
pub struct ScriptedControl {
    connect_results: Mutex<VecDeque<Result<(), ClientError>>>,
    serve_scripts: Mutex<VecDeque<ServeScript>>,
    pub connect_times: Mutex<Vec<Instant>>,
    pub connect_urls: Mutex<Vec<Url>>,
    pub serve_calls: AtomicUsize,
    pub serve_returns: Mutex<Vec<Instant>>,
    pub active_serves: AtomicUsize,
    pub peak_serves: AtomicUsize,
    pub close_count: AtomicUsize,
    pub close_times: Mutex<Vec<Instant>>,
    pub write_close_count: AtomicUsize,
    pub requests: Mutex<Vec<OutboundMessage>>,
}

impl ScriptedControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a connect outcome; once the queue drains, connects succeed.
    pub fn push_connect(&self, result: Result<(), ClientError>) {
        self.connect_results.lock().unwrap().push_back(result);
    }

    /// Queue a serve script; once the queue drains, serves block until close.
    pub fn push_serve(&self, script: ServeScript) {
        self.serve_scripts.lock().unwrap().push_back(script);
    }

    pub fn connects(&self) -> usize {
        self.connect_times.lock().unwrap().len()
    }

    fn next_connect(&self) -> Result<(), ClientError> {
        self.connect_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    fn next_serve(&self) -> ServeScript {
        self.serve_scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ServeScript::BlockUntilClose(Ok(())))
    }
}

/// Factory producing one scripted client per attempt, all observing the same
/// [`ScriptedControl`].
pub struct ScriptedFactory {
    pub control: Arc<ScriptedControl>,
}

impl ScriptedFactory {
    pub fn new(control: Arc<ScriptedControl>) -> Arc<Self> {
        Arc::new(Self { control })
    }
}

impl ConnectionFactory for ScriptedFactory {
    fn new_client(
        &self,
        url: Url,
        _credentials: Credentials,
        _config: &SessionConfig,
        handlers: HandlerRegistry,
    ) -> Arc<dyn ClientServer> {
        self.control.connect_urls.lock().unwrap().push(url);
        Arc::new(ScriptedClient {
            control: self.control.clone(),
            handlers,
            closed: CancellationToken::new(),
        })
    }
}

pub struct ScriptedClient {
    control: Arc<ScriptedControl>,
    handlers: HandlerRegistry,
    closed: CancellationToken,
}

impl ScriptedClient {
    async fn run_script(&self, script: ServeScript) -> Result<(), ClientError> {
        match script {
            ServeScript::End(result) => result,
            ServeScript::BlockUntilClose(result) => {
                self.closed.cancelled().await;
                result
            }
            ServeScript::BlockFor(duration, result) => {
                tokio::select! {
                    _ = self.closed.cancelled() => {}
                    _ = tokio::time::sleep(duration) => {}
                }
                result
            }
            ServeScript::Frames { frames, spacing, then } => {
                for frame in frames {
                    tokio::select! {
                        _ = self.closed.cancelled() => return then,
                        _ = tokio::time::sleep(spacing) => {}
                    }
                    self.handlers.dispatch(&frame, self).await;
                }
                then
            }
        }
    }
}

#[async_trait]
impl Outbound for ScriptedClient {
    async fn send(&self, msg: OutboundMessage) -> Result<(), ClientError> {
        self.control.requests.lock().unwrap().push(msg);
        Ok(())
    }
}

#[async_trait]
impl ClientServer for ScriptedClient {
    fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.register(handler);
    }

    fn set_any_message_hook(&self, hook: InboundHook) {
        self.handlers.set_any_message_hook(hook);
    }

    async fn connect(&self) -> Result<(), ClientError> {
        self.control.connect_times.lock().unwrap().push(Instant::now());
        self.control.next_connect()
    }

    async fn serve(&self, _cancel: CancellationToken) -> Result<(), ClientError> {
        self.control.serve_calls.fetch_add(1, Ordering::SeqCst);
        let live = self.control.active_serves.fetch_add(1, Ordering::SeqCst) + 1;
        self.control.peak_serves.fetch_max(live, Ordering::SeqCst);

        let script = self.control.next_serve();
        let result = self.run_script(script).await;

        self.control.active_serves.fetch_sub(1, Ordering::SeqCst);
        self.control.serve_returns.lock().unwrap().push(Instant::now());
        result
    }

    async fn make_request(&self, msg: OutboundMessage) -> Result<(), ClientError> {
        self.send(msg).await
    }

    async fn write_close_message(&self) -> Result<(), ClientError> {
        self.control.write_close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        if !self.closed.is_cancelled() {
            self.control.close_count.fetch_add(1, Ordering::SeqCst);
            self.control.close_times.lock().unwrap().push(Instant::now());
        }
        self.closed.cancel();
        Ok(())
    }
}

/// Resolver with a scripted failure queue and call-time observation.
#[derive(Default)]
pub struct ScriptedResolver {
    failures: Mutex<VecDeque<ResolveError>>,
    pub resolve_times: Mutex<Vec<Instant>>,
}

impl ScriptedResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_failure(&self, message: &str) {
        self.failures.lock().unwrap().push_back(ResolveError(message.into()));
    }
}

/// Local wrapper so `EndpointResolver` (foreign trait) can be implemented for
/// `Arc<ScriptedResolver>` (foreign type) without violating the orphan rule.
pub struct SharedResolver(pub Arc<ScriptedResolver>);

#[async_trait]
impl EndpointResolver for SharedResolver {
    async fn resolve(&self, _container_instance_arn: &str) -> Result<String, ResolveError> {
        self.0.resolve_times.lock().unwrap().push(Instant::now());
        match self.0.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok("https://control.example.com".to_string()),
        }
    }
}

/// Engine recording dispatches and credential associations.
#[derive(Default)]
pub struct RecordingEngine {
    pub dispatched: Mutex<Vec<Vec<TaskPayload>>>,
    pub associations: Mutex<Vec<(String, String)>>,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TaskEngine for RecordingEngine {
    fn version(&self) -> String {
        "Docker version result".into()
    }

    async fn dispatch(&self, tasks: Vec<TaskPayload>) -> Result<(), EngineError> {
        self.dispatched.lock().unwrap().push(tasks);
        Ok(())
    }

    fn assign_credentials(&self, task_arn: &str, credentials_id: &str) -> Result<(), EngineError> {
        self.associations.lock().unwrap().push((task_arn.into(), credentials_id.into()));
        Ok(())
    }
}

/// Credentials manager recording everything it stores.
#[derive(Default)]
pub struct RecordingManager {
    pub stored: Mutex<Vec<TaskCredentials>>,
}

impl RecordingManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl CredentialsManager for RecordingManager {
    fn set_task_credentials(&self, credentials: TaskCredentials) -> Result<(), CredentialsError> {
        self.stored.lock().unwrap().push(credentials);
        Ok(())
    }
}

/// Provider with fixed, non-empty credentials.
#[derive(Debug, Clone)]
pub struct TestCredentials;

impl CredentialsProvider for TestCredentials {
    fn credentials(&self) -> Credentials {
        Credentials {
            access_key_id: "AKIDTEST".into(),
            secret_access_key: "secret".into(),
            session_token: "token".into(),
        }
    }
}

/// Poll until `predicate` holds or `timeout` elapses; panics on timeout.
pub async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !predicate() {
        if Instant::now() > deadline {
            panic!("condition not reached within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
