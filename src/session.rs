//! The control-plane session: one long-lived relationship with the control
//! endpoint, spanning many connections.
//!
//! The outer loop walks discover → build URL → connect → run → classify →
//! delay until cancelled. The inner runtime owns exactly one connection:
//! a serve pump, an inactivity watchdog, and a one-shot age rotation, with
//! the first finisher deciding how the attempt ends. Every worker an attempt
//! spawns is joined before the next attempt begins.
//!
//! Classification policy (see `classify`):
//! - cancellation ends the session, silently;
//! - an inactive-instance error publishes one deregistration event and waits
//!   the long reconnect delay;
//! - a clean close resets backoff and reconnects immediately;
//! - anything else reconnects after the next backoff delay.

use crate::backoff::ExponentialBackoff;
use crate::client::{ClientServer, ConnectionFactory, WebsocketConnectionFactory};
use crate::config::{AgentIdentity, ConfigError, SessionConfig};
use crate::credentials::{CredentialsManager, CredentialsProvider};
use crate::dispatch::{HandlerRegistry, MessageHandler};
use crate::endpoint::{session_url, EndpointResolver, SessionState, UrlError};
use crate::engine::TaskEngine;
use crate::error::ClientError;
use crate::events::{InstanceEvent, InstanceEventBus};
use crate::handlers::{HeartbeatHandler, PayloadHandler, RefreshCredentialsHandler};
use crate::jitter::jittered;
use crate::messages::MessageKind;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::timer::HeartbeatMonitor;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sequence cursor reported when the manifest feature is disabled.
const DEFAULT_SEQ_NUM: i64 = 1;

/// How one connection attempt ended.
#[derive(Debug)]
enum AttemptEnd {
    /// The resolved endpoint could not be turned into a session URL.
    Url(UrlError),
    /// The handshake failed.
    Connect(ClientError),
    /// The connection served and then ended.
    Serve {
        /// What the serve pump returned; `Ok` is a clean end-of-stream.
        result: Result<(), ClientError>,
        /// What ended the attempt.
        reason: DisconnectReason,
    },
    /// The session was cancelled mid-attempt.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    ServeExit,
    HeartbeatTimeout,
    ConnectionAge,
}

/// What the loop does after classifying an attempt.
#[derive(Debug)]
enum NextStep {
    Stop,
    Reconnect,
    Backoff(Duration),
}

/// Assembles a [`Session`] from its collaborators.
pub struct SessionBuilder {
    identity: AgentIdentity,
    config: SessionConfig,
    resolver: Box<dyn EndpointResolver>,
    engine: Arc<dyn TaskEngine>,
    credentials: Arc<dyn CredentialsProvider>,
    credentials_manager: Option<Arc<dyn CredentialsManager>>,
    factory: Arc<dyn ConnectionFactory>,
    handlers: HandlerRegistry,
    events: Arc<InstanceEventBus>,
    cancel: CancellationToken,
    sleeper: Arc<dyn Sleeper>,
    seq_num: Option<Arc<AtomicI64>>,
}

impl SessionBuilder {
    /// Start from the required collaborators; everything else has production
    /// defaults.
    pub fn new(
        identity: AgentIdentity,
        resolver: Box<dyn EndpointResolver>,
        engine: Arc<dyn TaskEngine>,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        Self {
            identity,
            config: SessionConfig::default(),
            resolver,
            engine,
            credentials,
            credentials_manager: None,
            factory: Arc::new(WebsocketConnectionFactory),
            handlers: HandlerRegistry::new(),
            events: Arc::new(InstanceEventBus::new()),
            cancel: CancellationToken::new(),
            sleeper: Arc::new(TokioSleeper),
            seq_num: None,
        }
    }

    /// Replace the default tunables.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the connection factory (tests substitute scripted clients).
    pub fn factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Route credential-refresh frames into `manager`.
    pub fn credentials_manager(mut self, manager: Arc<dyn CredentialsManager>) -> Self {
        self.credentials_manager = Some(manager);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the delay source (tests make delays observable).
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Enable the task-manifest cursor, resuming from `seq_num` on each
    /// reconnect. External handlers advance it; the session only reads it.
    pub fn manifest_seq_num(mut self, seq_num: Arc<AtomicI64>) -> Self {
        self.seq_num = Some(seq_num);
        self
    }

    /// Register a custom handler; it takes precedence over the default one
    /// for the same message kind.
    pub fn handler(self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.register(handler);
        self
    }

    /// Validate configuration and assemble the session.
    pub fn build(self) -> Result<Session, ConfigError> {
        self.config.validate()?;
        let backoff = self.config.backoff()?;

        if !self.handlers.contains(MessageKind::Heartbeat) {
            self.handlers.register(Arc::new(HeartbeatHandler));
        }
        if !self.handlers.contains(MessageKind::Payload) {
            self.handlers.register(Arc::new(PayloadHandler::new(
                self.engine.clone(),
                &self.identity,
                self.seq_num.clone(),
            )));
        }
        if let Some(manager) = &self.credentials_manager {
            if !self.handlers.contains(MessageKind::RefreshCredentials) {
                self.handlers.register(Arc::new(RefreshCredentialsHandler::new(
                    manager.clone(),
                    self.engine.clone(),
                )));
            }
        }

        Ok(Session {
            identity: self.identity,
            config: self.config,
            resolver: self.resolver,
            engine: self.engine,
            credentials: self.credentials,
            factory: self.factory,
            handlers: self.handlers,
            events: self.events,
            cancel: self.cancel,
            sleeper: self.sleeper,
            backoff,
            send_credentials: true,
            seq_num: self.seq_num,
        })
    }
}

/// One long-lived control-plane session.
pub struct Session {
    identity: AgentIdentity,
    config: SessionConfig,
    resolver: Box<dyn EndpointResolver>,
    engine: Arc<dyn TaskEngine>,
    credentials: Arc<dyn CredentialsProvider>,
    factory: Arc<dyn ConnectionFactory>,
    handlers: HandlerRegistry,
    events: Arc<InstanceEventBus>,
    cancel: CancellationToken,
    sleeper: Arc<dyn Sleeper>,
    backoff: ExponentialBackoff,
    send_credentials: bool,
    seq_num: Option<Arc<AtomicI64>>,
}

impl Session {
    /// Token that ends the session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Instance-status events published by this session. Subscribe before
    /// calling [`start`](Self::start).
    pub fn events(&self) -> &InstanceEventBus {
        &self.events
    }

    /// Run the session until the cancellation token fires. Transient
    /// failures (discovery, connect, serve, timers) never end the loop.
    pub async fn start(mut self) {
        info!(
            cluster = %self.identity.cluster_arn,
            container_instance = %self.identity.container_instance_arn,
            "control-plane session starting"
        );
        loop {
            let endpoint = tokio::select! {
                _ = self.cancel.cancelled() => break,
                resolved = self.resolver.resolve(&self.identity.container_instance_arn) => resolved,
            };
            let endpoint = match endpoint {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    let delay = self.backoff.duration();
                    warn!(error = %e, delay = ?delay, "endpoint discovery failed");
                    if self.delay(delay).await.is_break() {
                        break;
                    }
                    continue;
                }
            };

            let end = self.run_attempt(&endpoint).await;
            match self.classify(&end) {
                NextStep::Stop => break,
                NextStep::Reconnect => {}
                NextStep::Backoff(delay) => {
                    if self.delay(delay).await.is_break() {
                        break;
                    }
                }
            }
        }
        info!("control-plane session stopped");
    }

    /// One connect/serve/close cycle against `endpoint`.
    async fn run_attempt(&mut self, endpoint: &str) -> AttemptEnd {
        let seq_num = self
            .seq_num
            .as_ref()
            .map(|s| s.load(Ordering::Acquire))
            .unwrap_or(DEFAULT_SEQ_NUM);
        let runtime_version = self.engine.version();
        let url = match session_url(
            endpoint,
            &self.identity,
            SessionState {
                runtime_version: &runtime_version,
                send_credentials: self.send_credentials,
                seq_num,
            },
        ) {
            Ok(url) => url,
            Err(e) => return AttemptEnd::Url(e),
        };

        let client: Arc<dyn ClientServer> = self.factory.new_client(
            url,
            self.credentials.credentials(),
            &self.config,
            self.handlers.clone(),
        );

        let heartbeat =
            HeartbeatMonitor::new(self.config.heartbeat_timeout, self.config.heartbeat_jitter);
        let hook = heartbeat.clone();
        client.set_any_message_hook(Arc::new(move |_msg| hook.reset()));

        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return AttemptEnd::Cancelled,
            res = client.connect() => res,
        };
        if let Err(e) = connected {
            return AttemptEnd::Connect(e);
        }

        // One-shot: only the first connection of the process asks the
        // endpoint to push credentials.
        self.send_credentials = false;
        info!(endpoint, seq_num, "control channel established");

        // The inactivity window starts at serve time, not at handshake time.
        heartbeat.reset();

        let serve_cancel = self.cancel.child_token();
        let pump_client = Arc::clone(&client);
        let pump_cancel = serve_cancel.clone();
        let mut pump: JoinHandle<Result<(), ClientError>> =
            tokio::spawn(async move { pump_client.serve(pump_cancel).await });

        let age = jittered(self.config.connection_time, self.config.connection_jitter);

        let end = tokio::select! {
            res = &mut pump => AttemptEnd::Serve {
                result: flatten_pump(res),
                reason: DisconnectReason::ServeExit,
            },
            _ = heartbeat.expired() => {
                info!("no inbound traffic within heartbeat timeout, closing connection");
                let _ = client.close().await;
                AttemptEnd::Serve {
                    result: join_pump(pump).await,
                    reason: DisconnectReason::HeartbeatTimeout,
                }
            }
            _ = tokio::time::sleep(age) => {
                info!(age = ?age, "connection reached maximum age, rotating");
                let _ = client.close().await;
                AttemptEnd::Serve {
                    result: join_pump(pump).await,
                    reason: DisconnectReason::ConnectionAge,
                }
            }
            _ = self.cancel.cancelled() => {
                let _ = client.write_close_message().await;
                let _ = client.close().await;
                let _ = join_pump(pump).await;
                AttemptEnd::Cancelled
            }
        };

        serve_cancel.cancel();
        let _ = client.close().await;
        end
    }

    fn classify(&mut self, end: &AttemptEnd) -> NextStep {
        match end {
            AttemptEnd::Cancelled => NextStep::Stop,
            AttemptEnd::Url(e) => {
                let delay = self.backoff.duration();
                warn!(error = %e, delay = ?delay, "cannot build session url");
                NextStep::Backoff(delay)
            }
            AttemptEnd::Connect(e) | AttemptEnd::Serve { result: Err(e), .. } => {
                if e.is_inactive_instance() {
                    warn!(error = %e, "control endpoint reports instance inactive");
                    self.events.publish(InstanceEvent::Deregistered);
                    NextStep::Backoff(self.config.inactive_instance_reconnect_delay)
                } else if e.is_connection_closed() {
                    debug!("clean close, reconnecting immediately");
                    self.backoff.reset();
                    NextStep::Reconnect
                } else {
                    let delay = self.backoff.duration();
                    warn!(error = %e, delay = ?delay, "connection failed, backing off");
                    NextStep::Backoff(delay)
                }
            }
            AttemptEnd::Serve { result: Ok(()), reason } => {
                debug!(reason = ?reason, "connection ended cleanly, reconnecting immediately");
                self.backoff.reset();
                NextStep::Reconnect
            }
        }
    }

    /// Wait out a reconnect delay, unless cancellation fires first.
    async fn delay(&self, duration: Duration) -> ControlFlow<()> {
        if duration.is_zero() {
            return ControlFlow::Continue(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => ControlFlow::Break(()),
            _ = self.sleeper.sleep(duration) => ControlFlow::Continue(()),
        }
    }
}

fn flatten_pump(
    res: Result<Result<(), ClientError>, tokio::task::JoinError>,
) -> Result<(), ClientError> {
    match res {
        Ok(inner) => inner,
        Err(join_err) => Err(ClientError::from(join_err)),
    }
}

async fn join_pump(pump: JoinHandle<Result<(), ClientError>>) -> Result<(), ClientError> {
    flatten_pump(pump.await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, StaticCredentialsProvider};
    use crate::endpoint::StaticEndpoint;
    use crate::engine::EngineError;
    use crate::messages::TaskPayload;
    use crate::sleeper::RecordingSleeper;
    use async_trait::async_trait;

    struct NullEngine;

    #[async_trait]
    impl TaskEngine for NullEngine {
        fn version(&self) -> String {
            "test".into()
        }

        async fn dispatch(&self, _tasks: Vec<TaskPayload>) -> Result<(), EngineError> {
            Ok(())
        }

        fn assign_credentials(
            &self,
            _task_arn: &str,
            _credentials_id: &str,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            connection_backoff_min: Duration::from_millis(10),
            connection_backoff_max: Duration::from_millis(40),
            connection_backoff_jitter: 0.0,
            inactive_instance_reconnect_delay: Duration::from_millis(500),
            ..Default::default()
        }
    }

    fn test_session() -> Session {
        SessionBuilder::new(
            AgentIdentity::new("cluster", "instance", "1.0.0", "hash"),
            Box::new(StaticEndpoint::new("https://control.example.com")),
            Arc::new(NullEngine),
            Arc::new(StaticCredentialsProvider(Credentials::default())),
        )
        .config(test_config())
        .sleeper(Arc::new(RecordingSleeper::new()))
        .build()
        .expect("builds")
    }

    #[tokio::test]
    async fn cancelled_attempt_stops_the_loop() {
        let mut session = test_session();
        assert!(matches!(session.classify(&AttemptEnd::Cancelled), NextStep::Stop));
    }

    #[tokio::test]
    async fn clean_close_resets_backoff_and_reconnects_immediately() {
        let mut session = test_session();
        // Grow the backoff first.
        session.backoff.duration();
        session.backoff.duration();
        assert!(session.backoff.current() > Duration::from_millis(10));

        let step = session.classify(&AttemptEnd::Serve {
            result: Ok(()),
            reason: DisconnectReason::ConnectionAge,
        });
        assert!(matches!(step, NextStep::Reconnect));
        assert_eq!(session.backoff.current(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn connect_eof_classifies_like_clean_close() {
        let mut session = test_session();
        let step = session.classify(&AttemptEnd::Connect(ClientError::ConnectionClosed));
        assert!(matches!(step, NextStep::Reconnect));
    }

    #[tokio::test]
    async fn generic_error_backs_off_without_reset() {
        let mut session = test_session();
        let first = session.classify(&AttemptEnd::Connect(ClientError::Transport("x".into())));
        let second = session.classify(&AttemptEnd::Connect(ClientError::Transport("x".into())));
        match (first, second) {
            (NextStep::Backoff(a), NextStep::Backoff(b)) => {
                assert_eq!(a, Duration::from_millis(10));
                assert_eq!(b, Duration::from_millis(15));
            }
            other => panic!("expected growing backoff, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inactive_instance_publishes_event_and_waits_long_delay() {
        let mut session = test_session();
        let mut events = session.events().subscribe("test");

        let step = session.classify(&AttemptEnd::Connect(ClientError::Handshake(
            "InactiveInstanceException: gone".into(),
        )));
        match step {
            NextStep::Backoff(delay) => assert_eq!(delay, Duration::from_millis(500)),
            other => panic!("expected inactive delay, got {other:?}"),
        }
        assert_eq!(events.try_recv().ok(), Some(InstanceEvent::Deregistered));
        assert!(events.try_recv().is_err(), "exactly one event per termination");
    }

    #[tokio::test]
    async fn url_failure_backs_off() {
        let mut session = test_session();
        let end = session.run_attempt("ftp://control.example.com").await;
        assert!(matches!(end, AttemptEnd::Url(UrlError::UnsupportedScheme(_))));
        assert!(matches!(session.classify(&end), NextStep::Backoff(_)));
    }
}
