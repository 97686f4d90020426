//! Convenient re-exports for common tether types.
pub use crate::{
    client::{ClientServer, ConnectionFactory, WebsocketConnectionFactory},
    config::{AgentIdentity, ConfigError, SessionConfig},
    credentials::{Credentials, CredentialsManager, CredentialsProvider, TaskCredentials},
    dispatch::{HandlerRegistry, MessageHandler, Outbound},
    endpoint::{EndpointResolver, StaticEndpoint},
    engine::{EngineError, TaskEngine},
    error::{ClientError, HandlerError},
    events::{InstanceEvent, InstanceEventBus},
    messages::{ControlMessage, MessageKind, OutboundMessage},
    session::{Session, SessionBuilder},
};
