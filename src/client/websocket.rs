//! Websocket implementation of the [`ClientServer`] contract.
//!
//! One instance owns one connection: `connect` upgrades, `serve` pumps the
//! read half through the handler registry, writes go through a mutex-guarded
//! sink. Force-close is coordinated through an internal token so a blocked
//! `serve` unblocks without waiting on the peer.

use crate::client::ClientServer;
use crate::credentials::Credentials;
use crate::dispatch::{HandlerRegistry, InboundHook, MessageHandler, Outbound};
use crate::error::ClientError;
use crate::messages::{decode_frame, encode_frame, OutboundMessage};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// `NO_PROXY` default applied when the embedding process supplied none: the
/// instance metadata endpoints and the container-runtime socket must never be
/// routed through a proxy.
pub const DEFAULT_NO_PROXY: &str = "169.254.169.254,169.254.170.2,/var/run/docker.sock";

/// Set the `NO_PROXY` default unless the user already chose one. A
/// user-supplied value (either spelling) is never overwritten.
pub(crate) fn ensure_no_proxy_default() {
    if std::env::var_os("NO_PROXY").is_none() && std::env::var_os("no_proxy").is_none() {
        std::env::set_var("NO_PROXY", DEFAULT_NO_PROXY);
    }
}

/// One websocket connection to the control endpoint.
pub struct WebsocketClientServer {
    url: Url,
    credentials: Credentials,
    handlers: HandlerRegistry,
    write: tokio::sync::Mutex<Option<WsSink>>,
    read: std::sync::Mutex<Option<WsSource>>,
    connected: AtomicBool,
    closed: CancellationToken,
}

impl WebsocketClientServer {
    /// A client for `url`; no I/O happens until `connect`.
    pub fn new(url: Url, credentials: Credentials, handlers: HandlerRegistry) -> Self {
        Self {
            url,
            credentials,
            handlers,
            write: tokio::sync::Mutex::new(None),
            read: std::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    fn upgrade_request(&self) -> Result<tungstenite::handshake::client::Request, ClientError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Handshake(e.to_string()))?;
        let basic =
            STANDARD.encode(format!("{}:{}", self.credentials.access_key_id, self.credentials.secret_access_key));
        let headers = request.headers_mut();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Basic {basic}"))
                .map_err(|e| ClientError::Handshake(e.to_string()))?,
        );
        if !self.credentials.session_token.is_empty() {
            headers.insert(
                "x-session-token",
                HeaderValue::from_str(&self.credentials.session_token)
                    .map_err(|e| ClientError::Handshake(e.to_string()))?,
            );
        }
        Ok(request)
    }

    async fn send_frame(&self, frame: WsMessage) -> Result<(), ClientError> {
        let mut write = self.write.lock().await;
        let sink = write.as_mut().ok_or(ClientError::NotConnected)?;
        sink.send(frame).await.map_err(map_stream_error)
    }
}

#[async_trait]
impl ClientServer for WebsocketClientServer {
    fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.register(handler);
    }

    fn set_any_message_hook(&self, hook: InboundHook) {
        self.handlers.set_any_message_hook(hook);
    }

    async fn connect(&self) -> Result<(), ClientError> {
        ensure_no_proxy_default();
        let request = self.upgrade_request()?;
        let (stream, _response) = connect_async(request).await.map_err(map_handshake_error)?;
        let (sink, source) = stream.split();
        *self.write.lock().await = Some(sink);
        *self.read.lock().unwrap_or_else(|p| p.into_inner()) = Some(source);
        self.connected.store(true, Ordering::SeqCst);
        debug!(url = %self.url, "control channel connected");
        Ok(())
    }

    async fn serve(&self, cancel: CancellationToken) -> Result<(), ClientError> {
        let mut source = {
            let mut read = self.read.lock().unwrap_or_else(|p| p.into_inner());
            match read.take() {
                Some(source) => source,
                None if self.connected.load(Ordering::SeqCst) => {
                    return Err(ClientError::AlreadyServing)
                }
                None => return Err(ClientError::NotConnected),
            }
        };

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = self.closed.cancelled() => return Ok(()),
                frame = source.next() => frame,
            };
            match frame {
                None => return Ok(()),
                Some(Ok(WsMessage::Text(text))) => match decode_frame(&text) {
                    Ok(msg) => self.handlers.dispatch(&msg, self).await,
                    Err(e) => warn!(error = %e, "dropping undecodable frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => return close_result(frame),
                Some(Ok(_)) => {} // binary/ping/pong carry no control messages
                Some(Err(e)) => return Err(map_stream_error(e)),
            }
        }
    }

    async fn make_request(&self, msg: OutboundMessage) -> Result<(), ClientError> {
        let frame = encode_frame(&msg)?;
        self.send_frame(WsMessage::Text(frame.into())).await
    }

    async fn write_close_message(&self) -> Result<(), ClientError> {
        self.send_frame(WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "shutting down".into(),
        })))
        .await
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.closed.cancel();
        let mut write = self.write.lock().await;
        if let Some(mut sink) = write.take() {
            let _ = sink.close().await;
        }
        Ok(())
    }
}

#[async_trait]
impl Outbound for WebsocketClientServer {
    async fn send(&self, msg: OutboundMessage) -> Result<(), ClientError> {
        self.make_request(msg).await
    }
}

/// Classify the peer's close frame: a normal close is the clean
/// end-of-stream, everything else keeps its code and reason for the session
/// classifier.
fn close_result(frame: Option<CloseFrame>) -> Result<(), ClientError> {
    match frame {
        None => Ok(()),
        Some(frame) => {
            let code = u16::from(frame.code);
            let reason = frame.reason.to_string();
            match frame.code {
                // A deregistration hint rides in the close reason, so a
                // "normal" close naming it still classifies as an error.
                CloseCode::Normal | CloseCode::Away
                    if !reason.contains(crate::error::INACTIVE_INSTANCE_MARKER) =>
                {
                    Ok(())
                }
                _ => Err(ClientError::UnexpectedClose { code, reason }),
            }
        }
    }
}

fn map_handshake_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            ClientError::ConnectionClosed
        }
        tungstenite::Error::Http(response) => {
            let status = response.status();
            let body = response
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            ClientError::Handshake(format!("{status}: {body}"))
        }
        other => ClientError::Handshake(other.to_string()),
    }
}

fn map_stream_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            ClientError::ConnectionClosed
        }
        other => ClientError::Transport(other.to_string()),
    }
}
