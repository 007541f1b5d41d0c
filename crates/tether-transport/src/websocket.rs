//! WebSocket transport with optional automatic reconnection.
//!
//! Every text frame carries exactly one JSON-RPC message, without any
//! `Content-Length` framing.

use crate::config::WebSocketConfig;
use crate::events::TransportEvents;
use crate::shared::TransportShared;
use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{TetherError, TetherResult};
use tether_protocol::{
    encode_body, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Upper bound for the delay between reconnection attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay before reconnection attempt `attempt` (1-based): the base interval
/// doubled per previous attempt, capped at [`MAX_RECONNECT_DELAY`].
pub fn backoff_delay(interval: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    interval.saturating_mul(factor).min(MAX_RECONNECT_DELAY)
}

fn as_millis_u64(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Transport over a single WebSocket connection.
pub struct WebSocketTransport {
    inner: Arc<WsInner>,
}

struct WsInner {
    config: WebSocketConfig,
    shared: TransportShared,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
    user_closed: AtomicBool,
}

impl WebSocketTransport {
    /// Create a transport for `config`; no connection is made yet.
    pub fn new(config: WebSocketConfig) -> Self {
        let shared = TransportShared::new(format!("ws:{}", config.url));
        Self {
            inner: Arc::new(WsInner {
                config,
                shared,
                sink: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
                reconnect: Mutex::new(None),
                user_closed: AtomicBool::new(false),
            }),
        }
    }

    /// Open the socket.
    pub async fn connect(&self) -> TetherResult<()> {
        let inner = &self.inner;
        if inner.shared.is_open() {
            return Err(TetherError::AlreadyConnected);
        }
        if let Some(task) = inner.reconnect.lock().take() {
            task.abort();
        }
        inner.user_closed.store(false, Ordering::SeqCst);

        let stream = inner.open_socket().await?;
        if inner.user_closed.load(Ordering::SeqCst) {
            debug!(url = %inner.config.url, "Disconnected while opening; dropping socket");
            return Err(TetherError::Disconnected);
        }
        inner.install(stream).await;
        info!(url = %inner.config.url, "WebSocket connected");
        Ok(())
    }

    /// Close the socket and cancel any scheduled reconnection.
    pub async fn disconnect(&self) -> TetherResult<()> {
        let inner = &self.inner;
        inner.user_closed.store(true, Ordering::SeqCst);

        let reconnecting = match inner.reconnect.lock().take() {
            Some(task) => {
                let active = !task.is_finished();
                task.abort();
                active
            }
            None => false,
        };

        let was_open = inner.shared.teardown();
        if let Some(reader) = inner.reader.lock().take() {
            reader.abort();
        }
        if let Some(mut sink) = inner.sink.lock().await.take() {
            if was_open {
                let _ = tokio::time::timeout(CLOSE_FRAME_TIMEOUT, sink.send(Message::Close(None)))
                    .await;
            }
        }

        if was_open || reconnecting {
            debug!(url = %inner.config.url, "WebSocket closed by client");
            inner.shared.emit_close("disconnected by client", true);
        }
        Ok(())
    }

    /// Send a request and wait for its response.
    pub async fn send_request(&self, request: JsonRpcRequest) -> TetherResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(TetherError::NotConnected);
        }
        let id = request.id;
        let text = encode_text(&JsonRpcMessage::Request(request))?;
        let timeout = Duration::from_millis(self.inner.config.request_timeout_ms);
        self.inner
            .shared
            .round_trip(id, timeout, self.inner.send_text(text))
            .await
    }

    /// Send a notification.
    pub async fn send_notification(&self, notification: JsonRpcNotification) -> TetherResult<()> {
        if !self.is_connected() {
            return Err(TetherError::NotConnected);
        }
        let text = encode_text(&JsonRpcMessage::Notification(notification))?;
        self.inner.send_text(text).await
    }

    /// Open flag set and the reader task still running.
    pub fn is_connected(&self) -> bool {
        self.inner.shared.is_open()
            && self
                .inner
                .reader
                .lock()
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }

    /// Listener lists of this transport.
    pub fn events(&self) -> &TransportEvents {
        &self.inner.shared.events
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.shared.pending.len()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.inner.user_closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.reconnect.lock().take() {
            task.abort();
        }
        if let Some(task) = self.inner.reader.lock().take() {
            task.abort();
        }
    }
}

impl WsInner {
    async fn open_socket(&self) -> TetherResult<WsStream> {
        let url = &self.config.url;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TetherError::Config(format!("Invalid WebSocket URL '{url}': {e}")))?;

        for (name, value) in &self.config.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TetherError::Config(format!("Invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TetherError::Config(format!("Invalid value for header '{name}': {e}")))?;
            request.headers_mut().insert(header, value);
        }

        let timeout = Duration::from_millis(self.config.connection_timeout_ms);
        let (stream, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    TetherError::Transport(format!(
                        "WebSocket connection to {url} timed out after {}ms",
                        self.config.connection_timeout_ms
                    ))
                })?
                .map_err(|e| {
                    TetherError::Transport(format!("WebSocket connection to {url} failed: {e}"))
                })?;
        Ok(stream)
    }

    async fn install(self: &Arc<Self>, stream: WsStream) {
        let (write, read) = stream.split();
        *self.sink.lock().await = Some(write);
        self.shared.mark_open();
        let task = tokio::spawn(read_loop(Arc::clone(self), read));
        if let Some(old) = self.reader.lock().replace(task) {
            old.abort();
        }
    }

    async fn send_text(&self, text: String) -> TetherResult<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TetherError::NotConnected)?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| TetherError::Transport(format!("WebSocket send failed: {e}")))
    }

    async fn connection_lost(self: &Arc<Self>, reason: String) {
        if self.user_closed.load(Ordering::SeqCst) || !self.shared.teardown() {
            return;
        }
        self.sink.lock().await.take();
        warn!(url = %self.config.url, reason = %reason, "WebSocket connection lost");

        if self.config.auto_reconnect && self.config.max_reconnect_attempts > 0 {
            self.shared
                .report_error(format!("WebSocket connection lost: {reason}"));
            let task = tokio::spawn(reconnect_loop(Arc::clone(self)));
            *self.reconnect.lock() = Some(task);
        } else {
            self.shared.emit_close(reason, false);
        }
    }
}

fn encode_text(message: &JsonRpcMessage) -> TetherResult<String> {
    let body = encode_body(message)?;
    String::from_utf8(body).map_err(|e| TetherError::Transport(e.to_string()))
}

async fn read_loop(inner: Arc<WsInner>, mut read: SplitStream<WsStream>) {
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => inner.shared.dispatch_body(text.as_bytes()),
            Some(Ok(Message::Binary(bytes))) => inner.shared.dispatch_body(&bytes),
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => format!("closed by server ({}): {}", frame.code, frame.reason),
                    None => "closed by server".to_string(),
                };
            }
            // Ping/pong are answered by tungstenite.
            Some(Ok(_)) => {}
            Some(Err(e)) => break format!("WebSocket error: {e}"),
            None => break "WebSocket stream ended".to_string(),
        }
    };
    inner.connection_lost(reason).await;
}

// Boxed: the reader spawns this loop and this loop spawns a new reader.
fn reconnect_loop(inner: Arc<WsInner>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let interval = Duration::from_millis(inner.config.reconnect_interval_ms);
        let max_attempts = inner.config.max_reconnect_attempts;

        for attempt in 1..=max_attempts {
            let delay = backoff_delay(interval, attempt);
            debug!(url = %inner.config.url, attempt, delay_ms = as_millis_u64(delay), "Scheduling WebSocket reconnect");
            tokio::time::sleep(delay).await;
            if inner.user_closed.load(Ordering::SeqCst) {
                return;
            }

            match inner.open_socket().await {
                Ok(stream) => {
                    inner.install(stream).await;
                    info!(url = %inner.config.url, attempt, "WebSocket reconnected");
                    inner.shared.emit_reconnect(attempt);
                    return;
                }
                Err(e) => inner.shared.report_error(format!(
                    "Reconnect attempt {attempt}/{max_attempts} failed: {e}"
                )),
            }
        }

        warn!(url = %inner.config.url, max_attempts, "Giving up on WebSocket reconnection");
        inner.shared.emit_close(
            format!("connection lost; gave up after {max_attempts} reconnect attempts"),
            false,
        );
    })
}
