//! Transports carrying JSON-RPC messages between the tether client and an
//! MCP server.
//!
//! Three channels are supported: a child process over stdio, a WebSocket,
//! and HTTP POST with an optional Server-Sent Events stream. They share one
//! contract, exposed through the [`Transport`] enum built by
//! [`Transport::from_config`].

pub mod config;
mod events;
pub mod http;
mod pending;
mod shared;
pub mod sse;
pub mod stdio;
pub mod websocket;

pub use config::{HttpConfig, StdioConfig, TransportConfig, TransportKind, WebSocketConfig};
pub use events::{CloseEvent, ReconnectEvent, TransportEvents};
pub use http::HttpTransport;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;

use tether_core::{ListenerId, TetherResult};
use tether_protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Any of the supported transports.
pub enum Transport {
    /// Child process over stdin/stdout.
    Stdio(StdioTransport),
    /// WebSocket connection.
    WebSocket(WebSocketTransport),
    /// HTTP POST plus optional SSE.
    Http(HttpTransport),
}

macro_rules! each {
    ($self:ident, $t:ident => $body:expr) => {
        match $self {
            Transport::Stdio($t) => $body,
            Transport::WebSocket($t) => $body,
            Transport::Http($t) => $body,
        }
    };
}

impl Transport {
    /// Validate `config` and build the matching transport. Nothing is
    /// opened until [`connect`](Self::connect).
    pub fn from_config(config: &TransportConfig) -> TetherResult<Self> {
        config.validate()?;
        Ok(match config {
            TransportConfig::Stdio(c) => Self::Stdio(StdioTransport::new(c.clone())),
            TransportConfig::WebSocket(c) => Self::WebSocket(WebSocketTransport::new(c.clone())),
            TransportConfig::Http(c) => Self::Http(HttpTransport::new(c.clone())?),
        })
    }

    /// Which kind of channel this is.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::WebSocket(_) => TransportKind::WebSocket,
            Self::Http(_) => TransportKind::Http,
        }
    }

    /// Open the channel. Fails with `AlreadyConnected` when already open.
    pub async fn connect(&self) -> TetherResult<()> {
        each!(self, t => t.connect().await)
    }

    /// Close the channel; a no-op when it is not open.
    pub async fn disconnect(&self) -> TetherResult<()> {
        each!(self, t => t.disconnect().await)
    }

    /// Send a request and wait for the response with the same id.
    pub async fn send_request(&self, request: JsonRpcRequest) -> TetherResult<JsonRpcResponse> {
        each!(self, t => t.send_request(request).await)
    }

    /// Send a notification; no response is expected.
    pub async fn send_notification(&self, notification: JsonRpcNotification) -> TetherResult<()> {
        each!(self, t => t.send_notification(notification).await)
    }

    /// Whether the channel is open and alive.
    pub fn is_connected(&self) -> bool {
        each!(self, t => t.is_connected())
    }

    /// Listener lists of the underlying transport.
    pub fn events(&self) -> &TransportEvents {
        each!(self, t => t.events())
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        each!(self, t => t.pending_requests())
    }

    /// Listen for inbound notifications, server requests and unmatched responses.
    pub fn on_message(&self, f: impl Fn(&JsonRpcMessage) + Send + Sync + 'static) -> ListenerId {
        self.events().on_message(f)
    }

    /// Listen for non-fatal transport errors.
    pub fn on_error(&self, f: impl Fn(&String) + Send + Sync + 'static) -> ListenerId {
        self.events().on_error(f)
    }

    /// Listen for the channel closing.
    pub fn on_close(&self, f: impl Fn(&CloseEvent) + Send + Sync + 'static) -> ListenerId {
        self.events().on_close(f)
    }

    /// Listen for successful reconnections (WebSocket only).
    pub fn on_reconnect(&self, f: impl Fn(&ReconnectEvent) + Send + Sync + 'static) -> ListenerId {
        self.events().on_reconnect(f)
    }

    /// Remove a listener registered through any `on_*` method.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events().remove(id)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind())
            .field("connected", &self.is_connected())
            .finish()
    }
}
