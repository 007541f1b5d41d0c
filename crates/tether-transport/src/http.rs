//! HTTP transport: every message is an independent POST, server-initiated
//! traffic arrives over an optional Server-Sent Events stream.

use crate::config::HttpConfig;
use crate::events::TransportEvents;
use crate::shared::TransportShared;
use crate::sse::SseParser;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{TetherError, TetherResult};
use tether_protocol::{
    decode_body, encode_body, methods, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_STREAM: &str = "text/event-stream";

/// Transport speaking JSON-RPC over plain HTTP POST requests.
pub struct HttpTransport {
    config: HttpConfig,
    client: reqwest::Client,
    shared: Arc<TransportShared>,
    events_task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpTransport {
    /// Build the HTTP client; fails on headers that are not valid HTTP.
    pub fn new(config: HttpConfig) -> TetherResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TetherError::Config(format!("Invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TetherError::Config(format!("Invalid value for header '{name}': {e}")))?;
            headers.insert(header, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TetherError::Http(format!("Failed to build HTTP client: {e}")))?;

        let shared = Arc::new(TransportShared::new(format!("http:{}", config.url)));
        Ok(Self {
            config,
            client,
            shared,
            events_task: Mutex::new(None),
        })
    }

    /// Check the endpoint with a `ping` round trip, then open the event
    /// stream when one is configured.
    pub async fn connect(&self) -> TetherResult<()> {
        if self.shared.is_open() {
            return Err(TetherError::AlreadyConnected);
        }

        let ping = JsonRpcMessage::Request(JsonRpcRequest::with_next_id(methods::PING, None));
        let timeout = Duration::from_millis(self.config.connection_timeout_ms);
        let replies = tokio::time::timeout(timeout, self.post(&ping))
            .await
            .map_err(|_| {
                TetherError::Transport(format!(
                    "HTTP ping to {} timed out after {}ms",
                    self.config.url, self.config.connection_timeout_ms
                ))
            })??;

        for reply in replies {
            match reply {
                JsonRpcMessage::Response(response) => {
                    response.into_result()?;
                }
                other => self.shared.dispatch(other),
            }
        }

        self.shared.mark_open();
        if let Some(events_url) = &self.config.events_url {
            let task = tokio::spawn(event_stream(
                self.client.clone(),
                events_url.clone(),
                Arc::clone(&self.shared),
            ));
            *self.events_task.lock() = Some(task);
        }
        info!(url = %self.config.url, "HTTP transport connected");
        Ok(())
    }

    /// Stop the event stream and fail every pending request.
    pub async fn disconnect(&self) -> TetherResult<()> {
        if !self.shared.teardown() {
            return Ok(());
        }
        if let Some(task) = self.events_task.lock().take() {
            task.abort();
        }
        self.shared.emit_close("disconnected by client", true);
        Ok(())
    }

    /// POST a request and wait for its response, inline or over the event stream.
    pub async fn send_request(&self, request: JsonRpcRequest) -> TetherResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(TetherError::NotConnected);
        }
        let id = request.id;
        let message = JsonRpcMessage::Request(request);
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let exchange = async {
            for reply in self.post(&message).await? {
                self.shared.dispatch(reply);
            }
            Ok::<(), TetherError>(())
        };

        // The POST itself counts against the request timeout.
        tokio::time::timeout(timeout, self.shared.round_trip(id, timeout, exchange))
            .await
            .map_err(|_| TetherError::Timeout {
                timeout_ms: self.config.request_timeout_ms,
            })?
    }

    /// POST a notification.
    pub async fn send_notification(&self, notification: JsonRpcNotification) -> TetherResult<()> {
        if !self.is_connected() {
            return Err(TetherError::NotConnected);
        }
        let replies = self
            .post(&JsonRpcMessage::Notification(notification))
            .await?;
        for reply in replies {
            self.shared.dispatch(reply);
        }
        Ok(())
    }

    /// HTTP is stateless, so this is the transport flag alone.
    pub fn is_connected(&self) -> bool {
        self.shared.is_open()
    }

    /// Listener lists of this transport.
    pub fn events(&self) -> &TransportEvents {
        &self.shared.events
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// POST one message. An empty body yields no messages; an event-stream
    /// body may yield several.
    async fn post(&self, message: &JsonRpcMessage) -> TetherResult<Vec<JsonRpcMessage>> {
        let body = encode_body(message)?;
        let response = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| TetherError::Http(format!("POST {} failed: {e}", self.config.url)))?;

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(EVENT_STREAM));
        let text = response
            .text()
            .await
            .map_err(|e| TetherError::Http(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(TetherError::Http(format!("HTTP {status}: {text}")));
        }
        if text.trim().is_empty() {
            debug!(url = %self.config.url, %status, "Empty body; reply expected on event stream");
            return Ok(Vec::new());
        }

        if is_event_stream {
            let mut parser = SseParser::new();
            let mut events = parser.push(&text);
            events.extend(parser.finish());
            return events
                .iter()
                .map(|event| decode_body(event.as_bytes()))
                .collect();
        }
        Ok(vec![decode_body(text.as_bytes())?])
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.events_task.lock().take() {
            task.abort();
        }
    }
}

async fn event_stream(client: reqwest::Client, url: String, shared: Arc<TransportShared>) {
    let response = match client.get(&url).header(ACCEPT, EVENT_STREAM).send().await {
        Ok(response) => response,
        Err(e) => {
            shared.report_error(format!("Failed to open event stream {url}: {e}"));
            return;
        }
    };
    if !response.status().is_success() {
        shared.report_error(format!(
            "Event stream {url} returned HTTP {}",
            response.status()
        ));
        return;
    }
    debug!(url = %url, "SSE event stream open");

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut carry: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                shared.report_error(format!("Event stream {url} failed: {e}"));
                return;
            }
        };
        // Multi-byte characters may straddle chunk boundaries.
        carry.extend_from_slice(&bytes);
        let valid = match std::str::from_utf8(&carry) {
            Ok(text) => text.len(),
            Err(e) => e.valid_up_to(),
        };
        let text = String::from_utf8_lossy(&carry[..valid]).into_owned();
        carry.drain(..valid);

        for event in parser.push(&text) {
            shared.dispatch_body(event.as_bytes());
        }
    }

    if let Some(event) = parser.finish() {
        shared.dispatch_body(event.as_bytes());
    }
    if shared.is_open() {
        warn!(url = %url, "SSE event stream ended");
        shared.report_error(format!("Event stream {url} ended"));
    }
}
