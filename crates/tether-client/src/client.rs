//! MCP client: drives one transport through the connect/initialize
//! handshake and exposes the typed MCP operations.

use crate::config::{ClientOptions, ServerConfig};
use crate::events::{ClientEvent, ClientEventKind, ConnectionState, Subscription};
use crate::stats::{ClientStatistics, Counter};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tether_core::{Listeners, TetherError, TetherResult};
use tether_protocol::{
    methods, CallToolParams, CallToolResult, GetPromptResult, Implementation, InitializeParams,
    InitializeResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, LoggingLevel, Paginated,
    Prompt, ReadResourceResult, Resource, ResourceTemplate, ServerCapabilities, Tool,
};
use tether_transport::{CloseEvent, ReconnectEvent, Transport, TransportConfig};
use tracing::{debug, info, warn};

/// Outcome of a client operation.
///
/// Client operations never return `Err`: failures (timeouts, transport
/// errors, server-side errors, calls while not ready) come back with
/// `success == false` and a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl<T> OperationResult<T> {
    /// A successful result.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms: None,
        }
    }

    /// A failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms: None,
        }
    }

    fn timed(mut self, started: Instant) -> Self {
        self.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Convert into a `Result`, turning a failure into [`TetherError::Transport`]
    /// carrying the failure message.
    pub fn into_result(self) -> TetherResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(TetherError::Transport(
                self.error.unwrap_or_else(|| "operation failed".to_string()),
            )),
        }
    }
}

impl<T> From<TetherResult<T>> for OperationResult<T> {
    fn from(result: TetherResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// What the server reported about itself during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
    /// Protocol version the server agreed to.
    pub protocol_version: String,
    /// Capabilities the server announced.
    pub capabilities: ServerCapabilities,
    /// Optional usage instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl From<InitializeResult> for ServerInfo {
    fn from(result: InitializeResult) -> Self {
        Self {
            name: result.server_info.name,
            version: result.server_info.version,
            protocol_version: result.protocol_version,
            capabilities: result.capabilities,
            instructions: result.instructions,
        }
    }
}

/// Client for one MCP server.
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    server_id: String,
    options: ClientOptions,
    transport: Transport,
    state: Mutex<ConnectionState>,
    server_info: Mutex<Option<ServerInfo>>,
    tools: Mutex<Option<Vec<Tool>>>,
    stats: Mutex<ClientStatistics>,
    events: Arc<Listeners<ClientEvent>>,
    connect_gate: tokio::sync::Mutex<()>,
    /// Bumped by every explicit disconnect; a connect attempt that sees it
    /// move gives up.
    epoch: AtomicU64,
}

impl McpClient {
    /// Create a client for `server_id`. No connection is made yet.
    pub fn new(
        server_id: impl Into<String>,
        transport: &TransportConfig,
        options: ClientOptions,
    ) -> TetherResult<Self> {
        let transport = Transport::from_config(transport)?;
        let inner = Arc::new(ClientInner {
            server_id: server_id.into(),
            options,
            transport,
            state: Mutex::new(ConnectionState::Disconnected),
            server_info: Mutex::new(None),
            tools: Mutex::new(None),
            stats: Mutex::new(ClientStatistics::new()),
            events: Arc::new(Listeners::new()),
            connect_gate: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
        });
        ClientInner::wire_transport(&inner);
        Ok(Self { inner })
    }

    /// Create a client from a manager server entry.
    pub fn from_config(config: &ServerConfig) -> TetherResult<Self> {
        config.validate()?;
        Self::new(&config.id, &config.transport, config.client.clone())
    }

    /// Id this client was registered under.
    pub fn server_id(&self) -> &str {
        &self.inner.server_id
    }

    // --- Lifecycle ---

    /// Open the transport and run the `initialize` handshake.
    ///
    /// Calling this while another connect is running waits for it. If that
    /// attempt reached `Ready` its result is returned without opening a
    /// second channel; otherwise this call makes its own attempt. A
    /// [`disconnect`](Self::disconnect) issued mid-attempt wins and the
    /// attempt fails with [`TetherError::Disconnected`].
    pub async fn connect(&self) -> OperationResult<ServerInfo> {
        let started = Instant::now();
        OperationResult::from(self.establish().await).timed(started)
    }

    pub(crate) async fn establish(&self) -> TetherResult<ServerInfo> {
        let inner = &self.inner;
        let _gate = inner.connect_gate.lock().await;

        if inner.state() == ConnectionState::Ready {
            if let Some(info) = inner.server_info.lock().clone() {
                return Ok(info);
            }
        }

        let epoch = inner.epoch.load(Ordering::SeqCst);
        inner.set_state(ConnectionState::Connecting);
        info!(server = %inner.server_id, transport = %inner.transport.kind(), "Connecting to MCP server");
        if let Err(e) = inner.transport.connect().await {
            warn!(server = %inner.server_id, error = %e, "MCP connection failed");
            inner.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        if inner.superseded(epoch) {
            inner.abandon().await;
            return Err(TetherError::Disconnected);
        }
        inner.set_state(ConnectionState::Connected);

        match inner.initialize().await {
            Ok(_) if inner.superseded(epoch) => {
                inner.abandon().await;
                Err(TetherError::Disconnected)
            }
            Ok(info) => {
                info!(
                    server = %inner.server_id,
                    name = %info.name,
                    version = %info.version,
                    protocol = %info.protocol_version,
                    "MCP server ready"
                );
                Ok(info)
            }
            Err(e) => {
                warn!(server = %inner.server_id, error = %e, "MCP handshake failed");
                inner.abandon().await;
                Err(e)
            }
        }
    }

    /// Close the transport. Pending requests fail; statistics are kept.
    pub async fn disconnect(&self) -> OperationResult<()> {
        let started = Instant::now();
        OperationResult::from(self.shutdown().await).timed(started)
    }

    pub(crate) async fn shutdown(&self) -> TetherResult<()> {
        let inner = &self.inner;
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        let result = inner.transport.disconnect().await;
        inner.clear_session();
        if inner.state() != ConnectionState::Disconnected {
            info!(server = %inner.server_id, "Disconnected from MCP server");
        }
        inner.set_state(ConnectionState::Disconnected);
        result
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Whether operations can be issued.
    pub fn is_ready(&self) -> bool {
        self.inner.state() == ConnectionState::Ready
    }

    /// Server details from the last successful handshake.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.server_info.lock().clone()
    }

    /// Tool list from the last `list_tools`, if still valid.
    pub fn cached_tools(&self) -> Option<Vec<Tool>> {
        self.inner.tools.lock().clone()
    }

    /// Whether the cached tool list contains `name`.
    pub fn has_tool(&self, name: &str) -> bool {
        self.inner
            .tools
            .lock()
            .as_ref()
            .is_some_and(|tools| tools.iter().any(|t| t.name == name))
    }

    // --- Tools ---

    /// List every tool, following pagination, and refresh the cache.
    pub async fn list_tools(&self) -> OperationResult<Vec<Tool>> {
        self.run(None, async {
            let tools = self
                .inner
                .list_all::<ListToolsResult>(methods::TOOLS_LIST)
                .await?;
            *self.inner.tools.lock() = Some(tools.clone());
            Ok(tools)
        })
        .await
    }

    /// Look up one tool, from the cache when it is populated.
    pub async fn get_tool(&self, name: &str) -> OperationResult<Tool> {
        self.run(None, async {
            let cached = self.inner.tools.lock().clone();
            let tools = match cached {
                Some(tools) => tools,
                None => {
                    let tools = self
                        .inner
                        .list_all::<ListToolsResult>(methods::TOOLS_LIST)
                        .await?;
                    *self.inner.tools.lock() = Some(tools.clone());
                    tools
                }
            };
            tools
                .into_iter()
                .find(|t| t.name == name)
                .ok_or_else(|| TetherError::NotFound(format!("Tool '{name}'")))
        })
        .await
    }

    /// Invoke a tool.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> OperationResult<CallToolResult> {
        let params = CallToolParams::new(name, arguments);
        self.run(Some(Counter::ToolCall), async {
            self.inner
                .request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
                .await
        })
        .await
    }

    // --- Resources ---

    /// List every resource, following pagination.
    pub async fn list_resources(&self) -> OperationResult<Vec<Resource>> {
        self.run(None, self.inner.list_all::<ListResourcesResult>(methods::RESOURCES_LIST))
            .await
    }

    /// List every resource template, following pagination.
    pub async fn list_resource_templates(&self) -> OperationResult<Vec<ResourceTemplate>> {
        self.run(
            None,
            self.inner
                .list_all::<ListResourceTemplatesResult>(methods::RESOURCES_TEMPLATES_LIST),
        )
        .await
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> OperationResult<ReadResourceResult> {
        self.run(
            Some(Counter::ResourceRead),
            self.inner
                .request(methods::RESOURCES_READ, Some(json!({ "uri": uri }))),
        )
        .await
    }

    /// Ask for `notifications/resources/updated` about `uri`.
    pub async fn subscribe_resource(&self, uri: &str) -> OperationResult<()> {
        self.run(
            None,
            self.inner
                .request_unit(methods::RESOURCES_SUBSCRIBE, Some(json!({ "uri": uri }))),
        )
        .await
    }

    /// Stop updates about `uri`.
    pub async fn unsubscribe_resource(&self, uri: &str) -> OperationResult<()> {
        self.run(
            None,
            self.inner
                .request_unit(methods::RESOURCES_UNSUBSCRIBE, Some(json!({ "uri": uri }))),
        )
        .await
    }

    // --- Prompts ---

    /// List every prompt, following pagination.
    pub async fn list_prompts(&self) -> OperationResult<Vec<Prompt>> {
        self.run(None, self.inner.list_all::<ListPromptsResult>(methods::PROMPTS_LIST))
            .await
    }

    /// Render a prompt with string arguments.
    pub async fn get_prompt(&self, name: &str, arguments: Value) -> OperationResult<GetPromptResult> {
        self.run(
            Some(Counter::PromptGet),
            self.inner.request(
                methods::PROMPTS_GET,
                Some(json!({ "name": name, "arguments": arguments })),
            ),
        )
        .await
    }

    // --- Utility ---

    /// Round-trip a `ping`; the payload is the latency in milliseconds.
    pub async fn ping(&self) -> OperationResult<u64> {
        self.run(None, async {
            let started = Instant::now();
            self.inner.request_unit(methods::PING, None).await?;
            Ok(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
        })
        .await
    }

    /// Set the minimum level of `notifications/message` the server sends.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> OperationResult<()> {
        self.run(
            None,
            self.inner
                .request_unit(methods::LOGGING_SET_LEVEL, Some(json!({ "level": level }))),
        )
        .await
    }

    // --- Observability ---

    /// Snapshot of the counters.
    pub fn statistics(&self) -> ClientStatistics {
        self.inner.stats.lock().clone()
    }

    /// Zero the counters and restart the uptime anchor.
    pub fn reset_statistics(&self) {
        self.inner.stats.lock().reset();
    }

    // --- Eventing ---

    /// Receive events of `kind` ([`ClientEventKind::Any`] for all).
    pub fn subscribe(
        &self,
        kind: ClientEventKind,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> Subscription {
        Subscription::new(&self.inner.events, kind, callback)
    }

    /// Drop every subscription.
    pub fn unsubscribe_all(&self) {
        self.inner.events.clear();
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.events.len()
    }

    /// Count the operation, check readiness, run it, and time it.
    async fn run<T, F>(&self, counter: Option<Counter>, op: F) -> OperationResult<T>
    where
        F: Future<Output = TetherResult<T>>,
    {
        let started = Instant::now();
        if let Some(counter) = counter {
            self.inner.stats.lock().bump(counter);
        }
        let state = self.inner.state();
        if state != ConnectionState::Ready {
            return OperationResult::failure(format!(
                "Server '{}' is not connected (state: {state})",
                self.inner.server_id
            ))
            .timed(started);
        }
        let result = op.await;
        if let Err(e) = &result {
            debug!(server = %self.inner.server_id, error = %e, "MCP operation failed");
        }
        OperationResult::from(result).timed(started)
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server_id", &self.inner.server_id)
            .field("state", &self.inner.state())
            .field("transport", &self.inner.transport.kind())
            .finish()
    }
}

impl ClientInner {
    /// Route transport events into client state and the event bus. Listeners
    /// hold a weak reference so they never keep the client alive.
    fn wire_transport(this: &Arc<Self>) {
        let weak = Arc::downgrade(this);
        this.transport.on_message(with_inner(&weak, |inner, message: &JsonRpcMessage| {
            inner.handle_message(message);
        }));
        this.transport.on_error(with_inner(&weak, |inner, message: &String| {
            inner.handle_error(message);
        }));
        this.transport.on_close(with_inner(&weak, |inner, event: &CloseEvent| {
            inner.handle_close(event);
        }));
        this.transport.on_reconnect(with_inner(&weak, |inner, event: &ReconnectEvent| {
            let attempt = event.attempt;
            let epoch = inner.epoch.load(Ordering::SeqCst);
            let inner = Arc::clone(inner);
            tokio::spawn(async move { inner.resume(attempt, epoch).await });
        }));
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            std::mem::replace(&mut *state, next)
        };
        debug!(server = %self.server_id, from = %previous, to = %next, "Connection state changed");
        self.events.emit(&ClientEvent::StateChanged {
            previous,
            current: next,
        });
    }

    fn clear_session(&self) {
        self.server_info.lock().take();
        self.tools.lock().take();
    }

    fn superseded(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    /// Close the channel of a failed or cancelled attempt.
    async fn abandon(&self) {
        let _ = self.transport.disconnect().await;
        self.clear_session();
        self.set_state(ConnectionState::Disconnected);
    }

    async fn initialize(&self) -> TetherResult<ServerInfo> {
        self.set_state(ConnectionState::Initializing);
        let params = InitializeParams {
            protocol_version: self.options.protocol_version.clone(),
            capabilities: json!({}),
            client_info: Implementation {
                name: self.options.client_name.clone(),
                version: self.options.client_version.clone(),
            },
        };
        let result: InitializeResult = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;
        if result.protocol_version != self.options.protocol_version {
            warn!(
                server = %self.server_id,
                requested = %self.options.protocol_version,
                offered = %result.protocol_version,
                "Server negotiated a different protocol version"
            );
        }
        self.transport
            .send_notification(JsonRpcNotification::new(methods::INITIALIZED, None))
            .await?;

        let info = ServerInfo::from(result);
        *self.server_info.lock() = Some(info.clone());
        self.set_state(ConnectionState::Ready);
        Ok(info)
    }

    /// Re-run the handshake on a channel the transport re-opened by itself.
    async fn resume(self: Arc<Self>, attempt: u32, epoch: u64) {
        let _gate = self.connect_gate.lock().await;
        if self.superseded(epoch) {
            debug!(server = %self.server_id, "Skipping re-initialization after disconnect");
            return;
        }
        self.stats.lock().reconnections += 1;
        info!(server = %self.server_id, attempt, "Transport reconnected; re-initializing");

        self.set_state(ConnectionState::Connecting);
        self.set_state(ConnectionState::Connected);
        match self.initialize().await {
            Ok(_) if self.superseded(epoch) => self.abandon().await,
            Ok(_) => {}
            Err(e) => {
                warn!(server = %self.server_id, error = %e, "Handshake after reconnect failed");
                self.events.emit(&ClientEvent::Error {
                    message: format!("Handshake after reconnect failed: {e}"),
                });
                self.abandon().await;
            }
        }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> TetherResult<R> {
        let request = JsonRpcRequest::with_next_id(method, params);
        debug!(server = %self.server_id, method, id = request.id, "Sending request");
        self.stats.lock().record_request();

        let outcome = self.exchange(request).await;
        if let Err(e) = &outcome {
            self.stats.lock().record_failure();
            if e.is_channel_failure()
                && self.state() == ConnectionState::Ready
                && !self.transport.is_connected()
            {
                self.clear_session();
                self.set_state(ConnectionState::Disconnected);
            }
        }
        outcome
    }

    async fn exchange<R: DeserializeOwned>(&self, request: JsonRpcRequest) -> TetherResult<R> {
        let response = self.transport.send_request(request).await?;
        let value = response.into_result()?;
        Ok(serde_json::from_value(value)?)
    }

    async fn request_unit(&self, method: &str, params: Option<Value>) -> TetherResult<()> {
        self.request::<Value>(method, params).await.map(drop)
    }

    /// Fetch every page of a cursor-paginated list. Stops at an empty cursor
    /// or one that was already followed.
    async fn list_all<P>(&self, method: &str) -> TetherResult<Vec<P::Item>>
    where
        P: Paginated + DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: P = self.request(method, params).await?;
            let (mut batch, next) = page.into_page();
            items.append(&mut batch);
            match next {
                Some(next) if !next.is_empty() && seen.insert(next.clone()) => {
                    cursor = Some(next);
                }
                Some(next) if !next.is_empty() => {
                    warn!(server = %self.server_id, method, cursor = %next, "Server repeated a pagination cursor; stopping");
                    break;
                }
                _ => break,
            }
        }
        Ok(items)
    }

    fn handle_message(&self, message: &JsonRpcMessage) {
        self.stats.lock().touch();
        match message {
            JsonRpcMessage::Notification(notification) => {
                debug!(server = %self.server_id, method = %notification.method, "Notification");
                let params = notification.params.as_ref();
                match notification.method.as_str() {
                    methods::TOOLS_LIST_CHANGED => {
                        self.tools.lock().take();
                        self.events.emit(&ClientEvent::ToolsChanged);
                    }
                    methods::RESOURCE_UPDATED => {
                        match params.and_then(|p| p.get("uri")).and_then(Value::as_str) {
                            Some(uri) => self.events.emit(&ClientEvent::ResourceUpdated {
                                uri: uri.to_string(),
                            }),
                            None => warn!(server = %self.server_id, "Resource update without a uri"),
                        }
                    }
                    methods::LOG_MESSAGE => {
                        let level = params
                            .and_then(|p| p.get("level"))
                            .and_then(Value::as_str)
                            .unwrap_or("info");
                        let data = params.and_then(|p| p.get("data")).cloned().unwrap_or(Value::Null);
                        info!(server = %self.server_id, level, data = %data, "Server log message");
                    }
                    _ => {}
                }
                self.events
                    .emit(&ClientEvent::Notification(notification.clone()));
            }
            JsonRpcMessage::Request(request) => {
                debug!(server = %self.server_id, method = %request.method, id = request.id, "Ignoring server request");
            }
            JsonRpcMessage::Response(response) => {
                debug!(server = %self.server_id, id = ?response.id, "Discarding late response");
            }
        }
    }

    fn handle_error(&self, message: &str) {
        // A WebSocket drop is reported as an error while reconnection runs.
        if self.state() == ConnectionState::Ready && !self.transport.is_connected() {
            self.clear_session();
            self.set_state(ConnectionState::Disconnected);
        }
        self.events.emit(&ClientEvent::Error {
            message: message.to_string(),
        });
    }

    fn handle_close(&self, event: &CloseEvent) {
        if event.initiated_by_user {
            return;
        }
        warn!(server = %self.server_id, reason = %event.reason, "MCP connection closed");
        self.clear_session();
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(&ClientEvent::Error {
            message: format!("Connection closed: {}", event.reason),
        });
    }
}

fn with_inner<E: 'static>(
    weak: &Weak<ClientInner>,
    f: impl Fn(&Arc<ClientInner>, &E) + Send + Sync + 'static,
) -> impl Fn(&E) + Send + Sync + 'static {
    let weak = weak.clone();
    move |event| {
        if let Some(inner) = weak.upgrade() {
            f(&inner, event);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tether_transport::StdioConfig;

    fn offline_client() -> McpClient {
        McpClient::new(
            "offline",
            &TransportConfig::Stdio(StdioConfig::new("cat")),
            ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_operation_result_shapes() {
        let ok = OperationResult::ok(5);
        assert!(ok.success);
        assert_eq!(ok.clone().into_result().unwrap(), 5);

        let failed: OperationResult<u32> = OperationResult::failure("boom");
        assert!(!failed.success);
        assert!(failed.data.is_none());
        assert_eq!(failed.into_result().unwrap_err().to_string(), "Transport error: boom");
    }

    #[test]
    fn test_operation_result_serialization_skips_empty_fields() {
        let failed: OperationResult<u32> = OperationResult::failure("nope");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json, json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn test_server_info_from_initialize_result() {
        let result: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "fixture", "version": "1.2.3"}
        }))
        .unwrap();
        let info = ServerInfo::from(result);
        assert_eq!(info.name, "fixture");
        assert_eq!(info.version, "1.2.3");
        assert!(info.capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_operations_fail_when_not_ready() {
        let client = offline_client();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);

        let result = client.call_tool("echo", json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not connected"));
        assert!(result.duration_ms.is_some());

        let result = client.read_resource("mem://x").await;
        assert!(!result.success);
        let result = client.get_prompt("greet", json!({})).await;
        assert!(!result.success);

        // Counters move even though the calls never reached the server.
        let stats = client.statistics();
        assert_eq!(stats.tool_calls, 1);
        assert_eq!(stats.resource_reads, 1);
        assert_eq!(stats.prompt_gets, 1);
        assert_eq!(stats.total_requests, 0);
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_quiet() {
        let client = offline_client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.subscribe(ClientEventKind::Any, move |e| sink.lock().push(e.clone()));

        let result = client.disconnect().await;
        assert!(result.success);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_invalid_transport_rejected() {
        let err = McpClient::new(
            "bad",
            &TransportConfig::Stdio(StdioConfig::new("")),
            ClientOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }
}
