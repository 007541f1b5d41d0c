use crate::client::{McpClient, OperationResult, ServerInfo};
use crate::config::{ManagerConfig, ServerConfig, DEFAULT_MAX_CONNECTIONS};
use crate::events::ConnectionState;
use crate::stats::ClientStatistics;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tether_core::{TetherError, TetherResult};
use tether_protocol::{CallToolParams, CallToolResult, Tool};
use tracing::{info, warn};

/// Per-server part of [`ManagerStatistics`].
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatistics {
    /// Current connection state.
    pub state: ConnectionState,
    /// Number of tools in the cached list.
    pub tool_count: usize,
    /// The client's counters.
    pub stats: ClientStatistics,
}

/// Totals across every registered server.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatistics {
    /// Registered servers.
    pub total_servers: usize,
    /// Servers in the `Ready` state.
    pub connected_servers: usize,
    /// Sum of requests sent.
    pub total_requests: u64,
    /// Sum of failed requests.
    pub failed_requests: u64,
    /// Sum of tool calls.
    pub tool_calls: u64,
    /// Sum of resource reads.
    pub resource_reads: u64,
    /// Sum of prompt gets.
    pub prompt_gets: u64,
    /// Sum of reconnections.
    pub reconnections: u64,
    /// Breakdown by server id.
    pub servers: BTreeMap<String, ServerStatistics>,
}

struct Registration {
    config: ServerConfig,
    client: McpClient,
}

/// Owns a named set of MCP clients under a connection budget.
///
/// Registration is synchronous; connecting and disconnecting are async and
/// never hold the registry lock across an await.
pub struct McpManager {
    max_connections: usize,
    servers: RwLock<HashMap<String, Registration>>,
    disposed: AtomicBool,
}

impl McpManager {
    /// Create an empty manager allowing `max_connections` registrations.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            servers: RwLock::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Create a manager and register every configured server.
    pub fn from_config(config: ManagerConfig) -> TetherResult<Self> {
        let manager = Self::new(config.max_connections);
        for server in config.servers {
            manager.register_server(server)?;
        }
        Ok(manager)
    }

    /// Maximum number of registrations.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self) -> TetherResult<()> {
        if self.is_disposed() {
            return Err(TetherError::Disposed);
        }
        Ok(())
    }

    /// Validate `config`, create its client and register it.
    pub fn register_server(&self, config: ServerConfig) -> TetherResult<McpClient> {
        self.ensure_usable()?;
        config.validate()?;

        let mut servers = self.servers.write();
        if servers.contains_key(&config.id) {
            return Err(TetherError::DuplicateServer(config.id));
        }
        if servers.len() >= self.max_connections {
            return Err(TetherError::CapacityExceeded {
                max: self.max_connections,
            });
        }

        let client = McpClient::from_config(&config)?;
        info!(
            server = %config.id,
            transport = %config.transport.kind(),
            endpoint = %config.transport.endpoint(),
            "MCP server registered"
        );
        servers.insert(
            config.id.clone(),
            Registration {
                config,
                client: client.clone(),
            },
        );
        Ok(client)
    }

    /// Disconnect and forget a server. Returns `false` if it was not registered.
    pub async fn unregister_server(&self, server_id: &str) -> bool {
        let Some(registration) = self.servers.write().remove(server_id) else {
            return false;
        };
        let client = registration.client;
        client.unsubscribe_all();
        if let Err(e) = client.shutdown().await {
            warn!(server = %server_id, error = %e, "Error while disconnecting unregistered server");
        }
        info!(server = %server_id, "MCP server unregistered");
        true
    }

    fn lookup(&self, server_id: &str) -> TetherResult<McpClient> {
        self.servers
            .read()
            .get(server_id)
            .map(|r| r.client.clone())
            .ok_or_else(|| TetherError::NotRegistered(server_id.to_string()))
    }

    fn snapshot(&self) -> Vec<(String, McpClient)> {
        self.servers
            .read()
            .iter()
            .map(|(id, r)| (id.clone(), r.client.clone()))
            .collect()
    }

    // --- Connections ---

    /// Connect one server.
    pub async fn connect(&self, server_id: &str) -> TetherResult<ServerInfo> {
        self.ensure_usable()?;
        self.lookup(server_id)?.establish().await
    }

    /// Disconnect one server.
    pub async fn disconnect(&self, server_id: &str) -> TetherResult<()> {
        self.lookup(server_id)?.shutdown().await
    }

    /// Connect every registered server concurrently. One failure does not
    /// affect the others.
    pub async fn connect_all(&self) -> TetherResult<HashMap<String, TetherResult<ServerInfo>>> {
        self.ensure_usable()?;
        let clients = self.snapshot();
        let outcomes = join_all(clients.iter().map(|(_, client)| client.establish())).await;

        let results: HashMap<_, _> = clients
            .into_iter()
            .map(|(id, _)| id)
            .zip(outcomes)
            .collect();
        let failed = results.values().filter(|r| r.is_err()).count();
        info!(
            servers = results.len(),
            failed,
            "Connected registered MCP servers"
        );
        Ok(results)
    }

    /// Disconnect every registered server concurrently.
    pub async fn disconnect_all(&self) -> HashMap<String, TetherResult<()>> {
        let clients = self.snapshot();
        let outcomes = join_all(clients.iter().map(|(_, client)| client.shutdown())).await;
        clients
            .into_iter()
            .map(|(id, _)| id)
            .zip(outcomes)
            .collect()
    }

    // --- Views ---

    /// The client registered under `server_id`, whatever its state.
    pub fn client(&self, server_id: &str) -> Option<McpClient> {
        self.lookup(server_id).ok()
    }

    /// The configuration `server_id` was registered with.
    pub fn server_config(&self, server_id: &str) -> Option<ServerConfig> {
        self.servers.read().get(server_id).map(|r| r.config.clone())
    }

    /// Every client that is currently ready, by server id.
    pub fn all_clients(&self) -> HashMap<String, McpClient> {
        self.snapshot()
            .into_iter()
            .filter(|(_, client)| client.is_ready())
            .collect()
    }

    /// Registered server ids, sorted.
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered servers.
    pub fn server_count(&self) -> usize {
        self.servers.read().len()
    }

    // --- Cross-server operations ---

    /// `list_tools` on every ready client, concurrently. Servers whose call
    /// fails are left out.
    pub async fn list_all_tools(&self) -> HashMap<String, Vec<Tool>> {
        let clients: Vec<(String, McpClient)> = self.all_clients().into_iter().collect();
        let outcomes = join_all(clients.iter().map(|(_, client)| client.list_tools())).await;

        let mut all = HashMap::new();
        for ((id, _), outcome) in clients.into_iter().zip(outcomes) {
            match outcome.data {
                Some(tools) if outcome.success => {
                    all.insert(id, tools);
                }
                _ => warn!(
                    server = %id,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Failed to list tools"
                ),
            }
        }
        all
    }

    /// Call a tool on one server.
    ///
    /// Unknown and disconnected servers both yield a "not connected" failure,
    /// worded differently.
    pub async fn call_tool(
        &self,
        server_id: &str,
        params: CallToolParams,
    ) -> OperationResult<CallToolResult> {
        let started = Instant::now();
        let Some(client) = self.client(server_id) else {
            let mut result = OperationResult::failure(format!(
                "Server '{server_id}' is not connected: no server with that id is registered"
            ));
            result.duration_ms = Some(0);
            return result;
        };
        if !client.is_ready() {
            let mut result = OperationResult::failure(format!(
                "Server '{server_id}' is not connected (state: {})",
                client.connection_state()
            ));
            result.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(0));
            return result;
        }
        client.call_tool(&params.name, params.arguments).await
    }

    /// Ready servers whose cached tool list offers `tool_name`, sorted.
    pub fn find_servers_with_tool(&self, tool_name: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .all_clients()
            .into_iter()
            .filter(|(_, client)| client.has_tool(tool_name))
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Aggregate every client's counters.
    pub fn statistics(&self) -> ManagerStatistics {
        let mut totals = ManagerStatistics {
            total_servers: 0,
            connected_servers: 0,
            total_requests: 0,
            failed_requests: 0,
            tool_calls: 0,
            resource_reads: 0,
            prompt_gets: 0,
            reconnections: 0,
            servers: BTreeMap::new(),
        };

        for (id, client) in self.snapshot() {
            let stats = client.statistics();
            let state = client.connection_state();
            totals.total_servers += 1;
            if state == ConnectionState::Ready {
                totals.connected_servers += 1;
            }
            totals.total_requests += stats.total_requests;
            totals.failed_requests += stats.failed_requests;
            totals.tool_calls += stats.tool_calls;
            totals.resource_reads += stats.resource_reads;
            totals.prompt_gets += stats.prompt_gets;
            totals.reconnections += stats.reconnections;
            totals.servers.insert(
                id,
                ServerStatistics {
                    state,
                    tool_count: client.cached_tools().map_or(0, |t| t.len()),
                    stats,
                },
            );
        }
        totals
    }

    /// Disconnect and drop every server; later registrations and connects
    /// fail with [`TetherError::Disposed`].
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let registrations: Vec<Registration> =
            self.servers.write().drain().map(|(_, r)| r).collect();
        let count = registrations.len();
        join_all(registrations.iter().map(|r| {
            r.client.unsubscribe_all();
            r.client.shutdown()
        }))
        .await;
        info!(servers = count, "MCP manager disposed");
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONNECTIONS)
    }
}

static GLOBAL_MANAGER: Mutex<Option<Arc<McpManager>>> = parking_lot::const_mutex(None);

/// Process-wide manager, created on first use with default capacity.
///
/// Prefer constructing an [`McpManager`] explicitly; this exists for callers
/// that cannot thread one through.
pub fn global_manager() -> Arc<McpManager> {
    Arc::clone(
        GLOBAL_MANAGER
            .lock()
            .get_or_insert_with(|| Arc::new(McpManager::default())),
    )
}

/// Dispose the process-wide manager so the next [`global_manager`] call
/// starts fresh.
pub async fn reset_global_manager() {
    let previous = GLOBAL_MANAGER.lock().take();
    if let Some(manager) = previous {
        manager.dispose().await;
    }
}
