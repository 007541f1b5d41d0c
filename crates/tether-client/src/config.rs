use serde::{Deserialize, Serialize};
use std::path::Path;
use tether_core::{TetherError, TetherResult};
use tether_protocol::PROTOCOL_VERSION;
use tether_transport::TransportConfig;

/// Manager configuration, usually loaded from TOML.
///
/// ```toml
/// max_connections = 4
///
/// [[servers]]
/// id = "files"
/// [servers.transport]
/// type = "stdio"
/// command = "mcp-server-filesystem"
/// args = ["/tmp"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of registered servers (default: 10).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Servers registered by [`McpManager::from_config`](crate::McpManager::from_config).
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// One server entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique id within the manager.
    pub id: String,
    /// How to reach the server.
    pub transport: TransportConfig,
    /// Handshake options.
    #[serde(default)]
    pub client: ClientOptions,
}

/// What the client advertises during `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Client name sent as `clientInfo.name` (default: "tether").
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Client version sent as `clientInfo.version`.
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Protocol version requested.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

/// Default for [`ManagerConfig::max_connections`].
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}
fn default_client_name() -> String {
    "tether".to_string()
}
fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_string()
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_version: default_client_version(),
            protocol_version: default_protocol_version(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            servers: Vec::new(),
        }
    }
}

impl ManagerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> TetherResult<Self> {
        toml::from_str(s).map_err(|e| TetherError::Config(format!("Invalid manager config: {e}")))
    }

    /// Load and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> TetherResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TetherError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

impl ServerConfig {
    /// A server entry with default client options.
    pub fn new(id: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            id: id.into(),
            transport,
            client: ClientOptions::default(),
        }
    }

    /// Check the id and the transport fields.
    pub fn validate(&self) -> TetherResult<()> {
        if self.id.trim().is_empty() {
            return Err(TetherError::Config("server id must not be empty".into()));
        }
        self.transport.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tether_transport::TransportKind;

    #[test]
    fn test_parse_full_config() {
        let config = ManagerConfig::from_toml_str(
            r#"
            max_connections = 3

            [[servers]]
            id = "files"
            [servers.transport]
            type = "stdio"
            command = "mcp-files"
            args = ["/tmp"]

            [[servers]]
            id = "remote"
            [servers.transport]
            type = "websocket"
            url = "wss://mcp.example.com/ws"
            secure = true
            max_reconnect_attempts = 3
            [servers.client]
            client_name = "orchestrator"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_connections, 3);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].transport.kind(), TransportKind::Stdio);
        assert_eq!(config.servers[0].client, ClientOptions::default());
        assert_eq!(config.servers[1].transport.kind(), TransportKind::WebSocket);
        assert_eq!(config.servers[1].client.client_name, "orchestrator");
        assert_eq!(config.servers[1].client.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::from_toml_str("").unwrap();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ManagerConfig::from_toml_str("servers = 5").unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ManagerConfig::from_file("/nonexistent/tether.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tether.toml"));
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let server = ServerConfig::new(
            "  ",
            TransportConfig::Stdio(tether_transport::StdioConfig::new("cat")),
        );
        assert!(matches!(server.validate(), Err(TetherError::Config(_))));
    }
}
