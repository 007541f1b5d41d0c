use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tether_core::{TetherError, TetherResult};

/// Which concrete transport a configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process over stdin/stdout.
    Stdio,
    /// WebSocket text frames.
    WebSocket,
    /// HTTP POST plus a Server-Sent Events stream.
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransportKind::Stdio => "stdio",
            TransportKind::WebSocket => "websocket",
            TransportKind::Http => "http",
        })
    }
}

/// Transport configuration, tagged by `type`.
///
/// ```toml
/// type = "stdio"
/// command = "mcp-server-sqlite"
/// args = ["--db", "test.db"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Spawn a child process.
    Stdio(StdioConfig),
    /// Connect to a WebSocket endpoint.
    #[serde(alias = "ws")]
    WebSocket(WebSocketConfig),
    /// Talk to an HTTP endpoint.
    Http(HttpConfig),
}

/// Configuration for the stdio transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioConfig {
    /// Program to spawn.
    pub command: String,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory of the child.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Upper bound for `connect()` (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Upper bound for each request (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Headers sent with the upgrade request (auth tokens, ...).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Reconnect after an unexpected close (default: true).
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Delay before the first reconnection attempt; doubles per attempt (default: 1000).
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Attempts before giving up (default: 5).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Require `wss://`.
    #[serde(default)]
    pub secure: bool,
    /// Upper bound for `connect()` and each reconnection attempt (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Upper bound for each request (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Configuration for the HTTP+SSE transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Endpoint receiving JSON-RPC POSTs.
    pub url: String,
    /// Server-Sent Events endpoint for server-to-client messages.
    #[serde(default)]
    pub events_url: Option<String>,
    /// Headers sent with every request (auth tokens, ...).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Require `https://`.
    #[serde(default)]
    pub secure: bool,
    /// Upper bound for the liveness ping in `connect()` (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Upper bound for each request (default: 30000).
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_reconnect_interval_ms() -> u64 {
    1_000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}

impl StdioConfig {
    /// Configuration for `command` with default timeouts.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            connection_timeout_ms: default_timeout_ms(),
            request_timeout_ms: default_timeout_ms(),
        }
    }

    /// Append one argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }
}

impl WebSocketConfig {
    /// Configuration for `url` with default reconnection policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            auto_reconnect: default_true(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            secure: false,
            connection_timeout_ms: default_timeout_ms(),
            request_timeout_ms: default_timeout_ms(),
        }
    }

    /// Add a header to the upgrade request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Configure reconnection.
    pub fn with_reconnect(mut self, enabled: bool, interval: Duration, max_attempts: u32) -> Self {
        self.auto_reconnect = enabled;
        self.reconnect_interval_ms = duration_ms(interval);
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Override the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }
}

impl HttpConfig {
    /// Configuration for `url` without an event stream.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            events_url: None,
            headers: HashMap::new(),
            secure: false,
            connection_timeout_ms: default_timeout_ms(),
            request_timeout_ms: default_timeout_ms(),
        }
    }

    /// Open a Server-Sent Events stream at `url` on connect.
    pub fn with_events_url(mut self, url: impl Into<String>) -> Self {
        self.events_url = Some(url.into());
        self
    }

    /// Add a header to every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }
}

impl TransportConfig {
    /// The transport this configuration selects.
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Stdio(_) => TransportKind::Stdio,
            TransportConfig::WebSocket(_) => TransportKind::WebSocket,
            TransportConfig::Http(_) => TransportKind::Http,
        }
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(match self {
            TransportConfig::Stdio(c) => c.request_timeout_ms,
            TransportConfig::WebSocket(c) => c.request_timeout_ms,
            TransportConfig::Http(c) => c.request_timeout_ms,
        })
    }

    /// Connection timeout.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(match self {
            TransportConfig::Stdio(c) => c.connection_timeout_ms,
            TransportConfig::WebSocket(c) => c.connection_timeout_ms,
            TransportConfig::Http(c) => c.connection_timeout_ms,
        })
    }

    /// Short human readable endpoint (command or URL), used in logs.
    pub fn endpoint(&self) -> &str {
        match self {
            TransportConfig::Stdio(c) => &c.command,
            TransportConfig::WebSocket(c) => &c.url,
            TransportConfig::Http(c) => &c.url,
        }
    }

    /// Check the transport-specific required fields.
    pub fn validate(&self) -> TetherResult<()> {
        if self.request_timeout().is_zero() || self.connection_timeout().is_zero() {
            return Err(TetherError::Config("timeouts must be greater than zero".into()));
        }
        match self {
            TransportConfig::Stdio(c) => {
                if c.command.trim().is_empty() {
                    return Err(TetherError::Config("stdio transport requires a command".into()));
                }
            }
            TransportConfig::WebSocket(c) => {
                check_url(&c.url, "ws://", "wss://", c.secure)?;
            }
            TransportConfig::Http(c) => {
                check_url(&c.url, "http://", "https://", c.secure)?;
                if let Some(events) = &c.events_url {
                    check_url(events, "http://", "https://", c.secure)?;
                }
            }
        }
        Ok(())
    }
}

fn check_url(url: &str, plain: &str, tls: &str, secure: bool) -> TetherResult<()> {
    if url.trim().is_empty() {
        return Err(TetherError::Config("transport requires a url".into()));
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with(tls) {
        return Ok(());
    }
    if lower.starts_with(plain) {
        if secure {
            return Err(TetherError::Config(format!(
                "secure transport requires a {tls} url, got '{url}'"
            )));
        }
        return Ok(());
    }
    Err(TetherError::Config(format!(
        "url '{url}' must start with {plain} or {tls}"
    )))
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
