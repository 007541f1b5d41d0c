use thiserror::Error;

/// A convenience `Result` alias using [`TetherError`].
pub type TetherResult<T> = Result<T, TetherError>;

/// Top-level error type for the tether framework.
///
/// Variants fall into three groups: channel failures (`Transport`, `Http`,
/// `Disconnected`, `NotConnected`, `Io`), single-call failures (`Rpc`,
/// `Timeout`, `Protocol`, `NotFound`, `Json`) and caller mistakes (`Config`,
/// `AlreadyConnected`, `DuplicateServer`, `CapacityExceeded`,
/// `NotRegistered`, `Disposed`).
#[derive(Error, Debug)]
pub enum TetherError {
    /// A frame or message that violates JSON-RPC 2.0.
    #[error("Protocol error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code (`PARSE_ERROR`, `INVALID_REQUEST`, ...).
        code: i64,
        /// Human readable description.
        message: String,
    },

    /// The server answered with a JSON-RPC `error` object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Error code reported by the server.
        code: i64,
        /// Error message reported by the server.
        message: String,
    },

    /// No response arrived within the configured request timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The channel closed while the request was outstanding.
    #[error("Transport disconnected while request was pending")]
    Disconnected,

    /// An operation was attempted on a closed channel.
    #[error("Transport is not connected")]
    NotConnected,

    /// `connect()` was called on an open channel.
    #[error("Transport is already connected")]
    AlreadyConnected,

    /// A failure of the underlying channel (spawn, socket, stream).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A failed or non-2xx HTTP exchange.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A server id was registered twice.
    #[error("Server '{0}' is already registered")]
    DuplicateServer(String),

    /// Registering another server would exceed the connection budget.
    #[error("Cannot register server: maximum of {max} concurrent connections reached")]
    CapacityExceeded {
        /// The configured maximum.
        max: usize,
    },

    /// The server id is unknown to the manager.
    #[error("Server '{0}' is not registered")]
    NotRegistered(String),

    /// A named item (tool, prompt, ...) does not exist on the server.
    #[error("{0} not found")]
    NotFound(String),

    /// The manager was disposed.
    #[error("Manager has been disposed")]
    Disposed,

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TetherError {
    /// Whether the error invalidates the whole channel rather than one call.
    pub fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            TetherError::Transport(_)
                | TetherError::Http(_)
                | TetherError::Disconnected
                | TetherError::NotConnected
                | TetherError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_duration() {
        let err = TetherError::Timeout { timeout_ms: 250 };
        assert_eq!(err.to_string(), "Request timed out after 250ms");
    }

    #[test]
    fn test_channel_failure_classification() {
        assert!(TetherError::Disconnected.is_channel_failure());
        assert!(TetherError::Transport("boom".into()).is_channel_failure());
        assert!(!TetherError::Timeout { timeout_ms: 1 }.is_channel_failure());
        assert!(!TetherError::Rpc {
            code: -32601,
            message: "nope".into()
        }
        .is_channel_failure());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: TetherError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
