//! MCP client for the tether framework.
//!
//! # Main types
//!
//! - [`McpClient`]: one server connection, driven through
//!   `disconnected → connecting → connected → initializing → ready`.
//! - [`McpManager`]: a named set of clients under a connection budget, with
//!   cross-server tool lookup and aggregated statistics.
//! - [`OperationResult`]: success flag, payload, error message and duration
//!   returned by every client operation.
//! - [`ClientEvent`]: state changes, server notifications and errors
//!   delivered to [`Subscription`]s.

pub mod client;
pub mod config;
pub mod events;
pub mod manager;
pub mod stats;

pub use client::{McpClient, OperationResult, ServerInfo};
pub use config::{ClientOptions, ManagerConfig, ServerConfig, DEFAULT_MAX_CONNECTIONS};
pub use events::{ClientEvent, ClientEventKind, ConnectionState, Subscription};
pub use manager::{
    global_manager, reset_global_manager, ManagerStatistics, McpManager, ServerStatistics,
};
pub use stats::ClientStatistics;
