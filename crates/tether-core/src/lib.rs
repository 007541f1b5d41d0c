//! Core types shared across the tether crates.
//!
//! # Main types
//!
//! - [`TetherError`]: Unified error enum for codec, transports, client and manager.
//! - [`TetherResult`]: Convenience alias for `Result<T, TetherError>`.
//! - [`Listeners`]: Multi-subscriber callback list used for transport and client events.

mod error;
mod listeners;

pub use error::{TetherError, TetherResult};
pub use listeners::{ListenerId, Listeners};
