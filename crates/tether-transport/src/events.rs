use tether_core::{ListenerId, Listeners};
use tether_protocol::JsonRpcMessage;

/// Why a transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Human readable reason.
    pub reason: String,
    /// `true` when the close came from `disconnect()`.
    pub initiated_by_user: bool,
}

/// A WebSocket transport re-established its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectEvent {
    /// Which attempt succeeded (1-based).
    pub attempt: u32,
}

/// Listener lists fed by a transport's read loop.
///
/// Messages are everything that is not a response to a pending request:
/// notifications, server-initiated requests, and responses nobody waits
/// for anymore.
#[derive(Debug, Default)]
pub struct TransportEvents {
    pub(crate) messages: Listeners<JsonRpcMessage>,
    pub(crate) errors: Listeners<String>,
    pub(crate) closes: Listeners<CloseEvent>,
    pub(crate) reconnects: Listeners<ReconnectEvent>,
}

impl TransportEvents {
    /// Listen for inbound messages.
    pub fn on_message(&self, f: impl Fn(&JsonRpcMessage) + Send + Sync + 'static) -> ListenerId {
        self.messages.add(f)
    }

    /// Listen for non-fatal errors (bad frames, failed reconnection attempts, ...).
    pub fn on_error(&self, f: impl Fn(&String) + Send + Sync + 'static) -> ListenerId {
        self.errors.add(f)
    }

    /// Listen for the channel closing for good.
    pub fn on_close(&self, f: impl Fn(&CloseEvent) + Send + Sync + 'static) -> ListenerId {
        self.closes.add(f)
    }

    /// Listen for successful reconnections.
    pub fn on_reconnect(&self, f: impl Fn(&ReconnectEvent) + Send + Sync + 'static) -> ListenerId {
        self.reconnects.add(f)
    }

    /// Remove a listener from whichever list holds it.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.messages.remove(id)
            || self.errors.remove(id)
            || self.closes.remove(id)
            || self.reconnects.remove(id)
    }
}
