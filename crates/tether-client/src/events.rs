//! Connection states and the events a client publishes to its subscribers.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tether_core::{ListenerId, Listeners};
use tether_protocol::JsonRpcNotification;

/// Lifecycle of one server connection.
///
/// A successful connect walks every state in order; any failure drops back
/// to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No channel.
    Disconnected,
    /// Opening the channel.
    Connecting,
    /// Channel open, handshake not started.
    Connected,
    /// `initialize` sent, waiting for the result.
    Initializing,
    /// Handshake done; operations allowed.
    Ready,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Ready => "ready",
        })
    }
}

/// Something that happened on a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The connection state changed.
    StateChanged {
        /// State before the transition.
        previous: ConnectionState,
        /// State after the transition.
        current: ConnectionState,
    },
    /// The server sent a notification.
    Notification(JsonRpcNotification),
    /// A transport or protocol error that did not belong to a single call.
    Error {
        /// Description of the error.
        message: String,
    },
    /// The server announced that its tool list changed; the cached list was dropped.
    ToolsChanged,
    /// A subscribed resource changed on the server.
    ResourceUpdated {
        /// URI of the resource.
        uri: String,
    },
}

impl ClientEvent {
    /// The kind used to filter subscriptions.
    pub fn kind(&self) -> ClientEventKind {
        match self {
            ClientEvent::StateChanged { .. } => ClientEventKind::StateChanged,
            ClientEvent::Notification(_) => ClientEventKind::Notification,
            ClientEvent::Error { .. } => ClientEventKind::Error,
            ClientEvent::ToolsChanged => ClientEventKind::ToolsChanged,
            ClientEvent::ResourceUpdated { .. } => ClientEventKind::ResourceUpdated,
        }
    }
}

/// Event filter for [`McpClient::subscribe`](crate::McpClient::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEventKind {
    /// [`ClientEvent::StateChanged`].
    StateChanged,
    /// [`ClientEvent::Notification`].
    Notification,
    /// [`ClientEvent::Error`].
    Error,
    /// [`ClientEvent::ToolsChanged`].
    ToolsChanged,
    /// [`ClientEvent::ResourceUpdated`].
    ResourceUpdated,
    /// Every event.
    Any,
}

impl ClientEventKind {
    /// Whether `event` passes this filter.
    pub fn matches(self, event: &ClientEvent) -> bool {
        self == ClientEventKind::Any || self == event.kind()
    }
}

/// Handle to one subscription on a client.
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: ListenerId,
    kind: ClientEventKind,
    bus: Weak<Listeners<ClientEvent>>,
}

impl Subscription {
    pub(crate) fn new(
        bus: &Arc<Listeners<ClientEvent>>,
        kind: ClientEventKind,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> Self {
        let id = bus.add(move |event| {
            if kind.matches(event) {
                callback(event);
            }
        });
        Self {
            id,
            kind,
            bus: Arc::downgrade(bus),
        }
    }

    /// The filter this subscription was created with.
    pub fn kind(&self) -> ClientEventKind {
        self.kind
    }

    /// Stop receiving events. Returns `false` if already removed or the
    /// client is gone.
    pub fn unsubscribe(&self) -> bool {
        self.bus.upgrade().is_some_and(|bus| bus.remove(self.id))
    }
}
