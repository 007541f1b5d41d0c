//! Table of requests waiting for their response.
//!
//! Three paths race to settle an entry: the matching response, the request
//! timeout, and the channel closing. Each of them starts by removing the
//! entry from the table; whichever removes it settles it, the others find
//! nothing to do.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tether_core::{TetherError, TetherResult};
use tether_protocol::JsonRpcResponse;
use tokio::sync::oneshot;

type Settle = oneshot::Sender<TetherResult<JsonRpcResponse>>;

/// Outstanding requests of one transport, keyed by request id.
#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: Mutex<HashMap<u64, Settle>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the handle its caller waits on.
    ///
    /// Dropping the handle removes the entry, so an abandoned caller never
    /// leaves it behind.
    pub(crate) fn register(&self, id: u64) -> PendingWaiter<'_> {
        let (tx, rx) = oneshot::channel();
        if self.entries.lock().insert(id, tx).is_some() {
            tracing::warn!(id, "Request id reused while still pending");
        }
        PendingWaiter {
            table: self,
            id,
            rx: Some(rx),
        }
    }

    /// Deliver a response to its waiter.
    ///
    /// Returns the response back when no request with that id is pending
    /// (already timed out, or never issued).
    pub(crate) fn resolve(&self, response: JsonRpcResponse) -> Result<(), JsonRpcResponse> {
        let Some(id) = response.id else {
            return Err(response);
        };
        let Some(tx) = self.entries.lock().remove(&id) else {
            return Err(response);
        };
        // The waiter may have been dropped between removal and send.
        let _ = tx.send(Ok(response));
        Ok(())
    }

    /// Remove an entry without settling it.
    pub(crate) fn cancel(&self, id: u64) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Fail every pending request; returns how many were failed.
    pub(crate) fn fail_all(&self, make_error: impl Fn() -> TetherError) -> usize {
        let drained: Vec<Settle> = self.entries.lock().drain().map(|(_, tx)| tx).collect();
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Err(make_error()));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// A registered request whose response has not been awaited yet.
pub(crate) struct PendingWaiter<'a> {
    table: &'a PendingRequests,
    id: u64,
    rx: Option<oneshot::Receiver<TetherResult<JsonRpcResponse>>>,
}

impl PendingWaiter<'_> {
    /// Wait for the response, failing after `timeout`.
    pub(crate) async fn wait(mut self, timeout: Duration) -> TetherResult<JsonRpcResponse> {
        let Some(rx) = self.rx.take() else {
            return Err(TetherError::Disconnected);
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TetherError::Disconnected),
            Err(_) => {
                self.table.cancel(self.id);
                Err(TetherError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl Drop for PendingWaiter<'_> {
    fn drop(&mut self) {
        self.table.cancel(self.id);
    }
}
