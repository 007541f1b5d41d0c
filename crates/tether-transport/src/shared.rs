use crate::events::{CloseEvent, ReconnectEvent, TransportEvents};
use crate::pending::PendingRequests;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tether_core::{TetherError, TetherResult};
use tether_protocol::{decode_body, Decoded, JsonRpcMessage, JsonRpcResponse};
use tracing::{debug, warn};

/// State every transport keeps regardless of its channel: the open flag,
/// the pending table and the listener lists.
pub(crate) struct TransportShared {
    label: String,
    open: AtomicBool,
    pub(crate) pending: PendingRequests,
    pub(crate) events: TransportEvents,
}

impl TransportShared {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            open: AtomicBool::new(false),
            pending: PendingRequests::new(),
            events: TransportEvents::default(),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Clear the open flag and fail every pending request.
    ///
    /// Returns `false` if the channel was already closed, so concurrent
    /// close paths tear down exactly once.
    pub(crate) fn teardown(&self) -> bool {
        if !self.open.swap(false, Ordering::SeqCst) {
            return false;
        }
        let failed = self.pending.fail_all(|| TetherError::Disconnected);
        if failed > 0 {
            debug!(transport = %self.label, failed, "Failed pending requests on close");
        }
        true
    }

    /// Register `id`, run `write`, then wait for the response.
    pub(crate) async fn round_trip<W>(
        &self,
        id: u64,
        timeout: Duration,
        write: W,
    ) -> TetherResult<JsonRpcResponse>
    where
        W: Future<Output = TetherResult<()>>,
    {
        let waiter = self.pending.register(id);
        // A close between the caller's check and registration would miss this entry.
        if !self.is_open() {
            return Err(TetherError::NotConnected);
        }
        write.await?;
        waiter.wait(timeout).await
    }

    /// Route one inbound message.
    pub(crate) fn dispatch(&self, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Response(response) => {
                if let Err(unmatched) = self.pending.resolve(response) {
                    debug!(
                        transport = %self.label,
                        id = ?unmatched.id,
                        "Response for unknown or expired request"
                    );
                    self.events
                        .messages
                        .emit(&JsonRpcMessage::Response(unmatched));
                }
            }
            other => self.events.messages.emit(&other),
        }
    }

    pub(crate) fn dispatch_decoded(&self, decoded: Decoded) {
        for err in decoded.errors {
            self.report_error(err);
        }
        for message in decoded.messages {
            self.dispatch(message);
        }
    }

    /// Decode and route one un-framed JSON body.
    pub(crate) fn dispatch_body(&self, body: &[u8]) {
        match decode_body(body) {
            Ok(message) => self.dispatch(message),
            Err(e) => self.report_error(e),
        }
    }

    pub(crate) fn report_error(&self, error: impl std::fmt::Display) {
        let message = error.to_string();
        warn!(transport = %self.label, error = %message, "Transport error");
        self.events.errors.emit(&message);
    }

    pub(crate) fn emit_close(&self, reason: impl Into<String>, initiated_by_user: bool) {
        self.events.closes.emit(&CloseEvent {
            reason: reason.into(),
            initiated_by_user,
        });
    }

    pub(crate) fn emit_reconnect(&self, attempt: u32) {
        self.events.reconnects.emit(&ReconnectEvent { attempt });
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }
}
