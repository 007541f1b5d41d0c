use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters kept per client.
///
/// Counters only grow until [`reset`](Self::reset); a reconnect keeps them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatistics {
    /// Requests sent, handshake included.
    pub total_requests: u64,
    /// Requests that failed (timeout, transport error, RPC error, bad result).
    pub failed_requests: u64,
    /// `call_tool` invocations, whether or not they succeeded.
    pub tool_calls: u64,
    /// `read_resource` invocations.
    pub resource_reads: u64,
    /// `get_prompt` invocations.
    pub prompt_gets: u64,
    /// Successful transport reconnections.
    pub reconnections: u64,
    /// Anchor for [`uptime`](Self::uptime).
    pub since: DateTime<Utc>,
    /// Last time a request was sent or a message arrived.
    pub last_activity: Option<DateTime<Utc>>,
}

impl ClientStatistics {
    pub(crate) fn new() -> Self {
        Self {
            total_requests: 0,
            failed_requests: 0,
            tool_calls: 0,
            resource_reads: 0,
            prompt_gets: 0,
            reconnections: 0,
            since: Utc::now(),
            last_activity: None,
        }
    }

    /// Time elapsed since creation or the last reset.
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.since
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }

    pub(crate) fn record_request(&mut self) {
        self.total_requests += 1;
        self.touch();
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed_requests += 1;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Operation counted on top of the request totals.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    ToolCall,
    ResourceRead,
    PromptGet,
}

impl ClientStatistics {
    pub(crate) fn bump(&mut self, counter: Counter) {
        match counter {
            Counter::ToolCall => self.tool_calls += 1,
            Counter::ResourceRead => self.resource_reads += 1,
            Counter::PromptGet => self.prompt_gets += 1,
        }
    }
}
