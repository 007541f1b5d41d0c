//! Stdio transport: spawns an MCP server subprocess and exchanges
//! `Content-Length` framed JSON-RPC messages over its stdin/stdout.

use crate::config::StdioConfig;
use crate::events::TransportEvents;
use crate::shared::TransportShared;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{TetherError, TetherResult};
use tether_protocol::{
    encode_frame, FrameDecoder, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const READ_CHUNK: usize = 8 * 1024;

/// Transport over a child process's standard streams.
pub struct StdioTransport {
    config: StdioConfig,
    shared: Arc<TransportShared>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: Arc<Mutex<Option<Child>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Create a transport for `config`; nothing is spawned until [`connect`](Self::connect).
    pub fn new(config: StdioConfig) -> Self {
        let shared = Arc::new(TransportShared::new(format!("stdio:{}", config.command)));
        Self {
            config,
            shared,
            stdin: tokio::sync::Mutex::new(None),
            child: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the server process.
    pub async fn connect(&self) -> TetherResult<()> {
        if self.shared.is_open() {
            return Err(TetherError::AlreadyConnected);
        }

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            TetherError::Transport(format!(
                "Failed to spawn MCP server '{}': {e}",
                self.config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TetherError::Transport("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TetherError::Transport("MCP server stdout not available".into()))?;
        let stderr = child.stderr.take();
        let pid = child.id();

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock() = Some(child);
        self.shared.mark_open();

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(read_loop(
            stdout,
            Arc::clone(&self.shared),
            Arc::clone(&self.child),
        )));
        if let Some(stderr) = stderr {
            let label = self.shared.label().to_string();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(transport = %label, line = %line, "MCP server stderr");
                }
            }));
        }

        info!(command = %self.config.command, pid = ?pid, "MCP server process started");
        Ok(())
    }

    /// Kill the process and fail every pending request. No-op when not running.
    pub async fn disconnect(&self) -> TetherResult<()> {
        if !self.shared.teardown() {
            return Ok(());
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        // Closing stdin lets well-behaved servers exit on their own.
        self.stdin.lock().await.take();

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => debug!(command = %self.config.command, %status, "MCP server exited"),
                Ok(Err(e)) => error!(command = %self.config.command, error = %e, "Failed to reap MCP server"),
                Err(_) => error!(command = %self.config.command, "MCP server did not exit after kill"),
            }
        }

        self.shared.emit_close("disconnected by client", true);
        Ok(())
    }

    /// Send a request and wait for its response.
    pub async fn send_request(&self, request: JsonRpcRequest) -> TetherResult<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(TetherError::NotConnected);
        }
        let id = request.id;
        let frame = encode_frame(&JsonRpcMessage::Request(request))?;
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        self.shared
            .round_trip(id, timeout, self.write_frame(&frame))
            .await
    }

    /// Send a notification.
    pub async fn send_notification(&self, notification: JsonRpcNotification) -> TetherResult<()> {
        if !self.is_connected() {
            return Err(TetherError::NotConnected);
        }
        let frame = encode_frame(&JsonRpcMessage::Notification(notification))?;
        self.write_frame(&frame).await
    }

    /// Open flag set and the child has not exited.
    pub fn is_connected(&self) -> bool {
        if !self.shared.is_open() {
            return false;
        }
        self.child
            .lock()
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Listener lists of this transport.
    pub fn events(&self) -> &TransportEvents {
        &self.shared.events
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    async fn write_frame(&self, frame: &[u8]) -> TetherResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TetherError::NotConnected)?;
        stdin
            .write_all(frame)
            .await
            .map_err(|e| TetherError::Transport(format!("Failed to write to MCP stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| TetherError::Transport(format!("Failed to flush MCP stdin: {e}")))
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

async fn read_loop(
    mut stdout: ChildStdout,
    shared: Arc<TransportShared>,
    child: Arc<Mutex<Option<Child>>>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK];

    let reason = loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break "MCP server closed stdout".to_string(),
            Ok(n) => shared.dispatch_decoded(decoder.push(&buf[..n])),
            Err(e) => {
                shared.report_error(format!("Error reading MCP server stdout: {e}"));
                break format!("stdout read error: {e}");
            }
        }
    };

    let status = child
        .lock()
        .as_mut()
        .and_then(|c| c.try_wait().ok().flatten());
    let reason = match status {
        Some(status) => format!("{reason} (process exited with {status})"),
        None => reason,
    };

    if shared.teardown() {
        info!(transport = %shared.label(), reason = %reason, "MCP server connection closed");
        shared.emit_close(reason, false);
    }
}
