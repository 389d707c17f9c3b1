//! Transport layer for MCP communication.
//!
//! A [`Transport`] moves JSON-RPC messages to and from one server and owns no
//! protocol semantics. Implementations:
//!
//! - [`StdioTransport`]: a subprocess speaking Content-Length framed JSON
//! - [`HttpTransport`]: one POST per message, replies read from the response
//! - [`SseTransport`]: a Server-Sent-Events stream for replies, POSTs for requests
//! - [`MemoryTransport`]: an in-process pair, for tests and embedding
//!
//! Inbound messages from every transport land in an [`Inbox`], a FIFO queue
//! with a single consumer (the client's receive loop).

mod http;
mod memory;
mod sse;
mod stdio;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::config::{McpServerConfig, TransportType};
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcMessage, JsonRpcRequest};

pub use http::{HttpTransport, HttpTransportConfig};
pub use memory::{MemoryServer, MemoryTransport};
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// Which kind of transport a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Subprocess over stdin/stdout.
    Stdio,
    /// HTTP request/response.
    Http,
    /// Server-Sent-Events push stream.
    Sse,
    /// In-process channel pair.
    Memory,
}

impl TransportKind {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moves messages between the client and one server.
///
/// Methods take `&self` so that the receive loop and concurrent senders can
/// share one transport behind an `Arc`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish reachability. Calling it again after [`close`](Self::close)
    /// starts a fresh connection.
    async fn connect(&self) -> Result<()>;

    /// Write one message.
    async fn send(&self, message: &JsonRpcRequest) -> Result<()>;

    /// Wait for the next inbound message; `None` once the transport has closed.
    async fn receive(&self) -> Option<JsonRpcMessage>;

    /// Release the connection. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Non-blocking liveness check.
    fn is_connected(&self) -> bool;

    /// Transport kind, for status reporting.
    fn kind(&self) -> TransportKind;
}

/// Build an unconnected transport for a server configuration.
pub fn for_config(config: &McpServerConfig) -> Result<Arc<dyn Transport>> {
    match config.transport {
        TransportType::Stdio => Ok(Arc::new(StdioTransport::new(
            &config.command,
            config.args.clone(),
            config.env.clone(),
        ))),
        TransportType::Http => Ok(Arc::new(HttpTransport::new(config.http_config()?)?)),
        TransportType::Sse => Ok(Arc::new(SseTransport::new(config.http_config()?)?)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbox
// ─────────────────────────────────────────────────────────────────────────────

/// FIFO queue of inbound messages.
///
/// Producers (reader tasks, the SSE thread, HTTP response handling) push
/// through a sender; the single consumer awaits [`recv`](Inbox::recv).
/// [`finish`](Inbox::finish) ends the stream once queued messages are
/// drained; [`close`](Inbox::close) ends it immediately. [`reopen`](Inbox::reopen)
/// swaps in a fresh channel, so producers left over from an earlier
/// connection write into a queue nobody reads.
#[derive(Debug)]
pub struct Inbox {
    tx: Mutex<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcMessage>>,
    closed: watch::Sender<bool>,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Inbox {
    /// Create an inbox in the closed state.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);
        Self {
            tx: Mutex::new(None),
            rx: tokio::sync::Mutex::new(rx),
            closed: watch::Sender::new(true),
        }
    }

    /// Start a fresh queue, discarding anything left from a previous connection.
    pub async fn reopen(&self) {
        // Wake any consumer still parked on the old queue so its lock is released.
        self.close();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.rx.lock().await = rx;
        *self.tx.lock() = Some(tx);
        self.closed.send_replace(false);
    }

    /// A sender for a producer task. `None` when the inbox is closed.
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<JsonRpcMessage>> {
        self.tx.lock().clone()
    }

    /// Enqueue a message. Returns `false` if the inbox is closed.
    pub fn push(&self, message: JsonRpcMessage) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Stop accepting messages; `recv` returns `None` once the queue drains
    /// and every producer's sender is gone.
    pub fn finish(&self) {
        self.tx.lock().take();
    }

    /// Stop immediately; pending and future `recv` calls return `None`.
    pub fn close(&self) {
        self.tx.lock().take();
        self.closed.send_replace(true);
    }

    /// Whether [`close`](Inbox::close) has been called since the last reopen.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait for the next message.
    pub async fn recv(&self) -> Option<JsonRpcMessage> {
        let closed = self.closed.subscribe();
        if *closed.borrow() {
            return None;
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            message = rx.recv() => message,
            _ = wait_closed(closed) => None,
        }
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reader lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Counts a transport's connections, so that a reader task left over from an
/// earlier connection cannot tear down the current one.
#[derive(Debug, Default)]
pub(crate) struct Epoch(Mutex<u64>);

impl Epoch {
    pub(crate) fn current(&self) -> u64 {
        *self.0.lock()
    }

    /// Retire the current connection's readers.
    pub(crate) fn advance(&self) {
        *self.0.lock() += 1;
    }

    /// Run `f` while `epoch` is still the current connection.
    pub(crate) fn if_current(&self, epoch: u64, f: impl FnOnce()) {
        let current = self.0.lock();
        if *current == epoch {
            f();
        }
    }
}

/// Held by a reader task. When the task ends, whether it returns, panics or
/// is aborted, the connection it served is marked dead and its inbox drained
/// to a close, unless a newer connection has taken over.
pub(crate) struct ReaderExit {
    alive: Arc<AtomicBool>,
    inbox: Arc<Inbox>,
    epoch: Arc<Epoch>,
    spawned_in: u64,
}

impl ReaderExit {
    pub(crate) fn new(alive: &Arc<AtomicBool>, inbox: &Arc<Inbox>, epoch: &Arc<Epoch>) -> Self {
        Self {
            alive: Arc::clone(alive),
            inbox: Arc::clone(inbox),
            epoch: Arc::clone(epoch),
            spawned_in: epoch.current(),
        }
    }
}

impl Drop for ReaderExit {
    fn drop(&mut self) {
        self.epoch.if_current(self.spawned_in, || {
            self.alive.store(false, Ordering::SeqCst);
            self.inbox.finish();
        });
    }
}

/// Fail a send on a transport that was never connected or has been closed.
pub(crate) fn not_connected(kind: TransportKind) -> McpError {
    McpError::transport(format!("{kind} transport is not connected"))
}
