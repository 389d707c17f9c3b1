//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns a client-side transport and a
//! [`MemoryServer`] handle that sees every message the client sends and can
//! reply, notify, or hang up. Useful for tests and for embedding a server in
//! the same process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Inbox, Transport, TransportKind, not_connected};
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, RequestId};

struct Shared {
    inbox: Inbox,
    connected: AtomicBool,
    server_alive: AtomicBool,
    connects: AtomicU32,
    fail_connects: AtomicU32,
}

/// Client side of an in-process connection.
pub struct MemoryTransport {
    shared: Arc<Shared>,
    to_server: mpsc::UnboundedSender<JsonRpcRequest>,
}

/// Server side of an in-process connection.
pub struct MemoryServer {
    shared: Arc<Shared>,
    from_client: tokio::sync::Mutex<mpsc::UnboundedReceiver<JsonRpcRequest>>,
}

impl MemoryTransport {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            inbox: Inbox::new(),
            connected: AtomicBool::new(false),
            server_alive: AtomicBool::new(true),
            connects: AtomicU32::new(0),
            fail_connects: AtomicU32::new(0),
        });
        (
            Self {
                shared: Arc::clone(&shared),
                to_server: tx,
            },
            MemoryServer {
                shared,
                from_client: tokio::sync::Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<()> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .shared
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(McpError::transport("connection refused"));
        }
        if !self.shared.server_alive.load(Ordering::SeqCst) {
            return Err(McpError::transport("in-memory server has shut down"));
        }
        self.shared.inbox.reopen().await;
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: &JsonRpcRequest) -> Result<()> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(not_connected(TransportKind::Memory));
        }
        self.to_server
            .send(message.clone())
            .map_err(|_| McpError::ConnectionClosed)
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        self.shared.inbox.recv().await
    }

    async fn close(&self) -> Result<()> {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.inbox.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }
}

impl MemoryServer {
    /// Next message from the client; `None` once the client transport is dropped.
    pub async fn recv(&self) -> Option<JsonRpcRequest> {
        self.from_client.lock().await.recv().await
    }

    /// Deliver any message to the client.
    pub fn send(&self, message: JsonRpcMessage) -> bool {
        self.shared.inbox.push(message)
    }

    /// Reply to a request with a result.
    pub fn respond(&self, id: RequestId, result: Value) -> bool {
        self.send(JsonRpcMessage::response(id, result))
    }

    /// Reply to a request with an error.
    pub fn respond_error(&self, id: RequestId, code: i64, message: impl Into<String>) -> bool {
        self.send(JsonRpcMessage::error_response(
            id,
            JsonRpcError::new(code, message),
        ))
    }

    /// Send a notification to the client.
    pub fn notify(&self, method: impl Into<String>, params: Option<Value>) -> bool {
        self.send(JsonRpcMessage::notification(method, params))
    }

    /// Drop the connection from the server side. Queued messages are still
    /// delivered; later connects fail.
    pub fn hang_up(&self) {
        self.shared.server_alive.store(false, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.inbox.finish();
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_connects(&self, n: u32) {
        self.shared.fail_connects.store(n, Ordering::SeqCst);
    }

    /// How many times the client has called connect.
    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Whether the client side is currently connected.
    pub fn client_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryServer {
    fn drop(&mut self) {
        self.hang_up();
    }
}
