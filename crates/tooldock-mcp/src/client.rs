//! MCP client for communicating with a single MCP server.
//!
//! The client owns one [`Transport`] and is the only reader of its inbound
//! stream. Requests are correlated with replies through a
//! [`PendingRequests`] table, so any number of requests may be outstanding
//! and replies may arrive in any order.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──▶ Handshaking ──▶ Ready
//!      ▲                          │ (retry with backoff)        │
//!      └──────── attempts exhausted / server gone ◀─────────────┤
//!                                                               ▼
//!                                              shutdown() ──▶ Closed
//! ```
//!
//! While `Ready`, a background health check pings the server. Failures only
//! set the degraded flag and are logged.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::McpServerConfig;
use crate::error::{McpError, Result};
use crate::pending::PendingRequests;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcMessage,
    JsonRpcRequest, ListResourcesResult, ListToolsResult, MessageKind, ReadResourceParams,
    ReadResourceResult, ResourceInfo, ServerInfo, ToolInfo,
};
use crate::transport::{self, Transport, TransportKind};

/// Error type notification handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback for a server notification. Receives the notification params.
pub type NotificationHandler =
    Arc<dyn Fn(Option<&Value>) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// Tunables for a client connection.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Connection attempts before giving up.
    pub connect_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
    /// Interval between health checks; `None` disables them.
    pub health_check_interval: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            health_check_interval: Some(Duration::from_secs(60)),
        }
    }
}

impl ClientOptions {
    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set connection attempts and the initial backoff.
    pub fn with_retries(mut self, attempts: u32, initial_backoff: Duration) -> Self {
        self.connect_attempts = attempts.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    /// Set (or disable) the health check interval.
    pub fn with_health_check(mut self, interval: Option<Duration>) -> Self {
        self.health_check_interval = interval;
        self
    }
}

/// Lifecycle state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; `connect()` may be called.
    Disconnected,
    /// Establishing the transport.
    Connecting,
    /// Transport up, `initialize` in flight.
    Handshaking,
    /// Handshake complete; requests are accepted.
    Ready,
    /// Shut down.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

struct ClientInner {
    name: String,
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    pending: Arc<PendingRequests>,
    state: Mutex<ConnectionState>,
    degraded: AtomicBool,
    handlers: RwLock<HashMap<String, Vec<NotificationHandler>>>,
    init: RwLock<Option<InitializeResult>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

/// An MCP client connected to a single MCP server.
pub struct McpClient {
    inner: Arc<ClientInner>,
}

impl McpClient {
    /// Create a client over an existing transport. Nothing happens until
    /// [`connect`](Self::connect).
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                transport,
                options,
                pending: Arc::new(PendingRequests::new()),
                state: Mutex::new(ConnectionState::Disconnected),
                degraded: AtomicBool::new(false),
                handlers: RwLock::new(HashMap::new()),
                init: RwLock::new(None),
                receive_task: Mutex::new(None),
                health_task: Mutex::new(None),
            }),
        }
    }

    /// Create a client for a server configuration, selecting the transport
    /// from the config. A per-server timeout overrides `options`.
    pub fn from_config(config: &McpServerConfig, mut options: ClientOptions) -> Result<Self> {
        let transport = transport::for_config(config)?;
        if let Some(timeout) = config.timeout {
            options.request_timeout = timeout;
        }
        Ok(Self::new(config.name.clone(), transport, options))
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether the last health check failed.
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    /// Whether requests can be sent right now.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready && self.inner.transport.is_connected()
    }

    /// Transport kind in use.
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    /// Get the server info (after the handshake).
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.init.read().as_ref().map(|i| i.server_info.clone())
    }

    /// Full initialize result (after the handshake).
    pub fn initialize_result(&self) -> Option<InitializeResult> {
        self.inner.init.read().clone()
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Register a handler for server notifications with this method.
    ///
    /// Handlers run on the receive loop and must not block. A handler that
    /// fails or panics is logged and does not affect the connection.
    pub fn on_notification<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<&Value>) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .entry(method.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Connect and perform the handshake, retrying with exponential backoff.
    ///
    /// Resources from a failed attempt are released before the next one.
    /// Once every attempt has failed, returns [`McpError::ConnectFailed`].
    pub async fn connect(&self) -> Result<()> {
        if self.state() == ConnectionState::Ready {
            return Ok(());
        }

        let attempts = self.inner.options.connect_attempts.max(1);
        let mut backoff = self.inner.options.initial_backoff;
        let mut last_error = None;

        for attempt in 1..=attempts {
            self.inner.set_state(ConnectionState::Connecting);
            match self.try_connect().await {
                Ok(()) => {
                    self.inner.set_state(ConnectionState::Ready);
                    self.inner.degraded.store(false, Ordering::SeqCst);
                    self.start_health_check();
                    tracing::info!(
                        server = %self.inner.name,
                        transport = %self.inner.transport.kind(),
                        attempt,
                        "MCP server ready"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        server = %self.inner.name,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "connection attempt failed"
                    );
                    self.inner.teardown().await;
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        self.inner.set_state(ConnectionState::Disconnected);
        Err(McpError::ConnectFailed {
            server: self.inner.name.clone(),
            attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    async fn try_connect(&self) -> Result<()> {
        self.inner.transport.connect().await?;

        self.inner.set_state(ConnectionState::Handshaking);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.receive_loop().await });
        if let Some(old) = self.inner.receive_task.lock().replace(task) {
            old.abort();
        }

        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self
            .inner
            .request("initialize", Some(params), self.inner.options.request_timeout)
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        tracing::info!(
            server = %self.inner.name,
            remote = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP server initialized"
        );
        *self.inner.init.write() = Some(init);

        self.inner
            .notify("notifications/initialized", None)
            .await
    }

    fn start_health_check(&self) {
        let Some(interval) = self.inner.options.health_check_interval else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.health_loop(interval).await });
        if let Some(old) = self.inner.health_task.lock().replace(task) {
            old.abort();
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state() == ConnectionState::Ready {
            Ok(())
        } else {
            Err(McpError::NotConnected)
        }
    }

    /// Send a request and wait for its result, using the default timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with_timeout(method, params, self.inner.options.request_timeout)
            .await
    }

    /// Send a request and wait for its result.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.ensure_ready()?;
        self.inner.request(method, params, timeout).await
    }

    /// Send a notification (no response expected).
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.ensure_ready()?;
        self.inner.notify(method, params).await
    }

    /// Check the server answers.
    pub async fn ping(&self) -> Result<()> {
        self.request("ping", None).await.map(|_| ())
    }

    /// List available tools from the server.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let result = self.request("tools/list", None).await?;
        let list: ListToolsResult = serde_json::from_value(result)?;

        tracing::debug!(
            server = %self.inner.name,
            tool_count = list.tools.len(),
            "listed MCP tools"
        );
        Ok(list.tools)
    }

    /// Call a tool on the server.
    ///
    /// A result flagged `isError` is returned as `Ok`; inspect
    /// [`CallToolResult::is_error`].
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        let call_result: CallToolResult = serde_json::from_value(result)?;

        if call_result.is_error() {
            tracing::warn!(server = %self.inner.name, tool = %name, "tool call returned error");
        } else {
            tracing::debug!(server = %self.inner.name, tool = %name, "tool call succeeded");
        }
        Ok(call_result)
    }

    /// List resources exposed by the server.
    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let result = self.request("resources/list", None).await?;
        let list: ListResourcesResult = serde_json::from_value(result)?;
        Ok(list.resources)
    }

    /// Read a resource and return the text of its first content item.
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        let result = self
            .request("resources/read", Some(serde_json::to_value(&params)?))
            .await?;
        let read: ReadResourceResult = serde_json::from_value(result)?;
        read.contents
            .into_iter()
            .next()
            .and_then(|c| c.text)
            .ok_or_else(|| McpError::protocol(format!("resource '{}' has no text content", uri)))
    }

    /// Shut the connection down. Idempotent.
    ///
    /// Stops the receive loop and health check, closes the transport, and
    /// fails every outstanding request with [`McpError::ConnectionClosed`].
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state == ConnectionState::Closed {
                return Ok(());
            }
            *state = ConnectionState::Closed;
        }
        tracing::info!(server = %self.inner.name, "shutting down MCP client");
        self.inner.teardown().await;
        Ok(())
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        // Tasks hold a reference to the inner state; stop them so it can be freed.
        self.inner.abort_tasks();
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.inner.name)
            .field("transport", &self.inner.transport.kind())
            .field("state", &self.state())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != ConnectionState::Closed || state == ConnectionState::Connecting {
            *current = state;
        }
    }

    fn abort_tasks(&self) {
        if let Some(task) = self.receive_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.health_task.lock().take() {
            task.abort();
        }
    }

    async fn teardown(&self) {
        self.abort_tasks();
        if let Err(e) = self.transport.close().await {
            tracing::debug!(server = %self.name, error = %e, "error closing transport");
        }
        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::debug!(server = %self.name, failed, "failed outstanding requests");
        }
    }

    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        let pending = self.pending.register();
        let request = JsonRpcRequest::new(pending.id().clone(), method, params);

        // Requests registered after the receive loop drained the table would
        // otherwise wait out their whole timeout.
        if !matches!(
            *self.state.lock(),
            ConnectionState::Ready | ConnectionState::Handshaking
        ) {
            return Err(McpError::ConnectionClosed);
        }

        // One deadline covers the send as well as the wait: HTTP-family
        // transports perform the whole POST inside `send`.
        let deadline = Instant::now() + timeout;
        tracing::trace!(server = %self.name, id = %pending.id(), method, "sending request");
        match tokio::time::timeout_at(deadline, self.transport.send(&request)).await {
            Ok(sent) => sent?,
            Err(_) => {
                tracing::debug!(server = %self.name, method, ?timeout, "request timed out while sending");
                return Err(McpError::timeout(method, timeout));
            }
        }
        pending.wait_until(method, deadline, timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.transport
            .send(&JsonRpcRequest::notification(method, params))
            .await
    }

    async fn receive_loop(self: Arc<Self>) {
        while let Some(message) = self.transport.receive().await {
            self.dispatch(message);
        }

        // Leave Ready before draining so no new request can slip in between.
        let lost = {
            let mut state = self.state.lock();
            let lost = matches!(
                *state,
                ConnectionState::Ready | ConnectionState::Handshaking
            );
            if lost {
                *state = ConnectionState::Disconnected;
            }
            lost
        };
        let failed = self.pending.fail_all();
        if lost {
            tracing::warn!(server = %self.name, failed, "connection to MCP server lost");
        }
    }

    fn dispatch(&self, message: JsonRpcMessage) {
        match message.kind() {
            MessageKind::Response => {
                let Some(id) = message.id.clone() else {
                    return;
                };
                let outcome = message
                    .into_result()
                    .map_err(|e| McpError::server_error(e.code, e.message, e.data));
                if !self.pending.resolve(&id, outcome) {
                    tracing::debug!(server = %self.name, id = %id, "discarding reply for unknown request");
                }
            }
            MessageKind::Notification => {
                let method = message.method.unwrap_or_default();
                self.handle_notification(&method, message.params.as_ref());
            }
            MessageKind::Request => {
                tracing::debug!(
                    server = %self.name,
                    method = message.method.as_deref().unwrap_or_default(),
                    "ignoring server-initiated request"
                );
            }
            MessageKind::Invalid => {
                tracing::debug!(server = %self.name, "dropping message with neither id nor method");
            }
        }
    }

    fn handle_notification(&self, method: &str, params: Option<&Value>) {
        let handlers = self.handlers.read().get(method).cloned().unwrap_or_default();
        if handlers.is_empty() {
            tracing::trace!(server = %self.name, method, "unhandled notification");
            return;
        }
        for handler in handlers {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(server = %self.name, method, error = %e, "notification handler failed");
                }
                Err(_) => {
                    tracing::error!(server = %self.name, method, "notification handler panicked");
                }
            }
        }
    }

    async fn health_loop(self: Arc<Self>, interval: Duration) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            ticker.tick().await;
            if *self.state.lock() != ConnectionState::Ready {
                return;
            }
            match self.request("ping", None, self.options.request_timeout).await {
                // Any answer, even an error reply, means the server is alive.
                Ok(_) | Err(McpError::ServerError { .. }) => {
                    if self.degraded.swap(false, Ordering::SeqCst) {
                        tracing::info!(server = %self.name, "health check recovered");
                    }
                }
                Err(e) => {
                    self.degraded.store(true, Ordering::SeqCst);
                    tracing::warn!(server = %self.name, error = %e, "health check failed");
                }
            }
        }
    }
}
