//! Blocking facade over [`McpManager`].
//!
//! [`SyncMcpManager`] starts one background thread that owns a
//! current-thread tokio runtime. Every call is submitted to that runtime and
//! the calling thread waits for the result with a bounded timeout, so
//! callers without an async runtime never run async code themselves.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::ToolCallError;
use crate::manager::{McpManager, ServerStatus};
use crate::tool::{ToolDescriptor, ToolOutput};

/// Default bound on how long a blocking call waits.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

/// Bound for [`SyncMcpManager::connect_all`], which includes retries.
pub const CONNECT_WAIT: Duration = Duration::from_secs(120);

const STOP_WAIT: Duration = Duration::from_secs(5);

/// Errors from the blocking facade.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The work did not finish within the wait bound.
    #[error("operation did not complete within {0:?}")]
    Timeout(Duration),

    /// The scheduler thread is gone.
    #[error("scheduler thread has stopped")]
    SchedulerStopped,

    /// The scheduler runtime could not be started.
    #[error("failed to start scheduler: {0}")]
    Runtime(String),

    /// A tool call failed.
    #[error(transparent)]
    Tool(#[from] ToolCallError),
}

/// Blocking wrapper that drives an [`McpManager`] on its own thread.
pub struct SyncMcpManager {
    manager: Arc<McpManager>,
    handle: Handle,
    wait: Duration,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    exited: Mutex<Option<mpsc::Receiver<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SyncMcpManager {
    /// Start the scheduler thread and hand it the manager.
    pub fn start(manager: McpManager) -> Result<Self, SyncError> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (exit_tx, exit_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("tooldock-scheduler".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));

                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                drop(runtime);
                tracing::debug!("scheduler thread stopped");
                let _ = exit_tx.send(());
            })
            .map_err(|e| SyncError::Runtime(e.to_string()))?;

        let handle = handle_rx
            .recv()
            .map_err(|_| SyncError::SchedulerStopped)?
            .map_err(SyncError::Runtime)?;

        Ok(Self {
            manager: Arc::new(manager),
            handle,
            wait: DEFAULT_WAIT,
            stop: Mutex::new(Some(stop_tx)),
            exited: Mutex::new(Some(exit_rx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Set the default wait bound.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// The wrapped manager.
    pub fn manager(&self) -> &Arc<McpManager> {
        &self.manager
    }

    /// Run `f` on the scheduler and wait up to `wait` for its result.
    ///
    /// On timeout the submitted work is cancelled.
    pub fn run<F, Fut, T>(&self, wait: Duration, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(Arc<McpManager>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let work = f(Arc::clone(&self.manager));
        let task = self.handle.spawn(async move {
            let _ = tx.send(work.await);
        });

        match rx.recv_timeout(wait) {
            Ok(value) => Ok(value),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                task.abort();
                Err(SyncError::Timeout(wait))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SyncError::SchedulerStopped),
        }
    }

    /// Connect every configured server. Returns how many are connected.
    pub fn connect_all(&self) -> Result<usize, SyncError> {
        self.run(CONNECT_WAIT, |m| async move { m.connect_all().await })
    }

    /// Invoke a tool, waiting at most the default bound.
    pub fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<ToolOutput, SyncError> {
        self.call_tool_with_wait(name, arguments, self.wait)
    }

    /// Invoke a tool, waiting at most `wait`.
    pub fn call_tool_with_wait(
        &self,
        name: &str,
        arguments: Option<Value>,
        wait: Duration,
    ) -> Result<ToolOutput, SyncError> {
        let name = name.to_string();
        self.run(wait, |m| async move { m.call_tool(&name, arguments).await })?
            .map_err(SyncError::from)
    }

    /// Registered tools.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.manager.list_tools()
    }

    /// Per-server status.
    pub fn get_status(&self) -> BTreeMap<String, ServerStatus> {
        self.manager.get_status()
    }

    /// Human-readable status report.
    pub fn status_report(&self) -> String {
        self.manager.status_report()
    }

    /// Shut every server down, then stop the scheduler thread.
    pub fn shutdown(&self) -> Result<(), SyncError> {
        let outcome = self.run(self.wait, |m| async move { m.shutdown().await });
        self.stop_scheduler();
        outcome
    }

    fn stop_scheduler(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        let Some(exited) = self.exited.lock().take() else {
            return;
        };
        match exited.recv_timeout(STOP_WAIT) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.lock().take()
                    && thread.join().is_err()
                {
                    tracing::warn!("scheduler thread panicked");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(wait = ?STOP_WAIT, "scheduler thread did not stop in time");
            }
        }
    }
}

impl Drop for SyncMcpManager {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.get_mut().take() {
            let _ = stop.send(());
        }
    }
}

impl std::fmt::Debug for SyncMcpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMcpManager")
            .field("manager", &self.manager)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}
