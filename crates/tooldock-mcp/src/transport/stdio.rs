//! Subprocess transport.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use super::{Epoch, Inbox, ReaderExit, Transport, TransportKind, not_connected};
use crate::codec;
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcMessage, JsonRpcRequest};

/// How long to wait for the child to exit after it has been killed.
const EXIT_WAIT: Duration = Duration::from_secs(5);

struct Process {
    child: Child,
    stdin: BufWriter<ChildStdin>,
}

/// Talks to a server subprocess over its stdin/stdout.
///
/// A reader task decodes stdout (framed or newline JSON) into the inbox.
/// Stderr is forwarded to `tracing` at debug level.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    process: tokio::sync::Mutex<Option<Process>>,
    inbox: Arc<Inbox>,
    alive: Arc<AtomicBool>,
    epoch: Arc<Epoch>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Create a transport that will spawn `command` on connect.
    ///
    /// `env` is added to the inherited environment.
    pub fn new(command: impl Into<String>, args: Vec<String>, env: Vec<(String, String)>) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            process: tokio::sync::Mutex::new(None),
            inbox: Arc::new(Inbox::new()),
            alive: Arc::new(AtomicBool::new(false)),
            epoch: Arc::new(Epoch::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The command this transport spawns.
    pub fn command(&self) -> &str {
        &self.command
    }

    async fn stop(&self) {
        // Retire the current reader before aborting it.
        self.epoch.advance();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.alive.store(false, Ordering::SeqCst);
        self.inbox.close();

        let Some(mut process) = self.process.lock().await.take() else {
            return;
        };
        if let Err(e) = process.child.start_kill() {
            tracing::debug!(command = %self.command, error = %e, "server process already gone");
        }
        match tokio::time::timeout(EXIT_WAIT, process.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(command = %self.command, %status, "server process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(command = %self.command, error = %e, "failed to reap server process");
            }
            Err(_) => {
                tracing::warn!(command = %self.command, "server process did not exit in time");
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> Result<()> {
        self.stop().await;

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!("failed to spawn '{}': {}", self.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;
        let stderr = child.stderr.take();

        self.inbox.reopen().await;
        let tx = self
            .inbox
            .sender()
            .ok_or_else(|| McpError::transport("inbox closed during connect"))?;
        self.alive.store(true, Ordering::SeqCst);

        let mut tasks = Vec::with_capacity(2);

        let exit = ReaderExit::new(&self.alive, &self.inbox, &self.epoch);
        let command = self.command.clone();
        tasks.push(tokio::spawn(async move {
            let _exit = exit;
            let mut reader = BufReader::new(stdout);
            loop {
                match codec::read_message(&mut reader).await {
                    Ok(Some(message)) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(command = %command, "server stdout closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(command = %command, error = %e, "failed to read from server");
                        break;
                    }
                }
            }
            drop(tx);
        }));

        if let Some(stderr) = stderr {
            let command = self.command.clone();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(command = %command, "server stderr: {}", line);
                }
            }));
        }

        *self.tasks.lock() = tasks;
        *self.process.lock().await = Some(Process {
            child,
            stdin: BufWriter::new(stdin),
        });

        tracing::info!(command = %self.command, args = ?self.args, "spawned MCP server");
        Ok(())
    }

    async fn send(&self, message: &JsonRpcRequest) -> Result<()> {
        let mut guard = self.process.lock().await;
        let process = guard
            .as_mut()
            .ok_or_else(|| not_connected(TransportKind::Stdio))?;
        if !self.alive.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed);
        }
        codec::write_message(&mut process.stdin, message).await
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        self.inbox.recv().await
    }

    async fn close(&self) -> Result<()> {
        self.stop().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
