//! Server-Sent-Events transport.
//!
//! Replies and notifications arrive on a long-lived GET stream; requests are
//! POSTed to the endpoint the stream announces in its `endpoint` event
//! (until one arrives, the stream URL itself). A reader task pumps the stream
//! into the inbox; closing the transport aborts it, which drops the stream
//! connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use super::http::{HttpTransportConfig, post_message};
use super::{Epoch, Inbox, ReaderExit, Transport, TransportKind, not_connected};
use crate::codec::{MAX_FRAME_BYTES, SseEvent, SseParser};
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcMessage, JsonRpcRequest};

/// How long connect waits for the initial `endpoint` event.
const DEFAULT_ENDPOINT_WAIT: Duration = Duration::from_secs(5);

/// Holds an SSE stream open and POSTs requests to the announced endpoint.
pub struct SseTransport {
    config: HttpTransportConfig,
    stream_url: Url,
    client: reqwest::Client,
    stream_client: reqwest::Client,
    endpoint: Arc<watch::Sender<Option<Url>>>,
    endpoint_wait: Duration,
    inbox: Arc<Inbox>,
    opened: AtomicBool,
    streaming: Arc<AtomicBool>,
    epoch: Arc<Epoch>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Create a transport for the stream at `config.url`.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let stream_url = config.parse_url()?;
        let client = config.build_client()?;
        let stream_client = config.build_stream_client()?;
        Ok(Self {
            config,
            stream_url,
            client,
            stream_client,
            endpoint: Arc::new(watch::Sender::new(None)),
            endpoint_wait: DEFAULT_ENDPOINT_WAIT,
            inbox: Arc::new(Inbox::new()),
            opened: AtomicBool::new(false),
            streaming: Arc::new(AtomicBool::new(false)),
            epoch: Arc::new(Epoch::default()),
            reader: Mutex::new(None),
        })
    }

    /// Bound the wait for the initial `endpoint` event during connect.
    pub fn with_endpoint_wait(mut self, wait: Duration) -> Self {
        self.endpoint_wait = wait;
        self
    }

    /// Where the next request will be POSTed.
    pub fn post_url(&self) -> Url {
        self.endpoint
            .borrow()
            .clone()
            .unwrap_or_else(|| self.stream_url.clone())
    }

    fn halt_reader(&self) {
        self.epoch.advance();
        self.streaming.store(false, Ordering::SeqCst);
        if let Some(task) = self.reader.lock().take() {
            task.abort();
        }
    }

    async fn open_stream(&self) -> Result<reqwest::Response> {
        let mut req = self
            .stream_client
            .get(self.stream_url.clone())
            .header("Accept", "text/event-stream");
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| McpError::transport(format!("failed to open SSE stream: {}", e)))?;
        if !resp.status().is_success() {
            return Err(McpError::transport(format!(
                "HTTP {} opening SSE stream",
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self) -> Result<()> {
        self.halt_reader();
        self.inbox.reopen().await;
        self.endpoint.send_replace(None);
        let mut endpoint_rx = self.endpoint.subscribe();

        let resp = tokio::time::timeout(self.config.timeout, self.open_stream())
            .await
            .map_err(|_| McpError::transport("timed out opening SSE stream"))??;

        let tx = self
            .inbox
            .sender()
            .ok_or_else(|| McpError::transport("inbox closed during connect"))?;
        let pump = StreamPump {
            stream_url: self.stream_url.clone(),
            endpoint: Arc::clone(&self.endpoint),
            tx,
            _exit: ReaderExit::new(&self.streaming, &self.inbox, &self.epoch),
        };
        self.streaming.store(true, Ordering::SeqCst);
        let task = tokio::spawn(pump.run(resp));
        if let Some(old) = self.reader.lock().replace(task) {
            old.abort();
        }

        let announced = endpoint_rx.borrow_and_update().is_some();
        if !announced
            && tokio::time::timeout(self.endpoint_wait, endpoint_rx.changed())
                .await
                .is_err()
        {
            tracing::debug!(
                url = %self.stream_url,
                "no endpoint event yet, posting to the stream URL"
            );
        }

        self.opened.store(true, Ordering::SeqCst);
        tracing::info!(
            url = %self.stream_url,
            endpoint = %self.post_url(),
            "connected to MCP server via SSE"
        );
        Ok(())
    }

    async fn send(&self, message: &JsonRpcRequest) -> Result<()> {
        if !self.opened.load(Ordering::SeqCst) {
            return Err(not_connected(TransportKind::Sse));
        }
        let url = self.post_url();
        let replies = post_message(&self.client, &self.config, &url, message).await?;
        for reply in replies {
            self.inbox.push(reply);
        }
        Ok(())
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        self.inbox.recv().await
    }

    async fn close(&self) -> Result<()> {
        self.halt_reader();
        if self.opened.swap(false, Ordering::SeqCst) {
            tracing::debug!(url = %self.stream_url, "closed SSE transport");
        }
        self.inbox.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.halt_reader();
    }
}

/// Reader task state for one stream connection.
struct StreamPump {
    stream_url: Url,
    endpoint: Arc<watch::Sender<Option<Url>>>,
    tx: mpsc::UnboundedSender<JsonRpcMessage>,
    _exit: ReaderExit,
}

impl StreamPump {
    /// Split the body into lines and feed them to the event parser until the
    /// stream ends or the task is aborted.
    async fn run(self, resp: reqwest::Response) {
        let mut parser = SseParser::new();
        let mut pending = Vec::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(url = %self.stream_url, error = %e, "SSE stream read failed");
                    break;
                }
            };
            pending.extend_from_slice(&chunk);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(event) = parser.feed_line(line.trim_end_matches(['\r', '\n'])) {
                    self.handle(event);
                }
            }
            if pending.len() > MAX_FRAME_BYTES {
                tracing::warn!(
                    url = %self.stream_url,
                    buffered = pending.len(),
                    "SSE line exceeds the frame limit, dropping the stream"
                );
                return;
            }
        }

        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending);
            if let Some(event) = parser.feed_line(line.trim_end_matches('\r')) {
                self.handle(event);
            }
        }
        if let Some(event) = parser.finish() {
            self.handle(event);
        }
        tracing::info!(url = %self.stream_url, "SSE stream ended");
    }

    fn handle(&self, event: SseEvent) {
        match event {
            SseEvent::Endpoint(endpoint) => match self.stream_url.join(&endpoint) {
                Ok(url) => {
                    tracing::debug!(endpoint = %url, "SSE endpoint announced");
                    self.endpoint.send_replace(Some(url));
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "ignoring invalid SSE endpoint");
                }
            },
            SseEvent::Message(message) => {
                let _ = self.tx.send(message);
            }
        }
    }
}
