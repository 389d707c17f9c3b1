//! HTTP request/response transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use super::{Inbox, Transport, TransportKind, not_connected};
use crate::codec::{self, SseEvent, SseParser};
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcMessage, JsonRpcRequest};

/// Delay between POST retries.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Configuration for HTTP-based transports.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Server URL (the POST target for HTTP, the stream URL for SSE).
    pub url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Number of retries for failed requests.
    pub retries: u32,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
            retries: 3,
            headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Create a new HTTP transport config with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub(crate) fn parse_url(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|e| McpError::transport(format!("invalid URL: {}", e)))
    }

    pub(crate) fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(5)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))
    }

    /// Client for long-lived streams: `timeout` bounds connecting only.
    pub(crate) fn build_stream_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))
    }
}

/// Sends each message as an HTTP POST and queues whatever the server
/// answers in the response body.
///
/// Concurrent sends are allowed; replies may be queued in any order and are
/// matched to their requests by id in the client.
pub struct HttpTransport {
    config: HttpTransportConfig,
    url: Url,
    client: reqwest::Client,
    inbox: Arc<Inbox>,
    connected: AtomicBool,
}

impl HttpTransport {
    /// Create a transport. Validates the URL; no request is made until connect.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let url = config.parse_url()?;
        let client = config.build_client()?;

        tracing::debug!(
            url = %url,
            timeout_secs = config.timeout.as_secs(),
            "created HTTP transport"
        );

        Ok(Self {
            config,
            url,
            client,
            inbox: Arc::new(Inbox::new()),
            connected: AtomicBool::new(false),
        })
    }

    /// The POST target.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<()> {
        let mut req = self.client.get(self.url.clone());
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| McpError::transport(format!("server unreachable: {}", e)))?;
        let status = resp.status();

        // Endpoints that only accept POST answer the probe with 405.
        if !status.is_success() && status != StatusCode::METHOD_NOT_ALLOWED {
            return Err(McpError::transport(format!("HTTP {} from {}", status, self.url)));
        }

        self.inbox.reopen().await;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(url = %self.url, %status, "connected to MCP server via HTTP");
        Ok(())
    }

    async fn send(&self, message: &JsonRpcRequest) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(not_connected(TransportKind::Http));
        }
        let replies = post_message(&self.client, &self.config, &self.url, message).await?;
        for reply in replies {
            self.inbox.push(reply);
        }
        Ok(())
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        self.inbox.recv().await
    }

    async fn close(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!(url = %self.url, "closed HTTP transport");
        }
        self.inbox.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }
}

/// POST one message and decode any replies in the response body.
///
/// Connection failures are retried up to `config.retries` times. Timeouts and
/// other failures after the request went out, and HTTP error statuses, are
/// returned immediately.
pub(crate) async fn post_message(
    client: &reqwest::Client,
    config: &HttpTransportConfig,
    url: &Url,
    message: &JsonRpcRequest,
) -> Result<Vec<JsonRpcMessage>> {
    let json = codec::encode(message)?;

    tracing::trace!(url = %url, json = %json, "sending MCP HTTP request");

    let mut retries = config.retries;
    let resp = loop {
        let mut req = client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(json.clone());
        for (key, value) in &config.headers {
            req = req.header(key, value);
        }

        match req.send().await {
            Ok(resp) => break resp,
            Err(e) => {
                // Only a failed connect guarantees the server never saw the
                // body; anything later may already have run the call.
                if retries == 0 || !e.is_connect() {
                    return Err(McpError::transport(format!("HTTP request failed: {}", e)));
                }
                retries -= 1;
                tracing::warn!(
                    error = %e,
                    retries_remaining = retries,
                    "HTTP request failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(McpError::transport(format!("HTTP error {}: {}", status, body)));
    }

    let is_event_stream = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"));

    let body = resp
        .text()
        .await
        .map_err(|e| McpError::transport(format!("failed to read response body: {}", e)))?;

    tracing::trace!(json = %body, "received MCP HTTP response");

    decode_body(&body, is_event_stream)
}

/// Decode a POST response body: empty, one JSON object, a JSON array of
/// messages, or an SSE-formatted body.
pub(crate) fn decode_body(body: &str, is_event_stream: bool) -> Result<Vec<JsonRpcMessage>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }

    if is_event_stream {
        return Ok(SseParser::parse_body(body)
            .into_iter()
            .filter_map(|event| match event {
                SseEvent::Message(message) => Some(message),
                SseEvent::Endpoint(_) => None,
            })
            .collect());
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| McpError::protocol(format!("undecodable reply body: {}", e)))?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(McpError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use serde_json::json;
    use crate::client::{ClientOptions, McpClient};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_http_transport_config() {
        let config = HttpTransportConfig::new("http://localhost:8080/mcp")
            .with_timeout(Duration::from_secs(60))
            .with_retries(5)
            .with_header("Authorization", "Bearer token123");

        assert_eq!(config.url, "http://localhost:8080/mcp");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retries, 5);
        assert_eq!(
            config.headers[0],
            ("Authorization".to_string(), "Bearer token123".to_string())
        );
    }

    #[test]
    fn test_http_transport_config_default() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 3);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_http_transport_invalid_url() {
        match HttpTransport::new(HttpTransportConfig::new("not a valid url")) {
            Err(McpError::Transport(msg)) => assert!(msg.contains("invalid URL")),
            _ => panic!("Expected Transport error"),
        }
    }

    #[test]
    fn test_decode_body_shapes() {
        assert!(decode_body("  ", false).unwrap().is_empty());

        let one = decode_body(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#, false).unwrap();
        assert_eq!(one.len(), 1);

        let batch = decode_body(
            r#"[{"jsonrpc":"2.0","id":1,"result":{}},{"jsonrpc":"2.0","method":"n"}]"#,
            false,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);

        let sse = decode_body(
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":9,\"result\":1}\n\n",
            true,
        )
        .unwrap();
        assert_eq!(sse[0].id, Some(RequestId::Number(9)));

        assert!(matches!(
            decode_body("<html>", false),
            Err(McpError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_405_counts_as_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(HttpTransportConfig::new(format!("{}/mcp", server.uri()))).unwrap();
        assert!(!transport.is_connected());
        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.kind(), TransportKind::Http);
    }

    #[tokio::test]
    async fn test_probe_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpTransportConfig::new(server.uri())).unwrap();
        let err = transport.connect().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("503"));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        let transport =
            HttpTransport::new(HttpTransportConfig::new("http://127.0.0.1:9/mcp")).unwrap();
        assert!(transport.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_post_reply_is_queued() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer t"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}})),
            )
            .mount(&server)
            .await;

        let config = HttpTransportConfig::new(server.uri()).with_header("Authorization", "Bearer t");
        let transport = HttpTransport::new(config).unwrap();
        transport.connect().await.unwrap();
        transport
            .send(&JsonRpcRequest::new(1, "tools/list", None))
            .await
            .unwrap();

        let reply = transport.receive().await.unwrap();
        assert_eq!(reply.id, Some(RequestId::Number(1)));
        assert_eq!(reply.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_post_accepted_without_body_queues_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpTransportConfig::new(server.uri())).unwrap();
        transport.connect().await.unwrap();
        transport
            .send(&JsonRpcRequest::notification("notifications/initialized", None))
            .await
            .unwrap();

        let next = tokio::time::timeout(Duration::from_millis(100), transport.receive()).await;
        assert!(next.is_err(), "nothing should be queued");
    }

    #[tokio::test]
    async fn test_post_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpTransportConfig::new(server.uri())).unwrap();
        transport.connect().await.unwrap();
        let err = transport
            .send(&JsonRpcRequest::new(1, "ping", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_timed_out_post_is_not_resent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {}}))
                    .set_delay(Duration::from_secs(1)),
            )
            .mount(&server)
            .await;

        let config = HttpTransportConfig::new(server.uri())
            .with_timeout(Duration::from_millis(300))
            .with_retries(3);
        let transport = HttpTransport::new(config).unwrap();
        transport.connect().await.unwrap();

        let params = json!({"name": "charge_card", "arguments": {}});
        assert!(
            transport
                .send(&JsonRpcRequest::new(1, "tools/call", Some(params)))
                .await
                .is_err()
        );

        let posts = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.as_str() == "POST")
            .count();
        assert_eq!(posts, 1);
    }

    #[tokio::test]
    async fn test_request_deadline_covers_a_slow_post() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "serverInfo": {"name": "web", "version": "1"}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "slow"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 2, "result": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpTransportConfig::new(server.uri())).unwrap();
        let options = ClientOptions::default()
            .with_retries(1, Duration::from_millis(10))
            .with_health_check(None);
        let client = McpClient::new("web", Arc::new(transport), options);
        client.connect().await.unwrap();

        let started = std::time::Instant::now();
        let err = client
            .request_with_timeout("slow", None, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(client.pending_requests(), 0);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_send_before_connect_and_close_idempotent() {
        let transport =
            HttpTransport::new(HttpTransportConfig::new("http://localhost:8080/mcp")).unwrap();
        assert!(
            transport
                .send(&JsonRpcRequest::new(1, "ping", None))
                .await
                .is_err()
        );
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.receive().await.is_none());
    }
}
