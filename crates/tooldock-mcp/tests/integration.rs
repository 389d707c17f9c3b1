//! Integration tests for the MCP client and manager.
//!
//! These tests spawn the `mock-mcp-server` binary and run the full protocol
//! flow over stdio.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tooldock_config::McpConfig;
use tooldock_mcp::{
    ClientOptions, ConnectionState, McpClient, McpError, McpManager, McpServerConfig, ServerState,
    SyncMcpManager, ToolCallError,
};

/// Path to the mock MCP server binary.
fn mock_server_path() -> String {
    env!("CARGO_BIN_EXE_mock-mcp-server").to_string()
}

fn mock_config(name: &str) -> McpServerConfig {
    McpServerConfig::new(name, mock_server_path())
}

fn options() -> ClientOptions {
    ClientOptions::default()
        .with_request_timeout(Duration::from_secs(10))
        .with_retries(2, Duration::from_millis(50))
        .with_health_check(None)
}

async fn connected(config: McpServerConfig) -> McpClient {
    let client = McpClient::from_config(&config, options()).expect("Failed to build client");
    client.connect().await.expect("Failed to connect");
    client
}

#[tokio::test]
async fn test_connect_and_initialize() {
    let client = connected(mock_config("test")).await;

    let server_info = client.server_info().expect("no server info");
    assert_eq!(server_info.name, "mock-mcp-server");
    assert_eq!(server_info.version, "1.0.0");
    assert_eq!(client.state(), ConnectionState::Ready);
    assert!(client.is_connected());

    client.ping().await.expect("ping failed");
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_list_tools() {
    let client = connected(mock_config("test")).await;

    let tools = client.list_tools().await.expect("Failed to list tools");
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "add", "slow", "fail", "crash"]);

    let echo = &tools[0];
    assert_eq!(echo.description.as_deref(), Some("Echo back the input"));
    assert_eq!(
        echo.input_schema.as_ref().unwrap()["required"],
        json!(["message"])
    );
}

#[tokio::test]
async fn test_call_tools() {
    let client = connected(mock_config("test")).await;

    let result = client
        .call_tool("echo", Some(json!({"message": "Hello, MCP!"})))
        .await
        .expect("Failed to call echo");
    assert!(!result.is_error());
    assert_eq!(result.text(), "Hello, MCP!");

    let result = client
        .call_tool("add", Some(json!({"a": 5, "b": 3})))
        .await
        .expect("Failed to call add");
    assert_eq!(result.text(), "8");

    let result = client.call_tool("fail", None).await.unwrap();
    assert!(result.is_error());
    assert_eq!(result.text(), "tool failed on purpose");
}

#[tokio::test]
async fn test_call_unknown_tool_is_server_error() {
    let client = connected(mock_config("test")).await;

    let err = client.call_tool("nonexistent", None).await.unwrap_err();
    match err {
        McpError::ServerError { code, message, .. } => {
            assert_eq!(code, -32602);
            assert!(message.contains("nonexistent"));
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_resources() {
    let client = connected(mock_config("test")).await;

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].uri, "mock://readme");

    let body = client.read_resource("mock://readme").await.unwrap();
    assert_eq!(body, "mock server readme");

    assert!(client.read_resource("mock://missing").await.is_err());
}

#[tokio::test]
async fn test_concurrent_calls_resolve_out_of_order() {
    let client = Arc::new(connected(mock_config("test")).await);

    let slow = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .call_tool("slow", Some(json!({"delay_ms": 500})))
                .await
        })
    };
    // Give the slow call a head start so it is issued first.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let fast = client
        .call_tool("echo", Some(json!({"message": "fast"})))
        .await
        .unwrap();
    assert_eq!(fast.text(), "fast");
    assert!(started.elapsed() < Duration::from_millis(400));

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.text(), "Slept for 500 ms");
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_timeout_leaves_connection_usable() {
    let client = connected(mock_config("test")).await;

    let params = json!({"name": "slow", "arguments": {"delay_ms": 600}});
    let err = client
        .request_with_timeout("tools/call", Some(params), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(client.pending_requests(), 0);

    // The late reply arrives while this call is outstanding and is discarded.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let result = client
        .call_tool("echo", Some(json!({"message": "still here"})))
        .await
        .unwrap();
    assert_eq!(result.text(), "still here");
}

#[tokio::test]
async fn test_server_crash_detection() {
    let client = connected(mock_config("test")).await;

    let err = client.call_tool("crash", None).await.unwrap_err();
    assert!(err.is_connection_error(), "unexpected error: {err:?}");

    // The receive loop notices the closed pipe.
    for _ in 0..50 {
        if !client.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!client.is_connected());
    assert!(matches!(client.ping().await, Err(McpError::NotConnected)));
}

#[tokio::test]
async fn test_newline_delimited_server() {
    let client = connected(mock_config("nl").with_arg("--newline")).await;
    let result = client
        .call_tool("echo", Some(json!({"message": "lines"})))
        .await
        .unwrap();
    assert_eq!(result.text(), "lines");
}

#[tokio::test]
async fn test_notification_handler_receives_server_messages() {
    let config = mock_config("test");
    let client = McpClient::from_config(&config, options()).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    client.on_notification("notifications/message", {
        let seen = Arc::clone(&seen);
        move |params| {
            if params.and_then(|p| p.get("data")) == Some(&json!("ready")) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    });

    client.connect().await.unwrap();
    // The notification is written before the ping reply.
    client.ping().await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown() {
    let client = connected(mock_config("test")).await;

    client.shutdown().await.expect("Failed to shutdown");
    client.shutdown().await.expect("second shutdown should be a no-op");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.list_tools().await,
        Err(McpError::NotConnected)
    ));
}

#[tokio::test]
async fn test_connect_failure_reports_attempts() {
    let config = McpServerConfig::new("missing", "nonexistent-mcp-server-12345");
    let client = McpClient::from_config(&config, options()).unwrap();

    match client.connect().await.unwrap_err() {
        McpError::ConnectFailed {
            server, attempts, ..
        } => {
            assert_eq!(server, "missing");
            assert_eq!(attempts, 2);
        }
        other => panic!("expected ConnectFailed, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_manager_isolation_and_namespacing() {
    let manager = McpManager::with_options("mcp_", options());
    manager.add_server(mock_config("alpha"));
    manager.add_server(mock_config("beta").with_arg("--newline"));
    manager.add_server(McpServerConfig::new("broken", "nonexistent-mcp-server-12345"));

    assert_eq!(manager.connect_all().await, 2);

    // Both servers expose `echo`; each gets its own name.
    let alpha = manager
        .call_tool("mcp_alpha_echo", Some(json!({"message": "a"})))
        .await
        .unwrap();
    let beta = manager
        .call_tool("mcp_beta_echo", Some(json!({"message": "b"})))
        .await
        .unwrap();
    assert_eq!(alpha.text, "a");
    assert_eq!(beta.text, "b");
    assert_eq!(manager.tool_count(), 10);

    let status = manager.get_status();
    assert!(status["alpha"].connected);
    assert_eq!(status["alpha"].tools_count, 5);
    assert!(!status["broken"].connected);
    assert_eq!(status["broken"].state, ServerState::NeverConnected);
    assert!(status["broken"].error.is_some());

    let report = manager.status_report();
    assert!(report.contains("alpha (stdio): Connected - 5 tools"));
    assert!(report.contains("broken (stdio): Disconnected - Error:"));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_manager_structured_failures() {
    let manager = McpManager::with_options("mcp_", options());
    manager.add_server(mock_config("svc"));
    manager.connect_all().await;

    let err = manager.call_tool("mcp_svc_nope", None).await.unwrap_err();
    assert!(matches!(err, ToolCallError::NotFound(_)));

    let err = manager.call_tool("mcp_svc_fail", None).await.unwrap_err();
    assert!(matches!(err, ToolCallError::Failed { .. }));
    assert!(err.to_string().contains("tool failed on purpose"));

    let err = manager.call_tool("mcp_svc_crash", None).await.unwrap_err();
    assert!(matches!(err, ToolCallError::ServerUnavailable { .. }));

    let status = manager.server_status("svc").unwrap();
    assert!(status.last_tool_error.is_some());

    // Reconnecting spawns a fresh process.
    manager.connect_server("svc").await.unwrap();
    assert!(manager.is_connected("svc"));
    let out = manager
        .call_tool("mcp_svc_add", Some(json!({"a": 1, "b": 2})))
        .await
        .unwrap();
    assert_eq!(out.text, "3");
}

#[tokio::test]
async fn test_manager_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.json");
    let contents = json!({
        "tool_prefix": "ext_",
        "request_timeout_secs": 10,
        "health_check_interval_secs": 0,
        "servers": [
            {"name": "mock", "transport": "stdio", "command": mock_server_path(), "args": ["--name", "configured"]},
            {"name": "off", "command": mock_server_path(), "enabled": false}
        ]
    });
    std::fs::write(&path, contents.to_string()).unwrap();

    let config: McpConfig = tooldock_config::load_config(&path).unwrap();
    let manager = McpManager::from_config(&config);
    assert_eq!(manager.server_names(), vec!["mock".to_string()]);

    assert_eq!(manager.connect_all().await, 1);
    assert!(manager.get_tool("ext_mock_echo").is_some());
    let client = manager.get_client("mock").unwrap();
    assert_eq!(client.server_info().unwrap().name, "configured");
}

#[test]
fn test_sync_facade_with_stdio_server() {
    let manager = McpManager::with_options("mcp_", options());
    manager.add_server(mock_config("sync"));

    let sync = SyncMcpManager::start(manager).unwrap();
    assert_eq!(sync.connect_all().unwrap(), 1);

    let out = sync
        .call_tool("mcp_sync_echo", Some(json!({"message": "blocking"})))
        .unwrap();
    assert_eq!(out.text, "blocking");

    let err = sync
        .call_tool_with_wait(
            "mcp_sync_slow",
            Some(json!({"delay_ms": 2000})),
            Duration::from_millis(200),
        )
        .unwrap_err();
    assert!(matches!(err, tooldock_mcp::SyncError::Timeout(_)));

    sync.shutdown().unwrap();
}
