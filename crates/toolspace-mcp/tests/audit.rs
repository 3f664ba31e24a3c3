// toolspace-mcp/tests/audit.rs
// ============================================================================
// Module: Audit Sink Tests
// Description: JSON-line output of the file audit sink.
// ============================================================================
//! ## Overview
//! Confirms request and proxy events land as redacted JSON lines, and that
//! proxy events reach the sink through the core audit seam.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use toolspace_config::ServerTransport;
use toolspace_core::ComponentId;
use toolspace_core::ComponentSpec;
use toolspace_core::ControlPlane;
use toolspace_core::ControlPlaneConfig;
use toolspace_core::ManualClock;
use toolspace_core::MemberId;
use toolspace_core::RoleName;
use toolspace_core::Timestamp;
use toolspace_core::Token;
use toolspace_core::token_fingerprint;
use toolspace_core::runtime::MemberRole;
use toolspace_mcp::McpAuditEvent;
use toolspace_mcp::McpAuditSink;
use toolspace_mcp::McpFileAuditSink;
use toolspace_mcp::McpOutcome;
use toolspace_mcp::ProxyAuditBridge;
use toolspace_mcp::ToolRouter;
use toolspace_mcp::audit::McpAuditEventParams;

fn read_lines(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Verifies request events are appended with a fingerprint, never the token.
#[test]
fn file_sink_appends_request_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let sink = McpFileAuditSink::new(&path).unwrap();
    let token = Token::new("secret-token-value-0001");
    for outcome in [McpOutcome::Ok, McpOutcome::ToolError] {
        sink.record(&McpAuditEvent::new(McpAuditEventParams {
            request_id: Some("1".to_string()),
            transport: ServerTransport::Http,
            peer_ip: Some("127.0.0.1".to_string()),
            method: "tools/call",
            tool: Some("echo".to_string()),
            outcome,
            error_code: None,
            token_fingerprint: Some(token_fingerprint(&token)),
            request_bytes: 10,
            response_bytes: 20,
        }));
    }

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event"], "mcp_request");
    assert_eq!(lines[0]["transport"], "http");
    assert_eq!(lines[1]["outcome"], "tool_error");
    assert_eq!(lines[0]["token_fingerprint"], token_fingerprint(&token));
    assert!(!std::fs::read_to_string(&path).unwrap().contains(token.as_str()));
}

/// Verifies proxy executions flow from the control plane into the file sink.
#[tokio::test]
async fn proxy_events_reach_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxy.jsonl");
    let sink: Arc<dyn McpAuditSink> = Arc::new(McpFileAuditSink::new(&path).unwrap());
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
    let plane = ControlPlane::new(ControlPlaneConfig::default(), clock, Arc::new(ProxyAuditBridge::new(sink)));
    let router = ToolRouter::new(Arc::new(plane));
    router.register_builtin_tools().unwrap();
    let plane = router.control_plane();

    let admin = plane.create_token(RoleName::new("admin"), "", None).unwrap().token;
    let member = plane.create_token(RoleName::new("user"), "", None).unwrap().token;
    let spec: ComponentSpec =
        serde_json::from_value(json!({"id": "ops", "name": "Ops", "role": "user"})).unwrap();
    plane.create_component(&admin, spec, MemberId::new("root")).await.unwrap();
    plane
        .add_member(&admin, &ComponentId::new("ops"), MemberId::new("m1"), member.clone(), MemberRole::Member)
        .await
        .unwrap();

    let result = router.handle_tool_call(&member, "ops__echo", json!({}), None).await;
    assert!(!result.is_error());

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["success"], true);
    assert!(!std::fs::read_to_string(&path).unwrap().contains(member.as_str()));
}
