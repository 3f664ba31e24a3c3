// toolspace-mcp/tests/router.rs
// ============================================================================
// Module: Tool Router Tests
// Description: System tool visibility and dispatch through the MCP router.
// ============================================================================
//! ## Overview
//! Drives the reserved system tool family and collaboration proxying through
//! [`ToolRouter`], the way an MCP `tools/call` would.

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
use toolspace_core::ControlPlane;
use toolspace_core::ControlPlaneConfig;
use toolspace_core::ManualClock;
use toolspace_core::NoopProxyAuditSink;
use toolspace_core::RoleName;
use toolspace_core::Timestamp;
use toolspace_core::Token;
use toolspace_core::ToolDescriptor;
use toolspace_core::ToolResult;
use toolspace_mcp::ToolError;
use toolspace_mcp::ToolRouter;
use toolspace_mcp::builtin::EchoTool;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn router() -> ToolRouter {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(1_000)));
    let plane = ControlPlane::new(ControlPlaneConfig::default(), clock, Arc::new(NoopProxyAuditSink));
    let router = ToolRouter::new(Arc::new(plane));
    router.register_builtin_tools().unwrap();
    router
}

fn token(router: &ToolRouter, role: &str) -> Token {
    router.control_plane().create_token(RoleName::new(role), role, None).unwrap().token
}

async fn names(router: &ToolRouter, token: &Token) -> Vec<String> {
    router.list_tools(token).await.unwrap().into_iter().map(|tool| tool.name.to_string()).collect()
}

async fn call(router: &ToolRouter, token: &Token, name: &str, args: Value) -> ToolResult {
    router.handle_tool_call(token, name, args, None).await
}

/// Returns the JSON payload of a successful result.
fn payload(result: &ToolResult) -> Value {
    assert!(!result.is_error(), "unexpected error: {:?}", result.first_text());
    serde_json::to_value(result).unwrap()["content"][0]["json"].clone()
}

// ============================================================================
// SECTION: Visibility
// ============================================================================

/// Verifies system tools are listed by group like catalog tools.
#[tokio::test]
async fn system_tools_follow_role_groups() {
    let router = router();
    let admin = names(&router, &token(&router, "admin")).await;
    assert!(admin.contains(&"admin_token_create".to_string()));
    assert!(admin.contains(&"org_member_add".to_string()));

    let user = names(&router, &token(&router, "user")).await;
    assert!(user.contains(&"echo".to_string()));
    assert!(user.contains(&"message_publish".to_string()));
    assert!(user.contains(&"task_submit".to_string()));
    assert!(user.contains(&"org_my_components".to_string()));
    assert!(!user.iter().any(|name| name.starts_with("admin_")));

    let guest = names(&router, &token(&router, "guest")).await;
    assert_eq!(guest, vec!["echo", "clock_now"]);
}

/// Verifies hidden system tools are refused before arguments are read.
#[tokio::test]
async fn hidden_system_tools_are_denied() {
    let router = router();
    let guest = token(&router, "guest");
    let denied = call(&router, &guest, "admin_token_create", json!({"role": "admin"})).await;
    assert!(denied.is_error());
    assert!(denied.first_text().unwrap().starts_with("permission_denied"));
    let denied = call(&router, &guest, "task_list", Value::Null).await;
    assert!(denied.first_text().unwrap().starts_with("permission_denied"));
}

/// Verifies an allow-list hides system tools as well.
#[tokio::test]
async fn allow_list_applies_to_system_tools() {
    let router = router();
    let admin = token(&router, "admin");
    let user = token(&router, "user");
    let set = call(&router, &admin, "admin_visible_tools_set", json!({"token": user.as_str(), "tools": ["echo"]})).await;
    assert_eq!(payload(&set)["tools"], json!(["echo"]));
    assert_eq!(names(&router, &user).await, vec!["echo"]);
    assert!(call(&router, &user, "task_list", json!({})).await.is_error());
}

/// Verifies reserved names cannot be registered as catalog tools.
#[tokio::test]
async fn reserved_names_are_rejected() {
    let router = router();
    let result = router.register_tool(ToolDescriptor::new("task_submit", "shadow"), Arc::new(EchoTool));
    assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    assert!(router.register_tool(EchoTool::descriptor(), Arc::new(EchoTool)).is_err());
}

// ============================================================================
// SECTION: Admin Tools
// ============================================================================

/// Verifies the token lifecycle through admin tools.
#[tokio::test]
async fn admin_manages_tokens() {
    let router = router();
    let admin = token(&router, "admin");
    let created = payload(&call(&router, &admin, "admin_token_create", json!({"role": "guest", "description": "g"})).await);
    let guest = Token::new(created["token"].as_str().unwrap());
    assert_eq!(created["record"]["role"], "guest");
    assert!(created["record"].get("token").is_none());
    assert_eq!(names(&router, &guest).await, vec!["echo", "clock_now"]);

    let valid = payload(&call(&router, &admin, "admin_token_validate", json!({"token": guest.as_str()})).await);
    assert_eq!(valid["valid"], true);

    let updated = payload(&call(&router, &admin, "admin_token_deactivate", json!({"token": guest.as_str()})).await);
    assert_eq!(updated["updated"], true);
    let invalid = payload(&call(&router, &admin, "admin_token_validate", json!({"token": guest.as_str()})).await);
    assert_eq!(invalid["valid"], false);
    assert_eq!(invalid["reason"], "inactive");
    assert!(router.list_tools(&guest).await.is_err());

    payload(&call(&router, &admin, "admin_token_activate", json!({"token": guest.as_str()})).await);
    let deleted = payload(&call(&router, &admin, "admin_token_delete", json!({"token": guest.as_str()})).await);
    assert_eq!(deleted["deleted"], true);
    let stats = payload(&call(&router, &admin, "admin_token_stats", json!({})).await);
    assert!(stats.is_object());
}

/// Verifies malformed arguments become invalid-argument results.
#[tokio::test]
async fn malformed_arguments_are_rejected() {
    let router = router();
    let admin = token(&router, "admin");
    let missing = call(&router, &admin, "admin_token_create", json!({})).await;
    assert!(missing.first_text().unwrap().starts_with("invalid_argument"));
    let unknown = call(&router, &admin, "admin_token_stats", json!({"extra": true})).await;
    assert!(unknown.first_text().unwrap().starts_with("invalid_argument"));
    let role = call(&router, &admin, "admin_token_create", json!({"role": "ghost"})).await;
    assert!(role.is_error());
}

/// Verifies executor rules round trip through admin tools.
#[tokio::test]
async fn admin_sets_executor_rules() {
    let router = router();
    let admin = token(&router, "admin");
    let user = token(&router, "user");
    let args = json!({
        "token": user.as_str(),
        "executor": "default",
        "rules": {"enabled": true, "deny": ["clock_now"]}
    });
    payload(&call(&router, &admin, "admin_executor_rules_set", args).await);
    let rules = payload(
        &call(&router, &admin, "admin_executor_rules_get", json!({"token": user.as_str(), "executor": "default"})).await,
    );
    assert_eq!(rules["rules"]["deny"], json!(["clock_now"]));
}

// ============================================================================
// SECTION: Messaging and Tasks
// ============================================================================

/// Verifies publish and receive between two tokens.
#[tokio::test]
async fn messages_flow_between_tokens() {
    let router = router();
    let alice = token(&router, "user");
    let bob = token(&router, "user");
    let sent = payload(
        &call(&router, &alice, "message_publish", json!({"destination": bob.as_str(), "content": {"hi": 1}})).await,
    );
    assert_eq!(sent["type"], "notification");

    let pending = payload(&call(&router, &alice, "message_pending", json!({})).await);
    assert_eq!(pending["messages"], json!([]));

    let received = payload(&call(&router, &bob, "message_receive", json!({"max": 10})).await);
    assert_eq!(received["messages"][0]["content"]["hi"], 1);
    let message_id = received["messages"][0]["id"].clone();

    payload(&call(&router, &bob, "message_reply", json!({"message_id": message_id, "content": "ok"})).await);
    let reply = payload(&call(&router, &alice, "message_receive", json!({})).await);
    assert_eq!(reply["messages"][0]["content"], "ok");
    assert_eq!(reply["messages"][0]["reply_to"], message_id);
}

/// Verifies a submitted task completes and can be awaited.
#[tokio::test]
async fn tasks_run_to_completion() {
    let router = router();
    let user = token(&router, "user");
    let task = payload(&call(&router, &user, "task_submit", json!({"tool": "echo", "arguments": {"n": 3}})).await);
    let task_id = task["id"].clone();
    let done = payload(&call(&router, &user, "task_wait", json!({"task_id": task_id, "timeout_ms": 5_000})).await);
    assert_eq!(done["status"], "completed");

    let listed = payload(&call(&router, &user, "task_list", json!({"status": "completed"})).await);
    assert_eq!(listed["tasks"].as_array().unwrap().len(), 1);

    let other = token(&router, "user");
    let hidden = call(&router, &other, "task_status", json!({"task_id": task_id})).await;
    assert!(hidden.first_text().unwrap().starts_with("not_found"));
}

// ============================================================================
// SECTION: Organization
// ============================================================================

/// Verifies component creation, membership, and proxied calls.
#[tokio::test]
async fn components_proxy_member_calls() {
    let router = router();
    let admin = token(&router, "admin");
    let member = token(&router, "user");
    let created = payload(
        &call(
            &router,
            &admin,
            "org_component_create",
            json!({"id": "dev-team", "name": "Dev Team", "role": "user", "visible_tools": ["echo"]}),
        )
        .await,
    );
    assert_eq!(created["member_count"], 1);

    let added = payload(
        &call(
            &router,
            &admin,
            "org_member_add",
            json!({"component_id": "dev-team", "member_id": "alice", "token": member.as_str()}),
        )
        .await,
    );
    assert_eq!(added["role"], "member");

    assert!(names(&router, &member).await.contains(&"dev-team__echo".to_string()));
    let proxied = payload(&call(&router, &member, "dev-team__echo", json!({"x": 1})).await);
    assert_eq!(proxied["component"], "dev-team");
    let forbidden = call(&router, &member, "dev-team__clock_now", json!({})).await;
    assert!(forbidden.first_text().unwrap().starts_with("forbidden"));

    let mine = payload(&call(&router, &member, "org_my_components", json!({})).await);
    assert_eq!(mine["components"][0]["component"]["id"], "dev-team");
    assert_eq!(mine["components"][0]["membership"]["member_id"], "alice");

    let removed = call(&router, &member, "org_member_remove", json!({"component_id": "dev-team", "member_id": "alice"})).await;
    assert!(removed.first_text().unwrap().starts_with("forbidden"));
    payload(&call(&router, &admin, "org_member_remove", json!({"component_id": "dev-team", "member_id": "alice"})).await);
    assert!(call(&router, &member, "dev-team__echo", json!({})).await.is_error());
}

/// Verifies the built-in clock tool reads the control plane clock.
#[tokio::test]
async fn clock_now_reads_plane_clock() {
    let router = router();
    let guest = token(&router, "guest");
    let now = payload(&call(&router, &guest, "clock_now", json!({})).await);
    assert_eq!(now["unix_millis"], 1_000);
}
