// toolspace-core/tests/organization.rs
// ============================================================================
// Module: Organization Tests
// Description: Component membership, authority ceilings, and proxy audit.
// ============================================================================
//! ## Overview
//! Builds a `dev-team` component over a small file tool catalog and checks
//! that proxy calls never exceed the component's authority.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Notify;
use toolspace_core::Authority;
use toolspace_core::ComponentId;
use toolspace_core::ComponentSpec;
use toolspace_core::MemberId;
use toolspace_core::OrganizationConfig;
use toolspace_core::OrganizationRegistry;
use toolspace_core::PermissionResolver;
use toolspace_core::ProxyAuditEvent;
use toolspace_core::ProxyAuditSink;
use toolspace_core::RoleName;
use toolspace_core::SystemClock;
use toolspace_core::Token;
use toolspace_core::Tool;
use toolspace_core::ToolCatalog;
use toolspace_core::ToolContext;
use toolspace_core::ToolDescriptor;
use toolspace_core::ToolExecutionError;
use toolspace_core::ToolName;
use toolspace_core::ToolResult;
use toolspace_core::runtime::MemberRole;
use toolspace_core::runtime::MembershipError;
use toolspace_core::runtime::OrganizationError;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProxyAuditEvent>>,
}

impl ProxyAuditSink for RecordingSink {
    fn record(&self, event: &ProxyAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct ContextEcho;

#[async_trait]
impl Tool for ContextEcho {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolExecutionError> {
        Ok(ToolResult::json(json!({
            "args": args,
            "role": ctx.role.as_str(),
            "component": ctx.component.as_ref().map(ToString::to_string),
        })))
    }
}

/// Signals when it starts and runs until released.
struct GateTool {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Tool for GateTool {
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolExecutionError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(ToolResult::json(args))
    }
}

struct Fixture {
    registry: OrganizationRegistry,
    audit: Arc<RecordingSink>,
}

fn fixture() -> Fixture {
    let catalog = Arc::new(ToolCatalog::new());
    catalog.register(ToolDescriptor::new("file_read", "read").with_groups(["base"]), Arc::new(ContextEcho)).unwrap();
    catalog
        .register(ToolDescriptor::new("file_write", "write").with_groups(["base"]).mutating(), Arc::new(ContextEcho))
        .unwrap();
    catalog.register(ToolDescriptor::new("shutdown", "ops").with_groups(["ops"]), Arc::new(ContextEcho)).unwrap();
    let audit = Arc::new(RecordingSink::default());
    let registry = OrganizationRegistry::new(
        OrganizationConfig::default(),
        catalog,
        Arc::new(PermissionResolver::with_defaults()),
        audit.clone(),
        Arc::new(SystemClock),
    );
    Fixture {
        registry,
        audit,
    }
}

fn dev_team(authority: Authority) -> ComponentSpec {
    ComponentSpec {
        id: ComponentId::new("dev-team"),
        name: "Dev Team".to_string(),
        description: String::new(),
        role: RoleName::new("user"),
        authority,
        max_members: Some(2),
    }
}

/// Verifies the allow-list ceiling: the listed tool runs, the other is
/// forbidden, and both outcomes are audited.
#[tokio::test]
async fn allow_list_bounds_proxy_execution() {
    let fx = fixture();
    let member = Token::new("tok_member");
    fx.registry.create_component(dev_team(Authority::with_visible_tools(["file_read"])), None).await.unwrap();
    fx.registry
        .add_member(&ComponentId::new("dev-team"), MemberId::new("alice"), member.clone(), MemberRole::Member)
        .await
        .unwrap();

    let ok = fx.registry.execute_collaboration_tool(&member, "dev-team__file_read", json!({"path": "a"}), None).await;
    assert!(!ok.is_error());
    let denied = fx.registry.execute_collaboration_tool(&member, "dev-team__file_write", json!({}), None).await;
    assert!(denied.is_error());
    assert!(denied.first_text().unwrap().starts_with("forbidden: component 'dev-team'"));

    let events = fx.audit.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert!(events[0].success);
    assert_eq!(events[0].member, Some(MemberId::new("alice")));
    assert!(!events[1].success);
    assert_eq!(events[1].tool, ToolName::new("file_write"));
    assert!(events.iter().all(|event| !event.token_fingerprint.contains("tok_member")));
}

/// Verifies the role ceiling and the admin requirement for mutating tools.
#[tokio::test]
async fn role_ceiling_and_member_roles() {
    let fx = fixture();
    let admin = Token::new("tok_admin");
    let member = Token::new("tok_member");
    fx.registry
        .create_component(dev_team(Authority::default()), Some((MemberId::new("root"), admin.clone())))
        .await
        .unwrap();
    fx.registry
        .add_member(&ComponentId::new("dev-team"), MemberId::new("bob"), member.clone(), MemberRole::Member)
        .await
        .unwrap();

    let result = fx.registry.execute_collaboration_tool(&admin, "dev-team__file_write", json!({}), None).await;
    assert!(!result.is_error());
    let ToolResult { content, .. } = result;
    assert!(serde_json::to_string(&content).unwrap().contains("dev-team"));
    assert!(fx.registry.execute_collaboration_tool(&member, "dev-team__file_write", json!({}), None).await.is_error());
    assert!(fx.registry.execute_collaboration_tool(&admin, "dev-team__shutdown", json!({}), None).await.is_error());

    let names: Vec<String> = fx
        .registry
        .get_all_collaboration_tools(&member)
        .await
        .unwrap()
        .into_iter()
        .map(|tool| tool.name.to_string())
        .collect();
    assert_eq!(names, vec!["dev-team__file_read"]);
}

/// Verifies non-members, malformed names, and unknown components.
#[tokio::test]
async fn unresolvable_calls_are_errors() {
    let fx = fixture();
    fx.registry.create_component(dev_team(Authority::default()), None).await.unwrap();
    let stranger = Token::new("tok_stranger");

    let not_member = fx.registry.execute_collaboration_tool(&stranger, "dev-team__file_read", json!({}), None).await;
    assert!(not_member.first_text().unwrap().starts_with("not_a_member"));
    let malformed = fx.registry.execute_collaboration_tool(&stranger, "__file_read", json!({}), None).await;
    assert!(malformed.first_text().unwrap().starts_with("malformed_name"));
    let missing = fx.registry.execute_collaboration_tool(&stranger, "ops-team__file_read", json!({}), None).await;
    assert!(missing.first_text().unwrap().starts_with("not_found: component"));
    assert_eq!(fx.audit.events.lock().unwrap().len(), 1);
}

/// Verifies membership limits, duplicates, and token removal.
#[tokio::test]
async fn membership_rules() {
    let fx = fixture();
    let id = ComponentId::new("dev-team");
    fx.registry.create_component(dev_team(Authority::default()), None).await.unwrap();
    fx.registry.add_member(&id, MemberId::new("a"), Token::new("t1"), MemberRole::Member).await.unwrap();
    assert!(matches!(
        fx.registry.add_member(&id, MemberId::new("b"), Token::new("t1"), MemberRole::Member).await,
        Err(OrganizationError::Membership(MembershipError::AlreadyMember { .. }))
    ));
    fx.registry.add_member(&id, MemberId::new("b"), Token::new("t2"), MemberRole::Member).await.unwrap();
    assert!(matches!(
        fx.registry.add_member(&id, MemberId::new("c"), Token::new("t3"), MemberRole::Member).await,
        Err(OrganizationError::Membership(MembershipError::Full { limit: 2, .. }))
    ));

    assert_eq!(fx.registry.remove_token_everywhere(&Token::new("t1")).await.unwrap(), 1);
    assert_eq!(fx.registry.stats().await.unwrap().memberships, 1);
    assert!(matches!(
        fx.registry.remove_member(&id, &MemberId::new("a")).await,
        Err(OrganizationError::Membership(MembershipError::NotFound { .. }))
    ));
}

/// Verifies component id validation and duplicate detection.
#[tokio::test]
async fn component_creation_rules() {
    let fx = fixture();
    let mut spec = dev_team(Authority::default());
    spec.id = ComponentId::new("task");
    assert!(matches!(fx.registry.create_component(spec, None).await, Err(OrganizationError::Invalid(_))));
    let mut spec = dev_team(Authority::default());
    spec.role = RoleName::new("nobody");
    assert!(matches!(fx.registry.create_component(spec, None).await, Err(OrganizationError::Invalid(_))));

    fx.registry.create_component(dev_team(Authority::default()), None).await.unwrap();
    assert!(matches!(
        fx.registry.create_component(dev_team(Authority::default()), None).await,
        Err(OrganizationError::AlreadyExists(_))
    ));
    assert_eq!(fx.registry.list_components().await.unwrap().len(), 1);
    assert!(fx.registry.delete_component(&ComponentId::new("dev-team")).unwrap());
}

/// Verifies member removal waits for an in-flight proxy call, which finishes
/// under the old membership, and refuses the member's next call.
#[tokio::test]
async fn removal_waits_for_in_flight_proxy_call() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let catalog = Arc::new(ToolCatalog::new());
    let gate = GateTool {
        started: Arc::clone(&started),
        release: Arc::clone(&release),
    };
    catalog.register(ToolDescriptor::new("slow_read", "read").with_groups(["base"]), Arc::new(gate)).unwrap();
    let audit = Arc::new(RecordingSink::default());
    let registry = Arc::new(OrganizationRegistry::new(
        OrganizationConfig::default(),
        catalog,
        Arc::new(PermissionResolver::with_defaults()),
        audit.clone(),
        Arc::new(SystemClock),
    ));
    let id = ComponentId::new("dev-team");
    let member = Token::new("tok_member");
    registry.create_component(dev_team(Authority::default()), None).await.unwrap();
    registry.add_member(&id, MemberId::new("alice"), member.clone(), MemberRole::Member).await.unwrap();

    let in_flight = tokio::spawn({
        let registry = Arc::clone(&registry);
        let member = member.clone();
        async move { registry.execute_collaboration_tool(&member, "dev-team__slow_read", json!({"n": 1}), None).await }
    });
    tokio::time::timeout(Duration::from_secs(5), started.notified()).await.unwrap();

    let removal = tokio::spawn({
        let registry = Arc::clone(&registry);
        let id = id.clone();
        async move { registry.remove_member(&id, &MemberId::new("alice")).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!removal.is_finished());

    release.notify_one();
    let result = in_flight.await.unwrap();
    assert!(!result.is_error());
    removal.await.unwrap().unwrap();

    let refused = registry.execute_collaboration_tool(&member, "dev-team__slow_read", json!({}), None).await;
    assert!(refused.first_text().unwrap().starts_with("not_a_member"));

    let events = audit.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert!(events[0].success);
    assert_eq!(events[0].member, Some(MemberId::new("alice")));
    assert!(!events[1].success);
}
