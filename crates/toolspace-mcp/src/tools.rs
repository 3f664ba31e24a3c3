// toolspace-mcp/src/tools.rs
// ============================================================================
// Module: MCP Tool Router
// Description: Tool routing for the Toolspace MCP server.
// Purpose: Expose thin wrappers over the Toolspace control plane.
// Dependencies: toolspace-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The tool router lists and dispatches tools for an authenticated token.
//! Catalog and collaboration tools go straight to
//! [`toolspace_core::ControlPlane::call_tool`]; reserved system tools are
//! decoded here and mapped onto the matching control plane operation.
//!
//! ## Invariants
//! - Tool calls never return a transport error; denials and failures are
//!   `isError` results.
//! - System tools pass the same visibility check as catalog tools before
//!   their arguments are decoded.
//! - Token values are only returned by `admin_token_create`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use toolspace_core::AccessError;
use toolspace_core::Authority;
use toolspace_core::ComponentId;
use toolspace_core::ComponentSpec;
use toolspace_core::ControlPlane;
use toolspace_core::ExecutorId;
use toolspace_core::ExecutorRules;
use toolspace_core::MemberId;
use toolspace_core::MessageId;
use toolspace_core::MessagePriority;
use toolspace_core::MessageType;
use toolspace_core::PublishRequest;
use toolspace_core::RoleName;
use toolspace_core::Session;
use toolspace_core::TaskId;
use toolspace_core::TaskStatus;
use toolspace_core::TaskSubmission;
use toolspace_core::Token;
use toolspace_core::Tool;
use toolspace_core::ToolDescriptor;
use toolspace_core::ToolName;
use toolspace_core::ToolResult;
use toolspace_core::runtime::MemberRole;

use crate::builtin::ClockNowTool;
use crate::builtin::EchoTool;
use crate::system_tools::SystemTool;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Wait applied when `task_wait` omits a timeout.
const DEFAULT_WAIT_MS: u64 = 30_000;
/// Upper bound on a single `task_wait`.
const MAX_WAIT_MS: u64 = 300_000;
/// Member id given to a component creator that does not pick one.
const DEFAULT_OWNER_ID: &str = "owner";

// ============================================================================
// SECTION: Tool Router
// ============================================================================

/// Tool router for MCP requests.
#[derive(Clone)]
pub struct ToolRouter {
    /// Shared control plane.
    control_plane: Arc<ControlPlane>,
}

impl ToolRouter {
    /// Creates a router over `control_plane`.
    #[must_use]
    pub const fn new(control_plane: Arc<ControlPlane>) -> Self {
        Self {
            control_plane,
        }
    }

    /// Returns the control plane.
    #[must_use]
    pub const fn control_plane(&self) -> &Arc<ControlPlane> {
        &self.control_plane
    }

    /// Registers a catalog tool, rejecting reserved system names.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for reserved, duplicate, or malformed names.
    pub fn register_tool(&self, descriptor: ToolDescriptor, handler: Arc<dyn Tool>) -> Result<(), ToolError> {
        if SystemTool::parse(descriptor.name.as_str()).is_some() {
            return Err(ToolError::InvalidParams(format!("tool name '{}' is reserved", descriptor.name)));
        }
        Ok(self.control_plane.register_tool(descriptor, handler)?)
    }

    /// Registers `echo` and `clock_now`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when either name is already registered.
    pub fn register_builtin_tools(&self) -> Result<(), ToolError> {
        self.register_tool(EchoTool::descriptor(), Arc::new(EchoTool))?;
        let clock = Arc::clone(self.control_plane.clock());
        self.register_tool(ClockNowTool::descriptor(), Arc::new(ClockNowTool::new(clock)))
    }

    /// Lists the catalog, system, and collaboration tools visible to `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when authentication fails.
    pub async fn list_tools(&self, token: &Token) -> Result<Vec<ToolDescriptor>, ToolError> {
        let mut tools = self.control_plane.list_tools(token).await?;
        let session = self.control_plane.authenticate(token)?;
        let system = SystemTool::all()
            .iter()
            .map(|tool| tool.descriptor())
            .filter(|descriptor| self.control_plane.is_visible(&session, descriptor));
        tools.extend(system);
        Ok(tools)
    }

    /// Handles a tool call by name. Failures become `isError` results.
    pub async fn handle_tool_call(
        &self,
        token: &Token,
        name: &str,
        arguments: Value,
        request_id: Option<String>,
    ) -> ToolResult {
        let Some(tool) = SystemTool::parse(name) else {
            return self.control_plane.call_tool(token, name, arguments, request_id).await;
        };
        match self.call_system_tool(token, tool, arguments, request_id).await {
            Ok(value) => ToolResult::json(value),
            Err(err) => err.to_tool_result(),
        }
    }

    /// Authorizes and dispatches one system tool.
    async fn call_system_tool(
        &self,
        token: &Token,
        tool: SystemTool,
        arguments: Value,
        request_id: Option<String>,
    ) -> Result<Value, AccessError> {
        let session = self.control_plane.authenticate(token)?;
        self.control_plane.authorize(&session, &tool.descriptor())?;
        match tool.group() {
            crate::system_tools::ADMIN_GROUP => self.handle_admin(tool, arguments).await,
            crate::system_tools::MESSAGING_GROUP => self.handle_message(&session, tool, arguments),
            crate::system_tools::TASKS_GROUP => self.handle_task(&session, tool, arguments, request_id).await,
            _ => self.handle_org(&session, tool, arguments).await,
        }
    }

    // ------------------------------------------------------------------------
    // Admin tools
    // ------------------------------------------------------------------------

    /// Handles `admin_*` tools.
    async fn handle_admin(&self, tool: SystemTool, arguments: Value) -> Result<Value, AccessError> {
        let plane = &self.control_plane;
        match tool {
            SystemTool::AdminTokenCreate => {
                let request = decode::<TokenCreateRequest>(arguments)?;
                let record = plane.create_token(
                    request.role,
                    request.description,
                    request.ttl_secs.map(secs_to_millis),
                )?;
                Ok(json!({ "token": record.token.as_str(), "record": to_json(&record)? }))
            }
            SystemTool::AdminTokenValidate => {
                let request = decode::<TokenRequest>(arguments)?;
                match plane.validate_token(&request.token) {
                    Ok(record) => Ok(json!({ "valid": true, "record": to_json(&record)? })),
                    Err(AccessError::TokenInvalid {
                        reason,
                    }) => Ok(json!({ "valid": false, "reason": reason })),
                    Err(err) => Err(err),
                }
            }
            SystemTool::AdminTokenDeactivate => {
                let request = decode::<TokenRequest>(arguments)?;
                Ok(json!({ "updated": plane.deactivate_token(&request.token)? }))
            }
            SystemTool::AdminTokenActivate => {
                let request = decode::<TokenRequest>(arguments)?;
                Ok(json!({ "updated": plane.activate_token(&request.token)? }))
            }
            SystemTool::AdminTokenRenew => {
                let request = decode::<TokenRenewRequest>(arguments)?;
                let renewed = plane.renew_token(&request.token, request.ttl_secs.map(secs_to_millis))?;
                Ok(json!({ "updated": renewed }))
            }
            SystemTool::AdminTokenDelete => {
                let request = decode::<TokenRequest>(arguments)?;
                Ok(json!({ "deleted": plane.delete_token(&request.token).await? }))
            }
            SystemTool::AdminTokenCleanup => {
                decode::<EmptyRequest>(arguments)?;
                Ok(json!({ "deactivated": plane.cleanup_expired_tokens()? }))
            }
            SystemTool::AdminTokenStats => {
                decode::<EmptyRequest>(arguments)?;
                to_json(&plane.token_stats()?)
            }
            SystemTool::AdminVisibleToolsGet => {
                let request = decode::<TokenRequest>(arguments)?;
                Ok(json!({ "tools": plane.get_visible_tools(&request.token)? }))
            }
            SystemTool::AdminVisibleToolsSet => {
                let request = decode::<VisibleToolsSetRequest>(arguments)?;
                plane.set_visible_tools(&request.token, request.tools.clone())?;
                Ok(json!({ "tools": request.tools }))
            }
            SystemTool::AdminExecutorRulesGet => {
                let request = decode::<ExecutorRulesGetRequest>(arguments)?;
                let rules = plane.get_executor_rules(&request.token, &request.executor)?;
                Ok(json!({ "executor": request.executor, "rules": to_json(&rules)? }))
            }
            SystemTool::AdminExecutorRulesSet => {
                let request = decode::<ExecutorRulesSetRequest>(arguments)?;
                let rules = to_json(&request.rules)?;
                plane.set_executor_rules(&request.token, request.executor.clone(), request.rules)?;
                Ok(json!({ "executor": request.executor, "rules": rules }))
            }
            SystemTool::AdminSpaceStats => {
                decode::<EmptyRequest>(arguments)?;
                to_json(&plane.space_stats()?)
            }
            SystemTool::AdminSpaceCleanup => {
                let request = decode::<TokenRequest>(arguments)?;
                to_json(&plane.cleanup_space(&request.token)?)
            }
            SystemTool::AdminSpaceActivate => {
                let request = decode::<TokenRequest>(arguments)?;
                Ok(json!({ "activated": plane.activate_space(&request.token)? }))
            }
            _ => Err(unrouted(tool)),
        }
    }

    // ------------------------------------------------------------------------
    // Message tools
    // ------------------------------------------------------------------------

    /// Handles `message_*` tools.
    fn handle_message(&self, session: &Session, tool: SystemTool, arguments: Value) -> Result<Value, AccessError> {
        let plane = &self.control_plane;
        let token = &session.token;
        match tool {
            SystemTool::MessagePublish => {
                let request = decode::<MessagePublishRequest>(arguments)?;
                let message = plane.publish_message(
                    token,
                    PublishRequest {
                        message_type: request.message_type.unwrap_or(MessageType::Notification),
                        source: token.clone(),
                        destination: request.destination,
                        content: request.content,
                        priority: request.priority.unwrap_or_default(),
                        ttl_ms: request.ttl_secs.map(secs_to_millis),
                        metadata: request.metadata,
                    },
                )?;
                to_json(&message)
            }
            SystemTool::MessageReceive => {
                let request = decode::<MessageReceiveRequest>(arguments)?;
                Ok(json!({ "messages": to_json(&plane.receive_messages(token, request.max)?)? }))
            }
            SystemTool::MessagePending => {
                decode::<EmptyRequest>(arguments)?;
                Ok(json!({ "messages": to_json(&plane.pending_messages(token)?)? }))
            }
            SystemTool::MessageReply => {
                let request = decode::<MessageReplyRequest>(arguments)?;
                to_json(&plane.reply_message(token, &request.message_id, request.content, request.priority)?)
            }
            SystemTool::MessageStats => {
                decode::<EmptyRequest>(arguments)?;
                to_json(&plane.message_stats(token)?)
            }
            _ => Err(unrouted(tool)),
        }
    }

    // ------------------------------------------------------------------------
    // Task tools
    // ------------------------------------------------------------------------

    /// Handles `task_*` tools.
    async fn handle_task(
        &self,
        session: &Session,
        tool: SystemTool,
        arguments: Value,
        request_id: Option<String>,
    ) -> Result<Value, AccessError> {
        let plane = &self.control_plane;
        let token = &session.token;
        match tool {
            SystemTool::TaskSubmit => {
                let request = decode::<TaskSubmitRequest>(arguments)?;
                let task = plane.submit_task(
                    token,
                    TaskSubmission {
                        tool: request.tool,
                        args: request.arguments.unwrap_or_else(|| json!({})),
                        request_id: request.request_id.or(request_id),
                        metadata: request.metadata,
                    },
                )?;
                to_json(&task)
            }
            SystemTool::TaskStatus => {
                let request = decode::<TaskRequest>(arguments)?;
                to_json(&plane.get_task(token, &request.task_id)?)
            }
            SystemTool::TaskWait => {
                let request = decode::<TaskWaitRequest>(arguments)?;
                let timeout_ms = request.timeout_ms.unwrap_or(DEFAULT_WAIT_MS).min(MAX_WAIT_MS);
                let task = plane.wait_task(token, &request.task_id, Duration::from_millis(timeout_ms)).await?;
                to_json(&task)
            }
            SystemTool::TaskCancel => {
                let request = decode::<TaskRequest>(arguments)?;
                to_json(&plane.cancel_task(token, &request.task_id)?)
            }
            SystemTool::TaskRetry => {
                let request = decode::<TaskRequest>(arguments)?;
                to_json(&plane.retry_task(token, &request.task_id)?)
            }
            SystemTool::TaskDelete => {
                let request = decode::<TaskRequest>(arguments)?;
                to_json(&plane.delete_task(token, &request.task_id)?)
            }
            SystemTool::TaskList => {
                let request = decode::<TaskListRequest>(arguments)?;
                Ok(json!({ "tasks": to_json(&plane.list_tasks(token, request.status)?)? }))
            }
            SystemTool::TaskStats => {
                decode::<EmptyRequest>(arguments)?;
                to_json(&plane.task_stats(token)?)
            }
            _ => Err(unrouted(tool)),
        }
    }

    // ------------------------------------------------------------------------
    // Organization tools
    // ------------------------------------------------------------------------

    /// Handles `org_*` tools.
    async fn handle_org(&self, session: &Session, tool: SystemTool, arguments: Value) -> Result<Value, AccessError> {
        let plane = &self.control_plane;
        let token = &session.token;
        match tool {
            SystemTool::OrgComponentCreate => {
                let request = decode::<ComponentCreateRequest>(arguments)?;
                let spec = ComponentSpec {
                    id: request.id,
                    name: request.name,
                    description: request.description,
                    role: request.role.unwrap_or_else(|| session.role().clone()),
                    authority: Authority {
                        visible_tools: request.visible_tools,
                        rules: request.executor_rules,
                    },
                    max_members: request.max_members,
                };
                let owner = request.member_id.unwrap_or_else(|| MemberId::new(DEFAULT_OWNER_ID));
                to_json(&plane.create_component(token, spec, owner).await?)
            }
            SystemTool::OrgComponentDelete => {
                let request = decode::<ComponentRequest>(arguments)?;
                Ok(json!({ "deleted": plane.delete_component(token, &request.component_id).await? }))
            }
            SystemTool::OrgComponentList => {
                decode::<EmptyRequest>(arguments)?;
                Ok(json!({ "components": to_json(&plane.list_components(token).await?)? }))
            }
            SystemTool::OrgMemberAdd => {
                let request = decode::<MemberAddRequest>(arguments)?;
                let member = plane
                    .add_member(
                        token,
                        &request.component_id,
                        request.member_id,
                        request.token,
                        request.role.unwrap_or_default(),
                    )
                    .await?;
                to_json(&member)
            }
            SystemTool::OrgMemberRemove => {
                let request = decode::<MemberRemoveRequest>(arguments)?;
                plane.remove_member(token, &request.component_id, &request.member_id).await?;
                Ok(json!({ "removed": true }))
            }
            SystemTool::OrgMyComponents => {
                decode::<EmptyRequest>(arguments)?;
                let memberships = plane
                    .my_components(token)
                    .await?
                    .into_iter()
                    .map(|(component, membership)| {
                        Ok(json!({ "component": to_json(&component)?, "membership": to_json(&membership)? }))
                    })
                    .collect::<Result<Vec<Value>, AccessError>>()?;
                Ok(json!({ "components": memberships }))
            }
            _ => Err(unrouted(tool)),
        }
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Arguments for tools that take no input.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyRequest {}

/// Arguments naming a target token.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenRequest {
    /// Target token.
    token: Token,
}

/// `admin_token_create` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenCreateRequest {
    /// Role for the new token.
    role: RoleName,
    /// Operator description.
    #[serde(default)]
    description: String,
    /// Lifetime in seconds.
    #[serde(default)]
    ttl_secs: Option<u64>,
}

/// `admin_token_renew` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenRenewRequest {
    /// Target token.
    token: Token,
    /// New lifetime in seconds.
    #[serde(default)]
    ttl_secs: Option<u64>,
}

/// `admin_visible_tools_set` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VisibleToolsSetRequest {
    /// Target token.
    token: Token,
    /// New allow-list.
    tools: BTreeSet<ToolName>,
}

/// `admin_executor_rules_get` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecutorRulesGetRequest {
    /// Target token.
    token: Token,
    /// Executor identifier.
    executor: ExecutorId,
}

/// `admin_executor_rules_set` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecutorRulesSetRequest {
    /// Target token.
    token: Token,
    /// Executor identifier.
    executor: ExecutorId,
    /// New rules.
    rules: ExecutorRules,
}

/// `message_publish` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessagePublishRequest {
    /// Recipient token.
    destination: Token,
    /// Payload.
    content: Value,
    /// Message kind.
    #[serde(default, rename = "type")]
    message_type: Option<MessageType>,
    /// Delivery priority.
    #[serde(default)]
    priority: Option<MessagePriority>,
    /// Lifetime in seconds.
    #[serde(default)]
    ttl_secs: Option<u64>,
    /// Metadata object.
    #[serde(default)]
    metadata: Option<Value>,
}

/// `message_receive` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageReceiveRequest {
    /// Maximum messages to take.
    #[serde(default)]
    max: Option<usize>,
}

/// `message_reply` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageReplyRequest {
    /// Message being answered.
    message_id: MessageId,
    /// Reply payload.
    content: Value,
    /// Reply priority.
    #[serde(default)]
    priority: Option<MessagePriority>,
}

/// `task_submit` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskSubmitRequest {
    /// Tool to run.
    tool: ToolName,
    /// Tool arguments.
    #[serde(default)]
    arguments: Option<Value>,
    /// Request identifier.
    #[serde(default)]
    request_id: Option<String>,
    /// Metadata object.
    #[serde(default)]
    metadata: Option<Value>,
}

/// Arguments naming a task.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskRequest {
    /// Task identifier.
    task_id: TaskId,
}

/// `task_wait` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskWaitRequest {
    /// Task identifier.
    task_id: TaskId,
    /// Wait bound in milliseconds.
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// `task_list` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskListRequest {
    /// Status filter.
    #[serde(default)]
    status: Option<TaskStatus>,
}

/// `org_component_create` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentCreateRequest {
    /// Component identifier.
    id: ComponentId,
    /// Display name.
    name: String,
    /// Description.
    #[serde(default)]
    description: String,
    /// Component role; the caller's role when absent.
    #[serde(default)]
    role: Option<RoleName>,
    /// Component allow-list.
    #[serde(default)]
    visible_tools: BTreeSet<ToolName>,
    /// Component executor rules.
    #[serde(default)]
    executor_rules: BTreeMap<ExecutorId, ExecutorRules>,
    /// Member limit.
    #[serde(default)]
    max_members: Option<usize>,
    /// Creator's member id.
    #[serde(default)]
    member_id: Option<MemberId>,
}

/// Arguments naming a component.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentRequest {
    /// Component identifier.
    component_id: ComponentId,
}

/// `org_member_add` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemberAddRequest {
    /// Component identifier.
    component_id: ComponentId,
    /// New member identifier.
    member_id: MemberId,
    /// New member token.
    token: Token,
    /// Intra-component role.
    #[serde(default)]
    role: Option<MemberRole>,
}

/// `org_member_remove` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemberRemoveRequest {
    /// Component identifier.
    component_id: ComponentId,
    /// Member identifier.
    member_id: MemberId,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tool router errors surfaced to the transport.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Invalid registration or request parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    /// Control plane rejection.
    #[error(transparent)]
    Access(#[from] AccessError),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes tool arguments; a null payload is treated as an empty object.
fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, AccessError> {
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload).map_err(|err| AccessError::InvalidArgument(err.to_string()))
}

/// Serializes a response payload.
fn to_json<T: Serialize>(value: &T) -> Result<Value, AccessError> {
    serde_json::to_value(value).map_err(|_| AccessError::Internal("serialization failed".to_string()))
}

/// Converts seconds to milliseconds, saturating.
const fn secs_to_millis(secs: u64) -> u64 {
    secs.saturating_mul(1_000)
}

/// Error for a system tool dispatched to the wrong family handler.
fn unrouted(tool: SystemTool) -> AccessError {
    AccessError::Internal(format!("system tool '{}' was not routed", tool.as_str()))
}
