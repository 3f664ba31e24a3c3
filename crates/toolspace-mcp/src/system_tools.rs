// toolspace-mcp/src/system_tools.rs
// ============================================================================
// Module: System Tool Family
// Description: Reserved router-level tool names and their descriptors.
// Purpose: Give admin, message, task, and org operations tool identities.
// Dependencies: toolspace-core, serde_json
// ============================================================================

//! ## Overview
//! System tools are not catalog entries; the router dispatches them to the
//! control plane directly. Each carries a permission group so visibility is
//! decided by the same role and allow-list rules as catalog tools. Their
//! names are reserved and cannot be registered in the catalog.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;
use toolspace_core::ToolDescriptor;

// ============================================================================
// SECTION: Groups
// ============================================================================

/// Group granting token and space administration.
pub const ADMIN_GROUP: &str = "admin";
/// Group granting the message bus tools.
pub const MESSAGING_GROUP: &str = "messaging";
/// Group granting the task tools.
pub const TASKS_GROUP: &str = "tasks";
/// Group granting the organization tools.
pub const ORGANIZATION_GROUP: &str = "organization";

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Reserved system tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemTool {
    /// Create a token.
    AdminTokenCreate,
    /// Check a token without side effects.
    AdminTokenValidate,
    /// Deactivate a token.
    AdminTokenDeactivate,
    /// Reactivate a token.
    AdminTokenActivate,
    /// Renew a token's expiry.
    AdminTokenRenew,
    /// Delete a token and everything it owns.
    AdminTokenDelete,
    /// Deactivate expired tokens.
    AdminTokenCleanup,
    /// Token counts.
    AdminTokenStats,
    /// Read a token's visible-tool allow-list.
    AdminVisibleToolsGet,
    /// Replace a token's visible-tool allow-list.
    AdminVisibleToolsSet,
    /// Read a token's executor rules.
    AdminExecutorRulesGet,
    /// Set a token's executor rules.
    AdminExecutorRulesSet,
    /// User-space counts.
    AdminSpaceStats,
    /// Soft-clean a user-space.
    AdminSpaceCleanup,
    /// Reactivate a user-space.
    AdminSpaceActivate,
    /// Publish a message.
    MessagePublish,
    /// Receive pending messages.
    MessageReceive,
    /// Peek at pending messages.
    MessagePending,
    /// Reply to a received message.
    MessageReply,
    /// Message counts.
    MessageStats,
    /// Submit a background task.
    TaskSubmit,
    /// Read a task.
    TaskStatus,
    /// Wait for a task.
    TaskWait,
    /// Cancel a task.
    TaskCancel,
    /// Retry a failed or cancelled task.
    TaskRetry,
    /// Delete a finished task.
    TaskDelete,
    /// List tasks.
    TaskList,
    /// Task counts.
    TaskStats,
    /// Create a collaboration component.
    OrgComponentCreate,
    /// Delete a collaboration component.
    OrgComponentDelete,
    /// List collaboration components.
    OrgComponentList,
    /// Add a member.
    OrgMemberAdd,
    /// Remove a member.
    OrgMemberRemove,
    /// List the caller's components.
    OrgMyComponents,
}

impl SystemTool {
    /// Returns the canonical tool name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdminTokenCreate => "admin_token_create",
            Self::AdminTokenValidate => "admin_token_validate",
            Self::AdminTokenDeactivate => "admin_token_deactivate",
            Self::AdminTokenActivate => "admin_token_activate",
            Self::AdminTokenRenew => "admin_token_renew",
            Self::AdminTokenDelete => "admin_token_delete",
            Self::AdminTokenCleanup => "admin_token_cleanup",
            Self::AdminTokenStats => "admin_token_stats",
            Self::AdminVisibleToolsGet => "admin_visible_tools_get",
            Self::AdminVisibleToolsSet => "admin_visible_tools_set",
            Self::AdminExecutorRulesGet => "admin_executor_rules_get",
            Self::AdminExecutorRulesSet => "admin_executor_rules_set",
            Self::AdminSpaceStats => "admin_space_stats",
            Self::AdminSpaceCleanup => "admin_space_cleanup",
            Self::AdminSpaceActivate => "admin_space_activate",
            Self::MessagePublish => "message_publish",
            Self::MessageReceive => "message_receive",
            Self::MessagePending => "message_pending",
            Self::MessageReply => "message_reply",
            Self::MessageStats => "message_stats",
            Self::TaskSubmit => "task_submit",
            Self::TaskStatus => "task_status",
            Self::TaskWait => "task_wait",
            Self::TaskCancel => "task_cancel",
            Self::TaskRetry => "task_retry",
            Self::TaskDelete => "task_delete",
            Self::TaskList => "task_list",
            Self::TaskStats => "task_stats",
            Self::OrgComponentCreate => "org_component_create",
            Self::OrgComponentDelete => "org_component_delete",
            Self::OrgComponentList => "org_component_list",
            Self::OrgMemberAdd => "org_member_add",
            Self::OrgMemberRemove => "org_member_remove",
            Self::OrgMyComponents => "org_my_components",
        }
    }

    /// Returns every system tool in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::AdminTokenCreate,
            Self::AdminTokenValidate,
            Self::AdminTokenDeactivate,
            Self::AdminTokenActivate,
            Self::AdminTokenRenew,
            Self::AdminTokenDelete,
            Self::AdminTokenCleanup,
            Self::AdminTokenStats,
            Self::AdminVisibleToolsGet,
            Self::AdminVisibleToolsSet,
            Self::AdminExecutorRulesGet,
            Self::AdminExecutorRulesSet,
            Self::AdminSpaceStats,
            Self::AdminSpaceCleanup,
            Self::AdminSpaceActivate,
            Self::MessagePublish,
            Self::MessageReceive,
            Self::MessagePending,
            Self::MessageReply,
            Self::MessageStats,
            Self::TaskSubmit,
            Self::TaskStatus,
            Self::TaskWait,
            Self::TaskCancel,
            Self::TaskRetry,
            Self::TaskDelete,
            Self::TaskList,
            Self::TaskStats,
            Self::OrgComponentCreate,
            Self::OrgComponentDelete,
            Self::OrgComponentList,
            Self::OrgMemberAdd,
            Self::OrgMemberRemove,
            Self::OrgMyComponents,
        ]
    }

    /// Parses a system tool from its name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|tool| tool.as_str() == name)
    }

    /// Returns the permission group granting the tool.
    #[must_use]
    pub const fn group(self) -> &'static str {
        match self {
            Self::AdminTokenCreate
            | Self::AdminTokenValidate
            | Self::AdminTokenDeactivate
            | Self::AdminTokenActivate
            | Self::AdminTokenRenew
            | Self::AdminTokenDelete
            | Self::AdminTokenCleanup
            | Self::AdminTokenStats
            | Self::AdminVisibleToolsGet
            | Self::AdminVisibleToolsSet
            | Self::AdminExecutorRulesGet
            | Self::AdminExecutorRulesSet
            | Self::AdminSpaceStats
            | Self::AdminSpaceCleanup
            | Self::AdminSpaceActivate => ADMIN_GROUP,
            Self::MessagePublish
            | Self::MessageReceive
            | Self::MessagePending
            | Self::MessageReply
            | Self::MessageStats => MESSAGING_GROUP,
            Self::TaskSubmit
            | Self::TaskStatus
            | Self::TaskWait
            | Self::TaskCancel
            | Self::TaskRetry
            | Self::TaskDelete
            | Self::TaskList
            | Self::TaskStats => TASKS_GROUP,
            Self::OrgComponentCreate
            | Self::OrgComponentDelete
            | Self::OrgComponentList
            | Self::OrgMemberAdd
            | Self::OrgMemberRemove
            | Self::OrgMyComponents => ORGANIZATION_GROUP,
        }
    }

    /// Returns the human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AdminTokenCreate => "Create a token bound to a role. The token value is returned once.",
            Self::AdminTokenValidate => "Report whether a token is valid and why not.",
            Self::AdminTokenDeactivate => "Deactivate a token.",
            Self::AdminTokenActivate => "Reactivate a token.",
            Self::AdminTokenRenew => "Reset a token's expiry from now.",
            Self::AdminTokenDelete => "Delete a token with its user-space, messages, and memberships.",
            Self::AdminTokenCleanup => "Deactivate every expired token.",
            Self::AdminTokenStats => "Return token counts.",
            Self::AdminVisibleToolsGet => "Return a token's visible-tool allow-list.",
            Self::AdminVisibleToolsSet => "Replace a token's visible-tool allow-list; empty defers to the role.",
            Self::AdminExecutorRulesGet => "Return a token's rules for one executor.",
            Self::AdminExecutorRulesSet => "Set a token's rules for one executor.",
            Self::AdminSpaceStats => "Return user-space counts.",
            Self::AdminSpaceCleanup => "Deactivate a user-space, cancel its tasks, and purge its messages.",
            Self::AdminSpaceActivate => "Reactivate a cleaned-up user-space.",
            Self::MessagePublish => "Send a message to another token.",
            Self::MessageReceive => "Take pending messages, highest priority first.",
            Self::MessagePending => "Read pending messages without taking them.",
            Self::MessageReply => "Reply to a message you received.",
            Self::MessageStats => "Return your message counts.",
            Self::TaskSubmit => "Run a tool in the background and return its task.",
            Self::TaskStatus => "Return one of your tasks.",
            Self::TaskWait => "Wait for a task to finish, up to a timeout.",
            Self::TaskCancel => "Cancel a pending or running task.",
            Self::TaskRetry => "Re-run a failed or cancelled task as a new task.",
            Self::TaskDelete => "Delete a finished task.",
            Self::TaskList => "List your tasks, optionally by status.",
            Self::TaskStats => "Return your task counts.",
            Self::OrgComponentCreate => "Create a collaboration component with you as its admin.",
            Self::OrgComponentDelete => "Delete a collaboration component.",
            Self::OrgComponentList => "List collaboration components.",
            Self::OrgMemberAdd => "Add a token to a collaboration component.",
            Self::OrgMemberRemove => "Remove a member from a collaboration component.",
            Self::OrgMyComponents => "List the components you belong to.",
        }
    }

    /// Returns true for tools that change state.
    #[must_use]
    pub const fn mutates(self) -> bool {
        !matches!(
            self,
            Self::AdminTokenValidate
                | Self::AdminTokenStats
                | Self::AdminVisibleToolsGet
                | Self::AdminExecutorRulesGet
                | Self::AdminSpaceStats
                | Self::MessagePending
                | Self::MessageStats
                | Self::TaskStatus
                | Self::TaskWait
                | Self::TaskList
                | Self::TaskStats
                | Self::OrgComponentList
                | Self::OrgMyComponents
        )
    }

    /// Returns the JSON schema of the tool arguments.
    #[must_use]
    pub fn input_schema(self) -> Value {
        let token = json!({ "type": "string", "description": "Target token." });
        let task_id = json!({ "type": "string" });
        let component_id = json!({ "type": "string", "pattern": "^[A-Za-z0-9-]+$" });
        let priority = json!({ "type": "string", "enum": ["low", "normal", "high", "urgent"] });
        match self {
            Self::AdminTokenCreate => object(
                json!({
                    "role": { "type": "string" },
                    "description": { "type": "string" },
                    "ttl_secs": { "type": "integer", "minimum": 1 }
                }),
                &["role"],
            ),
            Self::AdminTokenRenew => object(
                json!({ "token": token, "ttl_secs": { "type": "integer", "minimum": 1 } }),
                &["token"],
            ),
            Self::AdminTokenValidate
            | Self::AdminTokenDeactivate
            | Self::AdminTokenActivate
            | Self::AdminTokenDelete
            | Self::AdminVisibleToolsGet
            | Self::AdminSpaceCleanup
            | Self::AdminSpaceActivate => object(json!({ "token": token }), &["token"]),
            Self::AdminVisibleToolsSet => object(
                json!({
                    "token": token,
                    "tools": { "type": "array", "items": { "type": "string" } }
                }),
                &["token", "tools"],
            ),
            Self::AdminExecutorRulesGet => object(
                json!({ "token": token, "executor": { "type": "string" } }),
                &["token", "executor"],
            ),
            Self::AdminExecutorRulesSet => object(
                json!({
                    "token": token,
                    "executor": { "type": "string" },
                    "rules": {
                        "type": "object",
                        "properties": {
                            "enabled": { "type": "boolean" },
                            "allow": { "type": "array", "items": { "type": "string" } },
                            "deny": { "type": "array", "items": { "type": "string" } },
                            "timeout_ms": { "type": "integer", "minimum": 1 },
                            "settings": { "type": "object" }
                        }
                    }
                }),
                &["token", "executor", "rules"],
            ),
            Self::AdminTokenCleanup
            | Self::AdminTokenStats
            | Self::AdminSpaceStats
            | Self::MessagePending
            | Self::MessageStats
            | Self::TaskStats
            | Self::OrgComponentList
            | Self::OrgMyComponents => object(json!({}), &[]),
            Self::MessagePublish => object(
                json!({
                    "destination": { "type": "string", "description": "Recipient token." },
                    "content": {},
                    "type": { "type": "string", "enum": ["request", "response", "notification", "event"] },
                    "priority": priority,
                    "ttl_secs": { "type": "integer", "minimum": 1 },
                    "metadata": { "type": "object" }
                }),
                &["destination", "content"],
            ),
            Self::MessageReceive => object(json!({ "max": { "type": "integer", "minimum": 1 } }), &[]),
            Self::MessageReply => object(
                json!({ "message_id": { "type": "string" }, "content": {}, "priority": priority }),
                &["message_id", "content"],
            ),
            Self::TaskSubmit => object(
                json!({
                    "tool": { "type": "string" },
                    "arguments": { "type": "object" },
                    "request_id": { "type": "string" },
                    "metadata": { "type": "object" }
                }),
                &["tool"],
            ),
            Self::TaskStatus | Self::TaskCancel | Self::TaskRetry | Self::TaskDelete => {
                object(json!({ "task_id": task_id }), &["task_id"])
            }
            Self::TaskWait => object(
                json!({ "task_id": task_id, "timeout_ms": { "type": "integer", "minimum": 0 } }),
                &["task_id"],
            ),
            Self::TaskList => object(
                json!({
                    "status": {
                        "type": "string",
                        "enum": ["pending", "running", "completed", "failed", "cancelled"]
                    }
                }),
                &[],
            ),
            Self::OrgComponentCreate => object(
                json!({
                    "id": component_id,
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "role": { "type": "string" },
                    "visible_tools": { "type": "array", "items": { "type": "string" } },
                    "executor_rules": { "type": "object" },
                    "max_members": { "type": "integer", "minimum": 1 },
                    "member_id": { "type": "string" }
                }),
                &["id", "name"],
            ),
            Self::OrgComponentDelete => object(json!({ "component_id": component_id }), &["component_id"]),
            Self::OrgMemberAdd => object(
                json!({
                    "component_id": component_id,
                    "member_id": { "type": "string" },
                    "token": token,
                    "role": { "type": "string", "enum": ["admin", "member"] }
                }),
                &["component_id", "member_id", "token"],
            ),
            Self::OrgMemberRemove => object(
                json!({ "component_id": component_id, "member_id": { "type": "string" } }),
                &["component_id", "member_id"],
            ),
        }
    }

    /// Returns the descriptor used for visibility checks and listings.
    #[must_use]
    pub fn descriptor(self) -> ToolDescriptor {
        let descriptor = ToolDescriptor::new(self.as_str(), self.description())
            .with_groups([self.group()])
            .with_input_schema(self.input_schema());
        if self.mutates() { descriptor.mutating() } else { descriptor }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a closed object schema.
fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
