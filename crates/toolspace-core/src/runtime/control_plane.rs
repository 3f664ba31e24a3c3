// toolspace-core/src/runtime/control_plane.rs
// ============================================================================
// Module: Control Plane
// Description: Authenticated entry point over tokens, spaces, tools, and
//              organizations.
// Purpose: Turn a token plus a tool call into a permission-checked result.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The control plane is built once from [`ControlPlaneConfig`] and shared by
//! `Arc`. Every caller-facing operation starts by authenticating the token,
//! which also materializes the caller's user-space. Direct tool calls are
//! checked against the space's visibility and executor rules; names carrying
//! a component prefix are routed to the organization registry.
//!
//! Security posture: [`ControlPlane::call_tool`] never returns an error; every
//! failure is rendered as an `isError` result so transports cannot leak
//! partial state. Admin operations perform no caller checks of their own and
//! must be gated by the caller's role at the surface that exposes them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::authority::ExecutorRules;
use crate::core::errors::AccessError;
use crate::core::errors::TokenInvalidReason;
use crate::core::hashing::token_fingerprint;
use crate::core::identifiers::ComponentId;
use crate::core::identifiers::ExecutorId;
use crate::core::identifiers::GroupName;
use crate::core::identifiers::MemberId;
use crate::core::identifiers::MessageId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::TaskId;
use crate::core::identifiers::Token;
use crate::core::identifiers::ToolName;
use crate::core::result::ToolResult;
use crate::interfaces::Clock;
use crate::interfaces::ProxyAuditSink;
use crate::interfaces::Tool;
use crate::interfaces::ToolContext;
use crate::runtime::catalog::RegisteredTool;
use crate::runtime::catalog::ToolCatalog;
use crate::runtime::catalog::ToolDescriptor;
use crate::runtime::message_bus::Message;
use crate::runtime::message_bus::MessageBus;
use crate::runtime::message_bus::MessageBusConfig;
use crate::runtime::message_bus::MessagePriority;
use crate::runtime::message_bus::MessageStats;
use crate::runtime::message_bus::PublishRequest;
use crate::runtime::namespace::NAMESPACE_SEPARATOR;
use crate::runtime::organization::ComponentSpec;
use crate::runtime::organization::ComponentSummary;
use crate::runtime::organization::MemberRecord;
use crate::runtime::organization::MemberRole;
use crate::runtime::organization::OrganizationConfig;
use crate::runtime::organization::OrganizationRegistry;
use crate::runtime::organization::OrganizationStats;
use crate::runtime::permissions::PermissionResolver;
use crate::runtime::permissions::default_role_table;
use crate::runtime::task_queue::AsyncTask;
use crate::runtime::task_queue::OriginalCall;
use crate::runtime::task_queue::TaskExecution;
use crate::runtime::task_queue::TaskQueueConfig;
use crate::runtime::task_queue::TaskStats;
use crate::runtime::task_queue::TaskStatus;
use crate::runtime::task_queue::TaskSubmission;
use crate::runtime::token_store::TokenRecord;
use crate::runtime::token_store::TokenStats;
use crate::runtime::token_store::TokenStore;
use crate::runtime::token_store::TokenStoreConfig;
use crate::runtime::user_space::SpaceCleanup;
use crate::runtime::user_space::UserSpace;
use crate::runtime::user_space::UserSpaceRegistry;
use crate::runtime::user_space::UserSpaceStats;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Control plane construction inputs.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Token lifetime bounds.
    pub tokens: TokenStoreConfig,
    /// Role to group table.
    pub roles: BTreeMap<RoleName, BTreeSet<GroupName>>,
    /// Per-space task limits.
    pub task_queue: TaskQueueConfig,
    /// Message bus limits.
    pub message_bus: MessageBusConfig,
    /// Organization limits.
    pub organization: OrganizationConfig,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            tokens: TokenStoreConfig::default(),
            roles: default_role_table(),
            task_queue: TaskQueueConfig::default(),
            message_bus: MessageBusConfig::default(),
            organization: OrganizationConfig::default(),
        }
    }
}

/// Authenticated caller.
#[derive(Clone)]
pub struct Session {
    /// Caller token.
    pub token: Token,
    /// Validated token record.
    pub record: TokenRecord,
    /// Caller's user-space.
    pub space: Arc<UserSpace>,
}

impl Session {
    /// Returns the caller's role.
    #[must_use]
    pub const fn role(&self) -> &RoleName {
        &self.record.role
    }
}

// ============================================================================
// SECTION: Control Plane
// ============================================================================

/// Shared entry point over every runtime registry.
pub struct ControlPlane {
    /// Token records.
    tokens: Arc<TokenStore>,
    /// Role to group resolution.
    resolver: Arc<PermissionResolver>,
    /// Registered tools.
    catalog: Arc<ToolCatalog>,
    /// Inter-token messages.
    bus: Arc<MessageBus>,
    /// Per-token state.
    spaces: Arc<UserSpaceRegistry>,
    /// Collaboration components.
    organizations: Arc<OrganizationRegistry>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl ControlPlane {
    /// Builds a control plane with empty registries.
    #[must_use]
    pub fn new(config: ControlPlaneConfig, clock: Arc<dyn Clock>, audit: Arc<dyn ProxyAuditSink>) -> Self {
        let tokens = Arc::new(TokenStore::new(config.tokens, Arc::clone(&clock)));
        let resolver = Arc::new(PermissionResolver::new(config.roles));
        let catalog = Arc::new(ToolCatalog::new());
        let bus = Arc::new(MessageBus::new(config.message_bus, Arc::clone(&clock)));
        let spaces = Arc::new(UserSpaceRegistry::new(
            Arc::clone(&resolver),
            Arc::clone(&bus),
            Arc::clone(&clock),
            config.task_queue,
        ));
        let organizations = Arc::new(OrganizationRegistry::new(
            config.organization,
            Arc::clone(&catalog),
            Arc::clone(&resolver),
            audit,
            Arc::clone(&clock),
        ));
        Self {
            tokens,
            resolver,
            catalog,
            bus,
            spaces,
            organizations,
            clock,
        }
    }

    /// Returns the token store.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Returns the permission resolver.
    #[must_use]
    pub const fn resolver(&self) -> &Arc<PermissionResolver> {
        &self.resolver
    }

    /// Returns the tool catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// Returns the message bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Returns the user-space registry.
    #[must_use]
    pub const fn spaces(&self) -> &Arc<UserSpaceRegistry> {
        &self.spaces
    }

    /// Returns the organization registry.
    #[must_use]
    pub const fn organizations(&self) -> &Arc<OrganizationRegistry> {
        &self.organizations
    }

    /// Returns the clock.
    #[must_use]
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Registers a catalog tool.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] for duplicate or invalid names.
    pub fn register_tool(&self, descriptor: ToolDescriptor, handler: Arc<dyn Tool>) -> Result<(), AccessError> {
        Ok(self.catalog.register(descriptor, handler)?)
    }

    // ------------------------------------------------------------------------
    // Authentication and visibility
    // ------------------------------------------------------------------------

    /// Validates `token` and returns its session, creating the user-space on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::TokenInvalid`] for unknown, expired, or inactive
    /// tokens and [`AccessError::SpaceInactive`] for cleaned-up spaces.
    pub fn authenticate(&self, token: &Token) -> Result<Session, AccessError> {
        let record = self.tokens.validate(token)?;
        let space = self.spaces.get(token, &record.role)?;
        if !space.is_active() {
            return Err(AccessError::SpaceInactive);
        }
        Ok(Session {
            token: token.clone(),
            record,
            space,
        })
    }

    /// Returns true when the session may see `tool`.
    #[must_use]
    pub fn is_visible(&self, session: &Session, tool: &ToolDescriptor) -> bool {
        self.spaces.is_tool_visible(&session.token, tool)
    }

    /// Checks visibility and returns a denial naming what the tool requires.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::PermissionDenied`] when the tool is not visible.
    pub fn authorize(&self, session: &Session, tool: &ToolDescriptor) -> Result<(), AccessError> {
        if self.is_visible(session, tool) {
            return Ok(());
        }
        if session.space.authority()?.defers_to_role() {
            Err(AccessError::missing_groups(
                tool.name.as_str(),
                &PermissionResolver::required_groups(tool),
            ))
        } else {
            Err(AccessError::PermissionDenied {
                tool: tool.name.to_string(),
                reason: "is not in the visible tool list".to_string(),
            })
        }
    }

    /// Returns the direct tools visible to `token` followed by every
    /// collaboration tool it can reach.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub async fn list_tools(&self, token: &Token) -> Result<Vec<ToolDescriptor>, AccessError> {
        let session = self.authenticate(token)?;
        let mut tools: Vec<ToolDescriptor> = self
            .catalog
            .descriptors()?
            .into_iter()
            .filter(|tool| self.is_visible(&session, tool))
            .collect();
        tools.extend(self.organizations.get_all_collaboration_tools(token).await?);
        Ok(tools)
    }

    /// Calls a tool by name. Never errors: failures become `isError` results.
    pub async fn call_tool(
        &self,
        token: &Token,
        name: &str,
        args: Value,
        request_id: Option<String>,
    ) -> ToolResult {
        match self.try_call_tool(token, name, args, request_id).await {
            Ok(result) => result,
            Err(err) => err.to_tool_result(),
        }
    }

    /// Authenticates, routes, and executes a tool call.
    async fn try_call_tool(
        &self,
        token: &Token,
        name: &str,
        args: Value,
        request_id: Option<String>,
    ) -> Result<ToolResult, AccessError> {
        let session = self.authenticate(token)?;
        if name.contains(NAMESPACE_SEPARATOR) {
            return Ok(self.organizations.execute_collaboration_tool(token, name, args, request_id).await);
        }
        let entry = self.lookup(name)?;
        let execution = self.prepare(&session, &entry, request_id)?;
        entry.invoke(args, &execution.context, timeout_millis(execution.timeout)).await
    }

    /// Finds a direct catalog tool.
    fn lookup(&self, name: &str) -> Result<RegisteredTool, AccessError> {
        self.catalog.get(&ToolName::new(name))?.ok_or_else(|| AccessError::not_found("tool", name))
    }

    /// Authorizes a direct call and resolves its context and time bound.
    fn prepare(
        &self,
        session: &Session,
        entry: &RegisteredTool,
        request_id: Option<String>,
    ) -> Result<TaskExecution, AccessError> {
        self.authorize(session, &entry.descriptor)?;
        let authority = session.space.authority()?;
        let rules = authority.rules_for(&entry.descriptor.executor);
        if let Some(reason) = rules.and_then(|rules| rules.refusal(&entry.descriptor.name)) {
            return Err(AccessError::PermissionDenied {
                tool: entry.descriptor.name.to_string(),
                reason,
            });
        }
        let context = ToolContext {
            settings: rules.map_or(Value::Null, |rules| rules.settings.clone()),
            ..ToolContext::direct(session.token.clone(), session.role().clone())
        }
        .with_request_id(request_id);
        Ok(TaskExecution {
            handler: Arc::clone(&entry.handler),
            context,
            timeout: rules.and_then(|rules| rules.timeout_ms).map(Duration::from_millis),
        })
    }

    // ------------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------------

    /// Submits a direct tool call as a background task.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the call is not permitted, names a
    /// collaboration tool, or the queue is full.
    pub fn submit_task(&self, token: &Token, submission: TaskSubmission) -> Result<AsyncTask, AccessError> {
        let session = self.authenticate(token)?;
        if submission.tool.as_str().contains(NAMESPACE_SEPARATOR) {
            return Err(AccessError::InvalidArgument(
                "collaboration tools cannot be submitted as tasks".to_string(),
            ));
        }
        let entry = self.lookup(submission.tool.as_str())?;
        let execution = self.prepare(&session, &entry, submission.request_id.clone())?;
        Ok(session.space.tasks().submit(submission, execution)?)
    }

    /// Waits for a task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Timeout`] when the task is still active at the
    /// deadline.
    pub async fn wait_task(&self, token: &Token, task_id: &TaskId, timeout: Duration) -> Result<AsyncTask, AccessError> {
        let session = self.authenticate(token)?;
        Ok(session.space.tasks().wait(task_id, timeout).await?)
    }

    /// Returns one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when the task is absent.
    pub fn get_task(&self, token: &Token, task_id: &TaskId) -> Result<AsyncTask, AccessError> {
        Ok(self.authenticate(token)?.space.tasks().get_task(task_id)?)
    }

    /// Returns the original call snapshot of one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when the task is absent.
    pub fn get_original_call(&self, token: &Token, task_id: &TaskId) -> Result<OriginalCall, AccessError> {
        Ok(self.authenticate(token)?.space.tasks().get_original_call(task_id)?)
    }

    /// Returns the caller's tasks, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub fn list_tasks(&self, token: &Token, status: Option<TaskStatus>) -> Result<Vec<AsyncTask>, AccessError> {
        Ok(self.authenticate(token)?.space.tasks().get_user_tasks(status)?)
    }

    /// Cancels one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Conflict`] when the task is already terminal.
    pub fn cancel_task(&self, token: &Token, task_id: &TaskId) -> Result<AsyncTask, AccessError> {
        Ok(self.authenticate(token)?.space.tasks().cancel(task_id)?)
    }

    /// Deletes one of the caller's terminal tasks.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Conflict`] when the task is still active.
    pub fn delete_task(&self, token: &Token, task_id: &TaskId) -> Result<AsyncTask, AccessError> {
        Ok(self.authenticate(token)?.space.tasks().delete(task_id)?)
    }

    /// Retries a failed or cancelled task, re-checking permissions.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the task is not retryable or the tool is
    /// no longer permitted.
    pub fn retry_task(&self, token: &Token, task_id: &TaskId) -> Result<AsyncTask, AccessError> {
        let session = self.authenticate(token)?;
        let original = session.space.tasks().get_original_call(task_id)?;
        let entry = self.lookup(original.tool.as_str())?;
        let execution = self.prepare(&session, &entry, original.request_id)?;
        Ok(session.space.tasks().retry(task_id, execution)?)
    }

    /// Returns the caller's task counts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub fn task_stats(&self, token: &Token) -> Result<TaskStats, AccessError> {
        Ok(self.authenticate(token)?.space.tasks().get_stats()?)
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// Publishes a message from the caller. The source is always the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when the destination token is
    /// unknown and [`AccessError::LimitExceeded`] when its inbox is full.
    pub fn publish_message(&self, token: &Token, mut request: PublishRequest) -> Result<Message, AccessError> {
        self.authenticate(token)?;
        if self.tokens.get(&request.destination)?.is_none() {
            return Err(AccessError::not_found("token", token_fingerprint(&request.destination)));
        }
        request.source = token.clone();
        Ok(self.bus.publish(request)?)
    }

    /// Receives and removes the caller's pending messages.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub fn receive_messages(&self, token: &Token, max: Option<usize>) -> Result<Vec<Message>, AccessError> {
        self.authenticate(token)?;
        Ok(self.bus.receive_messages(token, max)?)
    }

    /// Returns the caller's pending messages without removing them.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub fn pending_messages(&self, token: &Token) -> Result<Vec<Message>, AccessError> {
        self.authenticate(token)?;
        Ok(self.bus.get_pending_messages(token)?)
    }

    /// Replies to a message addressed to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when the original is not visible to
    /// the caller.
    pub fn reply_message(
        &self,
        token: &Token,
        original_id: &MessageId,
        content: Value,
        priority: Option<MessagePriority>,
    ) -> Result<Message, AccessError> {
        self.authenticate(token)?;
        Ok(self.bus.reply(original_id, token, content, priority)?)
    }

    /// Returns the caller's message counts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub fn message_stats(&self, token: &Token) -> Result<MessageStats, AccessError> {
        self.authenticate(token)?;
        Ok(self.bus.get_stats(token)?)
    }

    // ------------------------------------------------------------------------
    // Token administration
    // ------------------------------------------------------------------------

    /// Creates a token for a registered role.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::InvalidArgument`] for unknown roles or
    /// out-of-bounds ttls.
    pub fn create_token(
        &self,
        role: RoleName,
        description: impl Into<String>,
        ttl_ms: Option<u64>,
    ) -> Result<TokenRecord, AccessError> {
        self.require_role(&role)?;
        Ok(self.tokens.create(role, description, ttl_ms)?)
    }

    /// Stores a caller-chosen, non-expiring token value for a registered role.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] for unknown roles or duplicate values.
    pub fn insert_bootstrap_token(
        &self,
        token: Token,
        role: RoleName,
        description: impl Into<String>,
    ) -> Result<TokenRecord, AccessError> {
        self.require_role(&role)?;
        Ok(self.tokens.insert(token, role, description)?)
    }

    /// Validates a token without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::TokenInvalid`] with the failure reason.
    pub fn validate_token(&self, token: &Token) -> Result<TokenRecord, AccessError> {
        Ok(self.tokens.validate(token)?)
    }

    /// Deactivates a token. Returns false when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub fn deactivate_token(&self, token: &Token) -> Result<bool, AccessError> {
        Ok(self.tokens.deactivate(token)?)
    }

    /// Activates a token. Returns false when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub fn activate_token(&self, token: &Token) -> Result<bool, AccessError> {
        Ok(self.tokens.activate(token)?)
    }

    /// Renews a token's expiry. Returns false when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::InvalidArgument`] for out-of-bounds ttls.
    pub fn renew_token(&self, token: &Token, ttl_ms: Option<u64>) -> Result<bool, AccessError> {
        Ok(self.tokens.renew(token, ttl_ms)?)
    }

    /// Deletes a token and everything it owns: its user-space, its messages,
    /// and its component memberships. Returns false when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub async fn delete_token(&self, token: &Token) -> Result<bool, AccessError> {
        if !self.tokens.delete(token)? {
            return Ok(false);
        }
        self.spaces.delete(token)?;
        self.bus.cleanup_user_messages(token)?;
        self.organizations.remove_token_everywhere(token).await?;
        Ok(true)
    }

    /// Deactivates expired tokens. Returns the number deactivated.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub fn cleanup_expired_tokens(&self) -> Result<usize, AccessError> {
        Ok(self.tokens.cleanup_expired()?)
    }

    /// Returns token counts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub fn token_stats(&self) -> Result<TokenStats, AccessError> {
        Ok(self.tokens.stats()?)
    }

    /// Runs periodic housekeeping: expired tokens are deactivated and expired
    /// messages purged. Returns `(tokens, messages)` affected.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub fn sweep(&self) -> Result<(usize, usize), AccessError> {
        let tokens = self.tokens.cleanup_expired()?;
        let messages = self.bus.purge_expired()?;
        Ok((tokens, messages))
    }

    // ------------------------------------------------------------------------
    // Space administration
    // ------------------------------------------------------------------------

    /// Returns a token's visible-tool allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::TokenInvalid`] when the token is unknown.
    pub fn get_visible_tools(&self, token: &Token) -> Result<BTreeSet<ToolName>, AccessError> {
        self.space_for_admin(token)?;
        Ok(self.spaces.get_visible_tools(token)?)
    }

    /// Replaces a token's visible-tool allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::TokenInvalid`] when the token is unknown.
    pub fn set_visible_tools(&self, token: &Token, tools: BTreeSet<ToolName>) -> Result<(), AccessError> {
        self.space_for_admin(token)?;
        Ok(self.spaces.set_visible_tools(token, tools)?)
    }

    /// Returns a token's rules for one executor.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::TokenInvalid`] when the token is unknown.
    pub fn get_executor_rules(
        &self,
        token: &Token,
        executor: &ExecutorId,
    ) -> Result<Option<ExecutorRules>, AccessError> {
        self.space_for_admin(token)?;
        Ok(self.spaces.get_executor_rules(token, executor)?)
    }

    /// Sets a token's rules for one executor.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::TokenInvalid`] when the token is unknown.
    pub fn set_executor_rules(
        &self,
        token: &Token,
        executor: ExecutorId,
        rules: ExecutorRules,
    ) -> Result<(), AccessError> {
        self.space_for_admin(token)?;
        Ok(self.spaces.set_executor_rules(token, executor, rules)?)
    }

    /// Returns aggregate user-space counts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub fn space_stats(&self) -> Result<UserSpaceStats, AccessError> {
        Ok(self.spaces.stats()?)
    }

    /// Soft-cleans a token's user-space.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when no space exists.
    pub fn cleanup_space(&self, token: &Token) -> Result<SpaceCleanup, AccessError> {
        Ok(self.spaces.cleanup(token)?)
    }

    /// Reactivates a token's user-space. Returns false when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub fn activate_space(&self, token: &Token) -> Result<bool, AccessError> {
        Ok(self.spaces.activate(token)?)
    }

    /// Returns the user-space for a stored token, creating it if needed.
    fn space_for_admin(&self, token: &Token) -> Result<Arc<UserSpace>, AccessError> {
        let record = self.tokens.get(token)?.ok_or(AccessError::TokenInvalid {
            reason: TokenInvalidReason::NotFound,
        })?;
        Ok(self.spaces.get(token, &record.role)?)
    }

    /// Rejects roles absent from the registry.
    fn require_role(&self, role: &RoleName) -> Result<(), AccessError> {
        if self.resolver.is_known_role(role) {
            Ok(())
        } else {
            Err(AccessError::InvalidArgument(format!("unknown role '{role}'")))
        }
    }

    // ------------------------------------------------------------------------
    // Organization
    // ------------------------------------------------------------------------

    /// Creates a component with the caller as its first admin.
    ///
    /// Callers without global admin rights may only create components bound
    /// to their own role whose allow-list names tools they can already see.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Forbidden`] when the spec exceeds the caller's
    /// authority, plus registry validation errors.
    pub async fn create_component(
        &self,
        token: &Token,
        spec: ComponentSpec,
        owner: MemberId,
    ) -> Result<ComponentSummary, AccessError> {
        let session = self.authenticate(token)?;
        if !self.resolver.is_global_admin(session.role()) {
            let forbidden = |reason: String| AccessError::Forbidden {
                component: spec.id.to_string(),
                tool: "org_component_create".to_string(),
                reason,
            };
            if &spec.role != session.role() {
                return Err(forbidden(format!("component role must be '{}'", session.role())));
            }
            for tool in &spec.authority.visible_tools {
                let visible = self
                    .catalog
                    .get(tool)?
                    .is_some_and(|entry| self.is_visible(&session, &entry.descriptor));
                if !visible {
                    return Err(forbidden(format!("tool '{tool}' is not visible to the caller")));
                }
            }
        }
        let component = self.organizations.create_component(spec, Some((owner, token.clone()))).await?;
        Ok(component.summary().await)
    }

    /// Deletes a component. Requires component or global admin.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Forbidden`] for callers without admin rights.
    pub async fn delete_component(&self, token: &Token, id: &ComponentId) -> Result<bool, AccessError> {
        self.require_component_admin(token, id, "org_component_delete").await?;
        Ok(self.organizations.delete_component(id)?)
    }

    /// Returns summaries of every component.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub async fn list_components(&self, token: &Token) -> Result<Vec<ComponentSummary>, AccessError> {
        self.authenticate(token)?;
        Ok(self.organizations.list_components().await?)
    }

    /// Adds a member. Requires component or global admin; the member token
    /// must exist.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] for unauthorized callers, unknown tokens, or
    /// rejected membership changes.
    pub async fn add_member(
        &self,
        token: &Token,
        id: &ComponentId,
        member_id: MemberId,
        member_token: Token,
        role: MemberRole,
    ) -> Result<MemberRecord, AccessError> {
        self.require_component_admin(token, id, "org_member_add").await?;
        if self.tokens.get(&member_token)?.is_none() {
            return Err(AccessError::not_found("token", token_fingerprint(&member_token)));
        }
        Ok(self.organizations.add_member(id, member_id, member_token, role).await?)
    }

    /// Removes a member. Requires component or global admin.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] for unauthorized callers or unknown members.
    pub async fn remove_member(&self, token: &Token, id: &ComponentId, member_id: &MemberId) -> Result<(), AccessError> {
        self.require_component_admin(token, id, "org_member_remove").await?;
        Ok(self.organizations.remove_member(id, member_id).await?)
    }

    /// Returns the components the caller belongs to with its membership.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when authentication fails.
    pub async fn my_components(&self, token: &Token) -> Result<Vec<(ComponentSummary, MemberRecord)>, AccessError> {
        self.authenticate(token)?;
        Ok(self.organizations.components_for_member(token).await?)
    }

    /// Returns aggregate organization counts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] on lock failure.
    pub async fn organization_stats(&self) -> Result<OrganizationStats, AccessError> {
        Ok(self.organizations.stats().await?)
    }

    /// Requires the caller to be a global admin or an admin member of `id`.
    async fn require_component_admin(&self, token: &Token, id: &ComponentId, operation: &str) -> Result<(), AccessError> {
        let session = self.authenticate(token)?;
        let component = self
            .organizations
            .get_component(id)?
            .ok_or_else(|| AccessError::not_found("component", id.as_str()))?;
        if self.resolver.is_global_admin(session.role()) {
            return Ok(());
        }
        match component.member_for_token(token).await {
            Some(member) if member.role == MemberRole::Admin => Ok(()),
            _ => Err(AccessError::Forbidden {
                component: id.to_string(),
                tool: operation.to_string(),
                reason: "requires the component admin role".to_string(),
            }),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts an optional duration to whole milliseconds.
fn timeout_millis(timeout: Option<Duration>) -> Option<u64> {
    timeout.map(|limit| u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
}
