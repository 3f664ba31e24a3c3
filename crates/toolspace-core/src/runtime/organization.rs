// toolspace-core/src/runtime/organization.rs
// ============================================================================
// Module: Organization Registry
// Description: Collaboration components, their members, and proxy execution.
// Purpose: Let members run tools under a component's authority, never beyond.
// Dependencies: crate::{core, interfaces, runtime}, tokio, serde, thiserror
// ============================================================================

//! ## Overview
//! A collaboration component is a named unit with its own role and
//! [`Authority`]. Members call tools through the component by prefixed name
//! (`<componentId>__<tool>`); the component checks membership, its authority
//! ceiling, and the member's intra-component role before delegating to the
//! catalog tool. Every proxy execution, allowed or refused, emits a
//! [`ProxyAuditEvent`].
//!
//! ## Invariants
//! - A proxy call never reaches a tool outside the component's ceiling: the
//!   non-empty allow-list, or the component role's visibility when empty.
//! - Mutating tools require the `admin` member role.
//! - Membership changes take the component's write lock; proxy calls hold
//!   the read lock for their whole duration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::authority::Authority;
use crate::core::errors::AccessError;
use crate::core::hashing::token_fingerprint;
use crate::core::identifiers::ComponentId;
use crate::core::identifiers::MemberId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::Token;
use crate::core::identifiers::ToolName;
use crate::core::result::ToolResult;
use crate::core::time::Timestamp;
use crate::interfaces::Clock;
use crate::interfaces::ProxyAuditEvent;
use crate::interfaces::ProxyAuditSink;
use crate::interfaces::ToolContext;
use crate::runtime::catalog::ToolCatalog;
use crate::runtime::catalog::ToolDescriptor;
use crate::runtime::namespace::ToolNameNamespacer;
use crate::runtime::permissions::PermissionResolver;

// ============================================================================
// SECTION: Members
// ============================================================================

/// Role of a member inside one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// May run mutating tools and manage membership.
    Admin,
    /// May run non-mutating tools.
    #[default]
    Member,
}

/// Component membership entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    /// Member identifier, unique within the component.
    pub member_id: MemberId,
    /// Member token (omitted from serialized output).
    #[serde(skip)]
    pub token: Token,
    /// Intra-component role.
    pub role: MemberRole,
    /// Join time.
    pub joined_at: Timestamp,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Membership errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    /// Member id or token already present.
    #[error("member {member} is already in component {component}")]
    AlreadyMember {
        /// Component identifier.
        component: String,
        /// Member identifier.
        member: String,
    },
    /// Component is at its member limit.
    #[error("component {component} is full ({limit} members)")]
    Full {
        /// Component identifier.
        component: String,
        /// Member limit.
        limit: usize,
    },
    /// Member absent from the component.
    #[error("member {member} not found in component {component}")]
    NotFound {
        /// Component identifier.
        component: String,
        /// Member identifier.
        member: String,
    },
}

impl From<MembershipError> for AccessError {
    fn from(error: MembershipError) -> Self {
        match error {
            MembershipError::AlreadyMember {
                ..
            } => Self::Conflict(error.to_string()),
            MembershipError::Full {
                ..
            } => Self::LimitExceeded(error.to_string()),
            MembershipError::NotFound {
                member, ..
            } => Self::not_found("member", member),
        }
    }
}

/// Organization registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrganizationError {
    /// Component spec rejected.
    #[error("invalid component: {0}")]
    Invalid(String),
    /// Component id already registered.
    #[error("component already exists: {0}")]
    AlreadyExists(String),
    /// Component absent.
    #[error("component not found: {0}")]
    NotFound(String),
    /// Registry is at its component limit.
    #[error("organization holds at most {0} components")]
    Capacity(usize),
    /// Membership change rejected.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    /// Registry lock failure.
    #[error("organization error: {0}")]
    Internal(String),
}

impl From<OrganizationError> for AccessError {
    fn from(error: OrganizationError) -> Self {
        match error {
            OrganizationError::Invalid(message) => Self::InvalidArgument(message),
            OrganizationError::AlreadyExists(id) => {
                Self::Conflict(format!("component already exists: {id}"))
            }
            OrganizationError::NotFound(id) => Self::not_found("component", id),
            OrganizationError::Capacity(limit) => {
                Self::LimitExceeded(format!("organization holds at most {limit} components"))
            }
            OrganizationError::Membership(error) => error.into(),
            OrganizationError::Internal(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Component
// ============================================================================

/// Inputs for creating a component.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentSpec {
    /// Component identifier (letters, digits, `-`).
    pub id: ComponentId,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Role whose groups bound the component when the allow-list is empty.
    pub role: RoleName,
    /// Visible tools and executor rules.
    #[serde(default)]
    pub authority: Authority,
    /// Member limit; the registry default applies when absent.
    #[serde(default)]
    pub max_members: Option<usize>,
}

/// Serializable component summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSummary {
    /// Component identifier.
    pub id: ComponentId,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Component role.
    pub role: RoleName,
    /// Visible-tool allow-list.
    pub visible_tools: BTreeSet<ToolName>,
    /// Current member count.
    pub member_count: usize,
    /// Member limit.
    pub max_members: usize,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Named unit that proxies tool calls for its members.
pub struct CollaborationComponent {
    /// Component identifier.
    id: ComponentId,
    /// Display name.
    name: String,
    /// Description.
    description: String,
    /// Component role.
    role: RoleName,
    /// Visible tools and executor rules.
    authority: Authority,
    /// Member limit.
    max_members: usize,
    /// Creation time.
    created_at: Timestamp,
    /// Members keyed by member id.
    members: RwLock<BTreeMap<MemberId, MemberRecord>>,
    /// Tools proxied to.
    catalog: Arc<ToolCatalog>,
    /// Role visibility for the empty allow-list ceiling.
    resolver: Arc<PermissionResolver>,
    /// Proxy audit sink.
    audit: Arc<dyn ProxyAuditSink>,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl CollaborationComponent {
    /// Returns the component identifier.
    #[must_use]
    pub const fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Returns the component role.
    #[must_use]
    pub const fn role(&self) -> &RoleName {
        &self.role
    }

    /// Returns the component authority.
    #[must_use]
    pub const fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Returns the member limit.
    #[must_use]
    pub const fn max_members(&self) -> usize {
        self.max_members
    }

    /// Adds a member.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::AlreadyMember`] when the member id or token
    /// is already present and [`MembershipError::Full`] at capacity.
    pub async fn add_member(
        &self,
        member_id: MemberId,
        token: Token,
        role: MemberRole,
    ) -> Result<MemberRecord, MembershipError> {
        let mut members = self.members.write().await;
        if members.contains_key(&member_id) || members.values().any(|member| member.token == token) {
            return Err(MembershipError::AlreadyMember {
                component: self.id.to_string(),
                member: member_id.to_string(),
            });
        }
        if members.len() >= self.max_members {
            return Err(MembershipError::Full {
                component: self.id.to_string(),
                limit: self.max_members,
            });
        }
        let record = MemberRecord {
            member_id: member_id.clone(),
            token,
            role,
            joined_at: self.clock.now(),
        };
        members.insert(member_id, record.clone());
        Ok(record)
    }

    /// Removes a member. Returns false when absent.
    pub async fn remove_member(&self, member_id: &MemberId) -> bool {
        self.members.write().await.remove(member_id).is_some()
    }

    /// Removes whichever member holds `token`. Returns false when absent.
    pub async fn remove_token(&self, token: &Token) -> bool {
        let mut members = self.members.write().await;
        let before = members.len();
        members.retain(|_, member| &member.token != token);
        members.len() != before
    }

    /// Returns the member holding `token`.
    pub async fn member_for_token(&self, token: &Token) -> Option<MemberRecord> {
        self.members.read().await.values().find(|member| &member.token == token).cloned()
    }

    /// Returns members in id order.
    pub async fn members(&self) -> Vec<MemberRecord> {
        self.members.read().await.values().cloned().collect()
    }

    /// Returns a summary of the component.
    pub async fn summary(&self) -> ComponentSummary {
        ComponentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            role: self.role.clone(),
            visible_tools: self.authority.visible_tools.clone(),
            member_count: self.members.read().await.len(),
            max_members: self.max_members,
            created_at: self.created_at,
        }
    }

    /// Returns true when the tool is inside the component's ceiling.
    #[must_use]
    pub fn within_ceiling(&self, tool: &ToolDescriptor) -> bool {
        if self.authority.defers_to_role() {
            self.resolver.is_visible(tool, &self.role)
        } else {
            self.authority.visible_tools.contains(&tool.name)
        }
    }

    /// Returns a refusal reason when a member with `role` may not run `tool`.
    #[must_use]
    pub fn refusal(&self, tool: &ToolDescriptor, role: MemberRole) -> Option<String> {
        if !self.within_ceiling(tool) {
            return Some("tool is outside the component authority".to_string());
        }
        if tool.mutates && role != MemberRole::Admin {
            return Some("mutating tools require the admin member role".to_string());
        }
        self.authority.rules_for(&tool.executor).and_then(|rules| rules.refusal(&tool.name))
    }

    /// Returns the prefixed tools a member may call. Non-members get none.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] when the catalog lock is poisoned.
    pub async fn get_tools_with_prefix(&self, token: &Token) -> Result<Vec<ToolDescriptor>, AccessError> {
        let Some(member) = self.member_for_token(token).await else {
            return Ok(Vec::new());
        };
        Ok(self
            .catalog
            .descriptors()?
            .iter()
            .filter(|tool| self.refusal(tool, member.role).is_none())
            .map(|tool| tool.renamed(ToolNameNamespacer::add_prefix(&self.id, &tool.name)))
            .collect())
    }

    /// Runs `tool` on behalf of the member holding `token`. Never errors:
    /// refusals and failures become error results, and every outcome is
    /// audited.
    pub async fn proxy_execute(
        &self,
        token: &Token,
        tool: &ToolName,
        args: Value,
        request_id: Option<String>,
    ) -> ToolResult {
        let started = Instant::now();
        let members = self.members.read().await;
        let member = members.values().find(|member| &member.token == token).cloned();
        let outcome = self.execute_as(member.as_ref(), token, tool, args, request_id).await;
        drop(members);

        let (success, reason) = match &outcome {
            Ok(result) if result.is_error() => {
                (false, Some(result.first_text().unwrap_or("tool returned an error").to_string()))
            }
            Ok(_) => (true, None),
            Err(err) => (false, Some(err.to_string())),
        };
        self.audit.record(&ProxyAuditEvent {
            event: "proxy_execute",
            timestamp: self.clock.now(),
            component: self.id.clone(),
            member: member.map(|member| member.member_id),
            token_fingerprint: token_fingerprint(token),
            tool: tool.clone(),
            success,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            reason,
        });
        outcome.unwrap_or_else(|err| err.to_tool_result())
    }

    /// Checks and executes a proxy call for a resolved member.
    async fn execute_as(
        &self,
        member: Option<&MemberRecord>,
        token: &Token,
        tool: &ToolName,
        args: Value,
        request_id: Option<String>,
    ) -> Result<ToolResult, AccessError> {
        let Some(member) = member else {
            return Err(AccessError::NotAMember {
                component: self.id.to_string(),
            });
        };
        let Some(entry) = self.catalog.get(tool)? else {
            return Err(AccessError::not_found("tool", tool.as_str()));
        };
        if let Some(reason) = self.refusal(&entry.descriptor, member.role) {
            return Err(AccessError::Forbidden {
                component: self.id.to_string(),
                tool: tool.to_string(),
                reason,
            });
        }
        let rules = self.authority.rules_for(&entry.descriptor.executor);
        let ctx = ToolContext {
            token: token.clone(),
            role: self.role.clone(),
            component: Some(self.id.clone()),
            request_id,
            settings: rules.map_or(Value::Null, |rules| rules.settings.clone()),
        };
        entry.invoke(args, &ctx, rules.and_then(|rules| rules.timeout_ms)).await
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Organization limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizationConfig {
    /// Member limit for components that do not set one.
    pub default_max_members: usize,
    /// Maximum number of components.
    pub max_components: usize,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            default_max_members: 100,
            max_components: 1_000,
        }
    }
}

/// Aggregate organization counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationStats {
    /// Registered components.
    pub components: usize,
    /// Memberships across all components.
    pub memberships: usize,
}

/// Registry of collaboration components.
pub struct OrganizationRegistry {
    /// Components keyed by id.
    components: Mutex<BTreeMap<ComponentId, Arc<CollaborationComponent>>>,
    /// Tools proxied to.
    catalog: Arc<ToolCatalog>,
    /// Role visibility.
    resolver: Arc<PermissionResolver>,
    /// Proxy audit sink shared by components.
    audit: Arc<dyn ProxyAuditSink>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Limits.
    config: OrganizationConfig,
}

impl OrganizationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        config: OrganizationConfig,
        catalog: Arc<ToolCatalog>,
        resolver: Arc<PermissionResolver>,
        audit: Arc<dyn ProxyAuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            components: Mutex::new(BTreeMap::new()),
            catalog,
            resolver,
            audit,
            clock,
            config,
        }
    }

    /// Creates a component, optionally seeding `owner` as its admin.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError`] for invalid ids or roles, duplicates,
    /// or when the registry is full.
    pub async fn create_component(
        &self,
        spec: ComponentSpec,
        owner: Option<(MemberId, Token)>,
    ) -> Result<Arc<CollaborationComponent>, OrganizationError> {
        if !ToolNameNamespacer::is_valid_component_id(spec.id.as_str()) {
            return Err(OrganizationError::Invalid(format!(
                "component id '{}' is invalid: {}",
                spec.id,
                ToolNameNamespacer::format_error_message()
            )));
        }
        if !self.resolver.is_known_role(&spec.role) {
            return Err(OrganizationError::Invalid(format!("unknown role '{}'", spec.role)));
        }
        let max_members = spec.max_members.unwrap_or(self.config.default_max_members);
        if max_members == 0 {
            return Err(OrganizationError::Invalid("max_members must be at least 1".to_string()));
        }
        let component = Arc::new(CollaborationComponent {
            id: spec.id.clone(),
            name: spec.name,
            description: spec.description,
            role: spec.role,
            authority: spec.authority,
            max_members,
            created_at: self.clock.now(),
            members: RwLock::new(BTreeMap::new()),
            catalog: Arc::clone(&self.catalog),
            resolver: Arc::clone(&self.resolver),
            audit: Arc::clone(&self.audit),
            clock: Arc::clone(&self.clock),
        });
        if let Some((member_id, token)) = owner {
            component.add_member(member_id, token, MemberRole::Admin).await?;
        }
        let mut components = self.lock()?;
        if components.contains_key(&spec.id) {
            return Err(OrganizationError::AlreadyExists(spec.id.to_string()));
        }
        if components.len() >= self.config.max_components {
            return Err(OrganizationError::Capacity(self.config.max_components));
        }
        components.insert(spec.id, Arc::clone(&component));
        drop(components);
        Ok(component)
    }

    /// Deletes a component. Returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError::Internal`] when the registry lock is
    /// poisoned.
    pub fn delete_component(&self, id: &ComponentId) -> Result<bool, OrganizationError> {
        Ok(self.lock()?.remove(id).is_some())
    }

    /// Returns a component by id.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError::Internal`] when the registry lock is
    /// poisoned.
    pub fn get_component(&self, id: &ComponentId) -> Result<Option<Arc<CollaborationComponent>>, OrganizationError> {
        Ok(self.lock()?.get(id).cloned())
    }

    /// Returns summaries of every component in id order.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError::Internal`] when the registry lock is
    /// poisoned.
    pub async fn list_components(&self) -> Result<Vec<ComponentSummary>, OrganizationError> {
        let mut summaries = Vec::new();
        for component in self.snapshot()? {
            summaries.push(component.summary().await);
        }
        Ok(summaries)
    }

    /// Adds a member to a component.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError`] when the component is absent or the
    /// membership change is rejected.
    pub async fn add_member(
        &self,
        id: &ComponentId,
        member_id: MemberId,
        token: Token,
        role: MemberRole,
    ) -> Result<MemberRecord, OrganizationError> {
        let component = self.require(id)?;
        Ok(component.add_member(member_id, token, role).await?)
    }

    /// Removes a member from a component.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError`] when the component or member is absent.
    pub async fn remove_member(&self, id: &ComponentId, member_id: &MemberId) -> Result<(), OrganizationError> {
        let component = self.require(id)?;
        if component.remove_member(member_id).await {
            Ok(())
        } else {
            Err(MembershipError::NotFound {
                component: id.to_string(),
                member: member_id.to_string(),
            }
            .into())
        }
    }

    /// Returns summaries of components `token` belongs to, with its role.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError::Internal`] when the registry lock is
    /// poisoned.
    pub async fn components_for_member(
        &self,
        token: &Token,
    ) -> Result<Vec<(ComponentSummary, MemberRecord)>, OrganizationError> {
        let mut found = Vec::new();
        for component in self.snapshot()? {
            if let Some(member) = component.member_for_token(token).await {
                found.push((component.summary().await, member));
            }
        }
        Ok(found)
    }

    /// Returns every prefixed tool `token` may call across its components.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Internal`] when a lock is poisoned.
    pub async fn get_all_collaboration_tools(&self, token: &Token) -> Result<Vec<ToolDescriptor>, AccessError> {
        let mut tools = Vec::new();
        for component in self.snapshot()? {
            tools.extend(component.get_tools_with_prefix(token).await?);
        }
        Ok(tools)
    }

    /// Parses a prefixed name and proxies the call. Never errors.
    pub async fn execute_collaboration_tool(
        &self,
        token: &Token,
        full_name: &str,
        args: Value,
        request_id: Option<String>,
    ) -> ToolResult {
        let Some(parsed) = ToolNameNamespacer::parse_prefix(full_name) else {
            return AccessError::MalformedName {
                name: full_name.to_string(),
                expected: ToolNameNamespacer::format_error_message(),
            }
            .to_tool_result();
        };
        match self.get_component(&parsed.component_id) {
            Ok(Some(component)) => {
                component.proxy_execute(token, &parsed.tool_name, args, request_id).await
            }
            Ok(None) => AccessError::not_found("component", parsed.component_id.as_str()).to_tool_result(),
            Err(err) => AccessError::from(err).to_tool_result(),
        }
    }

    /// Removes `token` from every component. Returns the number of
    /// memberships removed.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError::Internal`] when the registry lock is
    /// poisoned.
    pub async fn remove_token_everywhere(&self, token: &Token) -> Result<usize, OrganizationError> {
        let mut removed = 0;
        for component in self.snapshot()? {
            if component.remove_token(token).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Returns aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationError::Internal`] when the registry lock is
    /// poisoned.
    pub async fn stats(&self) -> Result<OrganizationStats, OrganizationError> {
        let components = self.snapshot()?;
        let mut stats = OrganizationStats {
            components: components.len(),
            memberships: 0,
        };
        for component in components {
            stats.memberships += component.members.read().await.len();
        }
        Ok(stats)
    }

    /// Returns the component or a not-found error.
    fn require(&self, id: &ComponentId) -> Result<Arc<CollaborationComponent>, OrganizationError> {
        self.get_component(id)?.ok_or_else(|| OrganizationError::NotFound(id.to_string()))
    }

    /// Clones the current component handles so no registry lock spans an
    /// await.
    fn snapshot(&self) -> Result<Vec<Arc<CollaborationComponent>>, OrganizationError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    /// Locks the registry.
    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<ComponentId, Arc<CollaborationComponent>>>, OrganizationError> {
        self.components
            .lock()
            .map_err(|_| OrganizationError::Internal("organization mutex poisoned".to_string()))
    }
}
