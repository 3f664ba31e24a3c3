// toolspace-core/src/runtime/permissions.rs
// ============================================================================
// Module: Permission Resolver
// Description: Role to group resolution and tool visibility.
// Purpose: Decide which catalog tools a role may see.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Roles resolve to permission groups through a runtime registry seeded from
//! configuration. A tool is visible to a role when their group sets
//! intersect, or when the wildcard group `"*"` appears on either side.
//! Lookups fail closed: an unknown role or a poisoned table resolves to the
//! empty set and sees nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::RwLock;

use thiserror::Error;

use crate::core::errors::AccessError;
use crate::core::identifiers::GroupName;
use crate::core::identifiers::RoleName;
use crate::runtime::catalog::ToolDescriptor;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Group granting administrative tools.
const ADMIN_GROUP: &str = "admin";

/// Returns the built-in role table.
#[must_use]
pub fn default_role_table() -> BTreeMap<RoleName, BTreeSet<GroupName>> {
    let mut table = BTreeMap::new();
    table.insert(RoleName::new("admin"), BTreeSet::from([GroupName::wildcard()]));
    table.insert(
        RoleName::new("user"),
        ["base", "messaging", "tasks", "organization"].into_iter().map(GroupName::new).collect(),
    );
    table.insert(RoleName::new("guest"), BTreeSet::from([GroupName::new("base")]));
    table
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Permission registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// Registration input rejected.
    #[error("invalid permission registration: {0}")]
    Invalid(String),
    /// Registry lock failure.
    #[error("permission registry error: {0}")]
    Internal(String),
}

impl From<PermissionError> for AccessError {
    fn from(error: PermissionError) -> Self {
        match error {
            PermissionError::Invalid(message) => Self::InvalidArgument(message),
            PermissionError::Internal(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Visibility
// ============================================================================

/// Returns true when the group sets grant visibility.
///
/// This is the pure visibility predicate; the resolver only supplies the
/// role's groups.
#[must_use]
pub fn groups_grant(tool_groups: &BTreeSet<GroupName>, role_groups: &BTreeSet<GroupName>) -> bool {
    role_groups.iter().any(GroupName::is_wildcard)
        || tool_groups.iter().any(GroupName::is_wildcard)
        || tool_groups.iter().any(|group| role_groups.contains(group))
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Runtime registry of role to group mappings.
pub struct PermissionResolver {
    /// Role table.
    table: RwLock<BTreeMap<RoleName, BTreeSet<GroupName>>>,
}

impl PermissionResolver {
    /// Creates a resolver from an explicit role table.
    #[must_use]
    pub const fn new(table: BTreeMap<RoleName, BTreeSet<GroupName>>) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Creates a resolver seeded with the built-in roles.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(default_role_table())
    }

    /// Returns the groups a role resolves to (empty when unknown).
    #[must_use]
    pub fn resolve_groups(&self, role: &RoleName) -> BTreeSet<GroupName> {
        let Ok(table) = self.table.read() else {
            return BTreeSet::new();
        };
        table.get(role).cloned().unwrap_or_default()
    }

    /// Returns true when `tool` is visible to `role`.
    #[must_use]
    pub fn is_visible(&self, tool: &ToolDescriptor, role: &RoleName) -> bool {
        groups_grant(&tool.groups, &self.resolve_groups(role))
    }

    /// Filters tools down to those visible to `role`, preserving order.
    #[must_use]
    pub fn filter_visible(&self, tools: &[ToolDescriptor], role: &RoleName) -> Vec<ToolDescriptor> {
        let role_groups = self.resolve_groups(role);
        tools.iter().filter(|tool| groups_grant(&tool.groups, &role_groups)).cloned().collect()
    }

    /// Returns the groups a tool requires, for denial messages.
    #[must_use]
    pub fn required_groups(tool: &ToolDescriptor) -> Vec<String> {
        tool.groups.iter().map(ToString::to_string).collect()
    }

    /// Returns true when the role is registered.
    #[must_use]
    pub fn is_known_role(&self, role: &RoleName) -> bool {
        self.table.read().is_ok_and(|table| table.contains_key(role))
    }

    /// Returns true when the role holds the wildcard or admin group.
    #[must_use]
    pub fn is_global_admin(&self, role: &RoleName) -> bool {
        let groups = self.resolve_groups(role);
        groups.iter().any(|group| group.is_wildcard() || group.as_str() == ADMIN_GROUP)
    }

    /// Returns the registered roles with their groups.
    #[must_use]
    pub fn roles(&self) -> BTreeMap<RoleName, BTreeSet<GroupName>> {
        self.table.read().map(|table| table.clone()).unwrap_or_default()
    }

    /// Adds `group` to each listed role, creating roles that are absent.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the names are empty or the registry
    /// lock is poisoned.
    pub fn register_group(&self, group: GroupName, roles: &[RoleName]) -> Result<(), PermissionError> {
        if group.as_str().trim().is_empty() {
            return Err(PermissionError::Invalid("group name must be non-empty".to_string()));
        }
        if roles.iter().any(|role| role.as_str().trim().is_empty()) {
            return Err(PermissionError::Invalid("role name must be non-empty".to_string()));
        }
        let mut table = self.write()?;
        for role in roles {
            table.entry(role.clone()).or_default().insert(group.clone());
        }
        drop(table);
        Ok(())
    }

    /// Registers or replaces a role's group set.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the role would resolve to no groups.
    pub fn register_role(
        &self,
        role: RoleName,
        groups: BTreeSet<GroupName>,
    ) -> Result<(), PermissionError> {
        if role.as_str().trim().is_empty() {
            return Err(PermissionError::Invalid("role name must be non-empty".to_string()));
        }
        if groups.is_empty() {
            return Err(PermissionError::Invalid(format!(
                "role '{role}' must resolve to at least one group"
            )));
        }
        self.write()?.insert(role, groups);
        Ok(())
    }

    /// Locks the table for writing.
    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<RoleName, BTreeSet<GroupName>>>, PermissionError>
    {
        self.table
            .write()
            .map_err(|_| PermissionError::Internal("permission table lock poisoned".to_string()))
    }
}
