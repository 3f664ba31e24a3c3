// toolspace-core/src/runtime/user_space.rs
// ============================================================================
// Module: User Spaces
// Description: Per-token isolated state and its registry.
// Purpose: Own each token's authority, task queue, and lifecycle flags.
// Dependencies: crate::{core, interfaces, runtime}, serde, thiserror
// ============================================================================

//! ## Overview
//! A user-space is created lazily the first time a token is used and carries
//! that token's [`Authority`] plus its own [`AsyncTaskQueue`]. Cleanup is
//! soft: active tasks are cancelled, pending messages purged, and the space is
//! marked inactive until an admin reactivates it. Delete is hard and removes
//! the space entirely.
//!
//! Security posture: raw tokens key the registry but are never rendered in
//! errors or snapshots; fingerprints are used instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Serialize;
use thiserror::Error;

use crate::core::authority::Authority;
use crate::core::authority::ExecutorRules;
use crate::core::errors::AccessError;
use crate::core::hashing::token_fingerprint;
use crate::core::identifiers::ExecutorId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::Token;
use crate::core::identifiers::ToolName;
use crate::core::time::Timestamp;
use crate::interfaces::Clock;
use crate::runtime::catalog::ToolDescriptor;
use crate::runtime::message_bus::MessageBus;
use crate::runtime::permissions::PermissionResolver;
use crate::runtime::task_queue::AsyncTaskQueue;
use crate::runtime::task_queue::TaskQueueConfig;
use crate::runtime::task_queue::TaskStats;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// User-space errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserSpaceError {
    /// No space exists for the token (identified by fingerprint).
    #[error("user space not found: {0}")]
    NotFound(String),
    /// Lock or cascade failure.
    #[error("user space error: {0}")]
    Internal(String),
}

impl From<UserSpaceError> for AccessError {
    fn from(error: UserSpaceError) -> Self {
        match error {
            UserSpaceError::NotFound(fingerprint) => Self::not_found("user_space", fingerprint),
            UserSpaceError::Internal(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: User Space
// ============================================================================

/// Mutable portion of a user-space.
#[derive(Debug, Clone)]
struct SpaceState {
    /// Role of the owning token.
    role: RoleName,
    /// Visible tools and executor rules.
    authority: Authority,
    /// False after soft cleanup or deactivation.
    is_active: bool,
    /// Creation time.
    created_at: Timestamp,
    /// Last access time.
    last_used: Timestamp,
}

/// Isolated state owned by one token.
pub struct UserSpace {
    /// Owning token.
    token: Token,
    /// Lifecycle and authority.
    state: Mutex<SpaceState>,
    /// Task queue for this token.
    tasks: AsyncTaskQueue,
}

/// Serializable snapshot of a user-space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSpaceInfo {
    /// Owning token fingerprint.
    pub token_fingerprint: String,
    /// Role of the owning token.
    pub role: RoleName,
    /// Visible tools and executor rules.
    pub authority: Authority,
    /// Whether the space accepts calls.
    pub is_active: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last access time.
    pub last_used: Timestamp,
    /// Task counts.
    pub tasks: TaskStats,
}

impl UserSpace {
    /// Returns the owning token.
    #[must_use]
    pub const fn token(&self) -> &Token {
        &self.token
    }

    /// Returns the task queue.
    #[must_use]
    pub const fn tasks(&self) -> &AsyncTaskQueue {
        &self.tasks
    }

    /// Returns the owning role.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when the state lock is poisoned.
    pub fn role(&self) -> Result<RoleName, UserSpaceError> {
        Ok(self.lock()?.role.clone())
    }

    /// Returns a copy of the authority.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when the state lock is poisoned.
    pub fn authority(&self) -> Result<Authority, UserSpaceError> {
        Ok(self.lock()?.authority.clone())
    }

    /// Returns true when the space accepts calls. Fails closed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.is_active)
    }

    /// Returns a snapshot of the space.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when a lock is poisoned.
    pub fn info(&self) -> Result<UserSpaceInfo, UserSpaceError> {
        let state = self.lock()?.clone();
        let tasks = self.tasks.get_stats().map_err(|err| UserSpaceError::Internal(err.to_string()))?;
        Ok(UserSpaceInfo {
            token_fingerprint: token_fingerprint(&self.token),
            role: state.role,
            authority: state.authority,
            is_active: state.is_active,
            created_at: state.created_at,
            last_used: state.last_used,
            tasks,
        })
    }

    /// Applies `update` to the state under the lock.
    fn update<R>(&self, update: impl FnOnce(&mut SpaceState) -> R) -> Result<R, UserSpaceError> {
        let mut state = self.lock()?;
        Ok(update(&mut state))
    }

    /// Locks the state.
    fn lock(&self) -> Result<MutexGuard<'_, SpaceState>, UserSpaceError> {
        self.state.lock().map_err(|_| UserSpaceError::Internal("user space mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Cleanup Report
// ============================================================================

/// Result of a soft cleanup or hard delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpaceCleanup {
    /// Active tasks cancelled.
    pub cancelled_tasks: usize,
    /// Pending messages purged.
    pub purged_messages: usize,
}

/// Aggregate user-space counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserSpaceStats {
    /// All spaces.
    pub total: usize,
    /// Active spaces.
    pub active: usize,
    /// Inactive spaces.
    pub inactive: usize,
    /// Space counts keyed by role.
    pub by_role: BTreeMap<String, usize>,
    /// Task counts across every space.
    pub tasks: TaskStats,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of user-spaces keyed by token.
pub struct UserSpaceRegistry {
    /// Spaces keyed by owning token.
    spaces: Mutex<BTreeMap<Token, Arc<UserSpace>>>,
    /// Role visibility for spaces without an allow-list.
    resolver: Arc<PermissionResolver>,
    /// Bus purged on cleanup.
    bus: Arc<MessageBus>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Limits applied to new task queues.
    queue_config: TaskQueueConfig,
}

impl UserSpaceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        resolver: Arc<PermissionResolver>,
        bus: Arc<MessageBus>,
        clock: Arc<dyn Clock>,
        queue_config: TaskQueueConfig,
    ) -> Self {
        Self {
            spaces: Mutex::new(BTreeMap::new()),
            resolver,
            bus,
            clock,
            queue_config,
        }
    }

    /// Returns the space for `token`, creating it on first use. Touches
    /// `last_used`.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when a lock is poisoned.
    pub fn get(&self, token: &Token, role: &RoleName) -> Result<Arc<UserSpace>, UserSpaceError> {
        let now = self.clock.now();
        let mut spaces = self.lock()?;
        if let Some(space) = spaces.get(token) {
            let space = Arc::clone(space);
            drop(spaces);
            space.update(|state| state.last_used = now)?;
            return Ok(space);
        }
        let space = Arc::new(UserSpace {
            token: token.clone(),
            state: Mutex::new(SpaceState {
                role: role.clone(),
                authority: Authority::default(),
                is_active: true,
                created_at: now,
                last_used: now,
            }),
            tasks: AsyncTaskQueue::new(token.clone(), self.queue_config, Arc::clone(&self.clock)),
        });
        spaces.insert(token.clone(), Arc::clone(&space));
        drop(spaces);
        Ok(space)
    }

    /// Returns the space for `token` without creating it.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when the registry lock is poisoned.
    pub fn get_if_exists(&self, token: &Token) -> Result<Option<Arc<UserSpace>>, UserSpaceError> {
        Ok(self.lock()?.get(token).cloned())
    }

    /// Returns true when a space exists for `token`.
    #[must_use]
    pub fn has_space(&self, token: &Token) -> bool {
        self.spaces.lock().is_ok_and(|spaces| spaces.contains_key(token))
    }

    /// Replaces the visible-tool allow-list. An empty set defers to roles.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn set_visible_tools(
        &self,
        token: &Token,
        tools: BTreeSet<ToolName>,
    ) -> Result<(), UserSpaceError> {
        self.require(token)?.update(|state| state.authority.visible_tools = tools)
    }

    /// Adds one tool to the allow-list. Returns false when already present.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn add_visible_tool(&self, token: &Token, tool: ToolName) -> Result<bool, UserSpaceError> {
        self.require(token)?.update(|state| state.authority.visible_tools.insert(tool))
    }

    /// Removes one tool from the allow-list. Returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn remove_visible_tool(&self, token: &Token, tool: &ToolName) -> Result<bool, UserSpaceError> {
        self.require(token)?.update(|state| state.authority.visible_tools.remove(tool))
    }

    /// Returns the allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn get_visible_tools(&self, token: &Token) -> Result<BTreeSet<ToolName>, UserSpaceError> {
        Ok(self.require(token)?.authority()?.visible_tools)
    }

    /// Returns true when the space may see `tool`. Fails closed for missing
    /// or inactive spaces.
    #[must_use]
    pub fn is_tool_visible(&self, token: &Token, tool: &ToolDescriptor) -> bool {
        let Ok(Some(space)) = self.get_if_exists(token) else {
            return false;
        };
        let Ok(state) = space.lock().map(|state| state.clone()) else {
            return false;
        };
        if !state.is_active {
            return false;
        }
        if state.authority.defers_to_role() {
            self.resolver.is_visible(tool, &state.role)
        } else {
            state.authority.visible_tools.contains(&tool.name)
        }
    }

    /// Returns the rules for one executor.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn get_executor_rules(
        &self,
        token: &Token,
        executor: &ExecutorId,
    ) -> Result<Option<ExecutorRules>, UserSpaceError> {
        Ok(self.require(token)?.authority()?.rules_for(executor).cloned())
    }

    /// Sets the rules for one executor.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn set_executor_rules(
        &self,
        token: &Token,
        executor: ExecutorId,
        rules: ExecutorRules,
    ) -> Result<(), UserSpaceError> {
        self.require(token)?.update(|state| {
            state.authority.rules.insert(executor, rules);
        })
    }

    /// Removes the rules for one executor. Returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn remove_executor_rules(
        &self,
        token: &Token,
        executor: &ExecutorId,
    ) -> Result<bool, UserSpaceError> {
        self.require(token)?.update(|state| state.authority.rules.remove(executor).is_some())
    }

    /// Soft cleanup: cancels active tasks, purges messages, and marks the
    /// space inactive.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::NotFound`] when no space exists.
    pub fn cleanup(&self, token: &Token) -> Result<SpaceCleanup, UserSpaceError> {
        let space = self.require(token)?;
        space.update(|state| state.is_active = false)?;
        self.release(&space)
    }

    /// Hard delete: releases the space's resources and removes it. Returns
    /// `None` when no space existed.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when a lock is poisoned.
    pub fn delete(&self, token: &Token) -> Result<Option<SpaceCleanup>, UserSpaceError> {
        let Some(space) = self.lock()?.remove(token) else {
            return Ok(None);
        };
        self.release(&space).map(Some)
    }

    /// Marks the space active. Returns false when no space exists.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when a lock is poisoned.
    pub fn activate(&self, token: &Token) -> Result<bool, UserSpaceError> {
        self.set_active(token, true)
    }

    /// Marks the space inactive. Returns false when no space exists.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when a lock is poisoned.
    pub fn deactivate(&self, token: &Token) -> Result<bool, UserSpaceError> {
        self.set_active(token, false)
    }

    /// Returns snapshots of every space in token order.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when a lock is poisoned.
    pub fn list(&self) -> Result<Vec<UserSpaceInfo>, UserSpaceError> {
        self.snapshot()?.iter().map(|space| space.info()).collect()
    }

    /// Returns aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns [`UserSpaceError::Internal`] when a lock is poisoned.
    pub fn stats(&self) -> Result<UserSpaceStats, UserSpaceError> {
        let mut stats = UserSpaceStats::default();
        for info in self.list()? {
            stats.total += 1;
            if info.is_active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            *stats.by_role.entry(info.role.to_string()).or_insert(0) += 1;
            stats.tasks.absorb(&info.tasks);
        }
        Ok(stats)
    }

    /// Cancels tasks and purges messages for a space.
    fn release(&self, space: &UserSpace) -> Result<SpaceCleanup, UserSpaceError> {
        let cancelled_tasks =
            space.tasks.cancel_active().map_err(|err| UserSpaceError::Internal(err.to_string()))?;
        let purged_messages = self
            .bus
            .cleanup_user_messages(&space.token)
            .map_err(|err| UserSpaceError::Internal(err.to_string()))?;
        Ok(SpaceCleanup {
            cancelled_tasks,
            purged_messages,
        })
    }

    /// Sets the active flag on an existing space.
    fn set_active(&self, token: &Token, active: bool) -> Result<bool, UserSpaceError> {
        let Some(space) = self.get_if_exists(token)? else {
            return Ok(false);
        };
        space.update(|state| state.is_active = active)?;
        Ok(true)
    }

    /// Returns the space or a fingerprinted not-found error.
    fn require(&self, token: &Token) -> Result<Arc<UserSpace>, UserSpaceError> {
        self.get_if_exists(token)?.ok_or_else(|| UserSpaceError::NotFound(token_fingerprint(token)))
    }

    /// Clones the current space handles.
    fn snapshot(&self) -> Result<Vec<Arc<UserSpace>>, UserSpaceError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    /// Locks the registry.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<Token, Arc<UserSpace>>>, UserSpaceError> {
        self.spaces
            .lock()
            .map_err(|_| UserSpaceError::Internal("user space registry mutex poisoned".to_string()))
    }
}
