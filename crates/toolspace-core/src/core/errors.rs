// toolspace-core/src/core/errors.rs
// ============================================================================
// Module: Access Errors
// Description: Boundary error taxonomy for tool access and proxy execution.
// Purpose: Convert every denial or failure into a debuggable isError result.
// Dependencies: thiserror, serde
// ============================================================================

//! ## Overview
//! [`AccessError`] is the error surfaced at operation boundaries. Each leaf
//! service keeps its own error enum and converts into this one. Messages name
//! the resource and the reason (for example the groups a tool requires) but
//! never the full permission table or a raw token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::result::ToolResult;

// ============================================================================
// SECTION: Token Reasons
// ============================================================================

/// Why a token failed validation.
///
/// # Invariants
/// - `NotFound` and `Expired` stay distinct so callers can choose between
///   re-authentication and renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenInvalidReason {
    /// Token is unknown to the store.
    NotFound,
    /// Token is past its expiry.
    Expired,
    /// Token was deactivated.
    Inactive,
}

impl TokenInvalidReason {
    /// Returns the stable label for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for TokenInvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Access Errors
// ============================================================================

/// Errors surfaced at the tool-access boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Token unknown, expired, or inactive.
    #[error("token_invalid: token is {reason}")]
    TokenInvalid {
        /// Validation failure reason.
        reason: TokenInvalidReason,
    },
    /// Role/group mismatch or executor rule denial.
    #[error("permission_denied: tool '{tool}' {reason}")]
    PermissionDenied {
        /// Tool being invoked.
        tool: String,
        /// Denial reason.
        reason: String,
    },
    /// Component authority or member role refused the tool.
    #[error("forbidden: component '{component}' does not permit tool '{tool}': {reason}")]
    Forbidden {
        /// Component identifier.
        component: String,
        /// Offending tool name.
        tool: String,
        /// Denial reason.
        reason: String,
    },
    /// Caller is not a member of the component.
    #[error("not_a_member: caller is not a member of component '{component}'")]
    NotAMember {
        /// Component identifier.
        component: String,
    },
    /// Task, message, component, tool, token, or user-space absent.
    #[error("not_found: {kind} '{id}'")]
    NotFound {
        /// Resource kind label.
        kind: &'static str,
        /// Resource identifier (never a raw token).
        id: String,
    },
    /// Namespaced tool name could not be parsed.
    #[error("malformed_name: '{name}': {expected}")]
    MalformedName {
        /// Offending name.
        name: String,
        /// Expected format description.
        expected: String,
    },
    /// Underlying tool reported a failure.
    #[error("execution_failed: tool '{tool}': {message}")]
    ExecutionFailed {
        /// Tool name.
        tool: String,
        /// Failure message.
        message: String,
    },
    /// Waiter gave up before the task finished.
    #[error("timeout: task '{task}' did not finish within {timeout_ms}ms")]
    Timeout {
        /// Task identifier.
        task: String,
        /// Wait timeout in milliseconds.
        timeout_ms: u64,
    },
    /// Caller's user-space is soft-cleaned or deactivated.
    #[error("space_inactive: user space is inactive")]
    SpaceInactive,
    /// Argument failed validation.
    #[error("invalid_argument: {0}")]
    InvalidArgument(String),
    /// Operation conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Configured capacity reached.
    #[error("limit_exceeded: {0}")]
    LimitExceeded(String),
    /// Unexpected internal failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl AccessError {
    /// Builds a permission denial naming the groups the tool requires.
    #[must_use]
    pub fn missing_groups(tool: impl Into<String>, required: &[String]) -> Self {
        let reason = if required.is_empty() {
            "is not visible to this role".to_string()
        } else {
            format!("requires one of groups [{}]", required.join(", "))
        };
        Self::PermissionDenied {
            tool: tool.into(),
            reason,
        }
    }

    /// Builds a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TokenInvalid {
                ..
            } => "token_invalid",
            Self::PermissionDenied {
                ..
            } => "permission_denied",
            Self::Forbidden {
                ..
            } => "forbidden",
            Self::NotAMember {
                ..
            } => "not_a_member",
            Self::NotFound {
                ..
            } => "not_found",
            Self::MalformedName {
                ..
            } => "malformed_name",
            Self::ExecutionFailed {
                ..
            } => "execution_failed",
            Self::Timeout {
                ..
            } => "timeout",
            Self::SpaceInactive => "space_inactive",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Conflict(_) => "conflict",
            Self::LimitExceeded(_) => "limit_exceeded",
            Self::Internal(_) => "internal",
        }
    }

    /// Renders the error as an `isError` tool result.
    #[must_use]
    pub fn to_tool_result(&self) -> ToolResult {
        ToolResult::error(self.to_string())
    }
}
