// toolspace-core/src/interfaces/mod.rs
// ============================================================================
// Module: Toolspace Interfaces
// Description: Tool, clock, and proxy audit seams.
// Purpose: Define the contract surfaces the runtime calls out through.
// Dependencies: crate::core, async-trait, serde
// ============================================================================

//! ## Overview
//! The runtime reaches the outside world through three seams: [`Tool`] for
//! executing work, [`Clock`] for reading time, and [`ProxyAuditSink`] for
//! recording proxy executions. Each has a default implementation so embedders
//! only supply what they need.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::ComponentId;
use crate::core::identifiers::MemberId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::Token;
use crate::core::identifiers::ToolName;
use crate::core::result::ToolResult;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tool Execution
// ============================================================================

/// Context handed to a tool for one invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Token the call is made on behalf of.
    pub token: Token,
    /// Effective role (the component role for proxy calls).
    pub role: RoleName,
    /// Component routing the call, for proxy execution.
    pub component: Option<ComponentId>,
    /// Caller-supplied request identifier.
    pub request_id: Option<String>,
    /// Executor settings from the applicable rules.
    pub settings: Value,
}

impl ToolContext {
    /// Builds a context for a direct call.
    #[must_use]
    pub fn direct(token: Token, role: RoleName) -> Self {
        Self {
            token,
            role,
            component: None,
            request_id: None,
            settings: Value::Null,
        }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Errors raised by tool implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolExecutionError {
    /// Arguments did not match the tool's expectations.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Tool failed while executing.
    #[error("{0}")]
    Failed(String),
}

/// Callable tool implementation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Executes the tool with JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolExecutionError`] when the tool cannot complete.
    async fn execute(&self, args: Value, ctx: &ToolContext)
    -> Result<ToolResult, ToolExecutionError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

/// Manually advanced time source for deterministic expiry.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current unix milliseconds.
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock fixed at `start`.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_unix_millis()),
        }
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        let delta = i64::try_from(millis).unwrap_or(i64::MAX);
        let _ = self.millis.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(current.saturating_add(delta))
        });
    }

    /// Sets the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Proxy Audit
// ============================================================================

/// Audit record emitted for every proxy execution, allowed or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Component routing the call.
    pub component: ComponentId,
    /// Resolved member, when the caller is a member.
    pub member: Option<MemberId>,
    /// Caller token fingerprint.
    pub token_fingerprint: String,
    /// Tool requested (unprefixed).
    pub tool: ToolName,
    /// Whether the call produced a non-error result.
    pub success: bool,
    /// Elapsed time in milliseconds.
    pub duration_ms: u64,
    /// Error code or denial reason for failures.
    pub reason: Option<String>,
}

/// Sink for proxy execution audit events.
pub trait ProxyAuditSink: Send + Sync {
    /// Record a proxy audit event.
    fn record(&self, event: &ProxyAuditEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProxyAuditSink;

impl ProxyAuditSink for NoopProxyAuditSink {
    fn record(&self, _event: &ProxyAuditEvent) {}
}
