// toolspace-mcp/src/builtin.rs
// ============================================================================
// Module: Built-in Catalog Tools
// Description: Catalog tools shipped with the server.
// Purpose: Give a freshly started server something callable.
// Dependencies: toolspace-core, async-trait, serde_json
// ============================================================================

//! ## Overview
//! `echo` returns its arguments and the caller's role; `clock_now` reads
//! the control plane clock. Both sit in the `base` group so every built-in
//! role can see them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use toolspace_core::Clock;
use toolspace_core::Tool;
use toolspace_core::ToolContext;
use toolspace_core::ToolDescriptor;
use toolspace_core::ToolExecutionError;
use toolspace_core::ToolResult;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Group granting the built-in tools.
pub const BASE_GROUP: &str = "base";

// ============================================================================
// SECTION: Echo
// ============================================================================

/// Returns the call arguments unchanged.
pub struct EchoTool;

impl EchoTool {
    /// Returns the catalog descriptor.
    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("echo", "Echo the arguments back with the caller's role.")
            .with_groups([BASE_GROUP])
            .with_input_schema(json!({
                "type": "object",
                "additionalProperties": true
            }))
    }
}

#[async_trait]
impl Tool for EchoTool {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolExecutionError> {
        Ok(ToolResult::json(json!({
            "echo": args,
            "role": ctx.role,
            "component": ctx.component,
            "request_id": ctx.request_id,
        })))
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Returns the current time in unix milliseconds.
pub struct ClockNowTool {
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl ClockNowTool {
    /// Builds the tool over `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
        }
    }

    /// Returns the catalog descriptor.
    #[must_use]
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("clock_now", "Return the server time in unix milliseconds.")
            .with_groups([BASE_GROUP])
            .with_input_schema(json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }))
    }
}

#[async_trait]
impl Tool for ClockNowTool {
    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolExecutionError> {
        Ok(ToolResult::json(json!({
            "unix_millis": self.clock.now().as_unix_millis()
        })))
    }
}
