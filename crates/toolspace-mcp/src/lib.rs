// toolspace-mcp/src/lib.rs
// ============================================================================
// Module: Toolspace MCP
// Description: MCP server and system tools for Toolspace.
// Purpose: Provide MCP tool adapters over the Toolspace control plane.
// Dependencies: toolspace-core, toolspace-config, axum, tokio
// ============================================================================

//! ## Overview
//! Toolspace MCP exposes the token-scoped control plane through MCP tools.
//! Catalog tools, the reserved system tool family, and namespaced
//! collaboration tools are all thin wrappers over
//! [`toolspace_core::ControlPlane`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod builtin;
pub mod server;
pub mod system_tools;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::McpAuditEvent;
pub use audit::McpAuditSink;
pub use audit::McpFileAuditSink;
pub use audit::McpNoopAuditSink;
pub use audit::McpOutcome;
pub use audit::McpStderrAuditSink;
pub use audit::McpSweepEvent;
pub use audit::ProxyAuditBridge;
pub use auth::RequestContext;
pub use server::McpServer;
pub use server::McpServerError;
pub use system_tools::SystemTool;
pub use tools::ToolError;
pub use tools::ToolRouter;
