// toolspace-core/src/lib.rs
// ============================================================================
// Module: Toolspace Core Library
// Description: Public API surface for the Toolspace access-control engine.
// Purpose: Expose core types, interfaces, and runtime services.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Toolspace core grants bearer tokens scoped access to a catalog of tools,
//! isolates per-token runtime state, and composes tokens into collaboration
//! components that proxy-execute tools under a narrower shared authority.
//! It is transport-agnostic; the MCP server in `toolspace-mcp` is one caller.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::Clock;
pub use interfaces::ManualClock;
pub use interfaces::NoopProxyAuditSink;
pub use interfaces::ProxyAuditEvent;
pub use interfaces::ProxyAuditSink;
pub use interfaces::SystemClock;
pub use interfaces::Tool;
pub use interfaces::ToolContext;
pub use interfaces::ToolExecutionError;
pub use runtime::AsyncTask;
pub use runtime::AsyncTaskQueue;
pub use runtime::CollaborationComponent;
pub use runtime::ComponentSpec;
pub use runtime::ControlPlane;
pub use runtime::ControlPlaneConfig;
pub use runtime::Message;
pub use runtime::MessageBus;
pub use runtime::MessageBusConfig;
pub use runtime::MessagePriority;
pub use runtime::MessageType;
pub use runtime::NamespacedTool;
pub use runtime::OrganizationConfig;
pub use runtime::OrganizationRegistry;
pub use runtime::PermissionResolver;
pub use runtime::PublishRequest;
pub use runtime::Session;
pub use runtime::TaskExecution;
pub use runtime::TaskQueueConfig;
pub use runtime::TaskStatus;
pub use runtime::TaskSubmission;
pub use runtime::TokenRecord;
pub use runtime::TokenStore;
pub use runtime::TokenStoreConfig;
pub use runtime::ToolCatalog;
pub use runtime::ToolDescriptor;
pub use runtime::ToolNameNamespacer;
pub use runtime::UserSpace;
pub use runtime::UserSpaceRegistry;
