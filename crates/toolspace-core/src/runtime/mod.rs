// toolspace-core/src/runtime/mod.rs
// ============================================================================
// Module: Toolspace Runtime
// Description: Token, permission, user-space, messaging, and organization services.
// Purpose: Provide the stateful services wired together by the control plane.
// Dependencies: crate::{core, interfaces}, tokio
// ============================================================================

//! ## Overview
//! Each service owns its own lock; no lock is held across an `.await`
//! except the per-component membership lock, which deliberately spans a
//! whole proxy call. Services are plain structs shared by `Arc`; there is no
//! process-global state.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod catalog;
pub mod control_plane;
pub mod message_bus;
pub mod namespace;
pub mod organization;
pub mod permissions;
pub mod task_queue;
pub mod token_store;
pub mod user_space;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::CatalogError;
pub use catalog::RegisteredTool;
pub use catalog::ToolCatalog;
pub use catalog::ToolDescriptor;
pub use control_plane::ControlPlane;
pub use control_plane::ControlPlaneConfig;
pub use control_plane::Session;
pub use message_bus::Message;
pub use message_bus::MessageBus;
pub use message_bus::MessageBusConfig;
pub use message_bus::MessageBusError;
pub use message_bus::MessagePriority;
pub use message_bus::MessageStats;
pub use message_bus::MessageType;
pub use message_bus::PublishRequest;
pub use namespace::NAMESPACE_SEPARATOR;
pub use namespace::NamespacedTool;
pub use namespace::ToolNameNamespacer;
pub use organization::CollaborationComponent;
pub use organization::ComponentSpec;
pub use organization::ComponentSummary;
pub use organization::MemberRecord;
pub use organization::MemberRole;
pub use organization::MembershipError;
pub use organization::OrganizationConfig;
pub use organization::OrganizationError;
pub use organization::OrganizationRegistry;
pub use organization::OrganizationStats;
pub use permissions::PermissionError;
pub use permissions::PermissionResolver;
pub use permissions::default_role_table;
pub use task_queue::AsyncTask;
pub use task_queue::AsyncTaskQueue;
pub use task_queue::OriginalCall;
pub use task_queue::TaskExecution;
pub use task_queue::TaskQueueConfig;
pub use task_queue::TaskQueueError;
pub use task_queue::TaskStats;
pub use task_queue::TaskStatus;
pub use task_queue::TaskSubmission;
pub use token_store::TokenError;
pub use token_store::TokenRecord;
pub use token_store::TokenStats;
pub use token_store::TokenStore;
pub use token_store::TokenStoreConfig;
pub use user_space::SpaceCleanup;
pub use user_space::UserSpace;
pub use user_space::UserSpaceError;
pub use user_space::UserSpaceInfo;
pub use user_space::UserSpaceRegistry;
pub use user_space::UserSpaceStats;
