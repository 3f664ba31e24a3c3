// toolspace-core/src/core/mod.rs
// ============================================================================
// Module: Toolspace Core Types
// Description: Identifiers, time, tool results, authority, and errors.
// Purpose: Provide stable, serializable types shared by every runtime service.
// Dependencies: serde, sha2, rand, thiserror
// ============================================================================

//! ## Overview
//! Core types are the wire-stable vocabulary of Toolspace. Runtime services
//! and the MCP surface exchange these values; none of them hold locks or
//! perform I/O.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod authority;
pub mod errors;
pub mod hashing;
pub mod identifiers;
pub mod result;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use authority::Authority;
pub use authority::ExecutorRules;
pub use errors::AccessError;
pub use errors::TokenInvalidReason;
pub use hashing::hex_encode;
pub use hashing::token_fingerprint;
pub use identifiers::ComponentId;
pub use identifiers::ExecutorId;
pub use identifiers::GroupName;
pub use identifiers::MemberId;
pub use identifiers::MessageId;
pub use identifiers::RoleName;
pub use identifiers::TaskId;
pub use identifiers::Token;
pub use identifiers::ToolName;
pub use identifiers::WILDCARD_GROUP;
pub use result::ContentBlock;
pub use result::ToolResult;
pub use time::Timestamp;
