// toolspace-config/src/lib.rs
// ============================================================================
// Module: Toolspace Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for toolspace.toml semantics.
// Dependencies: toolspace-core, serde, toml
// ============================================================================

//! ## Overview
//! `toolspace-config` defines the configuration model for a Toolspace server.
//! It provides strict, fail-closed validation and converts a validated file
//! into the control plane's construction inputs.
//!
//! Security posture: config inputs are untrusted and bootstrap tokens are
//! secrets; neither is echoed back in error messages.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
