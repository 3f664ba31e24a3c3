// toolspace-core/src/runtime/namespace.rs
// ============================================================================
// Module: Tool Name Namespacer
// Description: Component prefixes for aggregated collaboration tool names.
// Purpose: Keep tools from different components from colliding.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Collaboration tools are exposed as `<componentId>__<toolName>`. Component
//! ids are restricted to ASCII alphanumerics and `-`, and catalog tool names
//! may not contain `__`, so splitting on the first separator always recovers
//! the original pair. Everything here is pure; no registry is consulted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::identifiers::ComponentId;
use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Separator between a component id and a tool name.
pub const NAMESPACE_SEPARATOR: &str = "__";
/// Maximum component id length in bytes.
pub const MAX_COMPONENT_ID_LENGTH: usize = 64;
/// Tool families owned by the system surface; never valid component ids.
pub const RESERVED_FAMILIES: [&str; 6] = ["admin", "message", "task", "org", "system", "base"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// A namespaced tool name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedTool {
    /// Owning component.
    pub component_id: ComponentId,
    /// Unprefixed tool name.
    pub tool_name: ToolName,
}

/// Stateless prefixing utility.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolNameNamespacer;

impl ToolNameNamespacer {
    /// Prefixes `tool` with `component_id`.
    #[must_use]
    pub fn add_prefix(component_id: &ComponentId, tool: &ToolName) -> ToolName {
        ToolName::new(format!("{component_id}{NAMESPACE_SEPARATOR}{tool}"))
    }

    /// Splits a name on the first separator. Returns `None` when either side
    /// is empty or the separator is absent.
    #[must_use]
    pub fn parse_prefix(full: &str) -> Option<NamespacedTool> {
        let (component, tool) = full.split_once(NAMESPACE_SEPARATOR)?;
        if component.is_empty() || tool.is_empty() {
            return None;
        }
        Some(NamespacedTool {
            component_id: ComponentId::new(component),
            tool_name: ToolName::new(tool),
        })
    }

    /// Returns true when `name` parses to a valid, non-reserved component.
    #[must_use]
    pub fn is_collaboration_tool(name: &str) -> bool {
        Self::parse_prefix(name)
            .is_some_and(|parsed| Self::is_valid_component_id(parsed.component_id.as_str()))
    }

    /// Returns true when `id` may be used as a component id.
    #[must_use]
    pub fn is_valid_component_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_COMPONENT_ID_LENGTH
            && id.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-')
            && !RESERVED_FAMILIES.contains(&id)
    }

    /// Describes the expected collaboration tool name format.
    #[must_use]
    pub fn format_error_message() -> String {
        format!(
            "collaboration tool names must look like '<componentId>{NAMESPACE_SEPARATOR}<toolName>' \
             where componentId uses only letters, digits, and '-'"
        )
    }
}
