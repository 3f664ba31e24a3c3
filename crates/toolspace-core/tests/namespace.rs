// toolspace-core/tests/namespace.rs
// ============================================================================
// Module: Namespacer Tests
// Description: Prefixing and parsing of collaboration tool names.
// ============================================================================
//! ## Overview
//! Covers the reserved families, malformed names, and the prefix round trip.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use toolspace_core::ComponentId;
use toolspace_core::ToolName;
use toolspace_core::ToolNameNamespacer;

/// Verifies names without a usable prefix are rejected.
#[test]
fn malformed_names_do_not_parse() {
    for name in ["echo", "__echo", "dev-team__", "", "__"] {
        assert!(ToolNameNamespacer::parse_prefix(name).is_none(), "{name}");
    }
}

/// Verifies reserved families and invalid ids are not collaboration tools.
#[test]
fn reserved_and_invalid_prefixes() {
    assert!(ToolNameNamespacer::is_collaboration_tool("dev-team__file_read"));
    assert!(!ToolNameNamespacer::is_collaboration_tool("admin__token_create"));
    assert!(!ToolNameNamespacer::is_collaboration_tool("dev team__file_read"));
    assert!(!ToolNameNamespacer::is_valid_component_id(&"a".repeat(65)));
    assert!(ToolNameNamespacer::format_error_message().contains("__"));
}

proptest! {
    /// Verifies parse inverts add for valid component ids and tool names.
    #[test]
    fn prefix_round_trip(component in "[A-Za-z0-9-]{1,64}", tool in "[a-z][a-z0-9_]{0,30}[a-z0-9]") {
        prop_assume!(!tool.contains("__"));
        let component_id = ComponentId::new(component);
        let tool_name = ToolName::new(tool);
        let full = ToolNameNamespacer::add_prefix(&component_id, &tool_name);
        let parsed = ToolNameNamespacer::parse_prefix(full.as_str()).unwrap();
        prop_assert_eq!(parsed.component_id, component_id);
        prop_assert_eq!(parsed.tool_name, tool_name);
    }
}
