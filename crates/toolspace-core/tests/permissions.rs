// toolspace-core/tests/permissions.rs
// ============================================================================
// Module: Permission Resolver Tests
// Description: Role resolution and the visibility predicate.
// ============================================================================
//! ## Overview
//! Checks the built-in roles and fuzzes the visibility rule against its
//! set-theoretic definition.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use proptest::prelude::*;
use toolspace_core::GroupName;
use toolspace_core::PermissionResolver;
use toolspace_core::RoleName;
use toolspace_core::ToolDescriptor;

const GROUPS: [&str; 5] = ["*", "base", "messaging", "tasks", "admin"];

fn groups_from(mask: u8) -> BTreeSet<GroupName> {
    GROUPS
        .iter()
        .enumerate()
        .filter(|(index, _)| mask & (1 << index) != 0)
        .map(|(_, name)| GroupName::new(*name))
        .collect()
}

/// Verifies the admin role sees every tool, including untagged ones.
#[test]
fn admin_sees_everything() {
    let resolver = PermissionResolver::with_defaults();
    let admin = RoleName::new("admin");
    assert!(resolver.resolve_groups(&admin).contains(&GroupName::wildcard()));
    assert!(resolver.is_visible(&ToolDescriptor::new("anything", ""), &admin));
    assert!(resolver.is_visible(&ToolDescriptor::new("ops", "").with_groups(["ops"]), &admin));
    assert!(resolver.is_global_admin(&admin));
    assert!(!resolver.is_global_admin(&RoleName::new("user")));
}

/// Verifies unknown roles fail closed and filtering keeps order.
#[test]
fn unknown_roles_see_nothing() {
    let resolver = PermissionResolver::with_defaults();
    let tools = vec![
        ToolDescriptor::new("echo", "").with_groups(["base"]),
        ToolDescriptor::new("publish", "").with_groups(["messaging"]),
        ToolDescriptor::new("clock_now", "").with_groups(["base"]),
    ];
    assert!(resolver.filter_visible(&tools, &RoleName::new("intruder")).is_empty());
    let guest: Vec<String> = resolver
        .filter_visible(&tools, &RoleName::new("guest"))
        .into_iter()
        .map(|tool| tool.name.to_string())
        .collect();
    assert_eq!(guest, vec!["echo", "clock_now"]);
}

/// Verifies dynamic group and role registration.
#[test]
fn registration_extends_the_table() {
    let resolver = PermissionResolver::with_defaults();
    resolver.register_group(GroupName::new("files"), &[RoleName::new("user"), RoleName::new("auditor")]).unwrap();
    assert!(resolver.is_known_role(&RoleName::new("auditor")));
    assert!(resolver.resolve_groups(&RoleName::new("user")).contains(&GroupName::new("files")));
    assert!(resolver.register_role(RoleName::new("empty"), BTreeSet::new()).is_err());
    assert!(resolver.register_group(GroupName::new(" "), &[]).is_err());
}

proptest! {
    /// Verifies visibility equals intersection-or-wildcard for arbitrary sets.
    #[test]
    fn visibility_matches_set_definition(tool_mask in 0u8..32, role_mask in 0u8..32) {
        let tool_groups = groups_from(tool_mask);
        let role_groups = groups_from(role_mask);
        let role = RoleName::new("fuzz");
        let resolver = PermissionResolver::new(BTreeMap::from([(role.clone(), role_groups.clone())]));
        let tool = ToolDescriptor::new("t", "").with_groups(tool_groups.clone());

        let expected = !tool_groups.is_disjoint(&role_groups)
            || role_groups.contains(&GroupName::wildcard())
            || tool_groups.contains(&GroupName::wildcard());
        prop_assert_eq!(resolver.is_visible(&tool, &role), expected);
    }
}
