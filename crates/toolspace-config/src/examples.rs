// toolspace-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the CLI.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `toolspace.toml`. The bootstrap token below is a
//! placeholder and must be replaced before use.

/// Returns a canonical example `toolspace.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
transport = "http"
bind = "127.0.0.1:8650"
max_body_bytes = 1048576

[server.audit]
enabled = true
# path = "toolspace-audit.jsonl"

[tokens]
default_ttl_secs = 86400
max_ttl_secs = 2592000
cleanup_interval_secs = 60

# Replaces the built-in groups for a role.
[[roles]]
name = "guest"
groups = ["base", "messaging"]

# Adds a group to each listed role.
[[groups]]
name = "analytics"
roles = ["user", "analyst"]

# Bootstrap tokens ignore the ttl settings above and never expire.
[[bootstrap_tokens]]
token = "replace-with-a-long-random-admin-token"
role = "admin"
description = "initial operator token"

[user_space]
max_tasks_per_space = 1000

[message_bus]
max_pending_per_token = 1000
default_ttl_secs = 3600
history_per_token = 256

[organization]
default_max_members = 100
max_components = 1000
"#,
    )
}
