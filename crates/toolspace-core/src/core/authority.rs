// toolspace-core/src/core/authority.rs
// ============================================================================
// Module: Authority
// Description: Capability object shared by user-spaces and components.
// Purpose: Hold a visible-tool ceiling and per-executor rules in one value.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`Authority`] bounds what its holder may invoke. User-spaces hold one
//! per token; collaboration components hold one as their ceiling. The
//! visible-tool set is two-tier: empty defers to role filtering, non-empty is
//! an explicit allow-list that overrides it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::ExecutorId;
use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Executor Rules
// ============================================================================

/// Execution rules applied to every tool routed to one executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorRules {
    /// When false, every tool on this executor is refused.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Explicit allow-list; empty allows all.
    #[serde(default)]
    pub allow: BTreeSet<ToolName>,
    /// Explicit deny-list; always wins over `allow`.
    #[serde(default)]
    pub deny: BTreeSet<ToolName>,
    /// Execution time bound in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Opaque settings forwarded to tools in their context.
    #[serde(default = "empty_settings")]
    pub settings: Value,
}

impl Default for ExecutorRules {
    fn default() -> Self {
        Self {
            enabled: true,
            allow: BTreeSet::new(),
            deny: BTreeSet::new(),
            timeout_ms: None,
            settings: empty_settings(),
        }
    }
}

impl ExecutorRules {
    /// Returns a denial reason when these rules refuse `tool`.
    #[must_use]
    pub fn refusal(&self, tool: &ToolName) -> Option<String> {
        if !self.enabled {
            return Some("is refused: executor disabled".to_string());
        }
        if self.deny.contains(tool) {
            return Some("is refused: denied by executor rules".to_string());
        }
        if !self.allow.is_empty() && !self.allow.contains(tool) {
            return Some("is refused: not in executor allow-list".to_string());
        }
        None
    }
}

// ============================================================================
// SECTION: Authority
// ============================================================================

/// Capability object held by user-spaces and collaboration components.
///
/// # Invariants
/// - Empty `visible_tools` means "defer to role-based filtering".
/// - Non-empty `visible_tools` is an allow-list overriding role filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authority {
    /// Visible-tool allow-list (empty defers to role filtering).
    #[serde(default)]
    pub visible_tools: BTreeSet<ToolName>,
    /// Executor rules keyed by executor identifier.
    #[serde(default)]
    pub rules: BTreeMap<ExecutorId, ExecutorRules>,
}

impl Authority {
    /// Builds an authority restricted to the given tools.
    #[must_use]
    pub fn with_visible_tools<I, T>(tools: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ToolName>,
    {
        Self {
            visible_tools: tools.into_iter().map(Into::into).collect(),
            rules: BTreeMap::new(),
        }
    }

    /// Returns true when the allow-list is empty (role filtering applies).
    #[must_use]
    pub fn defers_to_role(&self) -> bool {
        self.visible_tools.is_empty()
    }

    /// Returns the rules for `executor`, if configured.
    #[must_use]
    pub fn rules_for(&self, executor: &ExecutorId) -> Option<&ExecutorRules> {
        self.rules.get(executor)
    }
}

// ============================================================================
// SECTION: Serde Defaults
// ============================================================================

/// Executors are enabled unless configured otherwise.
const fn default_enabled() -> bool {
    true
}

/// Empty settings object.
fn empty_settings() -> Value {
    Value::Object(Map::new())
}
