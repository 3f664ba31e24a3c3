// toolspace-core/src/core/identifiers.rs
// ============================================================================
// Module: Toolspace Identifiers
// Description: Opaque string identifiers for tokens, tools, tasks, and components.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, rand
// ============================================================================

//! ## Overview
//! Identifiers are opaque and serialize as plain strings. Roles, groups, and
//! tool names keep their string wire format; membership in the runtime
//! registries is validated at service boundaries rather than inside these
//! wrappers. Generated identifiers draw from the thread-local CSPRNG.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;

use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::hex_encode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Group name granting visibility of every group.
pub const WILDCARD_GROUP: &str = "*";
/// Random bytes backing a generated bearer token.
const TOKEN_RANDOM_BYTES: usize = 24;
/// Random bytes backing generated task and message identifiers.
const ID_RANDOM_BYTES: usize = 8;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares a transparent string identifier with the canonical helpers.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier!(
    /// Opaque bearer token compared by string equality.
    ///
    /// # Invariants
    /// - Tokens never appear in audit output; use
    ///   [`crate::core::hashing::token_fingerprint`] instead.
    Token
);

string_identifier!(
    /// Role name resolving to a set of permission groups.
    RoleName
);

string_identifier!(
    /// Permission group tag attached to tools.
    GroupName
);

string_identifier!(
    /// Catalog or namespaced tool name.
    ToolName
);

string_identifier!(
    /// Async task identifier scoped to a user-space.
    TaskId
);

string_identifier!(
    /// Message bus identifier.
    MessageId
);

string_identifier!(
    /// Collaboration component identifier (also the namespace prefix).
    ComponentId
);

string_identifier!(
    /// Member identifier inside a collaboration component.
    MemberId
);

string_identifier!(
    /// Executor identifier keying executor rules.
    ExecutorId
);

impl Token {
    /// Generates a fresh random bearer token (`tok_` + 48 hex chars).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("tok_{}", random_hex(TOKEN_RANDOM_BYTES)))
    }
}

impl TaskId {
    /// Generates a fresh random task identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("task-{}", random_hex(ID_RANDOM_BYTES)))
    }
}

impl MessageId {
    /// Generates a fresh random message identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("msg-{}", random_hex(ID_RANDOM_BYTES)))
    }
}

impl GroupName {
    /// Returns the wildcard group.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::new(WILDCARD_GROUP)
    }

    /// Returns true when this is the wildcard group.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_GROUP
    }
}

impl ExecutorId {
    /// Executor used when a tool does not name one.
    #[must_use]
    pub fn default_executor() -> Self {
        Self::new("default")
    }
}

impl Default for ExecutorId {
    fn default() -> Self {
        Self::default_executor()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns `len` random bytes as lowercase hex.
fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}
