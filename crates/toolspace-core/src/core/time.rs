// toolspace-core/src/core/time.rs
// ============================================================================
// Module: Toolspace Time Model
// Description: Unix-millisecond timestamps for tokens, tasks, and messages.
// Purpose: Keep expiry arithmetic explicit and clock-injectable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Runtime services never read wall-clock time directly. They ask an injected
//! [`crate::interfaces::Clock`] for a [`Timestamp`], which keeps token and
//! message expiry deterministic under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Milliseconds since the unix epoch.
///
/// # Invariants
/// - Arithmetic saturates; an overflowing ttl yields the maximum timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp shifted forward by `millis`.
    #[must_use]
    pub fn plus_millis(self, millis: u64) -> Self {
        let delta = i64::try_from(millis).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(delta))
    }

    /// Returns the non-negative distance from `earlier` to `self`.
    #[must_use]
    pub fn millis_since(self, earlier: Self) -> u64 {
        u64::try_from(self.0.saturating_sub(earlier.0)).unwrap_or(0)
    }
}
