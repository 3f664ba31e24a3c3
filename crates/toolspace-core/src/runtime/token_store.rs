// toolspace-core/src/runtime/token_store.rs
// ============================================================================
// Module: Token Store
// Description: In-memory bearer token records and lifecycle.
// Purpose: Create, validate, revoke, renew, and expire opaque tokens.
// Dependencies: crate::{core, interfaces}, serde, thiserror
// ============================================================================

//! ## Overview
//! Tokens are ephemeral, in-memory, opaque strings bound to a role. Expiry is
//! lazy: [`TokenStore::validate`] treats a token as expired as soon as the
//! clock passes `expires_at`, without mutating the record.
//! [`TokenStore::cleanup_expired`] may later deactivate such records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

use crate::core::errors::AccessError;
use crate::core::errors::TokenInvalidReason;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::Token;
use crate::core::time::Timestamp;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Stored token record.
///
/// # Invariants
/// - Valid iff `is_active && (expires_at is None || now < expires_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRecord {
    /// Opaque token value.
    #[serde(skip)]
    pub token: Token,
    /// Bound role.
    pub role: RoleName,
    /// Operator-supplied description.
    pub description: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Optional expiry time.
    pub expires_at: Option<Timestamp>,
    /// Activation flag.
    pub is_active: bool,
}

impl TokenRecord {
    /// Returns true when `now` is at or past the expiry.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Returns true when the record is active and not expired.
    #[must_use]
    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

/// Token lifetime configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenStoreConfig {
    /// TTL applied when the caller omits one.
    pub default_ttl_ms: Option<u64>,
    /// Upper bound on any requested TTL.
    pub max_ttl_ms: Option<u64>,
}

/// Aggregate token counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenStats {
    /// Total stored records.
    pub total: usize,
    /// Records currently valid.
    pub active: usize,
    /// Records past expiry.
    pub expired: usize,
    /// Record counts keyed by role.
    pub by_role: BTreeMap<String, usize>,
}

/// Token store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token is unknown.
    #[error("token not found")]
    NotFound,
    /// Token is past its expiry.
    #[error("token expired")]
    Expired,
    /// Token was deactivated.
    #[error("token inactive")]
    Inactive,
    /// Token value already stored.
    #[error("token already exists")]
    Duplicate,
    /// Requested ttl is zero or above the configured maximum.
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
    /// Store lock failure.
    #[error("token store error: {0}")]
    Internal(String),
}

impl From<TokenError> for AccessError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::NotFound => Self::TokenInvalid {
                reason: TokenInvalidReason::NotFound,
            },
            TokenError::Expired => Self::TokenInvalid {
                reason: TokenInvalidReason::Expired,
            },
            TokenError::Inactive => Self::TokenInvalid {
                reason: TokenInvalidReason::Inactive,
            },
            TokenError::Duplicate => Self::Conflict("token already exists".to_string()),
            TokenError::InvalidTtl(message) => Self::InvalidArgument(message),
            TokenError::Internal(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Token Store
// ============================================================================

/// In-memory token store.
pub struct TokenStore {
    /// Records keyed by token.
    records: Mutex<BTreeMap<Token, TokenRecord>>,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
    /// Lifetime bounds.
    config: TokenStoreConfig,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: TokenStoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            clock,
            config,
        }
    }

    /// Creates a token with a freshly generated value.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the ttl is out of bounds.
    pub fn create(
        &self,
        role: RoleName,
        description: impl Into<String>,
        ttl_ms: Option<u64>,
    ) -> Result<TokenRecord, TokenError> {
        let now = self.clock.now();
        let expires_at = self.resolve_ttl(ttl_ms)?.map(|ttl| now.plus_millis(ttl));
        self.store_record(Token::generate(), role, description.into(), now, expires_at)
    }

    /// Stores an operator-supplied bootstrap token. Bootstrap tokens never
    /// expire; the default and maximum ttl apply only to issued tokens.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Duplicate`] when the value is already stored.
    pub fn insert(
        &self,
        token: Token,
        role: RoleName,
        description: impl Into<String>,
    ) -> Result<TokenRecord, TokenError> {
        let now = self.clock.now();
        self.store_record(token, role, description.into(), now, None)
    }

    /// Inserts a new record, rejecting duplicate values.
    fn store_record(
        &self,
        token: Token,
        role: RoleName,
        description: String,
        now: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Result<TokenRecord, TokenError> {
        let record = TokenRecord {
            token: token.clone(),
            role,
            description,
            created_at: now,
            expires_at,
            is_active: true,
        };
        let mut records = self.lock()?;
        if records.contains_key(&token) {
            return Err(TokenError::Duplicate);
        }
        records.insert(token, record.clone());
        drop(records);
        Ok(record)
    }

    /// Validates a token without mutating it.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotFound`], [`TokenError::Expired`], or
    /// [`TokenError::Inactive`] for invalid tokens.
    pub fn validate(&self, token: &Token) -> Result<TokenRecord, TokenError> {
        let now = self.clock.now();
        let records = self.lock()?;
        let record = records.get(token).ok_or(TokenError::NotFound)?;
        if record.is_expired(now) {
            return Err(TokenError::Expired);
        }
        if !record.is_active {
            return Err(TokenError::Inactive);
        }
        Ok(record.clone())
    }

    /// Returns the stored record regardless of validity.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] when the store lock is poisoned.
    pub fn get(&self, token: &Token) -> Result<Option<TokenRecord>, TokenError> {
        Ok(self.lock()?.get(token).cloned())
    }

    /// Returns every stored record in token order.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] when the store lock is poisoned.
    pub fn list(&self) -> Result<Vec<TokenRecord>, TokenError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    /// Marks a token inactive. Returns false when the token is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] when the store lock is poisoned.
    pub fn deactivate(&self, token: &Token) -> Result<bool, TokenError> {
        self.set_active(token, false)
    }

    /// Marks a token active. Returns false when the token is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] when the store lock is poisoned.
    pub fn activate(&self, token: &Token) -> Result<bool, TokenError> {
        self.set_active(token, true)
    }

    /// Resets the expiry relative to now. `None` applies the default ttl,
    /// then the maximum; the expiry is cleared only when neither is
    /// configured. Returns false when the token is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the ttl is out of bounds.
    pub fn renew(&self, token: &Token, ttl_ms: Option<u64>) -> Result<bool, TokenError> {
        let ttl = self.resolve_ttl(ttl_ms)?;
        let now = self.clock.now();
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(token) else {
            return Ok(false);
        };
        record.expires_at = ttl.map(|ttl| now.plus_millis(ttl));
        drop(records);
        Ok(true)
    }

    /// Removes a token. Returns false when the token is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] when the store lock is poisoned.
    pub fn delete(&self, token: &Token) -> Result<bool, TokenError> {
        Ok(self.lock()?.remove(token).is_some())
    }

    /// Deactivates expired tokens that are still marked active.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] when the store lock is poisoned.
    pub fn cleanup_expired(&self) -> Result<usize, TokenError> {
        let now = self.clock.now();
        let mut records = self.lock()?;
        let mut count = 0;
        for record in records.values_mut() {
            if record.is_active && record.is_expired(now) {
                record.is_active = false;
                count += 1;
            }
        }
        drop(records);
        Ok(count)
    }

    /// Returns aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] when the store lock is poisoned.
    pub fn stats(&self) -> Result<TokenStats, TokenError> {
        let now = self.clock.now();
        let records = self.lock()?;
        let mut stats = TokenStats {
            total: records.len(),
            ..TokenStats::default()
        };
        for record in records.values() {
            if record.is_valid(now) {
                stats.active += 1;
            }
            if record.is_expired(now) {
                stats.expired += 1;
            }
            *stats.by_role.entry(record.role.to_string()).or_insert(0) += 1;
        }
        drop(records);
        Ok(stats)
    }

    /// Applies the default and maximum ttl bounds. An omitted ttl falls back
    /// to the default, then to the maximum.
    fn resolve_ttl(&self, ttl_ms: Option<u64>) -> Result<Option<u64>, TokenError> {
        let ttl = ttl_ms.or(self.config.default_ttl_ms).or(self.config.max_ttl_ms);
        if ttl == Some(0) {
            return Err(TokenError::InvalidTtl("ttl must be greater than zero".to_string()));
        }
        if let (Some(ttl), Some(max)) = (ttl, self.config.max_ttl_ms)
            && ttl > max
        {
            return Err(TokenError::InvalidTtl(format!("ttl {ttl}ms exceeds maximum {max}ms")));
        }
        Ok(ttl)
    }

    /// Toggles the activation flag.
    fn set_active(&self, token: &Token, active: bool) -> Result<bool, TokenError> {
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(token) else {
            return Ok(false);
        };
        record.is_active = active;
        drop(records);
        Ok(true)
    }

    /// Locks the record map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Token, TokenRecord>>, TokenError> {
        self.records
            .lock()
            .map_err(|_| TokenError::Internal("token store mutex poisoned".to_string()))
    }
}
