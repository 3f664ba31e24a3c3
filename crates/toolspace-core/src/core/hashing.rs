// toolspace-core/src/core/hashing.rs
// ============================================================================
// Module: Toolspace Hashing
// Description: Token fingerprints and hex encoding.
// Purpose: Let audit output correlate tokens without revealing them.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Bearer tokens are secrets. Anything that leaves the process (audit lines,
//! stats, error text) refers to a token through its SHA-256 fingerprint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

use crate::core::identifiers::Token;

// ============================================================================
// SECTION: Fingerprints
// ============================================================================

/// Returns the lowercase hex SHA-256 fingerprint of a token.
#[must_use]
pub fn token_fingerprint(token: &Token) -> String {
    let digest = Sha256::digest(token.as_str().as_bytes());
    hex_encode(&digest)
}

/// Encodes bytes as lowercase hex.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
