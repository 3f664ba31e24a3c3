// toolspace-mcp/src/auth.rs
// ============================================================================
// Module: MCP Request Authentication
// Description: Request context and bearer token extraction for MCP calls.
// Purpose: Locate the caller token fail-closed before any tool routing.
// Dependencies: toolspace-config, toolspace-core, serde_json
// ============================================================================

//! ## Overview
//! The MCP layer only locates the caller's token; validity, role, and tool
//! visibility are decided by [`toolspace_core::ControlPlane`]. A token may
//! travel in an `Authorization: Bearer` header (HTTP) or in the request
//! params as `_meta.token` or `token` (either transport). A malformed header
//! is rejected even when params also carry a token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use serde_json::Value;
use thiserror::Error;
use toolspace_config::ServerTransport;
use toolspace_core::Token;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted authorization header size in bytes.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;
/// Maximum accepted token length in bytes.
const MAX_TOKEN_BYTES: usize = 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request transport context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Transport used by the caller.
    pub transport: ServerTransport,
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Authorization header value (HTTP).
    pub auth_header: Option<String>,
    /// Request identifier for auditing.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Builds a stdio request context.
    #[must_use]
    pub const fn stdio() -> Self {
        Self {
            transport: ServerTransport::Stdio,
            peer_ip: None,
            auth_header: None,
            request_id: None,
        }
    }

    /// Builds an HTTP request context.
    #[must_use]
    pub const fn http(peer_ip: Option<IpAddr>, auth_header: Option<String>) -> Self {
        Self {
            transport: ServerTransport::Http,
            peer_ip,
            auth_header,
            request_id: None,
        }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token extraction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or malformed credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Token Extraction
// ============================================================================

/// Returns the caller token from the header or request params.
///
/// # Errors
///
/// Returns [`AuthError::Unauthenticated`] when no token is present or the
/// header is malformed.
pub fn resolve_token(ctx: &RequestContext, params: Option<&Value>) -> Result<Token, AuthError> {
    if let Some(header) = ctx.auth_header.as_deref() {
        return parse_bearer_token(header);
    }
    let from_params = params.and_then(|params| {
        params
            .get("_meta")
            .and_then(|meta| meta.get("token"))
            .or_else(|| params.get("token"))
            .and_then(Value::as_str)
    });
    match from_params {
        Some(token) => checked_token(token),
        None => Err(AuthError::Unauthenticated("missing token".to_string())),
    }
}

/// Parses an `Authorization: Bearer <token>` header value.
fn parse_bearer_token(header: &str) -> Result<Token, AuthError> {
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    checked_token(token)
}

/// Rejects empty or oversized token values.
fn checked_token(raw: &str) -> Result<Token, AuthError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(AuthError::Unauthenticated("empty token".to_string()));
    }
    if token.len() > MAX_TOKEN_BYTES {
        return Err(AuthError::Unauthenticated("token too large".to_string()));
    }
    Ok(Token::new(token))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

    use serde_json::json;

    use super::*;

    #[test]
    fn header_token_wins_over_params() {
        let ctx = RequestContext::http(None, Some("Bearer header-token".to_string()));
        let params = json!({ "token": "param-token" });
        assert_eq!(resolve_token(&ctx, Some(&params)).unwrap().as_str(), "header-token");
    }

    #[test]
    fn meta_token_is_preferred_over_plain_token() {
        let params = json!({ "_meta": { "token": "meta" }, "token": "plain" });
        assert_eq!(resolve_token(&RequestContext::stdio(), Some(&params)).unwrap().as_str(), "meta");
    }

    #[test]
    fn plain_token_is_accepted() {
        let params = json!({ "token": " plain " });
        assert_eq!(resolve_token(&RequestContext::stdio(), Some(&params)).unwrap().as_str(), "plain");
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        assert!(resolve_token(&RequestContext::stdio(), None).is_err());
        let params = json!({ "name": "echo" });
        assert!(resolve_token(&RequestContext::stdio(), Some(&params)).is_err());
    }

    #[test]
    fn malformed_header_is_rejected() {
        for header in ["Basic abc", "Bearer", "Bearer    ", "token"] {
            let ctx = RequestContext::http(None, Some(header.to_string()));
            assert!(resolve_token(&ctx, None).is_err(), "{header}");
        }
    }

    #[test]
    fn oversized_header_is_rejected() {
        let header = format!("Bearer {}", "a".repeat(MAX_AUTH_HEADER_BYTES));
        let ctx = RequestContext::http(None, Some(header));
        assert!(resolve_token(&ctx, None).is_err());
    }
}
