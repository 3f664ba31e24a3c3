// toolspace-mcp/src/audit.rs
// ============================================================================
// Module: MCP Audit Logging
// Description: Structured audit events for MCP requests and proxy calls.
// Purpose: Emit redacted JSON-line audit logs without hard dependencies.
// Dependencies: toolspace-config, toolspace-core, serde
// ============================================================================

//! ## Overview
//! Every JSON-RPC request produces one [`McpAuditEvent`]; every proxy
//! execution inside a collaboration component is forwarded from the core
//! [`ProxyAuditSink`] seam through [`ProxyAuditBridge`]. Tokens only ever
//! appear as SHA-256 fingerprints.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use toolspace_config::ServerTransport;
use toolspace_core::ProxyAuditEvent;
use toolspace_core::ProxyAuditSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum McpOutcome {
    /// Request succeeded.
    Ok,
    /// Tool ran but reported `isError`.
    ToolError,
    /// JSON-RPC level error.
    Error,
}

/// MCP audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct McpAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Transport used for the request.
    pub transport: ServerTransport,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// JSON-RPC method label.
    pub method: &'static str,
    /// Tool name (tools/call).
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: McpOutcome,
    /// JSON-RPC error code when present.
    pub error_code: Option<i64>,
    /// Caller token fingerprint when a token was presented.
    pub token_fingerprint: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

/// Inputs required to construct an audit event.
pub struct McpAuditEventParams {
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Transport type used for the request.
    pub transport: ServerTransport,
    /// Peer IP address if known.
    pub peer_ip: Option<String>,
    /// JSON-RPC method label.
    pub method: &'static str,
    /// Tool name (tools/call).
    pub tool: Option<String>,
    /// Request outcome.
    pub outcome: McpOutcome,
    /// JSON-RPC error code when present.
    pub error_code: Option<i64>,
    /// Caller token fingerprint.
    pub token_fingerprint: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Response body size in bytes.
    pub response_bytes: usize,
}

impl McpAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: McpAuditEventParams) -> Self {
        Self {
            event: "mcp_request",
            timestamp_ms: now_millis(),
            request_id: params.request_id,
            transport: params.transport,
            peer_ip: params.peer_ip,
            method: params.method,
            tool: params.tool,
            outcome: params.outcome,
            error_code: params.error_code,
            token_fingerprint: params.token_fingerprint,
            request_bytes: params.request_bytes,
            response_bytes: params.response_bytes,
        }
    }
}

/// Outcome of one periodic token and message sweep.
#[derive(Debug, Clone, Serialize)]
pub struct McpSweepEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Sweep outcome.
    pub outcome: McpOutcome,
    /// Expired tokens deactivated.
    pub tokens_deactivated: usize,
    /// Expired messages purged.
    pub messages_purged: usize,
    /// Failure message when the sweep did not complete.
    pub error: Option<String>,
}

impl McpSweepEvent {
    /// Creates an event for a completed sweep.
    #[must_use]
    pub fn completed(tokens_deactivated: usize, messages_purged: usize) -> Self {
        Self {
            event: "sweep",
            timestamp_ms: now_millis(),
            outcome: McpOutcome::Ok,
            tokens_deactivated,
            messages_purged,
            error: None,
        }
    }

    /// Creates an event for a failed sweep.
    #[must_use]
    pub fn failed(error: String) -> Self {
        Self {
            event: "sweep",
            timestamp_ms: now_millis(),
            outcome: McpOutcome::Error,
            tokens_deactivated: 0,
            messages_purged: 0,
            error: Some(error),
        }
    }
}

/// Milliseconds since the unix epoch.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for MCP request and proxy events.
pub trait McpAuditSink: Send + Sync {
    /// Record a request audit event.
    fn record(&self, event: &McpAuditEvent);

    /// Record a proxy execution event.
    fn record_proxy(&self, _event: &ProxyAuditEvent) {}

    /// Record a periodic sweep event.
    fn record_sweep(&self, _event: &McpSweepEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct McpStderrAuditSink;

impl McpAuditSink for McpStderrAuditSink {
    fn record(&self, event: &McpAuditEvent) {
        write_stderr_json(event);
    }

    fn record_proxy(&self, event: &ProxyAuditEvent) {
        write_stderr_json(event);
    }

    fn record_sweep(&self, event: &McpSweepEvent) {
        write_stderr_json(event);
    }
}

/// Writes one serialized line to stderr.
fn write_stderr_json<T: Serialize>(event: &T) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(std::io::stderr(), "{payload}");
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct McpFileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl McpFileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized line.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl McpAuditSink for McpFileAuditSink {
    fn record(&self, event: &McpAuditEvent) {
        self.append(event);
    }

    fn record_proxy(&self, event: &ProxyAuditEvent) {
        self.append(event);
    }

    fn record_sweep(&self, event: &McpSweepEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct McpNoopAuditSink;

impl McpAuditSink for McpNoopAuditSink {
    fn record(&self, _event: &McpAuditEvent) {}
}

// ============================================================================
// SECTION: Proxy Bridge
// ============================================================================

/// Forwards core proxy audit events into an MCP audit sink.
pub struct ProxyAuditBridge {
    /// Destination sink.
    sink: Arc<dyn McpAuditSink>,
}

impl ProxyAuditBridge {
    /// Wraps `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn McpAuditSink>) -> Self {
        Self {
            sink,
        }
    }
}

impl ProxyAuditSink for ProxyAuditBridge {
    fn record(&self, event: &ProxyAuditEvent) {
        self.sink.record_proxy(event);
    }
}
