// toolspace-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: MCP server implementations for stdio and HTTP transports.
// Purpose: Expose Toolspace tools via JSON-RPC 2.0.
// Dependencies: toolspace-core, toolspace-config, axum, tokio
// ============================================================================

//! ## Overview
//! The MCP server exposes Toolspace tools using JSON-RPC 2.0 over stdio
//! (Content-Length framing) or HTTP (`POST /rpc`). Every request is routed
//! through [`crate::tools::ToolRouter`] and produces one audit event.
//! Security posture: inputs are untrusted; the caller token is located by
//! [`crate::auth::resolve_token`] and judged by the control plane.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use toolspace_config::ServerTransport;
use toolspace_config::ToolspaceConfig;
use toolspace_core::AccessError;
use toolspace_core::ControlPlane;
use toolspace_core::SystemClock;
use toolspace_core::Token;
use toolspace_core::ToolDescriptor;
use toolspace_core::token_fingerprint;

use crate::audit::McpAuditEvent;
use crate::audit::McpAuditEventParams;
use crate::audit::McpAuditSink;
use crate::audit::McpFileAuditSink;
use crate::audit::McpNoopAuditSink;
use crate::audit::McpOutcome;
use crate::audit::McpStderrAuditSink;
use crate::audit::McpSweepEvent;
use crate::audit::ProxyAuditBridge;
use crate::auth::RequestContext;
use crate::auth::resolve_token;
use crate::tools::ToolError;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// MCP protocol revision reported by `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name reported by `initialize`.
const SERVER_NAME: &str = "toolspace";
/// Fallback body when a response cannot be serialized.
const SERIALIZATION_FALLBACK: &[u8] =
    br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32060,"message":"serialization failed"}}"#;

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Server configuration.
    config: ToolspaceConfig,
    /// Shared request state.
    state: Arc<ServerState>,
}

impl McpServer {
    /// Builds a new MCP server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when validation or initialization fails.
    pub fn from_config(config: ToolspaceConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let audit = build_audit_sink(&config)?;
        let control_plane = ControlPlane::new(
            config.control_plane_config(),
            Arc::new(SystemClock),
            Arc::new(ProxyAuditBridge::new(Arc::clone(&audit))),
        );
        let router = ToolRouter::new(Arc::new(control_plane));
        router.register_builtin_tools().map_err(|err| McpServerError::Init(err.to_string()))?;
        for bootstrap in &config.bootstrap_tokens {
            router
                .control_plane()
                .insert_bootstrap_token(
                    Token::new(bootstrap.token.as_str()),
                    bootstrap.role.as_str().into(),
                    bootstrap.description.as_str(),
                )
                .map_err(|err| McpServerError::Init(err.to_string()))?;
        }
        let state = Arc::new(ServerState {
            router,
            audit,
            max_body_bytes: config.server.max_body_bytes,
        });
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the tool router.
    #[must_use]
    pub fn router(&self) -> &ToolRouter {
        &self.state.router
    }

    /// Serves requests using the configured transport.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the server fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        let sweeper = spawn_sweeper(
            Arc::clone(self.state.router.control_plane()),
            Arc::clone(&self.state.audit),
            Duration::from_secs(self.config.tokens.cleanup_interval_secs),
        );
        let result = match self.config.server.transport {
            ServerTransport::Stdio => serve_stdio(&self.state).await,
            ServerTransport::Http => serve_http(&self.config, self.state).await,
        };
        sweeper.abort();
        result
    }
}

/// Builds the configured audit sink.
fn build_audit_sink(config: &ToolspaceConfig) -> Result<Arc<dyn McpAuditSink>, McpServerError> {
    let audit = &config.server.audit;
    if !audit.enabled {
        return Ok(Arc::new(McpNoopAuditSink));
    }
    match &audit.path {
        Some(path) => {
            let sink = McpFileAuditSink::new(Path::new(path))
                .map_err(|err| McpServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(McpStderrAuditSink)),
    }
}

/// Spawns the periodic token and message sweep.
fn spawn_sweeper(
    control_plane: Arc<ControlPlane>,
    audit: Arc<dyn McpAuditSink>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_sweep(&control_plane, audit.as_ref());
        }
    })
}

/// Runs one sweep, auditing failures and sweeps that changed state.
fn run_sweep(control_plane: &ControlPlane, audit: &dyn McpAuditSink) {
    match control_plane.sweep() {
        Ok((0, 0)) => {}
        Ok((tokens, messages)) => audit.record_sweep(&McpSweepEvent::completed(tokens, messages)),
        Err(err) => audit.record_sweep(&McpSweepEvent::failed(err.to_string())),
    }
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves JSON-RPC requests over stdin/stdout until stdin closes.
async fn serve_stdio(state: &ServerState) -> Result<(), McpServerError> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut writer = tokio::io::stdout();
    while let Some(bytes) = read_framed(&mut reader, state.max_body_bytes).await? {
        let (_, payload) = process_payload(state, &RequestContext::stdio(), &bytes).await;
        if let Some(payload) = payload {
            write_framed(&mut writer, &payload).await?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Serves JSON-RPC requests over HTTP.
async fn serve_http(config: &ToolspaceConfig, state: Arc<ServerState>) -> Result<(), McpServerError> {
    let addr = config.server.bind_addr().map_err(|err| McpServerError::Config(err.to_string()))?;
    let app = http_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| McpServerError::Transport("http bind failed".to_string()))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|_| McpServerError::Transport("http server failed".to_string()))
}

/// Builds the axum application for the `/rpc` endpoint.
fn http_app(state: Arc<ServerState>) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/rpc", post(handle_http))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Shared server state for transport handlers.
struct ServerState {
    /// Tool router for request dispatch.
    router: ToolRouter,
    /// Request audit sink.
    audit: Arc<dyn McpAuditSink>,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
}

/// Handles HTTP JSON-RPC requests.
async fn handle_http(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let context = http_request_context(peer, &headers);
    match process_payload(&state, &context, &bytes).await {
        (status, Some(payload)) => (status, [(CONTENT_TYPE, "application/json")], payload).into_response(),
        (_, None) => StatusCode::ACCEPTED.into_response(),
    }
}

/// Builds a request context from HTTP connection details.
fn http_request_context(peer: SocketAddr, headers: &HeaderMap) -> RequestContext {
    let auth_header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()).map(str::to_string);
    RequestContext::http(Some(peer.ip()), auth_header)
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    const fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    const fn failure(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
            }),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable error message.
    message: String,
}

/// Tool call parameters for JSON-RPC requests.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Raw JSON arguments.
    #[serde(default)]
    arguments: Value,
}

/// Tool list response payload.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Visible tool definitions.
    tools: Vec<ToolDescriptor>,
}

/// Result of dispatching one request, before serialization.
struct Dispatch {
    /// HTTP status for the response.
    status: StatusCode,
    /// Response envelope; `None` for notifications.
    response: Option<JsonRpcResponse>,
    /// Method label for auditing.
    method: &'static str,
    /// Tool name for `tools/call`.
    tool: Option<String>,
    /// Caller token when one was located.
    token: Option<Token>,
    /// Whether a tool result carried `isError`.
    tool_error: bool,
    /// Request identifier for auditing.
    request_id: Option<String>,
}

impl Dispatch {
    /// Builds a dispatch for a response without tool context.
    const fn plain(status: StatusCode, method: &'static str, response: JsonRpcResponse) -> Self {
        Self {
            status,
            response: Some(response),
            method,
            tool: None,
            token: None,
            tool_error: false,
            request_id: None,
        }
    }
}

/// Handles a raw payload, records the audit event, and serializes the reply.
async fn process_payload(
    state: &ServerState,
    context: &RequestContext,
    bytes: &[u8],
) -> (StatusCode, Option<Vec<u8>>) {
    let dispatch = parse_request(state, context, bytes).await;
    let payload = dispatch
        .response
        .as_ref()
        .map(|response| serde_json::to_vec(response).unwrap_or_else(|_| SERIALIZATION_FALLBACK.to_vec()));
    let error_code = dispatch.response.as_ref().and_then(|response| response.error.as_ref()).map(|err| err.code);
    let outcome = if error_code.is_some() {
        McpOutcome::Error
    } else if dispatch.tool_error {
        McpOutcome::ToolError
    } else {
        McpOutcome::Ok
    };
    state.audit.record(&McpAuditEvent::new(McpAuditEventParams {
        request_id: dispatch.request_id.or_else(|| context.request_id.clone()),
        transport: context.transport,
        peer_ip: context.peer_ip.map(|ip| ip.to_string()),
        method: dispatch.method,
        tool: dispatch.tool,
        outcome,
        error_code,
        token_fingerprint: dispatch.token.as_ref().map(token_fingerprint),
        request_bytes: bytes.len(),
        response_bytes: payload.as_ref().map_or(0, Vec::len),
    }));
    (dispatch.status, payload)
}

/// Parses and validates a JSON-RPC request payload.
async fn parse_request(state: &ServerState, context: &RequestContext, bytes: &[u8]) -> Dispatch {
    if bytes.len() > state.max_body_bytes {
        return Dispatch::plain(
            StatusCode::PAYLOAD_TOO_LARGE,
            "invalid",
            JsonRpcResponse::failure(Value::Null, -32070, "request body too large".to_string()),
        );
    }
    match serde_json::from_slice::<JsonRpcRequest>(bytes) {
        Ok(request) => handle_request(&state.router, context, request).await,
        Err(_) => Dispatch::plain(
            StatusCode::BAD_REQUEST,
            "invalid",
            JsonRpcResponse::failure(Value::Null, -32600, "invalid json-rpc request".to_string()),
        ),
    }
}

/// Dispatches a JSON-RPC request to the tool router.
async fn handle_request(router: &ToolRouter, base_context: &RequestContext, mut request: JsonRpcRequest) -> Dispatch {
    let Some(id) = request.id.take() else {
        return Dispatch {
            status: StatusCode::ACCEPTED,
            response: None,
            method: "notification",
            tool: None,
            token: None,
            tool_error: false,
            request_id: None,
        };
    };
    let context = base_context.clone().with_request_id(id.to_string());
    let mut dispatch = dispatch_method(router, &context, id, request).await;
    dispatch.request_id = context.request_id;
    dispatch
}

/// Routes a request that carries an id.
async fn dispatch_method(router: &ToolRouter, context: &RequestContext, id: Value, request: JsonRpcRequest) -> Dispatch {
    if request.jsonrpc != "2.0" {
        return Dispatch::plain(
            StatusCode::BAD_REQUEST,
            "invalid",
            JsonRpcResponse::failure(id, -32600, "invalid json-rpc version".to_string()),
        );
    }
    match request.method.as_str() {
        "initialize" => Dispatch::plain(StatusCode::OK, "initialize", JsonRpcResponse::success(id, initialize_result())),
        "ping" => Dispatch::plain(StatusCode::OK, "ping", JsonRpcResponse::success(id, json!({}))),
        "tools/list" => handle_tools_list(router, context, id, request.params).await,
        "tools/call" => handle_tools_call(router, context, id, request.params).await,
        _ => Dispatch::plain(
            StatusCode::BAD_REQUEST,
            "unknown",
            JsonRpcResponse::failure(id, -32601, "method not found".to_string()),
        ),
    }
}

/// Handles `tools/list`.
async fn handle_tools_list(
    router: &ToolRouter,
    context: &RequestContext,
    id: Value,
    params: Option<Value>,
) -> Dispatch {
    let token = match resolve_token(context, params.as_ref()) {
        Ok(token) => token,
        Err(err) => return unauthenticated(id, "tools/list", None, &err.to_string()),
    };
    let (status, response) = match router.list_tools(&token).await {
        Ok(tools) => match serde_json::to_value(ToolListResult {
            tools,
        }) {
            Ok(value) => (StatusCode::OK, JsonRpcResponse::success(id, value)),
            Err(_) => (StatusCode::OK, JsonRpcResponse::failure(id, -32060, "serialization failed".to_string())),
        },
        Err(err) => jsonrpc_error(id, err),
    };
    Dispatch {
        status,
        response: Some(response),
        method: "tools/list",
        tool: None,
        token: Some(token),
        tool_error: false,
        request_id: None,
    }
}

/// Handles `tools/call`.
async fn handle_tools_call(
    router: &ToolRouter,
    context: &RequestContext,
    id: Value,
    params: Option<Value>,
) -> Dispatch {
    let params = params.unwrap_or(Value::Null);
    let Ok(call) = serde_json::from_value::<ToolCallParams>(params.clone()) else {
        return Dispatch::plain(
            StatusCode::BAD_REQUEST,
            "tools/call",
            JsonRpcResponse::failure(id, -32602, "invalid tool params".to_string()),
        );
    };
    let token = match resolve_token(context, Some(&params)) {
        Ok(token) => token,
        Err(err) => return unauthenticated(id, "tools/call", Some(call.name), &err.to_string()),
    };
    let result = router.handle_tool_call(&token, &call.name, call.arguments, context.request_id.clone()).await;
    let tool_error = result.is_error();
    let response = match serde_json::to_value(&result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(_) => JsonRpcResponse::failure(id, -32060, "serialization failed".to_string()),
    };
    Dispatch {
        status: StatusCode::OK,
        response: Some(response),
        method: "tools/call",
        tool: Some(call.name),
        token: Some(token),
        tool_error,
        request_id: None,
    }
}

/// Builds the `initialize` result.
fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": { "listChanged": false }
        }
    })
}

/// Builds the dispatch for a request without a usable token.
fn unauthenticated(id: Value, method: &'static str, tool: Option<String>, message: &str) -> Dispatch {
    Dispatch {
        status: StatusCode::UNAUTHORIZED,
        response: Some(JsonRpcResponse::failure(id, -32001, message.to_string())),
        method,
        tool,
        token: None,
        tool_error: false,
        request_id: None,
    }
}

/// Builds a JSON-RPC error response for a router failure.
fn jsonrpc_error(id: Value, error: ToolError) -> (StatusCode, JsonRpcResponse) {
    let (status, code, message) = match error {
        ToolError::InvalidParams(message) => (StatusCode::BAD_REQUEST, -32602, message),
        ToolError::Access(err) => match err {
            AccessError::TokenInvalid {
                ..
            } => (StatusCode::UNAUTHORIZED, -32001, err.to_string()),
            AccessError::PermissionDenied {
                ..
            }
            | AccessError::Forbidden {
                ..
            }
            | AccessError::NotAMember {
                ..
            } => (StatusCode::FORBIDDEN, -32003, err.to_string()),
            AccessError::NotFound {
                ..
            } => (StatusCode::OK, -32004, err.to_string()),
            AccessError::InvalidArgument(message) => (StatusCode::BAD_REQUEST, -32602, message),
            other => (StatusCode::OK, -32050, other.to_string()),
        },
    };
    (status, JsonRpcResponse::failure(id, code, message))
}

// ============================================================================
// SECTION: Framing Helpers
// ============================================================================

/// Maximum accepted header line length for stdio framing.
const MAX_HEADER_LINE_BYTES: usize = 1024;

/// Reads a framed stdio payload using MCP Content-Length headers.
///
/// Returns `None` when the stream closes before a new frame starts.
async fn read_framed(
    reader: &mut (impl AsyncBufRead + Unpin),
    max_body_bytes: usize,
) -> Result<Option<Vec<u8>>, McpServerError> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut started = false;
    loop {
        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .await
            .map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
        if bytes == 0 {
            if started {
                return Err(McpServerError::Transport("stdio closed mid-frame".to_string()));
            }
            return Ok(None);
        }
        if bytes > MAX_HEADER_LINE_BYTES {
            return Err(McpServerError::Transport("header line too large".to_string()));
        }
        if line.trim().is_empty() {
            if started {
                break;
            }
            continue;
        }
        started = true;
        if let Some(value) = line.strip_prefix("Content-Length:") {
            if content_length.is_some() {
                return Err(McpServerError::Transport("duplicate content length".to_string()));
            }
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| McpServerError::Transport("invalid content length".to_string()))?;
            content_length = Some(parsed);
        }
    }
    let len = content_length.ok_or_else(|| McpServerError::Transport("missing content length".to_string()))?;
    if len > max_body_bytes {
        return Err(McpServerError::Transport("payload too large".to_string()));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
    Ok(Some(buf))
}

/// Writes a framed stdio payload using MCP Content-Length headers.
async fn write_framed(writer: &mut (impl AsyncWrite + Unpin), payload: &[u8]) -> Result<(), McpServerError> {
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
    writer.flush().await.map_err(|_| McpServerError::Transport("stdio write failed".to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test-only framing and dispatch assertions."
    )]

    use std::sync::Mutex;

    use serde_json::json;
    use toolspace_config::BootstrapTokenConfig;
    use toolspace_core::ControlPlaneConfig;
    use toolspace_core::ManualClock;
    use toolspace_core::NoopProxyAuditSink;
    use toolspace_core::RoleName;
    use toolspace_core::Timestamp;

    use super::*;

    const ADMIN_TOKEN: &str = "admin-token-0123456789";

    /// Captures audit events in memory.
    #[derive(Default)]
    struct CapturingSink {
        events: Mutex<Vec<McpAuditEvent>>,
        sweeps: Mutex<Vec<McpSweepEvent>>,
    }

    impl McpAuditSink for CapturingSink {
        fn record(&self, event: &McpAuditEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn record_sweep(&self, event: &McpSweepEvent) {
            self.sweeps.lock().unwrap().push(event.clone());
        }
    }

    fn test_state() -> (ServerState, Arc<CapturingSink>) {
        let mut config = ToolspaceConfig::default();
        config.bootstrap_tokens.push(BootstrapTokenConfig {
            token: ADMIN_TOKEN.to_string(),
            role: "admin".to_string(),
            description: "test admin".to_string(),
        });
        let server = McpServer::from_config(config).unwrap();
        let sink = Arc::new(CapturingSink::default());
        let state = ServerState {
            router: server.router().clone(),
            audit: Arc::clone(&sink) as Arc<dyn McpAuditSink>,
            max_body_bytes: 64 * 1024,
        };
        (state, sink)
    }

    async fn call(state: &ServerState, body: Value) -> (StatusCode, Value) {
        let bytes = serde_json::to_vec(&body).unwrap();
        let (status, payload) = process_payload(state, &RequestContext::stdio(), &bytes).await;
        (status, serde_json::from_slice(&payload.unwrap()).unwrap())
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut framed = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        framed.extend_from_slice(payload);
        framed
    }

    #[tokio::test]
    async fn read_framed_rejects_payload_over_limit() {
        let payload = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let framed = frame(payload);
        let mut reader = BufReader::new(framed.as_slice());
        assert!(read_framed(&mut reader, payload.len() - 1).await.is_err());
    }

    #[tokio::test]
    async fn read_framed_accepts_payload_at_limit() {
        let payload = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let framed = frame(payload);
        let mut reader = BufReader::new(framed.as_slice());
        let bytes = read_framed(&mut reader, payload.len()).await.unwrap().unwrap();
        assert_eq!(bytes, payload);
        assert!(read_framed(&mut reader, payload.len()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_framed_rejects_duplicate_content_length() {
        let framed = b"Content-Length: 2\r\nContent-Length: 2\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(framed.as_slice());
        assert!(read_framed(&mut reader, 1024).await.is_err());
    }

    #[tokio::test]
    async fn read_framed_rejects_missing_content_length() {
        let framed = b"Content-Type: application/json\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(framed.as_slice());
        assert!(read_framed(&mut reader, 1024).await.is_err());
    }

    #[tokio::test]
    async fn write_framed_emits_content_length_header() {
        let mut out = Vec::new();
        write_framed(&mut out, b"{}").await.unwrap();
        assert_eq!(out, b"Content-Length: 2\r\n\r\n{}");
    }

    #[tokio::test]
    async fn initialize_needs_no_token() {
        let (state, _) = test_state();
        let (status, body) = call(&state, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["serverInfo"]["name"], "toolspace");
        assert!(body["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_without_token_is_unauthenticated() {
        let (state, sink) = test_state();
        let (status, body) = call(&state, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], -32001);
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, McpOutcome::Error);
        assert_eq!(events[0].error_code, Some(-32001));
    }

    #[tokio::test]
    async fn tools_list_with_unknown_token_is_unauthenticated() {
        let (state, _) = test_state();
        let request = json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/list",
            "params": {"token": "unknown-token-value"}
        });
        let (_, body) = call(&state, request).await;
        assert_eq!(body["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn tools_list_for_admin_includes_system_tools() {
        let (state, sink) = test_state();
        let request = json!({
            "jsonrpc": "2.0", "id": 7, "method": "tools/list",
            "params": {"_meta": {"token": ADMIN_TOKEN}}
        });
        let (status, body) = call(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> =
            body["result"]["tools"].as_array().unwrap().iter().map(|tool| tool["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"admin_token_create"));
        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].token_fingerprint.as_deref(), Some(token_fingerprint(&Token::new(ADMIN_TOKEN)).as_str()));
        assert_eq!(events[0].request_id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn tools_call_returns_tool_result() {
        let (state, sink) = test_state();
        let request = json!({
            "jsonrpc": "2.0", "id": "a", "method": "tools/call",
            "params": {"name": "echo", "arguments": {"x": 1}, "token": ADMIN_TOKEN}
        });
        let (status, body) = call(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "a");
        assert!(body["result"]["isError"].is_null());
        assert_eq!(body["result"]["content"][0]["type"], "json");
        assert_eq!(body["result"]["content"][0]["json"]["echo"]["x"], 1);
        assert_eq!(sink.events.lock().unwrap()[0].tool.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_error() {
        let (state, sink) = test_state();
        let request = json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {"name": "does_not_exist", "token": ADMIN_TOKEN}
        });
        let (_, body) = call(&state, request).await;
        assert_eq!(body["result"]["isError"], true);
        assert_eq!(sink.events.lock().unwrap()[0].outcome, McpOutcome::ToolError);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let (state, _) = test_state();
        let (_, body) = call(&state, json!({"jsonrpc": "1.0", "id": 1, "method": "tools/list"})).await;
        assert_eq!(body["error"]["code"], -32600);
        let (_, body) = call(&state, json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"})).await;
        assert_eq!(body["error"]["code"], -32601);
        let (_, body) = call(&state, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {}})).await;
        assert_eq!(body["error"]["code"], -32602);
        let (status, payload) = process_payload(&state, &RequestContext::stdio(), b"not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload.is_some());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (state, _) = test_state();
        let bytes = vec![b' '; state.max_body_bytes + 1];
        let (status, payload) = process_payload(&state, &RequestContext::stdio(), &bytes).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let body: Value = serde_json::from_slice(&payload.unwrap()).unwrap();
        assert_eq!(body["error"]["code"], -32070);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (state, sink) = test_state();
        let bytes = serde_json::to_vec(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        let (status, payload) = process_payload(&state, &RequestContext::stdio(), &bytes).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(payload.is_none());
        assert_eq!(sink.events.lock().unwrap()[0].method, "notification");
    }

    #[tokio::test]
    async fn sweeps_that_expire_tokens_are_audited() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
        let plane = ControlPlane::new(ControlPlaneConfig::default(), clock.clone(), Arc::new(NoopProxyAuditSink));
        let sink = CapturingSink::default();
        plane.create_token(RoleName::new("user"), "short", Some(10)).unwrap();

        run_sweep(&plane, &sink);
        assert!(sink.sweeps.lock().unwrap().is_empty());

        clock.advance(10);
        run_sweep(&plane, &sink);
        let sweeps = sink.sweeps.lock().unwrap();
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].outcome, McpOutcome::Ok);
        assert_eq!(sweeps[0].tokens_deactivated, 1);
        assert!(sweeps[0].error.is_none());
    }

    #[test]
    fn failed_sweep_event_carries_error() {
        let event = McpSweepEvent::failed("token store error: poisoned".to_string());
        let line = serde_json::to_value(&event).unwrap();
        assert_eq!(line["event"], "sweep");
        assert_eq!(line["outcome"], "error");
        assert_eq!(line["error"], "token store error: poisoned");
    }
}
