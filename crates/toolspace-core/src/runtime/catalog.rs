// toolspace-core/src/runtime/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Ordered registry of callable tools and their descriptors.
// Purpose: Hold every registered tool tagged with permission groups.
// Dependencies: crate::{core, interfaces}, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! The catalog preserves registration order so that visibility filtering is
//! stable. Tool names may not contain the namespace separator; that keeps the
//! `<component>__<tool>` parse unambiguous.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::errors::AccessError;
use crate::core::identifiers::ExecutorId;
use crate::core::identifiers::GroupName;
use crate::core::identifiers::ToolName;
use crate::core::result::ToolResult;
use crate::interfaces::Tool;
use crate::interfaces::ToolContext;
use crate::runtime::namespace::NAMESPACE_SEPARATOR;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum tool name length in bytes.
const MAX_TOOL_NAME_LENGTH: usize = 128;

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Public description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: ToolName,
    /// Human-readable description.
    pub description: String,
    /// JSON schema describing the arguments.
    pub input_schema: Value,
    /// Permission groups that grant visibility.
    #[serde(skip)]
    pub groups: BTreeSet<GroupName>,
    /// Whether the tool mutates state (component admin required).
    #[serde(skip)]
    pub mutates: bool,
    /// Executor whose rules govern the tool.
    #[serde(skip)]
    pub executor: ExecutorId,
}

impl ToolDescriptor {
    /// Creates a descriptor with an open object schema and no groups.
    #[must_use]
    pub fn new(name: impl Into<ToolName>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({ "type": "object" }),
            groups: BTreeSet::new(),
            mutates: false,
            executor: ExecutorId::default_executor(),
        }
    }

    /// Returns a copy tagged with `groups`.
    #[must_use]
    pub fn with_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupName>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Returns a copy with the input schema set.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Returns a copy marked as mutating.
    #[must_use]
    pub const fn mutating(mut self) -> Self {
        self.mutates = true;
        self
    }

    /// Returns a copy routed to `executor`.
    #[must_use]
    pub fn with_executor(mut self, executor: impl Into<ExecutorId>) -> Self {
        self.executor = executor.into();
        self
    }

    /// Returns a copy renamed to `name`.
    #[must_use]
    pub fn renamed(&self, name: ToolName) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }
}

/// Catalog entry pairing a descriptor with its implementation.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Tool descriptor.
    pub descriptor: ToolDescriptor,
    /// Tool implementation.
    pub handler: Arc<dyn Tool>,
}

impl RegisteredTool {
    /// Executes the tool, bounding it by `timeout_ms` when set.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::ExecutionFailed`] when the tool fails or the
    /// time bound elapses.
    pub async fn invoke(
        &self,
        args: Value,
        ctx: &ToolContext,
        timeout_ms: Option<u64>,
    ) -> Result<ToolResult, AccessError> {
        let failed = |message: String| AccessError::ExecutionFailed {
            tool: self.descriptor.name.to_string(),
            message,
        };
        let call = self.handler.execute(args, ctx);
        let outcome = match timeout_ms {
            Some(limit) => tokio::time::timeout(Duration::from_millis(limit), call)
                .await
                .map_err(|_| failed(format!("timed out after {limit}ms")))?,
            None => call.await,
        };
        outcome.map_err(|err| failed(err.to_string()))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Tool name already registered.
    #[error("tool already registered: {0}")]
    Duplicate(String),
    /// Tool name rejected.
    #[error("invalid tool name: {0}")]
    InvalidName(String),
    /// Catalog lock failure.
    #[error("catalog error: {0}")]
    Internal(String),
}

impl From<CatalogError> for AccessError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::Duplicate(name) => Self::Conflict(format!("tool already registered: {name}")),
            CatalogError::InvalidName(message) => Self::InvalidArgument(message),
            CatalogError::Internal(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Ordered tool registry.
#[derive(Default)]
pub struct ToolCatalog {
    /// Registered tools in registration order.
    tools: Mutex<Vec<RegisteredTool>>,
}

impl ToolCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for duplicate or invalid names.
    pub fn register(
        &self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn Tool>,
    ) -> Result<(), CatalogError> {
        validate_tool_name(descriptor.name.as_str())?;
        let mut tools = self.lock()?;
        if tools.iter().any(|entry| entry.descriptor.name == descriptor.name) {
            return Err(CatalogError::Duplicate(descriptor.name.to_string()));
        }
        tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        drop(tools);
        Ok(())
    }

    /// Removes a tool. Returns false when the name is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Internal`] when the catalog lock is poisoned.
    pub fn unregister(&self, name: &ToolName) -> Result<bool, CatalogError> {
        let mut tools = self.lock()?;
        let before = tools.len();
        tools.retain(|entry| &entry.descriptor.name != name);
        Ok(tools.len() != before)
    }

    /// Returns the tool registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Internal`] when the catalog lock is poisoned.
    pub fn get(&self, name: &ToolName) -> Result<Option<RegisteredTool>, CatalogError> {
        Ok(self.lock()?.iter().find(|entry| &entry.descriptor.name == name).cloned())
    }

    /// Returns every descriptor in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Internal`] when the catalog lock is poisoned.
    pub fn descriptors(&self) -> Result<Vec<ToolDescriptor>, CatalogError> {
        Ok(self.lock()?.iter().map(|entry| entry.descriptor.clone()).collect())
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.lock().map_or(0, |tools| tools.len())
    }

    /// Returns true when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the tool list.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<RegisteredTool>>, CatalogError> {
        self.tools.lock().map_err(|_| CatalogError::Internal("catalog mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a catalog tool name.
fn validate_tool_name(name: &str) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(CatalogError::InvalidName("tool name must be non-empty".to_string()));
    }
    if name.len() > MAX_TOOL_NAME_LENGTH {
        return Err(CatalogError::InvalidName(format!("tool name '{name}' is too long")));
    }
    if name.contains(NAMESPACE_SEPARATOR) {
        return Err(CatalogError::InvalidName(format!(
            "tool name '{name}' must not contain '{NAMESPACE_SEPARATOR}'"
        )));
    }
    Ok(())
}
