// toolspace-core/src/core/result.rs
// ============================================================================
// Module: Tool Results
// Description: The content-block result shape returned by every tool.
// Purpose: Give direct calls, queued tasks, and proxy calls one result type.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ToolResult`] is `{ content: [...], isError?: bool }`. Failures are
//! reported in-band with `isError: true` so callers inspect the flag instead
//! of handling a separate error channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One block of tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text output.
    Text {
        /// Text payload.
        text: String,
    },
    /// Structured JSON output.
    Json {
        /// JSON payload.
        json: Value,
    },
}

/// Result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Output blocks in emission order.
    pub content: Vec<ContentBlock>,
    /// True when the invocation failed.
    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolResult {
    /// Builds a successful single-text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: text.into(),
            }],
            is_error: false,
        }
    }

    /// Builds a successful single-JSON result.
    #[must_use]
    pub fn json(json: Value) -> Self {
        Self {
            content: vec![ContentBlock::Json {
                json,
            }],
            is_error: false,
        }
    }

    /// Builds an error result carrying a text message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns true when the result reports a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_error
    }

    /// Returns the first text block, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text {
                text,
            } => Some(text.as_str()),
            ContentBlock::Json {
                ..
            } => None,
        })
    }
}

/// Serde helper that omits `isError: false`.
#[allow(clippy::trivially_copy_pass_by_ref, reason = "Serde skip predicates take references.")]
const fn is_false(value: &bool) -> bool {
    !*value
}
