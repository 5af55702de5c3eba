//! MCP tool implementations.
//!
//! This module contains all tools exposed by the cachet server. Each tool
//! has a params struct, an output struct and an `*_impl` function taking
//! the shared [`Controller`](cachet_client::Controller).

pub mod cache;
pub mod observe;
pub mod site;

use cachet_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
