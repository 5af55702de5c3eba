//! Statistics tools: get_global_stats, reset_stats and end_session.

use cachet_client::Controller;
use cachet_core::StatsTotals;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EndSessionOutput {
    /// Durable totals after the final flush.
    pub totals: StatsTotals,
}

pub async fn get_global_stats_impl(controller: &Controller) -> Result<CallToolResult, McpError> {
    let stats = controller.global_stats().await?;
    json_result(&stats)
}

/// Zero the cumulative counters and return the fresh global view.
pub async fn reset_stats_impl(controller: &Controller) -> Result<CallToolResult, McpError> {
    controller.reset_stats().await?;
    get_global_stats_impl(controller).await
}

/// Flush pending counters, then drop the per-origin session counters.
pub async fn end_session_impl(controller: &Controller) -> Result<CallToolResult, McpError> {
    let totals = controller.flush_stats().await?;
    controller.end_session();
    json_result(&EndSessionOutput { totals })
}
