//! toggle_site tool implementation.

use cachet_client::Controller;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToggleSiteParams {
    /// Origin hostname, or any URL on the origin.
    pub origin: String,

    /// Whether caching should be enabled for the origin.
    pub enabled: bool,
}

/// Flip the preference and return the resulting site state.
pub async fn toggle_site_impl(controller: &Controller, params: ToggleSiteParams) -> Result<CallToolResult, McpError> {
    let state = controller.toggle_site(&params.origin, params.enabled).await?;
    json_result(&state)
}
