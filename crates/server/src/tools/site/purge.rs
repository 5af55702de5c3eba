//! purge_site tool implementation.
//!
//! Removes every cached resource of one origin from the store, the working
//! set and the serve rules.

use cachet_client::Controller;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::SiteParams;
use crate::tools::json_result;

/// Output shared by the purge tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PurgeOutput {
    /// Number of resources removed.
    pub removed: u64,
}

pub async fn purge_site_impl(controller: &Controller, params: SiteParams) -> Result<CallToolResult, McpError> {
    let removed = controller.purge_site(&params.origin).await?;
    json_result(&PurgeOutput { removed })
}
