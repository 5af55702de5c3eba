//! get_state tool implementation.
//!
//! Reports whether caching is enabled for an origin, what is cached for it
//! and the session and cumulative counters.

use cachet_client::Controller;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters shared by the per-origin tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteParams {
    /// Origin hostname, or any URL on the origin.
    pub origin: String,
}

pub async fn get_state_impl(controller: &Controller, params: SiteParams) -> Result<CallToolResult, McpError> {
    let state = controller.get_state(&params.origin).await?;
    json_result(&state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{controller, output, seed};

    #[tokio::test]
    async fn test_state_reports_resident_items() {
        let controller = controller().await;
        seed(&controller, "https://cdn.example/a.css", "example", b"body{}").await;

        let params = SiteParams { origin: "https://Example/home".to_string() };
        let result = get_state_impl(&controller, params).await.unwrap();
        let state: serde_json::Value = output(&result);

        assert_eq!(state["origin"], "example");
        assert_eq!(state["enabled"], true);
        assert_eq!(state["item_count"], 1);
        assert_eq!(state["total_size_bytes"], 6);
    }

    #[tokio::test]
    async fn test_state_rejects_bad_origin() {
        let controller = controller().await;
        let params = SiteParams { origin: "   ".to_string() };
        assert!(get_state_impl(&controller, params).await.is_err());
    }
}
