//! Observation feed tools: observe_request and observe_response.
//!
//! Requests are decided inline since the host needs the hit/miss answer
//! before it proceeds. Responses are handed to a background task by
//! default so a slow secondary fetch never holds up the host.

use cachet_client::{Controller, RequestObserved, ResponseObserved};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObserveResponseParams {
    #[serde(flatten)]
    pub response: ResponseObserved,

    /// Wait for the pipeline and return its outcome instead of queuing.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueuedOutput {
    pub queued: bool,
}

pub async fn observe_request_impl(
    controller: &Controller, params: RequestObserved,
) -> Result<CallToolResult, McpError> {
    let outcome = controller.observe_request(&params).await;
    json_result(&outcome)
}

pub async fn observe_response_impl(
    controller: &Controller, params: ObserveResponseParams,
) -> Result<CallToolResult, McpError> {
    if params.wait {
        let outcome = controller.observe_response(&params.response).await;
        return json_result(&outcome);
    }

    let controller = controller.clone();
    let response = params.response;
    tokio::spawn(async move {
        let outcome = controller.observe_response(&response).await;
        tracing::debug!(url = %response.url, ?outcome, "response processed");
    });
    json_result(&QueuedOutput { queued: true })
}
