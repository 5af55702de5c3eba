//! Resource tools: list_all_resources, purge_all and serve_asset.

use cachet_client::Controller;
use cachet_core::ResourceMeta;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;
use crate::tools::site::purge::PurgeOutput;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListResourcesOutput {
    pub count: usize,
    pub resources: Vec<ResourceMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServeAssetParams {
    /// Normalized URL of a cached resource.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServeAssetOutput {
    pub url: String,
    pub content_type: String,
    /// Decoded body length.
    pub size_bytes: u64,
    /// Body as text, when it is valid UTF-8.
    pub text: Option<String>,
}

pub async fn list_all_resources_impl(controller: &Controller) -> Result<CallToolResult, McpError> {
    let resources = controller.list_all_resources().await?;
    json_result(&ListResourcesOutput { count: resources.len(), resources })
}

pub async fn purge_all_impl(controller: &Controller) -> Result<CallToolResult, McpError> {
    let removed = controller.purge_all().await?;
    json_result(&PurgeOutput { removed })
}

pub async fn serve_asset_impl(controller: &Controller, params: ServeAssetParams) -> Result<CallToolResult, McpError> {
    let asset = controller.serve(&params.url).await?;
    let size_bytes = asset.body.len() as u64;
    let output = ServeAssetOutput {
        url: asset.url,
        content_type: asset.content_type,
        size_bytes,
        text: String::from_utf8(asset.body).ok(),
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{controller, output, seed};

    #[tokio::test]
    async fn test_list_then_purge_all() {
        let controller = controller().await;
        seed(&controller, "https://cdn.example/a.css", "example", b"a").await;
        seed(&controller, "https://cdn.other/b.css", "other", b"b").await;

        let listed: ListResourcesOutput = output(&list_all_resources_impl(&controller).await.unwrap());
        assert_eq!(listed.count, 2);

        let purged: PurgeOutput = output(&purge_all_impl(&controller).await.unwrap());
        assert_eq!(purged.removed, 2);

        let listed: ListResourcesOutput = output(&list_all_resources_impl(&controller).await.unwrap());
        assert_eq!(listed.count, 0);
    }

    #[tokio::test]
    async fn test_serve_asset_text() {
        let controller = controller().await;
        seed(&controller, "https://cdn.example/a.css", "example", b"body{color:red}").await;

        let params = ServeAssetParams { url: "https://cdn.example/a.css".to_string() };
        let out: ServeAssetOutput = output(&serve_asset_impl(&controller, params).await.unwrap());
        assert_eq!(out.size_bytes, 15);
        assert_eq!(out.text.as_deref(), Some("body{color:red}"));
    }

    #[tokio::test]
    async fn test_serve_asset_missing() {
        let controller = controller().await;
        let params = ServeAssetParams { url: "https://cdn.example/none.css".to_string() };
        let err = serve_asset_impl(&controller, params).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }
}
