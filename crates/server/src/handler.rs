//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the controller-backed implementations.
use cachet_client::{Controller, RequestObserved};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::cache::{
    ServeAssetParams, UpdateSettingsParams, end_session_impl, get_global_stats_impl, list_all_resources_impl,
    purge_all_impl, reset_stats_impl, serve_asset_impl, update_settings_impl,
};
use crate::tools::observe::{ObserveResponseParams, observe_request_impl, observe_response_impl};
use crate::tools::site::{SiteParams, ToggleSiteParams, get_state_impl, purge_site_impl, toggle_site_impl};

/// The main MCP server handler for cachet.
#[derive(Clone)]
pub struct CachetServer {
    controller: Controller,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CachetServer {
    pub fn new(controller: Controller) -> Self {
        Self { controller, tool_router: Self::tool_router() }
    }

    #[tool(description = "Decide whether an outgoing request is served from the local cache. Returns hit (with bytes \
                          and serve rule), miss, bypassed or dropped.")]
    async fn observe_request(&self, params: Parameters<RequestObserved>) -> Result<CallToolResult, McpError> {
        observe_request_impl(&self.controller, params.0).await
    }

    #[tool(description = "Report a completed response. Eligible static assets are fetched and cached in the \
                          background; set wait=true to get the pipeline outcome.")]
    async fn observe_response(&self, params: Parameters<ObserveResponseParams>) -> Result<CallToolResult, McpError> {
        observe_response_impl(&self.controller, params.0).await
    }

    #[tool(description = "Get caching state for an origin: enabled flag, item count, total size and counters.")]
    async fn get_state(&self, params: Parameters<SiteParams>) -> Result<CallToolResult, McpError> {
        get_state_impl(&self.controller, params.0).await
    }

    #[tool(description = "Enable or disable caching for an origin. Disabling purges its resources by default.")]
    async fn toggle_site(&self, params: Parameters<ToggleSiteParams>) -> Result<CallToolResult, McpError> {
        toggle_site_impl(&self.controller, params.0).await
    }

    #[tool(description = "Remove every cached resource of an origin.")]
    async fn purge_site(&self, params: Parameters<SiteParams>) -> Result<CallToolResult, McpError> {
        purge_site_impl(&self.controller, params.0).await
    }

    #[tool(description = "Remove every cached resource. Cumulative statistics are kept.")]
    async fn purge_all(&self) -> Result<CallToolResult, McpError> {
        purge_all_impl(&self.controller).await
    }

    #[tool(description = "Get cumulative hit/miss/bytes-saved totals, store size, resident origins and settings.")]
    async fn get_global_stats(&self) -> Result<CallToolResult, McpError> {
        get_global_stats_impl(&self.controller).await
    }

    #[tool(description = "List metadata for every cached resource.")]
    async fn list_all_resources(&self) -> Result<CallToolResult, McpError> {
        list_all_resources_impl(&self.controller).await
    }

    #[tool(description = "Return a cached resource's decoded body (as text when UTF-8).")]
    async fn serve_asset(&self, params: Parameters<ServeAssetParams>) -> Result<CallToolResult, McpError> {
        serve_asset_impl(&self.controller, params.0).await
    }

    #[tool(description = "Zero the cumulative statistics.")]
    async fn reset_stats(&self) -> Result<CallToolResult, McpError> {
        reset_stats_impl(&self.controller).await
    }

    #[tool(description = "Flush pending statistics and clear per-origin session counters.")]
    async fn end_session(&self) -> Result<CallToolResult, McpError> {
        end_session_impl(&self.controller).await
    }

    #[tool(description = "Update the maximum resource age used by the sweep.")]
    async fn update_settings(&self, params: Parameters<UpdateSettingsParams>) -> Result<CallToolResult, McpError> {
        update_settings_impl(&self.controller, params.0).await
    }
}

impl ServerHandler for CachetServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "cachet".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Local HTTP asset cache. Feed request and response observations; query per-site and global state."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
