//! update_settings tool implementation.

use cachet_client::Controller;
use cachet_core::Settings;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateSettingsParams {
    /// Sweep resources not accessed within this many days. `0` disables the sweep.
    pub max_age_days: u32,

    /// Run an age sweep right away with the new settings.
    #[serde(default)]
    pub sweep_now: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateSettingsOutput {
    pub settings: Settings,
    /// Resources removed by an immediate sweep.
    pub swept: Option<usize>,
}

pub async fn update_settings_impl(
    controller: &Controller, params: UpdateSettingsParams,
) -> Result<CallToolResult, McpError> {
    let settings = controller
        .update_settings(Settings { max_age_days: params.max_age_days })
        .await?;
    let swept = if params.sweep_now { Some(controller.sweep_expired().await?) } else { None };
    json_result(&UpdateSettingsOutput { settings, swept })
}
