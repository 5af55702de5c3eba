//! Global cache MCP tools.
//!
//! Statistics, resource listing, full purge, settings and session control.

pub mod resources;
pub mod settings;
pub mod stats;

pub use resources::{ServeAssetParams, list_all_resources_impl, purge_all_impl, serve_asset_impl};
pub use settings::{UpdateSettingsParams, update_settings_impl};
pub use stats::{end_session_impl, get_global_stats_impl, reset_stats_impl};
