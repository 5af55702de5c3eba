//! Per-origin MCP tools.

pub mod purge;
pub mod state;
pub mod toggle;

pub use purge::purge_site_impl;
pub use state::{SiteParams, get_state_impl};
pub use toggle::{ToggleSiteParams, toggle_site_impl};
