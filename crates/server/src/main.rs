//! cachet server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use cachet_client::{CacheContext, Controller, FetchClient, FetchConfig, LocalRuleTable};
use cachet_core::CacheDb;
use cachet_core::config::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tasks;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(db_path = %config.db_path.display(), "Starting cachet server on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let fetcher = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let rules = Arc::new(LocalRuleTable::new(db.clone()));
    let ctx = CacheContext::open(db, config.clone()).await?;
    let controller = Controller::new(ctx, fetcher, rules);

    let flush = tasks::spawn_flush(controller.clone(), config.flush_interval());
    let sweep = tasks::spawn_sweep(controller.clone(), config.sweep_interval());

    let handler = handler::CachetServer::new(controller.clone());
    let server = serve_server(handler, stdio()).await?;

    tokio::select! {
        res = server.waiting() => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }

    flush.abort();
    sweep.abort();
    match controller.flush_stats().await {
        Ok(totals) => tracing::info!(hits = totals.hits, misses = totals.misses, "final stats flush"),
        Err(e) => tracing::error!(error = %e, "final stats flush failed"),
    }

    Ok(())
}
