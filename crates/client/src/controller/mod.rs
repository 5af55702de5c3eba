//! Accounting and interception controller.
//!
//! Consumes the observation feed. Outgoing requests are checked against the
//! working set: a resident URL is a hit, credited to the stats ledger and
//! served through a local rule; anything else is a miss and any stale rule
//! for the URL is cleared. Completed responses go to the pipeline.
//!
//! The controller also implements the management operations exposed to UI
//! collaborators: site state, toggles, purges, global stats, the periodic
//! stats flush and the age-based sweep.
//!
//! Failures on the request path never propagate; they degrade to a miss.

pub mod rules;
pub mod size;

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;

use cachet_core::store::StoreTotals;
use cachet_core::{Error, OriginCounters, ResourceMeta, Settings, StatsTotals, now_millis};

use crate::context::CacheContext;
use crate::events::{ObservedEvent, RequestObserved, ResponseObserved, Target};
use crate::fetch::BodyFetcher;
use crate::fetch::url::origin_host;
use crate::pipeline::{Pipeline, PipelineOutcome};

pub use rules::{LocalRuleTable, RuleInstaller, ServeRule};
pub use size::{AssetFamily, credited_bytes};

/// Decision for an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    Hit { bytes: u64, rule: ServeRule },
    Miss,
    /// Not a cacheable request, or caching is disabled for the origin.
    Bypassed,
    /// Event could not be validated.
    Dropped { error: String },
}

/// What happened to a completed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ResponseOutcome {
    /// Bytes credited for a native-cache hit, if any.
    pub native_credit: Option<u64>,
    pub pipeline: PipelineOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOutcome {
    Request(RequestOutcome),
    Response(ResponseOutcome),
}

/// Per-origin view returned by `get_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct SiteState {
    pub origin: String,
    pub enabled: bool,
    pub item_count: u64,
    pub total_size_bytes: u64,
    /// Session-scoped counters for this origin.
    pub session: OriginCounters,
    /// Cumulative counters across all origins, including unflushed deltas.
    pub totals: StatsTotals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct GlobalStats {
    pub totals: StatsTotals,
    pub pending: StatsTotals,
    pub store: StoreTotals,
    pub resident_origins: Vec<String>,
    pub settings: Settings,
}

/// Decoded body ready to be served for a local rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedAsset {
    pub url: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct Controller {
    ctx: Arc<CacheContext>,
    pipeline: Arc<Pipeline>,
    rules: Arc<dyn RuleInstaller>,
}

impl Controller {
    pub fn new(ctx: Arc<CacheContext>, fetcher: Arc<dyn BodyFetcher>, rules: Arc<dyn RuleInstaller>) -> Self {
        let pipeline = Arc::new(Pipeline::new(ctx.clone(), fetcher));
        Self { ctx, pipeline, rules }
    }

    pub fn context(&self) -> &Arc<CacheContext> {
        &self.ctx
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub async fn dispatch(&self, event: &ObservedEvent) -> EventOutcome {
        match event {
            ObservedEvent::Request(req) => EventOutcome::Request(self.observe_request(req).await),
            ObservedEvent::Response(resp) => EventOutcome::Response(self.observe_response(resp).await),
        }
    }

    /// Decide hit or miss for an outgoing request.
    pub async fn observe_request(&self, request: &RequestObserved) -> RequestOutcome {
        let target = match request.target() {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed request event");
                return RequestOutcome::Dropped { error: e.to_string() };
            }
        };

        if !request.is_retrieval() {
            return RequestOutcome::Bypassed;
        }
        if !self.ctx.prefs.is_enabled(&target.origin_host) {
            self.clear_rule(&target.url).await;
            return RequestOutcome::Bypassed;
        }

        if let Err(e) = self.ctx.working_set.ensure_loaded(&target.origin_host).await {
            tracing::warn!(origin = %target.origin_host, error = %e, "working set load failed, treating as miss");
            self.clear_rule(&target.url).await;
            return RequestOutcome::Miss;
        }

        let Some(meta) = self.ctx.working_set.lookup(&target.origin_host, &target.url) else {
            self.clear_rule(&target.url).await;
            return RequestOutcome::Miss;
        };

        match self.rules.install(&target.url).await {
            Ok(rule) => {
                self.ctx.stats.record_hit(&target.origin_host, meta.size_bytes);
                self.touch_on_hit(&target).await;
                tracing::debug!(url = %target.url, bytes = meta.size_bytes, rule = rule.id, "cache hit");
                RequestOutcome::Hit { bytes: meta.size_bytes, rule }
            }
            Err(e) => {
                tracing::warn!(url = %target.url, error = %e, "serve rule install failed, treating as miss");
                RequestOutcome::Miss
            }
        }
    }

    /// Credit native-cache hits, then run the response through the pipeline.
    pub async fn observe_response(&self, response: &ResponseObserved) -> ResponseOutcome {
        let native_credit = match response.target() {
            Ok(target) => self.credit_native_hit(&target, response),
            Err(_) => None,
        };
        let pipeline = self.pipeline.process(response).await;
        ResponseOutcome { native_credit, pipeline }
    }

    /// A response satisfied by the host's own cache saves bytes too, unless
    /// it is one of ours; those were credited on the request path.
    fn credit_native_hit(&self, target: &Target, response: &ResponseObserved) -> Option<u64> {
        if !response.from_cache || !response.is_retrieval() {
            return None;
        }
        if !(response.is_success() || response.status == 304) {
            return None;
        }
        if !self.ctx.prefs.is_enabled(&target.origin_host)
            || self.ctx.working_set.contains(&target.origin_host, &target.url)
        {
            return None;
        }
        let bytes = credited_bytes(&target.url, response.content_length);
        self.ctx.stats.record_hit(&target.origin_host, bytes);
        Some(bytes)
    }

    /// A served hit counts as an access for the age sweep.
    async fn touch_on_hit(&self, target: &Target) {
        let now = now_millis();
        self.ctx.working_set.touch(&target.origin_host, &target.url, now);
        if let Err(e) = self.ctx.db.touch_resource(&target.url, now).await {
            tracing::warn!(url = %target.url, error = %e, "access time not persisted");
        }
    }

    async fn clear_rule(&self, url: &str) {
        if let Err(e) = self.rules.remove(url).await {
            tracing::warn!(url = %url, error = %e, "serve rule removal failed");
        }
    }

    fn parse_origin(origin: &str) -> Result<String, Error> {
        origin_host(origin).map_err(|e| Error::InvalidInput(e.to_string()))
    }

    /// Read-only view of an origin. Does not make the origin resident.
    pub async fn get_state(&self, origin: &str) -> Result<SiteState, Error> {
        let origin = Self::parse_origin(origin)?;
        let (item_count, total_size_bytes) = match self.ctx.working_set.summary(&origin) {
            Some((count, size)) => (count as u64, size),
            None => {
                let totals = self.ctx.db.origin_totals(&origin).await?;
                (totals.item_count, totals.size_bytes)
            }
        };

        Ok(SiteState {
            enabled: self.ctx.prefs.is_enabled(&origin),
            item_count,
            total_size_bytes,
            session: self.ctx.stats.origin(&origin),
            totals: self.ctx.stats.totals(),
            origin,
        })
    }

    /// Enable or disable caching for an origin.
    ///
    /// Disabling stops rule installation immediately and, when
    /// `purge_on_disable` is set, purges the origin's cached resources.
    pub async fn toggle_site(&self, origin: &str, enabled: bool) -> Result<SiteState, Error> {
        let origin = Self::parse_origin(origin)?;
        let was_enabled = self.ctx.prefs.set(&origin, enabled).await?;
        tracing::info!(origin = %origin, enabled, "site preference changed");

        if !enabled && self.ctx.config.purge_on_disable {
            self.purge_site(&origin).await?;
        } else if !enabled && was_enabled {
            self.clear_origin_rules(&origin).await?;
        }

        self.get_state(&origin).await
    }

    async fn clear_origin_rules(&self, origin: &str) -> Result<(), Error> {
        for meta in self.ctx.db.list_meta_by_origin(origin).await? {
            self.clear_rule(&meta.url).await;
        }
        Ok(())
    }

    /// Remove every cached resource of an origin from store, memory and rules.
    pub async fn purge_site(&self, origin: &str) -> Result<u64, Error> {
        let origin = Self::parse_origin(origin)?;
        let urls = {
            let mut purges = self.ctx.purges.write().await;
            purges.bump_origin(&origin);
            let urls = self.ctx.db.delete_by_origin(&origin).await?;
            self.ctx.working_set.evict_origin(&origin);
            urls
        };
        for url in &urls {
            self.clear_rule(url).await;
        }
        tracing::info!(origin = %origin, removed = urls.len(), "site purged");
        Ok(urls.len() as u64)
    }

    pub async fn purge_all(&self) -> Result<u64, Error> {
        let removed = {
            let mut purges = self.ctx.purges.write().await;
            purges.bump_all();
            let removed = self.ctx.db.delete_all_resources().await?;
            self.ctx.working_set.clear();
            removed
        };
        self.rules.clear().await?;
        tracing::info!(removed, "cache purged");
        Ok(removed)
    }

    pub async fn global_stats(&self) -> Result<GlobalStats, Error> {
        Ok(GlobalStats {
            totals: self.ctx.stats.totals(),
            pending: self.ctx.stats.pending(),
            store: self.ctx.db.totals().await?,
            resident_origins: self.ctx.working_set.resident_origins(),
            settings: self.ctx.settings(),
        })
    }

    pub async fn list_all_resources(&self) -> Result<Vec<ResourceMeta>, Error> {
        self.ctx.db.list_all_meta().await
    }

    /// Decoded body for a URL with a local rule.
    pub async fn serve(&self, url: &str) -> Result<ServedAsset, Error> {
        let resource = self
            .ctx
            .db
            .get_resource(url)
            .await?
            .ok_or_else(|| Error::CacheMiss(url.to_string()))?;
        Ok(ServedAsset { body: resource.decoded_body()?, url: resource.url, content_type: resource.content_type })
    }

    /// Merge pending counters into the durable totals.
    pub async fn flush_stats(&self) -> Result<StatsTotals, Error> {
        self.ctx.stats.flush(&self.ctx.db).await
    }

    /// Evict resources not accessed within the configured age.
    ///
    /// Returns the number of resources removed.
    pub async fn sweep_expired(&self) -> Result<usize, Error> {
        let Some(cutoff) = self.ctx.settings().cutoff(now_millis()) else {
            return Ok(0);
        };
        let removed = self.ctx.db.delete_older_than(cutoff).await?;
        for (url, origin) in &removed {
            self.ctx.working_set.remove(origin, url);
            self.clear_rule(url).await;
        }
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "age sweep evicted resources");
        }
        Ok(removed.len())
    }

    /// Zero the cumulative counters, durable and pending.
    pub async fn reset_stats(&self) -> Result<(), Error> {
        self.ctx.db.reset_stats().await?;
        self.ctx.stats.reset();
        Ok(())
    }

    /// Forget session-scoped per-origin counters.
    pub fn end_session(&self) {
        self.ctx.stats.end_session();
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<Settings, Error> {
        self.ctx.update_settings(settings).await
    }
}
