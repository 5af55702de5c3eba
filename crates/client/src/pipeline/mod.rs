//! Validation and fetch pipeline.
//!
//! Turns a completed-response event into a no-op, an access-time touch, or
//! a full commit. Per URL the states are implicit:
//!
//! - **Uncached** -> first eligible response starts a secondary fetch.
//! - **Pending** -> a fetch is in flight. Further responses for the URL are
//!   dropped as duplicates, not queued.
//! - **Cached** -> a later response whose validator matches the stored one
//!   (ETag or Last-Modified) only touches the access time. Anything else
//!   re-fetches and replaces the body.
//!
//! Fetch failures return the URL to Uncached; the next observation retries.
//! A fetch that outlives a purge or a disable of its origin is discarded.

pub mod eligibility;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Serialize;

use cachet_core::{CachedResource, Error, codec, now_millis};

use crate::context::{CacheContext, PurgeMark};
use crate::events::{ResponseObserved, Target};
use crate::fetch::{BodyFetcher, FetchedBody};

pub use eligibility::SkipReason;

/// Result of running one response through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Skipped { reason: SkipReason },
    /// Another fetch for the same URL is already in flight.
    Duplicate,
    /// Validator matched; only the access time moved.
    Touched,
    Committed { size_bytes: u64, compressed: bool },
    Failed { error: String },
}

/// Removes a URL from the in-flight set when the run ends, however it ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    url: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.url);
    }
}

pub struct Pipeline {
    ctx: Arc<CacheContext>,
    fetcher: Arc<dyn BodyFetcher>,
    in_flight: Mutex<HashSet<String>>,
}

impl Pipeline {
    pub fn new(ctx: Arc<CacheContext>, fetcher: Arc<dyn BodyFetcher>) -> Self {
        Self { ctx, fetcher, in_flight: Mutex::new(HashSet::new()) }
    }

    /// Whether a fetch for `url` is currently in flight.
    pub fn is_pending(&self, url: &str) -> bool {
        self.in_flight.lock().contains(url)
    }

    fn begin(&self, url: &str) -> Option<InFlight<'_>> {
        self.in_flight
            .lock()
            .insert(url.to_string())
            .then(|| InFlight { set: &self.in_flight, url: url.to_string() })
    }

    /// Run one observed response through the pipeline.
    pub async fn process(&self, response: &ResponseObserved) -> PipelineOutcome {
        let target = match response.target() {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed response event");
                return PipelineOutcome::Skipped { reason: SkipReason::Malformed(e.to_string()) };
            }
        };

        if let Err(reason) = eligibility::check(response, self.ctx.config.max_resource_bytes) {
            tracing::debug!(url = %target.url, ?reason, "response not eligible");
            return PipelineOutcome::Skipped { reason };
        }
        if !self.ctx.prefs.is_enabled(&target.origin_host) {
            return PipelineOutcome::Skipped { reason: SkipReason::SiteDisabled };
        }

        let Some(_guard) = self.begin(&target.url) else {
            tracing::debug!(url = %target.url, "fetch already in flight, ignoring duplicate");
            return PipelineOutcome::Duplicate;
        };

        match self.run(&target, response).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(url = %target.url, origin = %target.origin_host, error = %e, "pipeline failed");
                PipelineOutcome::Failed { error: e.to_string() }
            }
        }
    }

    async fn run(&self, target: &Target, response: &ResponseObserved) -> Result<PipelineOutcome, Error> {
        let mark = self.ctx.purges.read().await.mark(&target.origin_host);
        let ws = &self.ctx.working_set;
        ws.ensure_loaded(&target.origin_host).await?;

        let observed = response.validator();
        if let Some(existing) = ws.lookup(&target.origin_host, &target.url)
            && existing.validator.matches(&observed)
        {
            let now = now_millis();
            ws.touch(&target.origin_host, &target.url, now);
            if let Err(e) = self.ctx.db.touch_resource(&target.url, now).await {
                tracing::warn!(url = %target.url, error = %e, "access time not persisted");
            }
            return Ok(PipelineOutcome::Touched);
        }

        let fetched = self.fetcher.fetch_body(&target.url).await?;
        let max = self.ctx.config.max_resource_bytes;
        if fetched.bytes.len() > max {
            tracing::debug!(url = %target.url, bytes = fetched.bytes.len(), "body over size ceiling");
            return Ok(PipelineOutcome::Skipped { reason: SkipReason::TooLarge(fetched.bytes.len() as u64) });
        }

        let resource = self.build_resource(target, response, fetched);
        self.commit(resource, mark).await
    }

    fn build_resource(&self, target: &Target, response: &ResponseObserved, fetched: FetchedBody) -> CachedResource {
        let content_type = fetched
            .content_type
            .or_else(|| response.content_type.clone())
            .unwrap_or_default();
        let validator = if fetched.validator.is_empty() { response.validator() } else { fetched.validator };
        let (body, compressed) = self.encode_body(&target.url, &content_type, &fetched.bytes);
        let now = now_millis();

        CachedResource {
            url: target.url.clone(),
            origin_host: target.origin_host.clone(),
            body,
            content_type,
            size_bytes: fetched.bytes.len() as u64,
            compressed,
            validator,
            cached_at: now,
            last_accessed_at: now,
            last_validated_at: now,
        }
    }

    /// Compress text-like bodies when enabled; any failure stores the raw body.
    fn encode_body(&self, url: &str, content_type: &str, raw: &[u8]) -> (Vec<u8>, bool) {
        if !self.ctx.config.compress_text || !eligibility::is_text_like(&eligibility::essence(content_type)) {
            return (raw.to_vec(), false);
        }
        match codec::compress(raw) {
            Ok(packed) if packed.len() < raw.len() => (packed, true),
            Ok(_) => (raw.to_vec(), false),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "compression failed, storing raw body");
                (raw.to_vec(), false)
            }
        }
    }

    /// Reflect the resource in the working set, then persist it.
    ///
    /// The in-memory update is optimistic. If the durable write fails it is
    /// undone for this URL and the failure is reported; nothing is re-read
    /// from storage. Nothing is written if the origin was purged since
    /// `mark` was taken or caching was disabled during the fetch.
    async fn commit(&self, resource: CachedResource, mark: PurgeMark) -> Result<PipelineOutcome, Error> {
        let purges = self.ctx.purges.read().await;
        if !self.ctx.prefs.is_enabled(&resource.origin_host) {
            tracing::debug!(url = %resource.url, "site disabled during fetch, discarding body");
            return Ok(PipelineOutcome::Skipped { reason: SkipReason::SiteDisabled });
        }
        if purges.mark(&resource.origin_host) != mark {
            tracing::debug!(url = %resource.url, "origin purged during fetch, discarding body");
            return Ok(PipelineOutcome::Skipped { reason: SkipReason::Purged });
        }

        let ws = &self.ctx.working_set;
        let previous = ws.upsert(resource.meta());

        if let Err(e) = self.ctx.db.put_resource(&resource).await {
            match previous {
                Some(prev) => {
                    ws.upsert(prev);
                }
                None => {
                    ws.remove(&resource.origin_host, &resource.url);
                }
            }
            tracing::error!(url = %resource.url, error = %e, "commit failed");
            return Err(e);
        }

        self.ctx.stats.record_miss(&resource.origin_host);
        tracing::debug!(
            url = %resource.url,
            origin = %resource.origin_host,
            size = resource.size_bytes,
            compressed = resource.compressed,
            "resource committed"
        );
        Ok(PipelineOutcome::Committed { size_bytes: resource.size_bytes, compressed: resource.compressed })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use cachet_core::{CacheDb, Validator};
    use cachet_core::config::AppConfig;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves canned bodies keyed by URL and counts calls.
    #[derive(Default)]
    pub(crate) struct MockFetcher {
        pub bodies: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
        pub calls: AtomicUsize,
        pub delay_ms: u64,
    }

    impl MockFetcher {
        pub fn serve(&self, url: &str, body: &[u8], etag: Option<&str>) {
            self.bodies
                .lock()
                .insert(url.to_string(), (body.to_vec(), etag.map(String::from)));
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BodyFetcher for MockFetcher {
        async fn fetch_body(&self, url: &str) -> Result<FetchedBody, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let Some((body, etag)) = self.bodies.lock().get(url).cloned() else {
                return Err(Error::HttpError("status 404".into()));
            };
            Ok(FetchedBody {
                status: StatusCode::OK,
                content_type: None,
                validator: Validator::new(etag, None),
                bytes: Bytes::from(body),
            })
        }
    }

    pub(crate) fn response(url: &str, origin: &str, content_type: &str, etag: Option<&str>) -> ResponseObserved {
        ResponseObserved {
            url: url.into(),
            origin: origin.into(),
            method: "GET".into(),
            status: 200,
            content_type: Some(content_type.into()),
            etag: etag.map(String::from),
            last_modified: None,
            content_length: None,
            from_cache: false,
        }
    }

    async fn setup(config: AppConfig, fetcher: Arc<MockFetcher>) -> (Arc<CacheContext>, Pipeline) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let ctx = CacheContext::open(db, config).await.unwrap();
        let pipeline = Pipeline::new(ctx.clone(), fetcher);
        (ctx, pipeline)
    }

    const APP_JS: &str = "https://cdn.example/app.js";

    #[tokio::test]
    async fn test_first_response_commits() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, &[7u8; 50_000], Some("\"v1\""));
        let (ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;

        let outcome = pipeline.process(&response(APP_JS, "example", "image/png", Some("\"v1\""))).await;
        assert_eq!(outcome, PipelineOutcome::Committed { size_bytes: 50_000, compressed: false });

        let stored = ctx.db.get_resource(APP_JS).await.unwrap().unwrap();
        assert_eq!(stored.size_bytes, 50_000);
        assert_eq!(stored.validator.etag.as_deref(), Some("\"v1\""));
        assert_eq!(ctx.working_set.summary("example"), Some((1, 50_000)));
        assert_eq!(ctx.stats.pending().misses, 1);
        assert!(!pipeline.is_pending(APP_JS));
    }

    #[tokio::test]
    async fn test_matching_validator_only_touches() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, b"console.log('v1')", Some("\"v1\""));
        let (ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;
        let event = response(APP_JS, "example", "application/javascript", Some("\"v1\""));

        pipeline.process(&event).await;
        let before = ctx.db.get_resource(APP_JS).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        for _ in 0..3 {
            assert_eq!(pipeline.process(&event).await, PipelineOutcome::Touched);
        }

        let after = ctx.db.get_resource(APP_JS).await.unwrap().unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(after.body, before.body);
        assert_eq!(after.size_bytes, before.size_bytes);
        assert_eq!(after.cached_at, before.cached_at);
        assert!(after.last_accessed_at > before.last_accessed_at);
        assert_eq!(ctx.stats.pending().misses, 1);
    }

    #[tokio::test]
    async fn test_changed_validator_replaces_body() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, b"old body", Some("\"a\""));
        let (ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;

        pipeline.process(&response(APP_JS, "example", "image/gif", Some("\"a\""))).await;
        let first = ctx.db.get_resource(APP_JS).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        fetcher.serve(APP_JS, b"a much newer body", Some("\"b\""));
        let outcome = pipeline.process(&response(APP_JS, "example", "image/gif", Some("\"b\""))).await;
        assert_eq!(outcome, PipelineOutcome::Committed { size_bytes: 17, compressed: false });

        let second = ctx.db.get_resource(APP_JS).await.unwrap().unwrap();
        assert_eq!(second.body, b"a much newer body");
        assert_eq!(second.validator.etag.as_deref(), Some("\"b\""));
        assert!(second.cached_at > first.cached_at);
        assert_eq!(ctx.working_set.summary("example"), Some((1, 17)));
        assert_eq!(ctx.stats.pending().misses, 2);
    }

    #[tokio::test]
    async fn test_no_validators_always_refetch() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, b"x", None);
        let (_ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;
        let event = response(APP_JS, "example", "image/png", None);

        pipeline.process(&event).await;
        pipeline.process(&event).await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_responses_fetch_once() {
        let fetcher = Arc::new(MockFetcher { delay_ms: 30, ..Default::default() });
        fetcher.serve(APP_JS, b"body", Some("\"v1\""));
        let (ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;
        let event = response(APP_JS, "example", "image/png", Some("\"v1\""));

        let (first, second) = tokio::join!(pipeline.process(&event), pipeline.process(&event));

        assert!(matches!(first, PipelineOutcome::Committed { .. }));
        assert_eq!(second, PipelineOutcome::Duplicate);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(ctx.stats.pending().misses, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_uncached_and_retries() {
        let fetcher = Arc::new(MockFetcher::default());
        let (ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;
        let event = response(APP_JS, "example", "image/png", Some("\"v1\""));

        assert!(matches!(pipeline.process(&event).await, PipelineOutcome::Failed { .. }));
        assert!(ctx.db.get_resource(APP_JS).await.unwrap().is_none());
        assert!(!pipeline.is_pending(APP_JS));

        fetcher.serve(APP_JS, b"now it works", Some("\"v1\""));
        assert!(matches!(pipeline.process(&event).await, PipelineOutcome::Committed { .. }));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_oversized_body_skipped_entirely() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, &[1u8; 2048], None);
        let config = AppConfig { max_resource_bytes: 1024, ..Default::default() };
        let (ctx, pipeline) = setup(config, fetcher).await;

        let outcome = pipeline.process(&response(APP_JS, "example", "image/png", None)).await;
        assert_eq!(outcome, PipelineOutcome::Skipped { reason: SkipReason::TooLarge(2048) });
        assert!(ctx.db.get_resource(APP_JS).await.unwrap().is_none());
        assert_eq!(ctx.working_set.summary("example"), Some((0, 0)));
    }

    #[tokio::test]
    async fn test_disabled_site_skipped() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, b"x", None);
        let (ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;
        ctx.prefs.set("example", false).await.unwrap();

        let outcome = pipeline.process(&response(APP_JS, "example", "image/png", None)).await;
        assert_eq!(outcome, PipelineOutcome::Skipped { reason: SkipReason::SiteDisabled });
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_ineligible_and_malformed_skipped() {
        let fetcher = Arc::new(MockFetcher::default());
        let (_ctx, pipeline) = setup(AppConfig::default(), fetcher.clone()).await;

        let html = response("https://example.com/", "example.com", "text/html", None);
        assert!(matches!(
            pipeline.process(&html).await,
            PipelineOutcome::Skipped { reason: SkipReason::DisallowedType(_) }
        ));

        let malformed = response("not a url", "example", "text/css", None);
        assert!(matches!(
            pipeline.process(&malformed).await,
            PipelineOutcome::Skipped { reason: SkipReason::Malformed(_) }
        ));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_text_bodies_compressed() {
        let script = "function add(a, b) { return a + b; }\n".repeat(200);
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, script.as_bytes(), Some("\"v1\""));
        let (ctx, pipeline) = setup(AppConfig::default(), fetcher).await;

        let outcome = pipeline
            .process(&response(APP_JS, "example", "application/javascript", Some("\"v1\"")))
            .await;
        assert_eq!(outcome, PipelineOutcome::Committed { size_bytes: script.len() as u64, compressed: true });

        let stored = ctx.db.get_resource(APP_JS).await.unwrap().unwrap();
        assert!(stored.body.len() < script.len());
        assert_eq!(stored.decoded_body().unwrap(), script.as_bytes());
    }

    #[tokio::test]
    async fn test_compression_disabled_by_config() {
        let script = "a".repeat(4096);
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.serve(APP_JS, script.as_bytes(), None);
        let config = AppConfig { compress_text: false, ..Default::default() };
        let (_ctx, pipeline) = setup(config, fetcher).await;

        let outcome = pipeline.process(&response(APP_JS, "example", "text/javascript", None)).await;
        assert_eq!(outcome, PipelineOutcome::Committed { size_bytes: 4096, compressed: false });
    }
}
