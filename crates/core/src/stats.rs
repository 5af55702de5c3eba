//! Session statistics with a batched, crash-tolerant flush.
//!
//! Every increment lands in an in-memory pending delta. [`StatsLedger::flush`]
//! moves the delta into the durable counters; if the write fails the delta is
//! merged back so the next flush carries it. Per-origin counters are
//! ephemeral and only live for the current session.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::StatsTotals;
use crate::{CacheDb, Error};

/// Durable destination of flushed deltas.
#[async_trait]
pub trait StatsSink: Send + Sync {
    /// Add `delta` to the cumulative counters and return the new totals.
    async fn add(&self, delta: StatsTotals) -> Result<StatsTotals, Error>;
}

#[async_trait]
impl StatsSink for CacheDb {
    async fn add(&self, delta: StatsTotals) -> Result<StatsTotals, Error> {
        self.add_stats(delta).await
    }
}

/// Session-scoped counters for one origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OriginCounters {
    pub items_served: u64,
    pub bytes_saved: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct Ledger {
    durable: StatsTotals,
    pending: StatsTotals,
    origins: HashMap<String, OriginCounters>,
}

/// Process-wide hit/miss/bytes accounting.
#[derive(Debug, Default)]
pub struct StatsLedger {
    inner: Mutex<Ledger>,
    /// Held for the whole of a flush so results land in write order.
    flushing: tokio::sync::Mutex<()>,
}

impl StatsLedger {
    /// Ledger seeded with previously persisted totals.
    pub fn with_durable(durable: StatsTotals) -> Self {
        Self { inner: Mutex::new(Ledger { durable, ..Default::default() }), ..Default::default() }
    }

    pub fn record_hit(&self, origin_host: &str, bytes: u64) {
        let mut ledger = self.inner.lock();
        ledger.pending.merge(StatsTotals { hits: 1, misses: 0, bytes_saved: bytes });
        let counters = ledger.origins.entry(origin_host.to_string()).or_default();
        counters.items_served += 1;
        counters.bytes_saved = counters.bytes_saved.saturating_add(bytes);
    }

    pub fn record_miss(&self, origin_host: &str) {
        let mut ledger = self.inner.lock();
        ledger.pending.merge(StatsTotals { hits: 0, misses: 1, bytes_saved: 0 });
        ledger.origins.entry(origin_host.to_string()).or_default().misses += 1;
    }

    /// Unflushed delta.
    pub fn pending(&self) -> StatsTotals {
        self.inner.lock().pending
    }

    /// Durable totals plus the unflushed delta.
    pub fn totals(&self) -> StatsTotals {
        let ledger = self.inner.lock();
        ledger.durable.combined(ledger.pending)
    }

    pub fn origin(&self, origin_host: &str) -> OriginCounters {
        self.inner.lock().origins.get(origin_host).copied().unwrap_or_default()
    }

    /// Write the pending delta to `sink`.
    ///
    /// The delta is detached before the write so increments recorded while
    /// the write is in flight accumulate separately. On failure it is merged
    /// back into the pending buffer and the error is returned.
    pub async fn flush(&self, sink: &dyn StatsSink) -> Result<StatsTotals, Error> {
        let _serial = self.flushing.lock().await;
        let delta = {
            let mut ledger = self.inner.lock();
            std::mem::take(&mut ledger.pending)
        };
        if delta.is_zero() {
            return Ok(self.inner.lock().durable);
        }

        match sink.add(delta).await {
            Ok(totals) => {
                self.inner.lock().durable = totals;
                tracing::debug!(hits = delta.hits, misses = delta.misses, bytes = delta.bytes_saved, "stats flushed");
                Ok(totals)
            }
            Err(e) => {
                self.inner.lock().pending.merge(delta);
                tracing::warn!(error = %e, "stats flush failed, delta kept for retry");
                Err(e)
            }
        }
    }

    /// Clear the ephemeral per-origin counters.
    pub fn end_session(&self) {
        self.inner.lock().origins.clear();
    }

    /// Forget everything in memory. The caller resets the durable row.
    pub fn reset(&self) {
        *self.inner.lock() = Ledger::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` writes, then accumulates.
    #[derive(Default)]
    struct FlakySink {
        failures: AtomicUsize,
        stored: Mutex<StatsTotals>,
    }

    #[async_trait]
    impl StatsSink for FlakySink {
        async fn add(&self, delta: StatsTotals) -> Result<StatsTotals, Error> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Database(tokio_rusqlite::Error::ConnectionClosed));
            }
            let mut stored = self.stored.lock();
            stored.merge(delta);
            Ok(*stored)
        }
    }

    #[test]
    fn test_record_hit_and_miss() {
        let ledger = StatsLedger::default();
        ledger.record_hit("example", 50_000);
        ledger.record_hit("example", 10);
        ledger.record_miss("other");

        assert_eq!(ledger.pending(), StatsTotals { hits: 2, misses: 1, bytes_saved: 50_010 });
        assert_eq!(ledger.origin("example"), OriginCounters { items_served: 2, bytes_saved: 50_010, misses: 0 });
        assert_eq!(ledger.origin("other").misses, 1);
        assert_eq!(ledger.origin("nobody"), OriginCounters::default());
    }

    #[tokio::test]
    async fn test_flush_moves_delta_to_durable() {
        let sink = FlakySink::default();
        let ledger = StatsLedger::default();
        ledger.record_hit("example", 100);

        let totals = ledger.flush(&sink).await.unwrap();
        assert_eq!(totals, StatsTotals { hits: 1, misses: 0, bytes_saved: 100 });
        assert!(ledger.pending().is_zero());
        assert_eq!(ledger.totals(), totals);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_delta() {
        let sink = FlakySink { failures: AtomicUsize::new(1), ..Default::default() };
        let ledger = StatsLedger::default();
        ledger.record_hit("example", 100);
        ledger.record_miss("example");

        assert!(ledger.flush(&sink).await.is_err());
        assert_eq!(ledger.pending(), StatsTotals { hits: 1, misses: 1, bytes_saved: 100 });

        ledger.record_hit("example", 5);
        let totals = ledger.flush(&sink).await.unwrap();
        assert_eq!(totals, StatsTotals { hits: 2, misses: 1, bytes_saved: 105 });
        assert!(ledger.pending().is_zero());
    }

    #[tokio::test]
    async fn test_empty_flush_skips_write() {
        let sink = FlakySink { failures: AtomicUsize::new(1), ..Default::default() };
        let ledger = StatsLedger::with_durable(StatsTotals { hits: 7, misses: 0, bytes_saved: 0 });

        let totals = ledger.flush(&sink).await.unwrap();
        assert_eq!(totals.hits, 7);
        assert_eq!(sink.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_against_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let ledger = StatsLedger::default();
        ledger.record_hit("example", 42);
        ledger.flush(&db).await.unwrap();

        assert_eq!(db.load_stats().await.unwrap(), StatsTotals { hits: 1, misses: 0, bytes_saved: 42 });
    }

    /// Holds the first write until released; later writes return at once.
    #[derive(Default)]
    struct GatedSink {
        stored: Mutex<StatsTotals>,
        calls: AtomicUsize,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl StatsSink for GatedSink {
        async fn add(&self, delta: StatsTotals) -> Result<StatsTotals, Error> {
            let totals = {
                let mut stored = self.stored.lock();
                stored.merge(delta);
                *stored
            };
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.release.notified().await;
            }
            Ok(totals)
        }
    }

    #[tokio::test]
    async fn test_overlapping_flushes_never_move_totals_back() {
        let sink = GatedSink::default();
        let ledger = StatsLedger::default();
        ledger.record_hit("example", 1);

        let (first, second, ()) = tokio::join!(
            ledger.flush(&sink),
            async {
                tokio::task::yield_now().await;
                ledger.record_hit("example", 1);
                ledger.flush(&sink).await
            },
            async {
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }
                sink.release.notify_one();
            },
        );

        assert_eq!(first.unwrap().hits, 1);
        assert_eq!(second.unwrap().hits, 2);
        assert_eq!(ledger.totals(), StatsTotals { hits: 2, misses: 0, bytes_saved: 2 });
        assert!(ledger.pending().is_zero());
    }

    #[test]
    fn test_end_session_keeps_totals() {
        let ledger = StatsLedger::default();
        ledger.record_hit("example", 10);
        ledger.end_session();

        assert_eq!(ledger.origin("example"), OriginCounters::default());
        assert_eq!(ledger.pending().hits, 1);
    }
}
