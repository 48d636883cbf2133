use model::execution::metrics::RunMetrics;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Default)]
struct InnerMetrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    retries: AtomicU64,
    batches: AtomicU64,
    batch_items: AtomicU64,
    item_time_ms: AtomicU64,
    wall_time_ms: AtomicU64,
    bytes_fetched: AtomicU64,
    requests_saved: AtomicU64,
}

/// Cumulative request counters shared by every task of a coordinator.
///
/// Survives across runs until [`Metrics::reset`] is called.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    /// Records one attempt. Success and failure are mutually exclusive so the
    /// per-attempt totals always add up.
    pub fn record_attempt(&self, success: bool, cache_hit: bool, bytes: u64, elapsed: Duration) {
        let inner = &self.inner;
        inner.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            inner.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            inner.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        if cache_hit {
            inner.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        inner.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
        inner
            .item_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self, count: u64) {
        self.inner.cache_misses.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_batch(&self, items: usize) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
        self.inner
            .batch_items
            .fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn add_wall_time(&self, elapsed: Duration) {
        self.inner
            .wall_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn add_requests_saved(&self, count: u64) {
        self.inner
            .requests_saved
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunMetrics {
        let inner = &self.inner;
        RunMetrics {
            total_requests: inner.total_requests.load(Ordering::Relaxed),
            successful_requests: inner.successful_requests.load(Ordering::Relaxed),
            failed_requests: inner.failed_requests.load(Ordering::Relaxed),
            cache_hits: inner.cache_hits.load(Ordering::Relaxed),
            cache_misses: inner.cache_misses.load(Ordering::Relaxed),
            retries: inner.retries.load(Ordering::Relaxed),
            batches: inner.batches.load(Ordering::Relaxed),
            batch_items: inner.batch_items.load(Ordering::Relaxed),
            item_time_ms: inner.item_time_ms.load(Ordering::Relaxed),
            wall_time_ms: inner.wall_time_ms.load(Ordering::Relaxed),
            bytes_fetched: inner.bytes_fetched.load(Ordering::Relaxed),
            requests_saved: inner.requests_saved.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.total_requests,
            &inner.successful_requests,
            &inner.failed_requests,
            &inner.cache_hits,
            &inner.cache_misses,
            &inner.retries,
            &inner.batches,
            &inner.batch_items,
            &inner.item_time_ms,
            &inner.wall_time_ms,
            &inner.bytes_fetched,
            &inner.requests_saved,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
