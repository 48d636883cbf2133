use serde::{Deserialize, Serialize};

/// Point-in-time view of a coordinator's cumulative counters.
///
/// Only raw counters are stored; ratios are derived on every call so they
/// can never go stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub retries: u64,
    pub batches: u64,
    /// Sum of the sizes of every dispatched batch.
    pub batch_items: u64,
    /// Sum of per-item elapsed time, i.e. what a sequential run would have cost.
    pub item_time_ms: u64,
    /// Wall-clock time spent inside runs.
    pub wall_time_ms: u64,
    pub bytes_fetched: u64,
    pub requests_saved: u64,
}

impl RunMetrics {
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_requests, self.total_requests)
    }

    pub fn average_batch_size(&self) -> f64 {
        ratio(self.batch_items, self.batches)
    }

    /// Ideal sequential time divided by actual elapsed time.
    pub fn parallel_efficiency(&self) -> f64 {
        ratio(self.item_time_ms, self.wall_time_ms)
    }

    pub fn is_consistent(&self) -> bool {
        self.successful_requests + self.failed_requests == self.total_requests
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
