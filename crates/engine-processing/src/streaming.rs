use engine_config::settings::streaming::StreamingConfig;
use futures::{StreamExt, stream};
use model::records::work_item::WorkItem;
use serde::Serialize;
use std::{
    future::Future,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};
use tracing::{debug, info};

/// Size assumed for items that carry no estimate.
pub const DEFAULT_ITEM_BYTES: u64 = 8 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamingStats {
    pub chunks_processed: u64,
    pub items_processed: u64,
    pub peak_concurrent_chunks: usize,
}

/// Chunked execution for work sets too large to hold in flight at once.
#[derive(Debug)]
pub struct StreamingProcessor {
    config: StreamingConfig,
    chunks_processed: AtomicU64,
    items_processed: AtomicU64,
    peak_concurrent_chunks: AtomicUsize,
}

impl StreamingProcessor {
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            config,
            chunks_processed: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            peak_concurrent_chunks: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    fn item_bytes(item: &WorkItem) -> u64 {
        if item.estimated_size == 0 {
            DEFAULT_ITEM_BYTES
        } else {
            item.estimated_size
        }
    }

    pub fn should_stream(&self, items: &[WorkItem]) -> bool {
        if items.len() > self.config.stream_threshold {
            return true;
        }
        let bytes: u64 = items.iter().map(Self::item_bytes).sum();
        bytes > self.config.byte_threshold()
    }

    /// Fixed-size chunks in input order. Only the last chunk may be short.
    pub fn create_chunks(&self, items: Vec<WorkItem>) -> Vec<Vec<WorkItem>> {
        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
        let mut iter = items.into_iter().peekable();
        while iter.peek().is_some() {
            chunks.push(iter.by_ref().take(size).collect());
        }
        chunks
    }

    /// Estimated memory for holding the items' content, in MB.
    pub fn estimate_memory_usage(&self, items: &[WorkItem]) -> f64 {
        items.iter().map(Self::item_bytes).sum::<u64>() as f64 / (1024.0 * 1024.0)
    }

    /// Runs chunks with at most `max_concurrent_chunks` in flight.
    ///
    /// Each chunk's output is handed to `sink` as soon as it completes, so
    /// finished chunks never accumulate inside the processor.
    pub async fn process<F, Fut, T, S>(&self, items: Vec<WorkItem>, mut run_chunk: F, mut sink: S)
    where
        F: FnMut(usize, Vec<WorkItem>) -> Fut,
        Fut: Future<Output = T>,
        S: FnMut(T),
    {
        let chunks = self.create_chunks(items);
        let total_chunks = chunks.len();
        let limit = self.config.max_concurrent_chunks.max(1);
        let in_flight = AtomicUsize::new(0);

        info!(
            chunks = total_chunks,
            chunk_size = self.config.chunk_size,
            max_concurrent_chunks = limit,
            "Streaming work in chunks"
        );

        let mut results = stream::iter(chunks.into_iter().enumerate())
            .map(|(index, chunk)| {
                let len = chunk.len();
                let fut = run_chunk(index, chunk);
                let in_flight = &in_flight;
                async move {
                    let now = in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                    self.peak_concurrent_chunks.fetch_max(now, Ordering::AcqRel);
                    let out = fut.await;
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                    (index, len, out)
                }
            })
            .buffer_unordered(limit);

        while let Some((index, len, out)) = results.next().await {
            sink(out);
            self.chunks_processed.fetch_add(1, Ordering::Relaxed);
            self.items_processed.fetch_add(len as u64, Ordering::Relaxed);
            debug!(chunk = index, items = len, "Chunk complete");
        }
    }

    pub fn stats(&self) -> StreamingStats {
        StreamingStats {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            peak_concurrent_chunks: self.peak_concurrent_chunks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::repository::Repository;
    use std::time::Duration;

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new(Repository::new("org", format!("repo{i}")), "go.mod"))
            .collect()
    }

    fn processor(chunk_size: usize, threshold: usize, concurrent: usize) -> StreamingProcessor {
        StreamingProcessor::new(StreamingConfig {
            chunk_size,
            stream_threshold: threshold,
            max_concurrent_chunks: concurrent,
            ..Default::default()
        })
    }

    #[test]
    fn streams_above_item_threshold() {
        let p = processor(5, 10, 2);
        assert!(p.should_stream(&items(15)));
        assert!(!p.should_stream(&items(10)));
    }

    #[test]
    fn streams_above_byte_threshold() {
        let p = StreamingProcessor::new(StreamingConfig {
            max_memory_per_chunk_mb: 1.0,
            max_concurrent_chunks: 2,
            ..Default::default()
        });
        let big: Vec<_> = items(3)
            .into_iter()
            .map(|i| i.with_estimated_size(1024 * 1024))
            .collect();
        assert!(p.should_stream(&big));
        assert!((p.estimate_memory_usage(&big) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn chunks_keep_order() {
        let p = processor(5, 10, 2);
        let chunks = p.create_chunks(items(15));
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![5, 5, 5]);
        assert_eq!(chunks[1][0].repo.name, "repo5");

        let uneven = p.create_chunks(items(7));
        assert_eq!(uneven.iter().map(Vec::len).collect::<Vec<_>>(), vec![5, 2]);
        assert!(p.create_chunks(Vec::new()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn caps_concurrent_chunks() {
        let p = processor(2, 1, 3);
        let mut seen = 0;

        p.process(
            items(20),
            |_, chunk| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                chunk.len()
            },
            |n| seen += n,
        )
        .await;

        let stats = p.stats();
        assert_eq!(seen, 20);
        assert_eq!(stats.chunks_processed, 10);
        assert_eq!(stats.items_processed, 20);
        assert_eq!(stats.peak_concurrent_chunks, 3);
    }
}
