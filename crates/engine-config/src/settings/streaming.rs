use serde::{Deserialize, Serialize};

/// Chunked execution settings for batches too large to hold in memory at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Items per chunk.
    pub chunk_size: usize,
    /// Memory budget per in-flight chunk.
    pub max_memory_per_chunk_mb: f64,
    /// Item count above which streaming kicks in.
    pub stream_threshold: usize,
    /// Chunks allowed in flight at once.
    pub max_concurrent_chunks: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            max_memory_per_chunk_mb: 100.0,
            stream_threshold: 100,
            max_concurrent_chunks: 3,
        }
    }
}

impl StreamingConfig {
    /// Aggregate byte size above which streaming kicks in regardless of item count.
    pub fn byte_threshold(&self) -> u64 {
        (self.max_memory_per_chunk_mb * 1024.0 * 1024.0 * self.max_concurrent_chunks as f64) as u64
    }
}
