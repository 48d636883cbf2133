use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle settings for scoped resource handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Run a background sweep that force-releases stale handles.
    pub auto_cleanup_enabled: bool,
    pub cleanup_interval_secs: u64,
    /// Handles older than this are considered leaked.
    pub max_resource_age_secs: u64,
    /// Memory fraction above which sweeps use a halved age limit.
    pub memory_cleanup_threshold: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            auto_cleanup_enabled: true,
            cleanup_interval_secs: 30,
            max_resource_age_secs: 300,
            memory_cleanup_threshold: 0.8,
        }
    }
}

impl ResourceConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn max_resource_age(&self) -> Duration {
        Duration::from_secs(self.max_resource_age_secs)
    }
}
