use crate::{
    error::ConfigError,
    settings::{resource::ResourceConfig, streaming::StreamingConfig, validator::ConfigValidator},
};
use model::core::strategy::ExecutionStrategy;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::debug;

/// Lock and manifest file names most repositories share.
pub const DEFAULT_COMMON_MANIFEST_FILES: [&str; 12] = [
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "requirements.txt",
    "Pipfile.lock",
    "poetry.lock",
    "Gemfile.lock",
    "composer.lock",
    "go.mod",
    "go.sum",
    "Cargo.lock",
];

/// Immutable, validated configuration for the batch engine.
///
/// Only obtainable through [`BatchConfigBuilder::build`] (or `Default`),
/// so every instance in circulation satisfies the validation rules.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    max_concurrent_requests: usize,
    max_concurrent_per_target: usize,
    default_batch_size: usize,
    min_batch_size: usize,
    max_batch_size: usize,
    max_memory_usage_mb: u64,
    memory_warning_threshold: f64,
    memory_critical_threshold: f64,
    memory_poll_interval: Duration,
    memory_window: usize,
    rate_limit_buffer: f64,
    rate_limit_safety_margin: u32,
    retry_attempts: u32,
    retry_delay_base: Duration,
    retry_delay_max: Duration,
    default_strategy: ExecutionStrategy,
    small_run_threshold: usize,
    enable_cross_target_batching: bool,
    enable_prioritization: bool,
    enable_performance_tracking: bool,
    exclude_archived: bool,
    common_manifest_files: Vec<String>,
    opportunity_min_savings: f64,
    streaming: StreamingConfig,
    resources: ResourceConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig::from_valid_builder(BatchConfigBuilder::default())
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Parses a JSON document of overrides on top of the defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let builder: BatchConfigBuilder = serde_json::from_str(json)?;
        builder.build()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&source)
    }

    /// Returns a builder pre-filled with this configuration, for derived variants.
    pub fn to_builder(&self) -> BatchConfigBuilder {
        BatchConfigBuilder {
            max_concurrent_requests: self.max_concurrent_requests,
            max_concurrent_per_target: self.max_concurrent_per_target,
            default_batch_size: self.default_batch_size,
            min_batch_size: self.min_batch_size,
            max_batch_size: self.max_batch_size,
            max_memory_usage_mb: self.max_memory_usage_mb,
            memory_warning_threshold: self.memory_warning_threshold,
            memory_critical_threshold: self.memory_critical_threshold,
            memory_poll_interval_ms: self.memory_poll_interval.as_millis() as u64,
            memory_window: self.memory_window,
            rate_limit_buffer: self.rate_limit_buffer,
            rate_limit_safety_margin: self.rate_limit_safety_margin,
            retry_attempts: self.retry_attempts,
            retry_delay_base_ms: self.retry_delay_base.as_millis() as u64,
            retry_delay_max_ms: self.retry_delay_max.as_millis() as u64,
            default_strategy: self.default_strategy,
            small_run_threshold: self.small_run_threshold,
            enable_cross_target_batching: self.enable_cross_target_batching,
            enable_prioritization: self.enable_prioritization,
            enable_performance_tracking: self.enable_performance_tracking,
            exclude_archived: self.exclude_archived,
            common_manifest_files: self.common_manifest_files.clone(),
            opportunity_min_savings: self.opportunity_min_savings,
            streaming: self.streaming.clone(),
            resources: self.resources.clone(),
        }
    }

    fn from_valid_builder(b: BatchConfigBuilder) -> Self {
        Self {
            max_concurrent_requests: b.max_concurrent_requests,
            max_concurrent_per_target: b.max_concurrent_per_target,
            default_batch_size: b.default_batch_size,
            min_batch_size: b.min_batch_size,
            max_batch_size: b.max_batch_size,
            max_memory_usage_mb: b.max_memory_usage_mb,
            memory_warning_threshold: b.memory_warning_threshold,
            memory_critical_threshold: b.memory_critical_threshold,
            memory_poll_interval: Duration::from_millis(b.memory_poll_interval_ms),
            memory_window: b.memory_window,
            rate_limit_buffer: b.rate_limit_buffer,
            rate_limit_safety_margin: b.rate_limit_safety_margin,
            retry_attempts: b.retry_attempts,
            retry_delay_base: Duration::from_millis(b.retry_delay_base_ms),
            retry_delay_max: Duration::from_millis(b.retry_delay_max_ms),
            default_strategy: b.default_strategy,
            small_run_threshold: b.small_run_threshold,
            enable_cross_target_batching: b.enable_cross_target_batching,
            enable_prioritization: b.enable_prioritization,
            enable_performance_tracking: b.enable_performance_tracking,
            exclude_archived: b.exclude_archived,
            common_manifest_files: b.common_manifest_files,
            opportunity_min_savings: b.opportunity_min_savings,
            streaming: b.streaming,
            resources: b.resources,
        }
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    pub fn max_concurrent_per_target(&self) -> usize {
        self.max_concurrent_per_target
    }

    pub fn default_batch_size(&self) -> usize {
        self.default_batch_size
    }

    pub fn min_batch_size(&self) -> usize {
        self.min_batch_size
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Clamps a proposed batch size into `[min_batch_size, max_batch_size]`.
    pub fn clamp_batch_size(&self, size: usize) -> usize {
        size.clamp(self.min_batch_size, self.max_batch_size)
    }

    pub fn max_memory_usage_mb(&self) -> u64 {
        self.max_memory_usage_mb
    }

    pub fn memory_warning_threshold(&self) -> f64 {
        self.memory_warning_threshold
    }

    pub fn memory_critical_threshold(&self) -> f64 {
        self.memory_critical_threshold
    }

    pub fn memory_poll_interval(&self) -> Duration {
        self.memory_poll_interval
    }

    pub fn memory_window(&self) -> usize {
        self.memory_window
    }

    pub fn rate_limit_buffer(&self) -> f64 {
        self.rate_limit_buffer
    }

    pub fn rate_limit_safety_margin(&self) -> u32 {
        self.rate_limit_safety_margin
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn retry_delay_base(&self) -> Duration {
        self.retry_delay_base
    }

    pub fn retry_delay_max(&self) -> Duration {
        self.retry_delay_max
    }

    pub fn default_strategy(&self) -> ExecutionStrategy {
        self.default_strategy
    }

    pub fn small_run_threshold(&self) -> usize {
        self.small_run_threshold
    }

    pub fn cross_target_batching(&self) -> bool {
        self.enable_cross_target_batching
    }

    pub fn prioritization(&self) -> bool {
        self.enable_prioritization
    }

    pub fn performance_tracking(&self) -> bool {
        self.enable_performance_tracking
    }

    pub fn exclude_archived(&self) -> bool {
        self.exclude_archived
    }

    pub fn common_manifest_files(&self) -> &[String] {
        &self.common_manifest_files
    }

    pub fn opportunity_min_savings(&self) -> f64 {
        self.opportunity_min_savings
    }

    pub fn streaming(&self) -> &StreamingConfig {
        &self.streaming
    }

    pub fn resources(&self) -> &ResourceConfig {
        &self.resources
    }
}

/// Mutable set of overrides that validates into a [`BatchConfig`].
///
/// Every field has a default, so JSON documents only need the keys they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfigBuilder {
    pub max_concurrent_requests: usize,
    pub max_concurrent_per_target: usize,
    pub default_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub max_memory_usage_mb: u64,
    pub memory_warning_threshold: f64,
    pub memory_critical_threshold: f64,
    pub memory_poll_interval_ms: u64,
    pub memory_window: usize,
    pub rate_limit_buffer: f64,
    pub rate_limit_safety_margin: u32,
    pub retry_attempts: u32,
    pub retry_delay_base_ms: u64,
    pub retry_delay_max_ms: u64,
    pub default_strategy: ExecutionStrategy,
    pub small_run_threshold: usize,
    pub enable_cross_target_batching: bool,
    pub enable_prioritization: bool,
    pub enable_performance_tracking: bool,
    pub exclude_archived: bool,
    pub common_manifest_files: Vec<String>,
    pub opportunity_min_savings: f64,
    pub streaming: StreamingConfig,
    pub resources: ResourceConfig,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            max_concurrent_per_target: 3,
            default_batch_size: 10,
            min_batch_size: 1,
            max_batch_size: 50,
            max_memory_usage_mb: 500,
            memory_warning_threshold: 0.8,
            memory_critical_threshold: 0.9,
            memory_poll_interval_ms: 1000,
            memory_window: 20,
            rate_limit_buffer: 0.8,
            rate_limit_safety_margin: 50,
            retry_attempts: 3,
            retry_delay_base_ms: 1000,
            retry_delay_max_ms: 30_000,
            default_strategy: ExecutionStrategy::Adaptive,
            small_run_threshold: 5,
            enable_cross_target_batching: true,
            enable_prioritization: true,
            enable_performance_tracking: true,
            exclude_archived: true,
            common_manifest_files: DEFAULT_COMMON_MANIFEST_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            opportunity_min_savings: 0.05,
            streaming: StreamingConfig::default(),
            resources: ResourceConfig::default(),
        }
    }
}

impl BatchConfigBuilder {
    /// Tuned for large organisations where the quota is the scarce resource.
    pub fn conservative() -> Self {
        Self {
            max_concurrent_requests: 3,
            max_concurrent_per_target: 1,
            default_batch_size: 5,
            rate_limit_buffer: 0.5,
            retry_delay_base_ms: 3000,
            rate_limit_safety_margin: 200,
            default_strategy: ExecutionStrategy::Conservative,
            ..Default::default()
        }
    }

    pub fn balanced() -> Self {
        Self {
            max_concurrent_requests: 5,
            max_concurrent_per_target: 2,
            default_batch_size: 10,
            rate_limit_buffer: 0.6,
            retry_delay_base_ms: 2000,
            rate_limit_safety_margin: 100,
            ..Default::default()
        }
    }

    /// For small scans where finishing fast matters more than headroom.
    pub fn aggressive() -> Self {
        Self {
            max_concurrent_requests: 8,
            max_concurrent_per_target: 3,
            default_batch_size: 15,
            rate_limit_buffer: 0.8,
            retry_delay_base_ms: 1000,
            rate_limit_safety_margin: 50,
            default_strategy: ExecutionStrategy::Parallel,
            ..Default::default()
        }
    }

    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    pub fn max_concurrent_per_target(mut self, n: usize) -> Self {
        self.max_concurrent_per_target = n;
        self
    }

    pub fn batch_sizes(mut self, min: usize, default: usize, max: usize) -> Self {
        self.min_batch_size = min;
        self.default_batch_size = default;
        self.max_batch_size = max;
        self
    }

    pub fn memory_thresholds(mut self, warning: f64, critical: f64) -> Self {
        self.memory_warning_threshold = warning;
        self.memory_critical_threshold = critical;
        self
    }

    pub fn memory_poll_interval_ms(mut self, ms: u64) -> Self {
        self.memory_poll_interval_ms = ms;
        self
    }

    pub fn rate_limit(mut self, buffer: f64, safety_margin: u32) -> Self {
        self.rate_limit_buffer = buffer;
        self.rate_limit_safety_margin = safety_margin;
        self
    }

    pub fn retry(mut self, attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_base_ms = base_ms;
        self.retry_delay_max_ms = max_ms;
        self
    }

    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn small_run_threshold(mut self, n: usize) -> Self {
        self.small_run_threshold = n;
        self
    }

    pub fn cross_target_batching(mut self, enabled: bool) -> Self {
        self.enable_cross_target_batching = enabled;
        self
    }

    pub fn prioritization(mut self, enabled: bool) -> Self {
        self.enable_prioritization = enabled;
        self
    }

    pub fn performance_tracking(mut self, enabled: bool) -> Self {
        self.enable_performance_tracking = enabled;
        self
    }

    pub fn exclude_archived(mut self, exclude: bool) -> Self {
        self.exclude_archived = exclude;
        self
    }

    pub fn common_manifest_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.common_manifest_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn opportunity_min_savings(mut self, fraction: f64) -> Self {
        self.opportunity_min_savings = fraction;
        self
    }

    pub fn memory_window(mut self, samples: usize) -> Self {
        self.memory_window = samples;
        self
    }

    pub fn streaming(mut self, streaming: StreamingConfig) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn resources(mut self, resources: ResourceConfig) -> Self {
        self.resources = resources;
        self
    }

    /// Validates every field and freezes the result.
    pub fn build(self) -> Result<BatchConfig, ConfigError> {
        ConfigValidator::new(&self).validate()?;
        debug!(
            strategy = %self.default_strategy,
            concurrency = self.max_concurrent_requests,
            batch = self.default_batch_size,
            "Batch configuration validated"
        );
        Ok(BatchConfig::from_valid_builder(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = BatchConfigBuilder::default().build().unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.default_strategy(), ExecutionStrategy::Adaptive);
        assert_eq!(config.retry_delay_base(), Duration::from_secs(1));
        assert_eq!(config.common_manifest_files().len(), 12);
    }

    #[test]
    fn presets_are_valid() {
        for builder in [
            BatchConfigBuilder::conservative(),
            BatchConfigBuilder::balanced(),
            BatchConfigBuilder::aggressive(),
        ] {
            builder.build().unwrap();
        }
    }

    #[test]
    fn json_overrides_only_named_fields() {
        let config = BatchConfig::from_json_str(
            r#"{ "max_concurrent_requests": 4, "default_strategy": "conservative",
                 "streaming": { "chunk_size": 5 } }"#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_requests(), 4);
        assert_eq!(config.default_strategy(), ExecutionStrategy::Conservative);
        assert_eq!(config.streaming().chunk_size, 5);
        assert_eq!(config.streaming().stream_threshold, 100);
        assert_eq!(config.default_batch_size(), 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = BatchConfig::from_json_str(r#"{ "max_concurency": 4 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn inverted_batch_bounds_fail_fast() {
        let err = BatchConfig::builder()
            .batch_sizes(20, 10, 50)
            .build()
            .unwrap_err();
        assert!(err.issues().iter().any(|i| i.contains("min_batch_size")));
    }

    #[test]
    fn collects_every_violation() {
        let err = BatchConfig::builder()
            .max_concurrent_requests(0)
            .rate_limit(1.5, 10)
            .memory_thresholds(0.95, 0.9)
            .build()
            .unwrap_err();

        assert_eq!(err.issues().len(), 3, "{err}");
    }

    #[test]
    fn to_builder_round_trips() {
        let config = BatchConfigBuilder::balanced().build().unwrap();
        assert_eq!(config.to_builder().build().unwrap(), config);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "retry_attempts": 6 }}"#).unwrap();

        let config = BatchConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.retry_attempts(), 6);

        let missing = BatchConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn clamps_batch_size() {
        let config = BatchConfig::builder().batch_sizes(2, 4, 8).build().unwrap();
        assert_eq!(config.clamp_batch_size(0), 2);
        assert_eq!(config.clamp_batch_size(5), 5);
        assert_eq!(config.clamp_batch_size(100), 8);
    }
}
