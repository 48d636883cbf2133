use crate::{error::ConfigError, settings::batch::BatchConfigBuilder};
use tracing::warn;

/// Checks a builder against every constraint before it is frozen.
pub struct ConfigValidator<'a> {
    builder: &'a BatchConfigBuilder,
    errors: Vec<String>,
}

impl<'a> ConfigValidator<'a> {
    pub fn new(builder: &'a BatchConfigBuilder) -> Self {
        Self {
            builder,
            errors: Vec::new(),
        }
    }

    pub fn validate(mut self) -> Result<(), ConfigError> {
        self.validate_concurrency();
        self.validate_batch_sizes();
        self.validate_memory();
        self.validate_rate_limit();
        self.validate_retry();
        self.validate_streaming();
        self.validate_resources();
        self.validate_opportunities();

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed(self.errors))
        }
    }

    fn validate_concurrency(&mut self) {
        let b = self.builder;
        self.at_least_one("max_concurrent_requests", b.max_concurrent_requests);
        self.at_least_one("max_concurrent_per_target", b.max_concurrent_per_target);

        if b.max_concurrent_per_target > b.max_concurrent_requests && b.max_concurrent_requests > 0
        {
            warn!(
                per_target = b.max_concurrent_per_target,
                global = b.max_concurrent_requests,
                "Per-target concurrency exceeds the global cap and will never be reached"
            );
        }
    }

    fn validate_batch_sizes(&mut self) {
        let b = self.builder;
        self.at_least_one("min_batch_size", b.min_batch_size);

        if b.min_batch_size > b.default_batch_size || b.default_batch_size > b.max_batch_size {
            self.errors.push(format!(
                "min_batch_size ({}) <= default_batch_size ({}) <= max_batch_size ({}) does not hold",
                b.min_batch_size, b.default_batch_size, b.max_batch_size
            ));
        }
    }

    fn validate_memory(&mut self) {
        let b = self.builder;
        self.unit_interval("memory_warning_threshold", b.memory_warning_threshold);
        self.unit_interval("memory_critical_threshold", b.memory_critical_threshold);

        if b.memory_warning_threshold >= b.memory_critical_threshold {
            self.errors.push(format!(
                "memory_warning_threshold ({}) must be below memory_critical_threshold ({})",
                b.memory_warning_threshold, b.memory_critical_threshold
            ));
        }

        self.at_least_one("memory_window", b.memory_window);
        if b.memory_poll_interval_ms == 0 {
            self.errors
                .push("memory_poll_interval_ms must be greater than zero".to_string());
        }
        if b.max_memory_usage_mb == 0 {
            self.errors
                .push("max_memory_usage_mb must be greater than zero".to_string());
        }
    }

    fn validate_rate_limit(&mut self) {
        let buffer = self.builder.rate_limit_buffer;
        self.unit_interval("rate_limit_buffer", buffer);
    }

    fn validate_retry(&mut self) {
        let b = self.builder;
        if b.retry_delay_base_ms > b.retry_delay_max_ms {
            self.errors.push(format!(
                "retry_delay_base_ms ({}) exceeds retry_delay_max_ms ({})",
                b.retry_delay_base_ms, b.retry_delay_max_ms
            ));
        }
        if b.retry_attempts > 10 {
            warn!(
                attempts = b.retry_attempts,
                "Large retry budget; failed targets will hold slots for a long time"
            );
        }
    }

    fn validate_streaming(&mut self) {
        let b = self.builder;
        let s = &b.streaming;
        self.at_least_one("streaming.chunk_size", s.chunk_size);
        self.at_least_one("streaming.max_concurrent_chunks", s.max_concurrent_chunks);
        self.at_least_one("streaming.stream_threshold", s.stream_threshold);
        if !s.max_memory_per_chunk_mb.is_finite() || s.max_memory_per_chunk_mb <= 0.0 {
            self.errors.push(format!(
                "streaming.max_memory_per_chunk_mb must be positive, got {}",
                s.max_memory_per_chunk_mb
            ));
        }
    }

    fn validate_resources(&mut self) {
        let b = self.builder;
        let r = &b.resources;
        self.unit_interval("resources.memory_cleanup_threshold", r.memory_cleanup_threshold);
        if r.auto_cleanup_enabled && r.cleanup_interval_secs == 0 {
            self.errors.push(
                "resources.cleanup_interval_secs must be greater than zero when auto cleanup is enabled"
                    .to_string(),
            );
        }
    }

    fn validate_opportunities(&mut self) {
        let b = self.builder;
        let v = b.opportunity_min_savings;
        if !v.is_finite() || !(0.0..1.0).contains(&v) {
            self.errors.push(format!(
                "opportunity_min_savings must be in [0, 1), got {v}"
            ));
        }
        if b.enable_cross_target_batching && b.common_manifest_files.is_empty() {
            warn!("Cross-target batching is enabled but no common manifest files are configured");
        }
    }

    fn at_least_one(&mut self, field: &str, value: usize) {
        if value == 0 {
            self.errors
                .push(format!("{field} must be at least 1, got 0"));
        }
    }

    /// Accepts values in `(0, 1]`.
    fn unit_interval(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            self.errors
                .push(format!("{field} must be in (0, 1], got {value}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::streaming::StreamingConfig;

    #[test]
    fn zero_buffer_is_rejected() {
        let builder = BatchConfigBuilder::default().rate_limit(0.0, 0);
        let err = ConfigValidator::new(&builder).validate().unwrap_err();
        assert!(err.issues()[0].contains("rate_limit_buffer"));
    }

    #[test]
    fn full_buffer_is_accepted() {
        let builder = BatchConfigBuilder::default().rate_limit(1.0, 0);
        assert!(ConfigValidator::new(&builder).validate().is_ok());
    }

    #[test]
    fn nan_thresholds_are_rejected() {
        let builder = BatchConfigBuilder::default().memory_thresholds(f64::NAN, 0.9);
        let err = ConfigValidator::new(&builder).validate().unwrap_err();
        assert!(
            err.issues()
                .iter()
                .any(|i| i.contains("memory_warning_threshold"))
        );
    }

    #[test]
    fn streaming_counts_must_be_positive() {
        let builder = BatchConfigBuilder::default().streaming(StreamingConfig {
            chunk_size: 0,
            max_concurrent_chunks: 0,
            ..Default::default()
        });
        let err = ConfigValidator::new(&builder).validate().unwrap_err();
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn retry_base_above_cap_is_rejected() {
        let builder = BatchConfigBuilder::default().retry(3, 5000, 1000);
        assert!(ConfigValidator::new(&builder).validate().is_err());
    }
}
