use crate::{
    coordinator::{batch::RunContext, results::RunResults},
    error::RunError,
    strategy::StrategyManager,
    streaming::{StreamingProcessor, StreamingStats},
};
use chrono::Utc;
use engine_config::settings::batch::BatchConfig;
use engine_core::{
    cache::{Cache, CacheKeyFn, default_cache_key},
    memory::{MemoryMonitor, MemoryProbe},
    metrics::Metrics,
    rate_limit::RateLimiter,
    resource::ResourceManager,
    retry::RetryPolicy,
    transport::Transport,
};
use engine_monitoring::{
    analyzer::{PerformanceAnalysis, PerformanceAnalyzer},
    collector::MetricsCollector,
    progress::{ProgressCallback, ProgressMonitor},
};
use model::{
    core::{repository::Repository, strategy::ExecutionStrategy},
    events::run::RunEvent,
    execution::metrics::RunMetrics,
    records::{outcome::FileContent, work_item::WorkItem},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, atomic::Ordering},
};
use tokio::{
    sync::{Semaphore, mpsc},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod batch;
mod item;
pub mod results;


/// Priority given to paths the caller marks as important in [`BatchCoordinator::process_files`].
pub const PRIORITY_PATH_BOOST: i32 = 10;

/// Top-level orchestrator for fetching manifests from many targets.
///
/// Metrics and resource counters live as long as the coordinator and span
/// every run made through it.
pub struct BatchCoordinator {
    config: Arc<BatchConfig>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn Cache>>,
    cache_key: CacheKeyFn,
    retry: RetryPolicy,
    strategy: StrategyManager,
    streaming: StreamingProcessor,
    limiter: Arc<RateLimiter>,
    memory: Arc<MemoryMonitor>,
    resources: ResourceManager,
    collector: Arc<MetricsCollector>,
    progress: Arc<ProgressMonitor>,
    analyzer: PerformanceAnalyzer,
    metrics: Metrics,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl BatchCoordinator {
    pub fn new(config: BatchConfig, transport: Arc<dyn Transport>) -> Self {
        let memory = Arc::new(MemoryMonitor::from_system(&config));
        let config = Arc::new(config);

        Self {
            transport,
            cache: None,
            cache_key: default_cache_key(),
            retry: RetryPolicy::from_config(&config),
            strategy: StrategyManager::new(config.clone()),
            streaming: StreamingProcessor::new(config.streaming().clone()),
            limiter: Arc::new(RateLimiter::from_config(&config)),
            memory,
            resources: ResourceManager::new(config.resources().clone()),
            collector: Arc::new(MetricsCollector::default()),
            progress: Arc::new(ProgressMonitor::new()),
            analyzer: PerformanceAnalyzer::new(),
            metrics: Metrics::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests())),
            cancel: CancellationToken::new(),
            events: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Overrides how cache keys are derived from work items.
    pub fn with_cache_key(mut self, key: CacheKeyFn) -> Self {
        self.cache_key = key;
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory = Arc::new(MemoryMonitor::new(&self.config, probe));
        self
    }

    /// Publishes run events on `tx`. Events are dropped rather than awaited when the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Arc::new(ProgressMonitor::new().with_callback(callback));
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn get_metrics(&self) -> RunMetrics {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
        self.collector.reset();
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn progress(&self) -> &ProgressMonitor {
        &self.progress
    }

    pub fn analyzer(&self) -> &PerformanceAnalyzer {
        &self.analyzer
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn streaming_stats(&self) -> StreamingStats {
        self.streaming.stats()
    }

    pub fn analyze_performance(&self) -> PerformanceAnalysis {
        self.analyzer
            .analyze_performance(&self.collector, Some(&self.progress))
    }

    /// Fetches every item and groups the final outcomes by target.
    ///
    /// Per-item failures are recorded in the results. An error is returned only
    /// when nothing at all could be processed.
    pub async fn process_targets(
        &self,
        items: Vec<WorkItem>,
        strategy_override: Option<ExecutionStrategy>,
    ) -> Result<RunResults, RunError> {
        if self.resources.is_shut_down() {
            return Err(RunError::ResourcesShutDown);
        }

        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let submitted = items.len();
        let strategy = self.strategy.resolve(submitted, strategy_override);
        let plan = self.strategy.plan(items);

        let mut results = RunResults::new(&run_id, strategy);
        results.opportunities = plan.opportunities;
        if submitted == 0 {
            return Ok(results);
        }

        self.metrics.add_requests_saved(plan.duplicates.len() as u64);
        self.resources.start_auto_cleanup();
        self.memory.sample();
        self.progress.start_monitoring(plan.items.len(), &run_id);

        info!(
            run_id = %run_id,
            items = plan.items.len(),
            duplicates = plan.duplicates.len(),
            strategy = %strategy,
            "Starting run"
        );
        self.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            total_items: plan.items.len(),
            strategy,
            timestamp: Utc::now(),
        });

        let streamed = self.streaming.should_stream(&plan.items);
        let ctx = RunContext::new(
            &run_id,
            strategy,
            self.config.max_concurrent_per_target(),
            streamed.then(|| self.strategy.initial_bounds(strategy).concurrency),
        );
        let mut outcomes = Vec::with_capacity(submitted);
        let dispatched = if streamed {
            self.run_streaming(&ctx, plan.items, &mut outcomes).await
        } else {
            self.run_batched(&ctx, plan.items, &mut outcomes).await
        };

        let elapsed = started.elapsed();
        self.metrics.add_wall_time(elapsed);
        let summary = self.progress.finish_monitoring();
        dispatched?;

        let by_key: HashMap<(String, String), usize> = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| (o.item.dedupe_key(), i))
            .collect();
        let mut fanned_out = Vec::new();
        for duplicate in plan.duplicates {
            if let Some(&i) = by_key.get(&duplicate.dedupe_key()) {
                let mut copy = outcomes[i].clone();
                copy.item = duplicate;
                fanned_out.push(copy);
            }
        }

        let completed = outcomes.len();
        for outcome in outcomes.into_iter().chain(fanned_out) {
            results.insert(outcome);
        }
        results.cancelled = ctx.cancelled.load(Ordering::Acquire);
        results.duration = elapsed;

        let succeeded = results.successful().count();
        let failed = results.failed().count();

        if results.cancelled {
            warn!(run_id = %run_id, completed, "Run cancelled between batches");
            self.emit(RunEvent::RunCancelled {
                run_id: run_id.clone(),
                completed_items: completed,
                timestamp: Utc::now(),
            });
        } else {
            info!(
                run_id = %run_id,
                succeeded,
                failed,
                duration_ms = elapsed.as_millis() as u64,
                throughput = summary.map(|s| s.throughput).unwrap_or_default(),
                "Run complete"
            );
            self.emit(RunEvent::RunCompleted {
                run_id: run_id.clone(),
                succeeded,
                failed,
                duration_ms: elapsed.as_millis() as u64,
                timestamp: Utc::now(),
            });
        }

        if !results.cancelled && succeeded == 0 && !results.failed().any(|o| o.is_terminal_failure())
        {
            let last_error = results
                .failed()
                .filter_map(|o| o.error.as_ref())
                .last()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "no outcome recorded".to_string());
            return Err(RunError::NoTargetsProcessed {
                attempted: submitted,
                last_error,
            });
        }

        Ok(results)
    }

    /// Fetches several files from one repository. Paths listed in
    /// `priority_paths` are dispatched first. Missing files are simply absent
    /// from the returned map.
    pub async fn process_files(
        &self,
        repo: &Repository,
        paths: &[String],
        priority_paths: &[String],
    ) -> Result<HashMap<String, FileContent>, RunError> {
        let boosted: HashSet<&str> = priority_paths.iter().map(String::as_str).collect();
        let items = paths
            .iter()
            .map(|path| {
                let item = WorkItem::new(repo.clone(), path.clone());
                if boosted.contains(path.as_str()) {
                    item.with_priority(PRIORITY_PATH_BOOST)
                } else {
                    item
                }
            })
            .collect();

        let results = self.process_targets(items, None).await?;
        let files = results
            .successful()
            .filter_map(|o| o.content.clone().map(|c| (o.item.path.clone(), c)))
            .collect::<HashMap<_, _>>();

        debug!(repo = %repo, requested = paths.len(), fetched = files.len(), "Processed files");
        Ok(files)
    }

    /// Releases every tracked resource. Safe to call more than once.
    pub fn cleanup(&self) {
        let cleaned = self.resources.cleanup();
        let stats = self.resources.stats();
        debug!(cleaned, active = stats.active, "Coordinator cleanup");
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events
            && let Err(err) = tx.try_send(event)
        {
            debug!(error = %err, "Dropped run event");
        }
    }
}
