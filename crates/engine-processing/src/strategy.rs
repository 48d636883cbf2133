use engine_config::settings::batch::BatchConfig;
use engine_core::{
    memory::{MemoryMonitor, PressureLevel},
    rate_limit::RateLimiter,
};
use model::{
    core::strategy::ExecutionStrategy,
    execution::opportunity::CrossTargetOpportunity,
    records::work_item::{WorkItem, prioritize},
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};
use tracing::{debug, info};

/// Concurrency and batch size for the next batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionBounds {
    pub concurrency: usize,
    pub batch_size: usize,
}

/// Deduplicated, ordered work for one run.
#[derive(Debug, Clone, Default)]
pub struct WorkPlan {
    /// Unique items in dispatch order.
    pub items: Vec<WorkItem>,
    /// Exact repeats of an item in `items`; they receive its outcome.
    pub duplicates: Vec<WorkItem>,
    pub opportunities: Vec<CrossTargetOpportunity>,
}

impl WorkPlan {
    pub fn requests_saved(&self) -> usize {
        self.duplicates.len()
    }
}

/// Adaptive runs are not worth it below the configured small-run threshold.
pub fn resolve_strategy(config: &BatchConfig, target_count: usize) -> ExecutionStrategy {
    let strategy = config.default_strategy();
    if strategy.is_adaptive() && target_count < config.small_run_threshold() {
        ExecutionStrategy::Parallel
    } else {
        strategy
    }
}

#[derive(Debug, Clone)]
pub struct StrategyManager {
    config: Arc<BatchConfig>,
}

impl StrategyManager {
    pub fn new(config: Arc<BatchConfig>) -> Self {
        Self { config }
    }

    /// An explicit override always wins over the configured strategy.
    pub fn resolve(
        &self,
        target_count: usize,
        strategy_override: Option<ExecutionStrategy>,
    ) -> ExecutionStrategy {
        let strategy =
            strategy_override.unwrap_or_else(|| resolve_strategy(&self.config, target_count));
        debug!(strategy = %strategy, target_count, "Resolved execution strategy");
        strategy
    }

    pub fn initial_bounds(&self, strategy: ExecutionStrategy) -> ExecutionBounds {
        let cap = self.config.max_concurrent_requests();
        let default = self.config.default_batch_size();

        match strategy {
            ExecutionStrategy::Sequential => ExecutionBounds {
                concurrency: 1,
                batch_size: default,
            },
            ExecutionStrategy::Parallel | ExecutionStrategy::Adaptive => ExecutionBounds {
                concurrency: cap,
                batch_size: default,
            },
            ExecutionStrategy::Conservative => ExecutionBounds {
                concurrency: (cap / 3).max(1),
                batch_size: self.config.clamp_batch_size(default / 2),
            },
        }
    }

    /// Bounds for the next batch given the latest memory and quota signals.
    pub fn next_bounds(
        &self,
        strategy: ExecutionStrategy,
        current: ExecutionBounds,
        memory: &MemoryMonitor,
        limiter: &RateLimiter,
    ) -> ExecutionBounds {
        let initial = self.initial_bounds(strategy);

        if !strategy.is_adaptive() {
            return ExecutionBounds {
                concurrency: initial.concurrency,
                batch_size: memory.adjusted_batch_size(initial.batch_size),
            };
        }

        let level = memory.pressure_level();
        let batch_size = if level == PressureLevel::Normal && limiter.current_delay().is_zero() {
            self.config
                .clamp_batch_size((current.batch_size * 3).div_ceil(2))
        } else {
            memory.adjusted_batch_size_for(level, current.batch_size)
        };

        let concurrency = if limiter.is_constrained() {
            (initial.concurrency / 2).max(1)
        } else {
            initial.concurrency
        };

        let next = ExecutionBounds {
            concurrency,
            batch_size,
        };
        if next != current {
            debug!(
                batch_size = next.batch_size,
                concurrency = next.concurrency,
                pressure = ?level,
                "Adjusted execution bounds"
            );
        }
        next
    }

    /// Groups targets that request the same common manifest paths.
    pub fn find_cross_target_opportunities(
        &self,
        items: &[WorkItem],
    ) -> Vec<CrossTargetOpportunity> {
        let common: HashSet<&str> = self
            .config
            .common_manifest_files()
            .iter()
            .map(String::as_str)
            .collect();

        let mut targets_by_path: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for item in items {
            let file_name = item.path.rsplit('/').next().unwrap_or(&item.path);
            if common.contains(file_name) {
                targets_by_path
                    .entry(item.path.as_str())
                    .or_default()
                    .insert(item.target_key());
            }
        }

        let mut paths_by_targets: BTreeMap<BTreeSet<&str>, Vec<&str>> = BTreeMap::new();
        for (path, targets) in targets_by_path {
            if targets.len() >= 2 {
                paths_by_targets.entry(targets).or_default().push(path);
            }
        }

        let min_savings = self.config.opportunity_min_savings();
        paths_by_targets
            .into_iter()
            .filter_map(|(targets, paths)| {
                let occurrences = targets.len() as f64;
                // Every path in a group is shared by the same targets.
                let estimated_savings = (occurrences - 1.0) / occurrences;
                (estimated_savings >= min_savings).then(|| CrossTargetOpportunity {
                    targets: targets.into_iter().map(str::to_string).collect(),
                    shared_paths: paths.into_iter().map(str::to_string).collect(),
                    estimated_savings,
                })
            })
            .collect()
    }

    /// Orders, deduplicates and analyses the submitted items.
    pub fn plan(&self, items: Vec<WorkItem>) -> WorkPlan {
        let items = if self.config.prioritization() {
            prioritize(items)
        } else {
            items
        };

        if !self.config.cross_target_batching() {
            return WorkPlan {
                items,
                ..Default::default()
            };
        }

        let opportunities = self.find_cross_target_opportunities(&items);
        let mut seen = HashSet::new();
        let (unique, duplicates): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| seen.insert(item.dedupe_key()));

        if !opportunities.is_empty() || !duplicates.is_empty() {
            info!(
                opportunities = opportunities.len(),
                duplicates = duplicates.len(),
                "Cross-target batching analysis"
            );
        }

        WorkPlan {
            items: unique,
            duplicates,
            opportunities,
        }
    }
}
