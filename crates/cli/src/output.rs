use crate::error::CliError;
use engine_config::settings::batch::BatchConfig;
use engine_core::{memory::MemoryReport, resource::ResourceStats};
use engine_monitoring::{
    analyzer::PerformanceAnalysis, collector::EfficiencyMetrics, progress::PerformanceAlert,
};
use engine_processing::{
    BatchCoordinator, RunResults,
    strategy::StrategyManager,
    streaming::{StreamingProcessor, StreamingStats},
};
use model::{
    core::strategy::ExecutionStrategy,
    execution::{metrics::RunMetrics, opportunity::CrossTargetOpportunity},
    records::{batch::partition, work_item::WorkItem},
};
use serde::Serialize;
use std::sync::Arc;

/// Dry-run view of how a targets file would be scheduled.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub strategy: ExecutionStrategy,
    pub submitted_items: usize,
    pub unique_items: usize,
    pub duplicates: usize,
    pub opportunities: Vec<CrossTargetOpportunity>,
    pub streaming: bool,
    pub estimated_memory_mb: f64,
    pub concurrency: usize,
    pub batches: Vec<BatchPreview>,
}

#[derive(Debug, Serialize)]
pub struct BatchPreview {
    pub sequence: usize,
    pub items: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub results: RunResults,
    pub metrics: RunMetrics,
    pub efficiency: EfficiencyMetrics,
    pub analysis: PerformanceAnalysis,
    pub alerts: Vec<PerformanceAlert>,
    pub memory: MemoryReport,
    pub streaming: StreamingStats,
    pub resources: ResourceStats,
}

/// Plans `items` exactly as a run would, without dispatching anything.
///
/// Adaptive runs resize between batches, so their preview shows the
/// starting size only.
pub fn build_plan_report(
    config: Arc<BatchConfig>,
    items: Vec<WorkItem>,
    strategy_override: Option<ExecutionStrategy>,
) -> PlanReport {
    let manager = StrategyManager::new(config.clone());
    let streaming = StreamingProcessor::new(config.streaming().clone());

    let submitted_items = items.len();
    let strategy = manager.resolve(submitted_items, strategy_override);
    let plan = manager.plan(items);
    let bounds = manager.initial_bounds(strategy);
    let is_streaming = streaming.should_stream(&plan.items);
    let estimated_memory_mb = streaming.estimate_memory_usage(&plan.items);
    let batch_size = if is_streaming {
        streaming.config().chunk_size
    } else {
        bounds.batch_size
    };

    let batches = partition("plan", plan.items.clone(), batch_size)
        .into_iter()
        .map(|batch| BatchPreview {
            sequence: batch.sequence,
            items: batch
                .items
                .iter()
                .map(|i| format!("{}:{}", i.repo.full_name, i.path))
                .collect(),
        })
        .collect();

    PlanReport {
        strategy,
        submitted_items,
        unique_items: plan.items.len(),
        duplicates: plan.duplicates.len(),
        opportunities: plan.opportunities,
        streaming: is_streaming,
        estimated_memory_mb,
        concurrency: bounds.concurrency,
        batches,
    }
}

/// Collects the run results together with everything the coordinator observed.
pub fn build_run_report(
    coordinator: &BatchCoordinator,
    mut results: RunResults,
    with_content: bool,
) -> RunReport {
    if !with_content {
        for outcome in results.results.values_mut().flatten() {
            if let Some(content) = outcome.content.as_mut() {
                content.content.clear();
            }
        }
    }

    let metrics = coordinator.get_metrics();
    RunReport {
        efficiency: coordinator.collector().efficiency_metrics(),
        analysis: coordinator.analyze_performance(),
        alerts: coordinator.progress().alert_on_performance_issues(&metrics),
        memory: coordinator.memory().memory_report(),
        streaming: coordinator.streaming_stats(),
        resources: coordinator.resources().stats(),
        metrics,
        results,
    }
}

pub async fn emit_json<T: Serialize>(value: &T, output: Option<String>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => tokio::fs::write(path, json).await?,
        None => println!("{json}"),
    }
    Ok(())
}
