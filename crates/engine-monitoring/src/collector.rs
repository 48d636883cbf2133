use chrono::{DateTime, Utc};
use model::core::strategy::ExecutionStrategy;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};
use tracing::debug;

pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// One measured operation, typically a dispatched batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub op_type: String,
    pub duration: Duration,
    pub batch_size: usize,
    pub success_count: usize,
    pub total_count: usize,
    pub cache_hits: usize,
    pub strategy: Option<ExecutionStrategy>,
    pub timestamp: DateTime<Utc>,
}

impl OperationRecord {
    pub fn new(
        op_type: impl Into<String>,
        duration: Duration,
        batch_size: usize,
        success_count: usize,
        total_count: usize,
        cache_hits: usize,
    ) -> Self {
        Self {
            op_type: op_type.into(),
            duration,
            batch_size,
            success_count,
            total_count,
            cache_hits,
            strategy: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Items per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_count as f64 / secs
        } else {
            0.0
        }
    }
}

/// Efficiency ratios over everything recorded so far. Percentages are 0 to 100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub cache_efficiency: f64,
    pub batch_efficiency: f64,
    /// Operations (items) per second.
    pub time_efficiency: f64,
    pub overall_efficiency: f64,
    pub total_operations: usize,
    pub total_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSummary {
    pub op_type: String,
    pub operations: usize,
    pub total_items: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub average_batch_size: f64,
    pub throughput: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: ExecutionStrategy,
    pub operations: usize,
    pub success_rate: f64,
    pub throughput: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub efficiency: EfficiencyMetrics,
    pub operations: Vec<OperationSummary>,
    pub strategies: Vec<StrategySummary>,
}

/// Per-operation-type history of measured operations.
#[derive(Debug)]
pub struct MetricsCollector {
    max_history: usize,
    history: Mutex<HashMap<String, VecDeque<OperationRecord>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl MetricsCollector {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, record: OperationRecord) {
        debug!(
            op_type = %record.op_type,
            batch_size = record.batch_size,
            success = record.success_count,
            total = record.total_count,
            duration_ms = record.duration.as_millis() as u64,
            "Recorded operation"
        );

        if let Ok(mut history) = self.history.lock() {
            let records = history.entry(record.op_type.clone()).or_default();
            records.push_back(record);
            while records.len() > self.max_history {
                records.pop_front();
            }
        }
    }

    /// Copy of the history for one operation type, oldest first.
    pub fn records(&self, op_type: &str) -> Vec<OperationRecord> {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.get(op_type).map(|r| r.iter().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn operation_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .history
            .lock()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        types.sort();
        types
    }

    fn all_records(&self) -> Vec<OperationRecord> {
        self.history
            .lock()
            .map(|h| h.values().flat_map(|r| r.iter().cloned()).collect())
            .unwrap_or_default()
    }

    pub fn efficiency_metrics(&self) -> EfficiencyMetrics {
        efficiency_of(&self.all_records())
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let all = self.all_records();

        let operations = self
            .operation_types()
            .into_iter()
            .map(|op_type| summarize_operation(op_type.clone(), &self.records(&op_type)))
            .collect();

        let mut by_strategy: BTreeMap<ExecutionStrategy, Vec<&OperationRecord>> = BTreeMap::new();
        for record in &all {
            if let Some(strategy) = record.strategy {
                by_strategy.entry(strategy).or_default().push(record);
            }
        }
        let strategies = by_strategy
            .into_iter()
            .map(|(strategy, records)| {
                let total: usize = records.iter().map(|r| r.total_count).sum();
                let success: usize = records.iter().map(|r| r.success_count).sum();
                let secs: f64 = records.iter().map(|r| r.duration.as_secs_f64()).sum();
                StrategySummary {
                    strategy,
                    operations: records.len(),
                    success_rate: ratio(success as f64, total as f64),
                    throughput: ratio(total as f64, secs),
                }
            })
            .collect();

        PerformanceSummary {
            efficiency: efficiency_of(&all),
            operations,
            strategies,
        }
    }

    /// Plain-language suggestions derived from the recorded history.
    pub fn identify_optimization_opportunities(&self) -> Vec<String> {
        let summary = self.performance_summary();
        let eff = summary.efficiency;
        let mut suggestions = Vec::new();

        if eff.total_operations == 0 {
            return suggestions;
        }

        if eff.cache_efficiency < 30.0 {
            suggestions.push(format!(
                "Cache hit rate is {:.1}%; reuse a warm cache between runs",
                eff.cache_efficiency
            ));
        }
        if eff.batch_efficiency < 90.0 {
            suggestions.push(format!(
                "{:.1}% of items failed; prune missing or private targets before dispatch",
                100.0 - eff.batch_efficiency
            ));
        }
        if eff.time_efficiency < 1.0 {
            suggestions.push(format!(
                "Throughput is {:.2} items/s; raise concurrency if the quota allows",
                eff.time_efficiency
            ));
        }
        for op in &summary.operations {
            if op.operations >= 3 && op.average_batch_size < 5.0 {
                suggestions.push(format!(
                    "'{}' batches average {:.1} items; larger batches amortize pacing delays",
                    op.op_type, op.average_batch_size
                ));
            }
        }
        if summary.strategies.len() > 1
            && let Some(best) = summary
                .strategies
                .iter()
                .max_by(|a, b| a.throughput.total_cmp(&b.throughput))
        {
            suggestions.push(format!(
                "Strategy '{}' had the highest throughput ({:.2} items/s)",
                best.strategy, best.throughput
            ));
        }

        suggestions
    }

    pub fn reset(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }
}

pub(crate) fn efficiency_of(records: &[OperationRecord]) -> EfficiencyMetrics {
    let total: usize = records.iter().map(|r| r.total_count).sum();
    let success: usize = records.iter().map(|r| r.success_count).sum();
    let hits: usize = records.iter().map(|r| r.cache_hits).sum();
    let secs: f64 = records.iter().map(|r| r.duration.as_secs_f64()).sum();

    let cache_efficiency = ratio(hits as f64, total as f64) * 100.0;
    let batch_efficiency = ratio(success as f64, total as f64) * 100.0;
    let time_efficiency = ratio(total as f64, secs);
    let overall_efficiency = if records.is_empty() {
        0.0
    } else {
        0.3 * cache_efficiency + 0.4 * batch_efficiency + 0.3 * (time_efficiency * 10.0).min(100.0)
    };

    EfficiencyMetrics {
        cache_efficiency,
        batch_efficiency,
        time_efficiency,
        overall_efficiency,
        total_operations: records.len(),
        total_items: total,
    }
}

fn summarize_operation(op_type: String, records: &[OperationRecord]) -> OperationSummary {
    let n = records.len() as f64;
    let total: usize = records.iter().map(|r| r.total_count).sum();
    let success: usize = records.iter().map(|r| r.success_count).sum();
    let secs: f64 = records.iter().map(|r| r.duration.as_secs_f64()).sum();
    let batch_sum: usize = records.iter().map(|r| r.batch_size).sum();

    OperationSummary {
        op_type,
        operations: records.len(),
        total_items: total,
        success_rate: ratio(success as f64, total as f64),
        average_duration_ms: ratio(secs * 1000.0, n),
        average_batch_size: ratio(batch_sum as f64, n),
        throughput: ratio(total as f64, secs),
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}
