use crate::{
    collector::{EfficiencyMetrics, MetricsCollector, OperationRecord},
    progress::ProgressMonitor,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
    time::Duration,
};
use tracing::info;

const MAX_ANALYSES: usize = 100;
const TREND_MIN_RECORDS: usize = 4;
const TREND_TOLERANCE: f64 = 0.05;
const SLOW_ETA: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    LowCacheEfficiency,
    HighFailureRate,
    LowThroughput,
    SmallBatches,
    SlowProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub action: String,
    pub expected_improvement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceAnalysis {
    /// 0 to 100.
    pub overall_score: f64,
    pub bottlenecks: Vec<Bottleneck>,
    /// Highest priority first.
    pub recommendations: Vec<Recommendation>,
    pub trend_analysis: BTreeMap<String, Trend>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub analyses: usize,
    pub average_score: f64,
    pub latest_score: Option<f64>,
    /// Most frequent first.
    pub common_bottlenecks: Vec<(BottleneckKind, usize)>,
}

/// Turns collected metrics into a score, bottlenecks and recommendations.
#[derive(Debug, Default)]
pub struct PerformanceAnalyzer {
    baseline: Mutex<Option<EfficiencyMetrics>>,
    history: Mutex<Vec<PerformanceAnalysis>>,
}

impl PerformanceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later scores are adjusted by half the change against this baseline.
    pub fn set_baseline(&self, baseline: EfficiencyMetrics) {
        if let Ok(mut b) = self.baseline.lock() {
            *b = Some(baseline);
        }
    }

    pub fn analyze_performance(
        &self,
        collector: &MetricsCollector,
        monitor: Option<&ProgressMonitor>,
    ) -> PerformanceAnalysis {
        let eff = collector.efficiency_metrics();
        let baseline = self.baseline.lock().ok().and_then(|b| *b);

        let overall_score = if eff.total_operations == 0 {
            0.0
        } else {
            match baseline {
                Some(b) => eff.overall_efficiency + 0.5 * (eff.overall_efficiency - b.overall_efficiency),
                None => eff.overall_efficiency,
            }
            .clamp(0.0, 100.0)
        };

        let bottlenecks = identify_bottlenecks(collector, &eff, monitor);
        let mut recommendations: Vec<Recommendation> =
            bottlenecks.iter().map(recommendation_for).collect();
        recommendations.sort_by_key(|r| r.priority);

        let trend_analysis = collector
            .operation_types()
            .into_iter()
            .map(|op| {
                let trend = trend_of(&collector.records(&op));
                (op, trend)
            })
            .collect();

        let analysis = PerformanceAnalysis {
            overall_score,
            bottlenecks,
            recommendations,
            trend_analysis,
            timestamp: Utc::now(),
        };

        info!(
            score = analysis.overall_score,
            bottlenecks = analysis.bottlenecks.len(),
            "Performance analysis complete"
        );

        if let Ok(mut history) = self.history.lock() {
            history.push(analysis.clone());
            if history.len() > MAX_ANALYSES {
                history.remove(0);
            }
        }

        analysis
    }

    pub fn performance_summary(&self) -> AnalysisSummary {
        let history = match self.history.lock() {
            Ok(h) => h.clone(),
            Err(_) => Vec::new(),
        };

        let average_score = if history.is_empty() {
            0.0
        } else {
            history.iter().map(|a| a.overall_score).sum::<f64>() / history.len() as f64
        };

        let mut counts: HashMap<BottleneckKind, usize> = HashMap::new();
        for analysis in &history {
            for b in &analysis.bottlenecks {
                *counts.entry(b.kind).or_default() += 1;
            }
        }
        let mut common_bottlenecks: Vec<_> = counts.into_iter().collect();
        common_bottlenecks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        AnalysisSummary {
            analyses: history.len(),
            average_score,
            latest_score: history.last().map(|a| a.overall_score),
            common_bottlenecks,
        }
    }
}

fn identify_bottlenecks(
    collector: &MetricsCollector,
    eff: &EfficiencyMetrics,
    monitor: Option<&ProgressMonitor>,
) -> Vec<Bottleneck> {
    let mut found = Vec::new();
    if eff.total_operations == 0 {
        return found;
    }

    if eff.cache_efficiency < 30.0 {
        found.push(Bottleneck {
            kind: BottleneckKind::LowCacheEfficiency,
            description: format!("Only {:.1}% of items were served from cache", eff.cache_efficiency),
        });
    }
    if eff.batch_efficiency < 90.0 {
        found.push(Bottleneck {
            kind: BottleneckKind::HighFailureRate,
            description: format!("{:.1}% of items failed", 100.0 - eff.batch_efficiency),
        });
    }
    if eff.time_efficiency < 1.0 {
        found.push(Bottleneck {
            kind: BottleneckKind::LowThroughput,
            description: format!("Throughput is {:.2} items/s", eff.time_efficiency),
        });
    }

    let summary = collector.performance_summary();
    let small = summary
        .operations
        .iter()
        .filter(|op| op.operations >= 3 && op.average_batch_size < 3.0)
        .map(|op| op.op_type.as_str())
        .collect::<Vec<_>>();
    if !small.is_empty() {
        found.push(Bottleneck {
            kind: BottleneckKind::SmallBatches,
            description: format!("Batches stay small for: {}", small.join(", ")),
        });
    }

    if let Some(snapshot) = monitor.and_then(ProgressMonitor::latest_snapshot)
        && let Some(eta) = snapshot.eta
        && eta > SLOW_ETA
    {
        found.push(Bottleneck {
            kind: BottleneckKind::SlowProgress,
            description: format!(
                "{} of {} items remaining with an ETA of {}s",
                snapshot.total - snapshot.completed.min(snapshot.total),
                snapshot.total,
                eta.as_secs()
            ),
        });
    }

    found
}

fn recommendation_for(bottleneck: &Bottleneck) -> Recommendation {
    let (priority, action, expected) = match bottleneck.kind {
        BottleneckKind::HighFailureRate => (
            Priority::High,
            "Exclude archived, missing or private targets before dispatch",
            "Fewer wasted requests and retries",
        ),
        BottleneckKind::LowThroughput => (
            Priority::High,
            "Raise max_concurrent_requests or switch to the parallel strategy",
            "Up to 2x throughput when the quota allows",
        ),
        BottleneckKind::SlowProgress => (
            Priority::Medium,
            "Enable cross-target batching and prioritize lock files",
            "Shorter runs through deduplicated fetches",
        ),
        BottleneckKind::LowCacheEfficiency => (
            Priority::Medium,
            "Keep the response cache warm between runs",
            "30-50% fewer network requests on repeat scans",
        ),
        BottleneckKind::SmallBatches => (
            Priority::Low,
            "Increase default_batch_size or memory headroom",
            "Lower per-batch pacing overhead",
        ),
    };

    Recommendation {
        priority,
        action: action.to_string(),
        expected_improvement: expected.to_string(),
    }
}

/// Compares throughput of the earlier and recent halves of the history.
fn trend_of(records: &[OperationRecord]) -> Trend {
    if records.len() < TREND_MIN_RECORDS {
        return Trend::InsufficientData;
    }

    let mid = records.len() / 2;
    let avg = |rs: &[OperationRecord]| rs.iter().map(|r| r.throughput()).sum::<f64>() / rs.len() as f64;
    let earlier = avg(&records[..mid]);
    let recent = avg(&records[mid..]);

    if earlier <= 0.0 {
        return if recent > 0.0 { Trend::Improving } else { Trend::Stable };
    }
    if recent > earlier * (1.0 + TREND_TOLERANCE) {
        Trend::Improving
    } else if recent < earlier * (1.0 - TREND_TOLERANCE) {
        Trend::Degrading
    } else {
        Trend::Stable
    }
}
