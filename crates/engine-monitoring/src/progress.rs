use model::execution::metrics::RunMetrics;
use serde::Serialize;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{info, warn};

const RATE_WINDOW: usize = 10;
const SUCCESS_WARNING: f64 = 0.9;
const SUCCESS_CRITICAL: f64 = 0.5;
const CACHE_HIT_LOW: f64 = 0.2;

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub label: String,
    pub total: usize,
    pub completed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub current_batch_size: usize,
    pub percent: f64,
    pub elapsed: Duration,
    /// Items per second over the trailing window.
    pub rate: f64,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub label: String,
    pub total: usize,
    pub completed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub elapsed: Duration,
    pub throughput: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAlert {
    pub severity: AlertSeverity,
    pub message: String,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

#[derive(Debug)]
struct ProgressState {
    label: String,
    total: usize,
    completed: usize,
    success_count: usize,
    failure_count: usize,
    current_batch_size: usize,
    started: Instant,
    samples: VecDeque<(Instant, usize)>,
}

impl ProgressState {
    fn new(total: usize, label: String) -> Self {
        let now = Instant::now();
        let mut samples = VecDeque::with_capacity(RATE_WINDOW);
        samples.push_back((now, 0));
        Self {
            label,
            total,
            completed: 0,
            success_count: 0,
            failure_count: 0,
            current_batch_size: 0,
            started: now,
            samples,
        }
    }

    fn push_sample(&mut self) {
        self.samples.push_back((Instant::now(), self.completed));
        while self.samples.len() > RATE_WINDOW {
            self.samples.pop_front();
        }
    }

    /// Trailing-window rate; a single slow batch only moves it by one sample.
    fn rate(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let secs = last.0.duration_since(first.0).as_secs_f64();
        if secs > 0.0 && last.1 > first.1 {
            return (last.1 - first.1) as f64 / secs;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.completed as f64 / elapsed
        } else {
            0.0
        }
    }

    fn eta(&self) -> Option<Duration> {
        let remaining = self.total.saturating_sub(self.completed);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        let rate = self.rate();
        (rate > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / rate))
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let percent = if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        };
        ProgressSnapshot {
            label: self.label.clone(),
            total: self.total,
            completed: self.completed,
            success_count: self.success_count,
            failure_count: self.failure_count,
            current_batch_size: self.current_batch_size,
            percent,
            elapsed: self.started.elapsed(),
            rate: self.rate(),
            eta: self.eta(),
        }
    }
}

/// Live progress and ETA for the current run.
pub struct ProgressMonitor {
    state: Mutex<Option<ProgressState>>,
    /// Final snapshot of the most recently finished run.
    last: Mutex<Option<ProgressSnapshot>>,
    callback: Option<ProgressCallback>,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            last: Mutex::new(None),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn start_monitoring(&self, total: usize, label: impl Into<String>) {
        let label = label.into();
        info!(total, label = %label, "Started progress monitoring");
        if let Ok(mut state) = self.state.lock() {
            *state = Some(ProgressState::new(total, label));
        }
    }

    /// Sets absolute counters, e.g. after a batch completes.
    pub fn update_progress(
        &self,
        completed: usize,
        success_count: usize,
        failure_count: usize,
        current_batch_size: usize,
    ) {
        self.update(|s| {
            s.completed = completed;
            s.success_count = success_count;
            s.failure_count = failure_count;
            s.current_batch_size = current_batch_size;
        });
    }

    /// Counts one finished item.
    pub fn record_item(&self, success: bool) {
        self.update(|s| {
            s.completed += 1;
            if success {
                s.success_count += 1;
            } else {
                s.failure_count += 1;
            }
        });
    }

    pub fn set_batch_size(&self, current_batch_size: usize) {
        if let Ok(mut state) = self.state.lock()
            && let Some(s) = state.as_mut()
        {
            s.current_batch_size = current_batch_size;
        }
    }

    fn update(&self, apply: impl FnOnce(&mut ProgressState)) {
        let snapshot = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let Some(s) = state.as_mut() else {
                return;
            };
            apply(s);
            s.push_sample();
            s.snapshot()
        };

        if let Some(callback) = &self.callback {
            callback(&snapshot);
        }
    }

    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(ProgressState::snapshot))
    }

    /// The live snapshot, or the final one of the last finished run.
    pub fn latest_snapshot(&self) -> Option<ProgressSnapshot> {
        self.snapshot()
            .or_else(|| self.last.lock().ok().and_then(|last| last.clone()))
    }

    pub fn calculate_eta(&self) -> Option<Duration> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.as_ref().and_then(ProgressState::eta))
    }

    pub fn alert_on_performance_issues(&self, metrics: &RunMetrics) -> Vec<PerformanceAlert> {
        let mut alerts = Vec::new();

        if metrics.total_requests > 0 {
            let success = metrics.success_rate();
            if success < SUCCESS_CRITICAL {
                alerts.push(PerformanceAlert {
                    severity: AlertSeverity::Critical,
                    message: format!("Success rate critically low: {:.1}%", success * 100.0),
                });
            } else if success < SUCCESS_WARNING {
                alerts.push(PerformanceAlert {
                    severity: AlertSeverity::Warning,
                    message: format!("Success rate below 90%: {:.1}%", success * 100.0),
                });
            }
        }

        if metrics.cache_hits + metrics.cache_misses > 0 {
            let hit_rate = metrics.cache_hit_rate();
            if hit_rate < CACHE_HIT_LOW {
                alerts.push(PerformanceAlert {
                    severity: AlertSeverity::Info,
                    message: format!("Cache hit rate low: {:.1}%", hit_rate * 100.0),
                });
            }
        }

        for alert in &alerts {
            if alert.severity >= AlertSeverity::Warning {
                warn!(severity = ?alert.severity, "{}", alert.message);
            }
        }

        alerts
    }

    /// Ends the current run and returns its totals. `None` if nothing was started.
    pub fn finish_monitoring(&self) -> Option<ProgressSummary> {
        let state = self.state.lock().ok()?.take()?;
        if let Ok(mut last) = self.last.lock() {
            *last = Some(state.snapshot());
        }
        let elapsed = state.started.elapsed();
        let secs = elapsed.as_secs_f64();

        let summary = ProgressSummary {
            throughput: if secs > 0.0 {
                state.completed as f64 / secs
            } else {
                0.0
            },
            success_rate: if state.completed > 0 {
                state.success_count as f64 / state.completed as f64
            } else {
                0.0
            },
            label: state.label,
            total: state.total,
            completed: state.completed,
            success_count: state.success_count,
            failure_count: state.failure_count,
            elapsed,
        };

        info!(
            label = %summary.label,
            completed = summary.completed,
            total = summary.total,
            elapsed_ms = elapsed.as_millis() as u64,
            "Finished progress monitoring"
        );
        Some(summary)
    }
}
