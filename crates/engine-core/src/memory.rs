use chrono::{DateTime, Utc};
use engine_config::settings::batch::BatchConfig;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Raw memory figures as read from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReading {
    /// System memory in use, 0 to 100.
    pub percent_used: f64,
    pub process_rss_mb: f64,
}

/// Source of memory readings. Swappable so tests can script pressure.
pub trait MemoryProbe: Send + Sync {
    fn read(&self) -> MemoryReading;
}

/// Reads system and process memory through `sysinfo`.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
    process_id: Option<Pid>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            process_id: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn read(&self) -> MemoryReading {
        let Ok(mut system) = self.system.lock() else {
            return MemoryReading {
                percent_used: 0.0,
                process_rss_mb: 0.0,
            };
        };

        system.refresh_memory();
        let total = system.total_memory();
        let percent_used = if total == 0 {
            0.0
        } else {
            system.used_memory() as f64 / total as f64 * 100.0
        };

        let process_rss_mb = match self.process_id {
            Some(pid) if system.refresh_process(pid) => system
                .process(pid)
                .map(|p| p.memory() as f64 / BYTES_PER_MB)
                .unwrap_or(0.0),
            _ => 0.0,
        };

        MemoryReading {
            percent_used,
            process_rss_mb,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub percent_used: f64,
    pub process_rss_mb: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryReport {
    pub current: Option<MemorySample>,
    pub level: PressureLevel,
    pub peak_percent_used: f64,
    pub peak_process_rss_mb: f64,
    pub average_percent_used: f64,
    /// Process RSS growth since [`MemoryMonitor::set_baseline`], in MB.
    pub rss_delta_from_baseline_mb: Option<f64>,
    pub trend: MemoryTrend,
    pub samples: usize,
}

#[derive(Debug, Default)]
struct MonitorState {
    samples: VecDeque<MemorySample>,
    baseline: Option<MemorySample>,
}

/// Samples memory into a bounded window and turns it into batch-size advice.
///
/// Pressure is the larger of system usage and process RSS against the
/// configured ceiling, both as a fraction of 1. Writers serialize on the
/// window mutex; the latest pressure is mirrored in an atomic for readers.
pub struct MemoryMonitor {
    probe: Arc<dyn MemoryProbe>,
    warning_threshold: f64,
    critical_threshold: f64,
    max_memory_mb: f64,
    min_batch_size: usize,
    max_batch_size: usize,
    window: usize,
    state: Mutex<MonitorState>,
    latest_pressure: AtomicU64,
}

impl MemoryMonitor {
    pub fn new(config: &BatchConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            warning_threshold: config.memory_warning_threshold(),
            critical_threshold: config.memory_critical_threshold(),
            max_memory_mb: config.max_memory_usage_mb() as f64,
            min_batch_size: config.min_batch_size(),
            max_batch_size: config.max_batch_size(),
            window: config.memory_window().max(1),
            state: Mutex::new(MonitorState::default()),
            latest_pressure: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    pub fn from_system(config: &BatchConfig) -> Self {
        Self::new(config, Arc::new(SystemMemoryProbe::new()))
    }

    pub fn sample(&self) -> MemorySample {
        let reading = self.probe.read();
        let sample = MemorySample {
            percent_used: reading.percent_used,
            process_rss_mb: reading.process_rss_mb,
            timestamp: Utc::now(),
        };

        let pressure = self.pressure_of(&sample);
        if let Ok(mut state) = self.state.lock() {
            state.samples.push_back(sample);
            while state.samples.len() > self.window {
                state.samples.pop_front();
            }
        }
        self.latest_pressure
            .store(pressure.to_bits(), Ordering::Release);

        match self.level_for(pressure) {
            PressureLevel::Critical => warn!(
                percent_used = sample.percent_used,
                process_rss_mb = sample.process_rss_mb,
                "Memory pressure critical"
            ),
            PressureLevel::Warning => debug!(
                percent_used = sample.percent_used,
                process_rss_mb = sample.process_rss_mb,
                "Memory pressure elevated"
            ),
            PressureLevel::Normal => {}
        }

        sample
    }

    /// Pressure of the latest sample; takes a first sample if none exists yet.
    pub fn pressure(&self) -> f64 {
        let latest = f64::from_bits(self.latest_pressure.load(Ordering::Acquire));
        if latest.is_nan() {
            let sample = self.sample();
            self.pressure_of(&sample)
        } else {
            latest
        }
    }

    pub fn pressure_of(&self, sample: &MemorySample) -> f64 {
        let system = sample.percent_used / 100.0;
        let process = if self.max_memory_mb > 0.0 {
            sample.process_rss_mb / self.max_memory_mb
        } else {
            0.0
        };
        system.max(process).max(0.0)
    }

    pub fn level_for(&self, pressure: f64) -> PressureLevel {
        if pressure >= self.critical_threshold {
            PressureLevel::Critical
        } else if pressure >= self.warning_threshold {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }

    pub fn pressure_level(&self) -> PressureLevel {
        self.level_for(self.pressure())
    }

    pub fn should_reduce_batch_size(&self) -> bool {
        self.pressure_level() >= PressureLevel::Warning
    }

    /// At this level new batch admission stops until a re-sample clears it.
    pub fn is_critical(&self) -> bool {
        self.pressure_level() == PressureLevel::Critical
    }

    pub fn adjusted_batch_size(&self, current: usize) -> usize {
        self.adjusted_batch_size_for(self.pressure_level(), current)
    }

    /// Always within `[min_batch_size, max_batch_size]` and non-increasing in `level`.
    pub fn adjusted_batch_size_for(&self, level: PressureLevel, current: usize) -> usize {
        let (min, max) = (self.min_batch_size, self.max_batch_size);
        match level {
            PressureLevel::Normal => current.clamp(min, max),
            PressureLevel::Warning => (current / 2).clamp(min, max),
            PressureLevel::Critical => min,
        }
    }

    /// Records the latest sample (taking one if needed) as the reference for later reports.
    pub fn set_baseline(&self) {
        let sample = self.sample();
        if let Ok(mut state) = self.state.lock() {
            state.baseline = Some(sample);
        }
    }

    pub fn history(&self) -> Vec<MemorySample> {
        self.state
            .lock()
            .map(|s| s.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn memory_report(&self) -> MemoryReport {
        let (samples, baseline) = match self.state.lock() {
            Ok(state) => (
                state.samples.iter().copied().collect::<Vec<_>>(),
                state.baseline,
            ),
            Err(_) => (Vec::new(), None),
        };

        let current = samples.last().copied();
        let level = current
            .map(|s| self.level_for(self.pressure_of(&s)))
            .unwrap_or(PressureLevel::Normal);
        let peak_percent_used = samples.iter().map(|s| s.percent_used).fold(0.0, f64::max);
        let peak_process_rss_mb = samples.iter().map(|s| s.process_rss_mb).fold(0.0, f64::max);
        let average_percent_used = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|s| s.percent_used).sum::<f64>() / samples.len() as f64
        };
        let rss_delta_from_baseline_mb = match (current, baseline) {
            (Some(c), Some(b)) => Some(c.process_rss_mb - b.process_rss_mb),
            _ => None,
        };

        MemoryReport {
            current,
            level,
            peak_percent_used,
            peak_process_rss_mb,
            average_percent_used,
            rss_delta_from_baseline_mb,
            trend: self.trend(&samples),
            samples: samples.len(),
        }
    }

    fn trend(&self, samples: &[MemorySample]) -> MemoryTrend {
        if samples.len() < 4 {
            return MemoryTrend::Stable;
        }

        let mid = samples.len() / 2;
        let avg = |s: &[MemorySample]| {
            s.iter().map(|x| self.pressure_of(x)).sum::<f64>() / s.len() as f64
        };
        let delta = avg(&samples[mid..]) - avg(&samples[..mid]);

        if delta > 0.05 {
            MemoryTrend::Increasing
        } else if delta < -0.05 {
            MemoryTrend::Decreasing
        } else {
            MemoryTrend::Stable
        }
    }
}
