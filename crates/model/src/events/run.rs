use crate::core::strategy::ExecutionStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle events published by a coordinator while a run is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        total_items: usize,
        strategy: ExecutionStrategy,
        timestamp: DateTime<Utc>,
    },

    BatchStarted {
        run_id: String,
        batch_id: String,
        items: usize,
        concurrency: usize,
        timestamp: DateTime<Utc>,
    },

    BatchCompleted {
        run_id: String,
        batch_id: String,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Memory reached the critical level; no new batches are admitted.
    AdmissionPaused {
        run_id: String,
        memory_percent: f64,
        timestamp: DateTime<Utc>,
    },

    AdmissionResumed {
        run_id: String,
        paused_ms: u64,
        timestamp: DateTime<Utc>,
    },

    RunCancelled {
        run_id: String,
        completed_items: usize,
        timestamp: DateTime<Utc>,
    },

    RunCompleted {
        run_id: String,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::BatchStarted { run_id, .. }
            | RunEvent::BatchCompleted { run_id, .. }
            | RunEvent::AdmissionPaused { run_id, .. }
            | RunEvent::AdmissionResumed { run_id, .. }
            | RunEvent::RunCancelled { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. } => run_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run.started",
            RunEvent::BatchStarted { .. } => "batch.started",
            RunEvent::BatchCompleted { .. } => "batch.completed",
            RunEvent::AdmissionPaused { .. } => "admission.paused",
            RunEvent::AdmissionResumed { .. } => "admission.resumed",
            RunEvent::RunCancelled { .. } => "run.cancelled",
            RunEvent::RunCompleted { .. } => "run.completed",
        }
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.event_type(), self.run_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = RunEvent::AdmissionResumed {
            run_id: "r1".into(),
            paused_ms: 1500,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "admission_resumed");
        assert_eq!(json["paused_ms"], 1500);
        assert_eq!(event.run_id(), "r1");
        assert_eq!(event.event_type(), "admission.resumed");
    }
}
