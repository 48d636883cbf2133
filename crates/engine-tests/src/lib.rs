#![allow(dead_code)]

use engine_config::settings::batch::{BatchConfig, BatchConfigBuilder};
use engine_core::memory::MemoryProbe;
use engine_processing::BatchCoordinator;
use model::{
    core::repository::Repository, events::run::RunEvent, records::work_item::WorkItem,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use utils::{ScriptedProbe, ScriptedTransport};

pub mod engine;
pub mod integration;
pub mod utils;

/// Capacity of the event channel handed to coordinators under test.
const EVENT_BUFFER: usize = 1024;

/// Builder preset used by every scenario: short retry delays so paused-clock
/// tests stay quick, everything else at defaults.
pub fn test_config() -> BatchConfigBuilder {
    BatchConfig::builder().retry(2, 10, 200)
}

/// Coordinator over `transport` with a calm memory probe and an event channel.
pub fn coordinator(
    config: BatchConfigBuilder,
    transport: Arc<ScriptedTransport>,
) -> (BatchCoordinator, mpsc::Receiver<RunEvent>) {
    coordinator_with_probe(config, transport, ScriptedProbe::calm())
}

pub fn coordinator_with_probe(
    config: BatchConfigBuilder,
    transport: Arc<ScriptedTransport>,
    probe: Arc<dyn MemoryProbe>,
) -> (BatchCoordinator, mpsc::Receiver<RunEvent>) {
    let config = config.build().expect("valid test config");
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let coordinator = BatchCoordinator::new(config, transport)
        .with_memory_probe(probe)
        .with_events(tx);
    (coordinator, rx)
}

/// Everything published so far, in order.
pub fn drain_events(rx: &mut mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Item counts of every `BatchStarted` event, in admission order.
pub fn batch_sizes(events: &[RunEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::BatchStarted { items, .. } => Some(*items),
            _ => None,
        })
        .collect()
}

pub fn work_item(full_name: &str, path: &str) -> WorkItem {
    WorkItem::new(
        Repository::parse(full_name).expect("owner/name"),
        path,
    )
}

/// `count` distinct repositories named `org/repo-<i>`, one item each for `path`.
pub fn fleet(count: usize, path: &str) -> Vec<WorkItem> {
    (0..count)
        .map(|i| work_item(&format!("org/repo-{i}"), path))
        .collect()
}
