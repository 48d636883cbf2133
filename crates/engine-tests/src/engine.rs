#[cfg(test)]
mod tests {
    use crate::{
        batch_sizes, coordinator, coordinator_with_probe, drain_events, fleet, test_config,
        utils::{ScriptedProbe, ScriptedTransport},
    };
    use engine_monitoring::{analyzer::BottleneckKind, progress::ProgressSnapshot};
    use model::{core::strategy::ExecutionStrategy, events::run::RunEvent};
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tracing_test::traced_test;

    fn serving(count: usize, path: &str) -> Arc<ScriptedTransport> {
        let mut transport = ScriptedTransport::new();
        for item in fleet(count, path) {
            transport = transport.file(&item.repo.full_name, path, "contents");
        }
        Arc::new(transport)
    }

    // Scenario: adaptive run with calm memory and no quota pressure.
    // Expected Outcome: each batch grows by half until the remaining work runs out.
    #[tokio::test(start_paused = true)]
    async fn adaptive_batches_grow_when_healthy() {
        let config = test_config().batch_sizes(1, 2, 10);
        let (coordinator, mut events) = coordinator(config, serving(20, "go.mod"));

        coordinator
            .process_targets(fleet(20, "go.mod"), Some(ExecutionStrategy::Adaptive))
            .await
            .unwrap();

        let sizes = batch_sizes(&drain_events(&mut events));
        assert_eq!(&sizes[..4], &[2, 3, 5, 8]);
        assert_eq!(sizes.iter().sum::<usize>(), 20);
        assert!(sizes.iter().all(|&s| s <= 10));
    }

    // Scenario: memory stays in the warning band for the whole run.
    // Expected Outcome: every batch is half the configured default.
    #[tokio::test(start_paused = true)]
    async fn warning_pressure_halves_batches() {
        let config = test_config().batch_sizes(1, 10, 50);
        let (coordinator, mut events) = coordinator_with_probe(
            config,
            serving(20, "go.mod"),
            ScriptedProbe::new([85.0]),
        );

        coordinator
            .process_targets(fleet(20, "go.mod"), Some(ExecutionStrategy::Parallel))
            .await
            .unwrap();

        assert_eq!(batch_sizes(&drain_events(&mut events)), vec![5, 5, 5, 5]);
    }

    // Scenario: memory is critical when the run starts and recovers a few polls later.
    // Expected Outcome:
    // - Admission pauses before the first batch and resumes once memory clears.
    // - Every item is still processed.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn critical_memory_pauses_admission() {
        let probe = ScriptedProbe::new([95.0, 95.0, 95.0, 30.0]);
        let config = test_config().memory_poll_interval_ms(500);
        let (coordinator, mut events) =
            coordinator_with_probe(config, serving(6, "go.mod"), probe.clone());

        let results = coordinator
            .process_targets(fleet(6, "go.mod"), None)
            .await
            .unwrap();
        assert_eq!(results.successful().count(), 6);
        assert!(probe.reads() >= 4);

        let events = drain_events(&mut events);
        let kinds: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
        let paused = kinds.iter().position(|k| *k == "admission.paused").unwrap();
        let resumed = kinds.iter().position(|k| *k == "admission.resumed").unwrap();
        let first_batch = kinds.iter().position(|k| *k == "batch.started").unwrap();
        assert!(paused < resumed && resumed < first_batch);

        let paused_ms = events.iter().find_map(|e| match e {
            RunEvent::AdmissionResumed { paused_ms, .. } => Some(*paused_ms),
            _ => None,
        });
        assert!(paused_ms.is_some_and(|ms| ms >= 1000));
        assert!(logs_contain("pausing batch admission"));
    }

    // Scenario: the caller cancels once the first batch has finished.
    // Expected Outcome:
    // - The in-flight batch completes; no further batch is admitted.
    // - The run is marked cancelled rather than failed.
    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_batches() {
        let config = test_config().batch_sizes(1, 2, 10);
        let transport = serving(6, "go.mod");
        let (coordinator, mut events) = coordinator(config, transport.clone());
        let token = coordinator.cancellation_token();
        let coordinator = coordinator.with_progress_callback(Arc::new(
            move |snapshot: &ProgressSnapshot| {
                if snapshot.completed >= 2 {
                    token.cancel();
                }
            },
        ));

        let results = coordinator
            .process_targets(fleet(6, "go.mod"), Some(ExecutionStrategy::Sequential))
            .await
            .unwrap();

        assert!(results.cancelled);
        assert_eq!(results.len(), 2);
        assert_eq!(transport.calls(), 2);

        let events = drain_events(&mut events);
        assert_eq!(batch_sizes(&events), vec![2]);
        assert!(matches!(
            events.last(),
            Some(RunEvent::RunCancelled {
                completed_items: 2,
                ..
            })
        ));
    }

    // Scenario: each fetch takes half an hour and the caller cancels after two items.
    // Expected Outcome: the analysis after the run still flags the slow progress of
    // the remaining work.
    #[tokio::test(start_paused = true)]
    async fn analysis_after_a_cancelled_slow_run_flags_slow_progress() {
        let mut transport = ScriptedTransport::new().latency(Duration::from_secs(30 * 60));
        for item in fleet(6, "go.mod") {
            transport = transport.file(&item.repo.full_name, "go.mod", "contents");
        }
        let config = test_config().batch_sizes(1, 2, 10);
        let (coordinator, _events) = coordinator(config, Arc::new(transport));
        let token = coordinator.cancellation_token();
        let coordinator = coordinator.with_progress_callback(Arc::new(
            move |snapshot: &ProgressSnapshot| {
                if snapshot.completed >= 2 {
                    token.cancel();
                }
            },
        ));

        let results = coordinator
            .process_targets(fleet(6, "go.mod"), Some(ExecutionStrategy::Sequential))
            .await
            .unwrap();
        assert!(results.cancelled);

        let last = coordinator.progress().latest_snapshot().unwrap();
        assert_eq!((last.completed, last.total), (2, 6));
        let analysis = coordinator.analyze_performance();
        assert!(
            analysis
                .bottlenecks
                .iter()
                .any(|b| b.kind == BottleneckKind::SlowProgress)
        );
    }

    // Scenario: a progress callback is registered for a multi-batch run.
    // Expected Outcome: it sees every item complete, ending at the full total.
    #[tokio::test(start_paused = true)]
    async fn progress_callback_tracks_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let (coordinator, _events) = coordinator(test_config(), serving(12, "go.mod"));
        let coordinator = coordinator.with_progress_callback({
            let seen = seen.clone();
            let calls = calls.clone();
            Arc::new(move |snapshot: &ProgressSnapshot| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push((snapshot.completed, snapshot.total));
            })
        });

        coordinator
            .process_targets(fleet(12, "go.mod"), None)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 12);
        assert_eq!(seen.lock().unwrap().last(), Some(&(12, 12)));
    }

    // Scenario: several runs feed the performance collector.
    // Expected Outcome: batch records exist, efficiency is reported and the analysis scores the run.
    #[tokio::test(start_paused = true)]
    async fn performance_tracking_records_batches() {
        let transport = ScriptedTransport::new().latency(Duration::from_millis(20));
        let transport = Arc::new(
            (0..10).fold(transport, |t, i| t.file(&format!("org/repo-{i}"), "go.mod", "m")),
        );
        let (coordinator, _events) = coordinator(test_config(), transport);

        coordinator
            .process_targets(fleet(10, "go.mod"), None)
            .await
            .unwrap();

        let records = coordinator.collector().records("batch");
        assert!(!records.is_empty());
        assert_eq!(records.iter().map(|r| r.total_count).sum::<usize>(), 10);

        let efficiency = coordinator.collector().efficiency_metrics();
        assert_eq!(efficiency.total_items, 10);

        let analysis = coordinator.analyze_performance();
        assert!((0.0..=100.0).contains(&analysis.overall_score));
    }

    // Scenario: a run finishes with nothing but successes.
    // Expected Outcome: the progress monitor raises no performance alerts.
    #[tokio::test(start_paused = true)]
    async fn healthy_run_raises_no_critical_alerts() {
        let (coordinator, _events) = coordinator(test_config(), serving(5, "go.mod"));

        coordinator
            .process_targets(fleet(5, "go.mod"), None)
            .await
            .unwrap();

        let alerts = coordinator
            .progress()
            .alert_on_performance_issues(&coordinator.get_metrics());
        assert!(
            alerts
                .iter()
                .all(|a| a.severity != engine_monitoring::progress::AlertSeverity::Critical)
        );
    }
}
