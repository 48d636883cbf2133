#[cfg(test)]
mod tests {
    use crate::{
        batch_sizes, coordinator, drain_events, fleet, test_config,
        utils::{Reply, ScriptedTransport},
        work_item,
    };
    use engine_core::cache::InMemoryCache;
    use engine_config::settings::streaming::StreamingConfig;
    use engine_processing::RunError;
    use model::{
        core::{repository::Repository, strategy::ExecutionStrategy},
        execution::quota::QuotaSnapshot,
        records::{outcome::FailureKind, work_item::WorkItem},
    };
    use std::{sync::Arc, time::Duration};
    use tracing_test::traced_test;

    const FAR_FUTURE_EPOCH: i64 = 4_102_444_800;

    // Scenario: five targets are submitted, two of which do not have the file.
    // Expected Outcome:
    // - Exactly three successful outcomes and two NotFound failures.
    // - Every item issued a request and the counters add up.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn tc01_mixed_valid_and_missing_targets() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .file("org/a", "package.json", "{\"name\":\"a\"}")
                .file("org/b", "package.json", "{\"name\":\"b\"}")
                .file("org/c", "package.json", "{\"name\":\"c\"}"),
        );
        let (coordinator, _events) = coordinator(test_config(), transport.clone());

        let items = ["org/a", "org/b", "org/c", "org/ghost", "org/phantom"]
            .iter()
            .map(|r| work_item(r, "package.json"))
            .collect();
        let results = coordinator.process_targets(items, None).await.unwrap();

        assert_eq!(results.successful().count(), 3);
        assert_eq!(results.failed().count(), 2);
        assert!(
            results
                .get("org/ghost")
                .is_some_and(|o| o[0].failure_kind() == Some(FailureKind::NotFound))
        );

        let metrics = coordinator.get_metrics();
        assert_eq!(metrics.total_requests, 5);
        assert_eq!(metrics.successful_requests, 3);
        assert!(metrics.is_consistent());
        assert!(logs_contain("Run complete"));
    }

    // Scenario: fifteen items against a streaming threshold of ten and chunks of five.
    // Expected Outcome: the work runs as three chunks and every item gets an outcome.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn tc02_streams_large_runs_in_chunks() {
        let mut transport = ScriptedTransport::new();
        for item in fleet(15, "go.mod") {
            transport = transport.file(&item.repo.full_name, "go.mod", "module x");
        }
        let config = test_config().streaming(StreamingConfig {
            chunk_size: 5,
            stream_threshold: 10,
            max_concurrent_chunks: 2,
            ..Default::default()
        });
        let (coordinator, mut events) = coordinator(config, Arc::new(transport));

        let results = coordinator
            .process_targets(fleet(15, "go.mod"), None)
            .await
            .unwrap();

        assert_eq!(results.len(), 15);
        assert_eq!(results.successful().count(), 15);

        let stats = coordinator.streaming_stats();
        assert_eq!(stats.chunks_processed, 3);
        assert_eq!(stats.items_processed, 15);
        assert!(stats.peak_concurrent_chunks <= 2);
        assert_eq!(batch_sizes(&drain_events(&mut events)), vec![5, 5, 5]);
        assert!(logs_contain("Streaming work in chunks"));
    }

    // Scenario: four targets all request a custom common manifest name.
    // Expected Outcome: one opportunity covering all four with savings of 3/4.
    #[tokio::test(start_paused = true)]
    async fn tc03_detects_cross_target_opportunities() {
        let config = test_config().common_manifest_files(["manifest.lock"]);
        let mut transport = ScriptedTransport::new();
        for item in fleet(4, "manifest.lock") {
            transport = transport.file(&item.repo.full_name, "manifest.lock", "lock");
        }
        let (coordinator, _events) = coordinator(config, Arc::new(transport));

        let results = coordinator
            .process_targets(fleet(4, "manifest.lock"), None)
            .await
            .unwrap();

        assert_eq!(results.opportunities.len(), 1);
        let opportunity = &results.opportunities[0];
        assert_eq!(opportunity.targets.len(), 4);
        assert_eq!(opportunity.shared_paths, vec!["manifest.lock".to_string()]);
        assert!((opportunity.estimated_savings - 0.75).abs() < 1e-9);
    }

    // Scenario: a run completes, then cleanup is requested twice.
    // Expected Outcome:
    // - No resources stay active after the run.
    // - Cleanup is idempotent and later runs are refused.
    #[tokio::test(start_paused = true)]
    async fn tc04_releases_resources() {
        let transport = Arc::new(ScriptedTransport::new().file("org/repo-0", "go.mod", "m"));
        let (coordinator, _events) = coordinator(test_config(), transport);

        coordinator
            .process_targets(fleet(3, "go.mod"), None)
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        let stats = coordinator.resources().stats();
        assert_eq!(stats.active, 0);
        assert!(stats.total_created >= 1);
        assert_eq!(stats.total_created, stats.total_cleaned);

        coordinator.cleanup();
        coordinator.cleanup();
        assert!(coordinator.resources().is_shut_down());

        let err = coordinator
            .process_targets(fleet(1, "go.mod"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::ResourcesShutDown));
    }

    // Scenario: the remote flakes twice, then rate limits once with a retry-after hint.
    // Expected Outcome: the item succeeds on its fourth attempt; retries are counted.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn tc05_retries_transient_and_rate_limited_failures() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .file("org/a", "Cargo.toml", "[package]")
                .then(
                    "org/a",
                    "Cargo.toml",
                    [
                        Reply::Transient,
                        Reply::Transient,
                        Reply::RateLimited(Some(Duration::from_millis(50))),
                    ],
                ),
        );
        let (coordinator, _events) = coordinator(test_config().retry(3, 10, 200), transport.clone());

        let results = coordinator
            .process_targets(vec![work_item("org/a", "Cargo.toml")], None)
            .await
            .unwrap();

        let outcome = &results.get("org/a").unwrap()[0];
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(transport.calls_for("org/a", "Cargo.toml"), 4);
        assert_eq!(coordinator.get_metrics().retries, 3);
        assert!(logs_contain("Retrying fetch"));
    }

    // Scenario: a terminal failure is returned for a forbidden repository.
    // Expected Outcome: no retry happens and the failure is classified as Forbidden.
    #[tokio::test(start_paused = true)]
    async fn tc06_does_not_retry_terminal_failures() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply("org/secret", "go.mod", Reply::Forbidden)
                .file("org/open", "go.mod", "m"),
        );
        let (coordinator, _events) = coordinator(test_config(), transport.clone());

        let results = coordinator
            .process_targets(
                vec![work_item("org/secret", "go.mod"), work_item("org/open", "go.mod")],
                None,
            )
            .await
            .unwrap();

        let failed = &results.get("org/secret").unwrap()[0];
        assert_eq!(failed.failure_kind(), Some(FailureKind::Forbidden));
        assert_eq!(failed.attempts, 1);
        assert_eq!(transport.calls_for("org/secret", "go.mod"), 1);
    }

    // Scenario: an archived repository is submitted with and without exclusion.
    // Expected Outcome: excluded archives are never fetched; included ones are.
    #[tokio::test(start_paused = true)]
    async fn tc07_archived_repositories() {
        let archived =
            || WorkItem::new(Repository::new("org", "legacy").archived(true), "pom.xml");
        let transport = Arc::new(ScriptedTransport::new().file("org/legacy", "pom.xml", "<p/>"));

        let (excluding, _events) = coordinator(test_config(), transport.clone());
        let results = excluding
            .process_targets(vec![archived()], None)
            .await
            .unwrap();
        assert_eq!(
            results.get("org/legacy").unwrap()[0].failure_kind(),
            Some(FailureKind::Archived)
        );
        assert_eq!(transport.calls(), 0);

        let (including, _events) =
            coordinator(test_config().exclude_archived(false), transport.clone());
        let results = including
            .process_targets(vec![archived()], None)
            .await
            .unwrap();
        assert!(results.get("org/legacy").unwrap()[0].success);
        assert_eq!(transport.calls(), 1);
    }

    // Scenario: the same fleet is scanned twice through a shared cache.
    // Expected Outcome: the second scan is served entirely from cache.
    #[tokio::test(start_paused = true)]
    async fn tc08_cache_serves_repeat_scans() {
        let mut transport = ScriptedTransport::new();
        for item in fleet(4, "requirements.txt") {
            transport = transport.file(&item.repo.full_name, "requirements.txt", "requests");
        }
        let transport = Arc::new(transport);
        let cache = Arc::new(InMemoryCache::new());
        let (coordinator, _events) = coordinator(test_config(), transport.clone());
        let coordinator = coordinator.with_cache(cache.clone());

        coordinator
            .process_targets(fleet(4, "requirements.txt"), None)
            .await
            .unwrap();
        let second = coordinator
            .process_targets(fleet(4, "requirements.txt"), None)
            .await
            .unwrap();

        assert!(second.outcomes().all(|o| o.cache_hit));
        assert_eq!(transport.calls(), 4);
        assert_eq!(cache.len(), 4);
        assert!((coordinator.get_metrics().cache_hit_rate() - 0.5).abs() < 1e-9);
    }

    // Scenario: many slow fetches against tight concurrency caps.
    // Expected Outcome: in-flight fetches never exceed the global or per-target cap.
    #[tokio::test(start_paused = true)]
    async fn tc09_respects_concurrency_caps() {
        let paths = ["package.json", "go.mod", "Cargo.toml", "pom.xml"];
        let mut transport = ScriptedTransport::new().latency(Duration::from_millis(100));
        let mut items = Vec::new();
        for repo in ["org/a", "org/b", "org/c"] {
            for path in paths {
                transport = transport.file(repo, path, "x");
                items.push(work_item(repo, path));
            }
        }
        let transport = Arc::new(transport);
        let config = test_config()
            .max_concurrent_requests(4)
            .max_concurrent_per_target(2)
            .batch_sizes(1, 12, 12);
        let (coordinator, _events) = coordinator(config, transport.clone());

        let results = coordinator
            .process_targets(items, Some(ExecutionStrategy::Parallel))
            .await
            .unwrap();

        assert_eq!(results.successful().count(), 12);
        assert!(transport.peak_in_flight() <= 4);
        for repo in ["org/a", "org/b", "org/c"] {
            assert!(transport.peak_in_flight_for(repo) <= 2);
        }
    }

    // Scenario: the remote reports a low remaining quota on every response.
    // Expected Outcome: later batches are paced and the limiter stays constrained.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn tc10_paces_batches_under_low_quota() {
        let mut transport = ScriptedTransport::new();
        for item in fleet(4, "go.mod") {
            transport = transport.file(&item.repo.full_name, "go.mod", "m");
        }
        transport.set_quota(QuotaSnapshot::new(20, FAR_FUTURE_EPOCH));
        let config = test_config().rate_limit(0.8, 0).batch_sizes(1, 2, 10);
        let (coordinator, _events) = coordinator(config, Arc::new(transport));

        let results = coordinator
            .process_targets(fleet(4, "go.mod"), Some(ExecutionStrategy::Sequential))
            .await
            .unwrap();

        assert_eq!(results.successful().count(), 4);
        assert!(results.duration >= Duration::from_secs(3));
        assert!(coordinator.rate_limiter().multiplier() > 1.0);
        assert!(coordinator.rate_limiter().is_constrained());
        assert!(logs_contain("Pacing before batch"));
    }

    // Scenario: every fetch fails transiently until retries are exhausted.
    // Expected Outcome: the run reports that no target could be processed.
    #[tokio::test(start_paused = true)]
    async fn tc11_reports_when_nothing_was_processed() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply("org/a", "go.mod", Reply::Transient)
                .reply("org/b", "go.mod", Reply::Transient),
        );
        let (coordinator, _events) = coordinator(test_config(), transport);

        let err = coordinator
            .process_targets(
                vec![work_item("org/a", "go.mod"), work_item("org/b", "go.mod")],
                None,
            )
            .await
            .unwrap_err();

        match err {
            RunError::NoTargetsProcessed {
                attempted,
                last_error,
            } => {
                assert_eq!(attempted, 2);
                assert!(last_error.contains("502"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // Scenario: results are exported as JSON for downstream tooling.
    // Expected Outcome: outcomes serialize grouped by target.
    #[tokio::test(start_paused = true)]
    async fn tc12_results_serialize_by_target() {
        let transport = Arc::new(ScriptedTransport::new().file("org/a", "go.mod", "module a"));
        let (coordinator, _events) = coordinator(test_config(), transport);

        let results = coordinator
            .process_targets(vec![work_item("org/a", "go.mod")], None)
            .await
            .unwrap();
        let json = serde_json::to_value(&results).unwrap();

        assert_eq!(json["results"]["org/a"][0]["success"], true);
        assert_eq!(
            json["results"]["org/a"][0]["content"]["content"],
            "module a"
        );
    }

    fn streamed_fleet_transport(count: usize) -> ScriptedTransport {
        let mut transport = ScriptedTransport::new().latency(Duration::from_millis(100));
        for item in fleet(count, "go.mod") {
            transport = transport.file(&item.repo.full_name, "go.mod", "module x");
        }
        transport
    }

    fn three_concurrent_chunks() -> StreamingConfig {
        StreamingConfig {
            chunk_size: 5,
            stream_threshold: 10,
            max_concurrent_chunks: 3,
            ..Default::default()
        }
    }

    // Scenario: a sequential run is large enough to stream as three concurrent chunks.
    // Expected Outcome: only one fetch is ever in flight across all chunks.
    #[tokio::test(start_paused = true)]
    async fn tc13_sequential_streaming_fetches_one_at_a_time() {
        let transport = Arc::new(streamed_fleet_transport(15));
        let config = test_config().streaming(three_concurrent_chunks());
        let (coordinator, _events) = coordinator(config, transport.clone());

        let results = coordinator
            .process_targets(fleet(15, "go.mod"), Some(ExecutionStrategy::Sequential))
            .await
            .unwrap();

        assert_eq!(results.successful().count(), 15);
        assert_eq!(coordinator.streaming_stats().chunks_processed, 3);
        assert_eq!(transport.peak_in_flight(), 1);
    }

    // Scenario: a conservative run with a cap of nine streams as three concurrent chunks.
    // Expected Outcome: the run never exceeds a third of the cap in flight.
    #[tokio::test(start_paused = true)]
    async fn tc14_conservative_streaming_keeps_reduced_concurrency() {
        let transport = Arc::new(streamed_fleet_transport(15));
        let config = test_config()
            .max_concurrent_requests(9)
            .streaming(three_concurrent_chunks());
        let (coordinator, _events) = coordinator(config, transport.clone());

        let results = coordinator
            .process_targets(fleet(15, "go.mod"), Some(ExecutionStrategy::Conservative))
            .await
            .unwrap();

        assert_eq!(results.successful().count(), 15);
        assert!(coordinator.streaming_stats().peak_concurrent_chunks > 1);
        assert_eq!(transport.peak_in_flight(), 3);
    }
}
