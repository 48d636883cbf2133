use super::{BatchCoordinator, batch::RunContext};
use crate::retry::{classify_fetch_error, failure_kind};
use engine_core::retry::Attempted;
use model::records::{
    outcome::{FailureKind, Outcome},
    work_item::WorkItem,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::{sync::Semaphore, time::Instant};
use tracing::{debug, warn};

/// Per-target admission caps for one run.
#[derive(Debug)]
pub(crate) struct TargetPermits {
    limit: usize,
    by_target: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl TargetPermits {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            by_target: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, target: &str) -> Arc<Semaphore> {
        // Entries are only ever inserted, so a poisoned map is still usable.
        let mut map = self
            .by_target
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.entry(target.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limit)))
            .clone()
    }
}

impl BatchCoordinator {
    /// Resolves one item to its final outcome. Never fails; errors become outcomes.
    pub(crate) async fn process_item(&self, item: WorkItem, ctx: &RunContext<'_>) -> Outcome {
        let started = Instant::now();

        if self.config.exclude_archived() && item.repo.archived {
            let outcome = Outcome::failed(
                item,
                FailureKind::Archived,
                "repository is archived",
                started.elapsed(),
                1,
            );
            self.metrics
                .record_attempt(false, false, 0, outcome.elapsed);
            self.progress.record_item(false);
            return outcome;
        }

        let _run_permit = match &ctx.in_flight {
            Some(slots) => slots.acquire().await.ok(),
            None => None,
        };
        let target_slot = ctx.targets.semaphore(item.target_key());
        let _target_permit = target_slot.acquire_owned().await.ok();
        let _global_permit = self.permits.clone().acquire_owned().await.ok();

        let cache_key = self.cache.as_ref().map(|_| (self.cache_key)(&item));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(content) = cache.get(key).await {
                let elapsed = started.elapsed();
                self.metrics
                    .record_attempt(true, true, content.size_bytes, elapsed);
                self.progress.record_item(true);
                debug!(repo = %item.target_key(), path = %item.path, "Cache hit");
                return Outcome::succeeded(item, content, true, elapsed, 1);
            }
            self.metrics.increment_cache_misses(1);
        }

        let transport = &self.transport;
        let limiter = &self.limiter;
        let metrics = &self.metrics;
        let repo = &item.repo;
        let path = item.path.as_str();

        let result = self
            .retry
            .run(
                move |_| async move {
                    let attempt_started = Instant::now();
                    let result = transport.fetch(repo, path).await;
                    if let Some(quota) = transport.current_quota() {
                        limiter.observe(quota);
                    }
                    let bytes = result.as_ref().map(|c| c.size_bytes).unwrap_or(0);
                    metrics.record_attempt(result.is_ok(), false, bytes, attempt_started.elapsed());
                    result
                },
                classify_fetch_error,
                |attempt, err| {
                    metrics.increment_retries(1);
                    debug!(repo = %repo, path, attempt, error = %err, "Retrying fetch");
                },
            )
            .await;

        let elapsed = started.elapsed();
        let outcome = match result {
            Ok(Attempted { value, attempts }) => {
                if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
                    cache.put(key, value.clone()).await;
                }
                Outcome::succeeded(item, value, false, elapsed, attempts)
            }
            Err(err) => {
                let attempts = err.attempts();
                let error = err.into_inner();
                let kind = failure_kind(&error);
                if !kind.is_terminal() {
                    warn!(
                        repo = %item.repo,
                        path = %item.path,
                        attempts,
                        error = %error,
                        "Fetch failed after retries"
                    );
                }
                Outcome::failed(item, kind, error.to_string(), elapsed, attempts)
            }
        };

        self.progress.record_item(outcome.success);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisoned_target_map_keeps_shared_caps() {
        let permits = TargetPermits::new(2);
        let before = permits.semaphore("org/a");

        std::thread::scope(|s| {
            let poisoned = s
                .spawn(|| {
                    let _map = permits.by_target.lock().unwrap();
                    panic!("holder panicked");
                })
                .join();
            assert!(poisoned.is_err());
        });
        assert!(permits.by_target.is_poisoned());

        let after = permits.semaphore("org/a");
        assert!(Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&after, &permits.semaphore("org/a")));
        assert_eq!(after.available_permits(), 2);
    }
}
