use super::{BatchCoordinator, item::TargetPermits};
use crate::{error::RunError, strategy::ExecutionBounds};
use chrono::Utc;
use engine_monitoring::collector::OperationRecord;
use futures::{StreamExt, stream};
use model::{
    core::strategy::ExecutionStrategy,
    events::run::RunEvent,
    records::{batch::Batch, outcome::Outcome, work_item::WorkItem},
};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::Semaphore,
    time::{Instant, sleep},
};
use tracing::{info, warn};

/// Shared per-run context threaded through batch execution.
pub(crate) struct RunContext<'a> {
    pub run_id: &'a str,
    pub strategy: ExecutionStrategy,
    pub targets: TargetPermits,
    /// Run-wide fetch cap shared by concurrently streamed chunks.
    pub in_flight: Option<Semaphore>,
    pub cancelled: AtomicBool,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        run_id: &'a str,
        strategy: ExecutionStrategy,
        per_target: usize,
        run_concurrency: Option<usize>,
    ) -> Self {
        Self {
            run_id,
            strategy,
            targets: TargetPermits::new(per_target),
            in_flight: run_concurrency.map(|n| Semaphore::new(n.max(1))),
            cancelled: AtomicBool::new(false),
        }
    }
}

impl BatchCoordinator {
    /// Holds admission while memory is critical. Returns `false` if the run was
    /// cancelled while waiting.
    pub(crate) async fn wait_for_admission(&self, run_id: &str) -> bool {
        if !self.memory.is_critical() {
            return true;
        }

        let paused = Instant::now();
        let pressure = self.memory.pressure();
        warn!(run_id, pressure, "Memory critical, pausing batch admission");
        self.emit(RunEvent::AdmissionPaused {
            run_id: run_id.to_string(),
            memory_percent: pressure * 100.0,
            timestamp: Utc::now(),
        });

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = sleep(self.config.memory_poll_interval()) => {}
            }
            self.memory.sample();
            self.resources.reclaim_under_pressure(&self.memory);
            if !self.memory.is_critical() {
                break;
            }
        }

        let paused_ms = paused.elapsed().as_millis() as u64;
        info!(run_id, paused_ms, "Memory recovered, resuming batch admission");
        self.emit(RunEvent::AdmissionResumed {
            run_id: run_id.to_string(),
            paused_ms,
            timestamp: Utc::now(),
        });
        true
    }

    /// Admits batches one after another, resizing between them.
    pub(crate) async fn run_batched(
        &self,
        ctx: &RunContext<'_>,
        items: Vec<WorkItem>,
        sink: &mut Vec<Outcome>,
    ) -> Result<(), RunError> {
        let mut queue: VecDeque<WorkItem> = items.into();
        let mut bounds = self.strategy.initial_bounds(ctx.strategy);
        bounds.batch_size = self.memory.adjusted_batch_size(bounds.batch_size);
        let mut sequence = 0;

        while !queue.is_empty() {
            if self.cancel.is_cancelled() || !self.wait_for_admission(ctx.run_id).await {
                ctx.cancelled.store(true, Ordering::Release);
                break;
            }

            let take = bounds.batch_size.min(queue.len());
            let batch = Batch::new(ctx.run_id, sequence, queue.drain(..take).collect());
            sequence += 1;

            sink.extend(self.run_batch(ctx, batch, bounds).await?);

            self.memory.sample();
            self.resources.reclaim_under_pressure(&self.memory);
            bounds = self
                .strategy
                .next_bounds(ctx.strategy, bounds, &self.memory, &self.limiter);
        }

        Ok(())
    }

    /// Streams oversized work in chunks; each chunk runs as one batch.
    pub(crate) async fn run_streaming(
        &self,
        ctx: &RunContext<'_>,
        items: Vec<WorkItem>,
        sink: &mut Vec<Outcome>,
    ) -> Result<(), RunError> {
        let bounds = self.strategy.initial_bounds(ctx.strategy);
        let mut first_error = None;

        self.streaming
            .process(
                items,
                move |sequence, chunk| async move {
                    if self.cancel.is_cancelled() || !self.wait_for_admission(ctx.run_id).await {
                        ctx.cancelled.store(true, Ordering::Release);
                        return Ok(Vec::new());
                    }
                    let batch = Batch::new(ctx.run_id, sequence, chunk);
                    self.run_batch(ctx, batch, bounds).await
                },
                |result| match result {
                    Ok(outcomes) => sink.extend(outcomes),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                },
            )
            .await;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Paces, then dispatches one batch through the bounded worker pool.
    /// Every item is accounted for before this returns.
    pub(crate) async fn run_batch(
        &self,
        ctx: &RunContext<'_>,
        batch: Batch,
        bounds: ExecutionBounds,
    ) -> Result<Vec<Outcome>, RunError> {
        let delay = self.limiter.current_delay();
        if !delay.is_zero() {
            info!(
                batch_id = %batch.id,
                delay_ms = delay.as_millis() as u64,
                "Pacing before batch to protect quota"
            );
            sleep(delay).await;
        }

        let len = batch.len();
        let mut buffer = self
            .resources
            .acquire_with(batch.id.clone(), Vec::with_capacity(len))
            .map_err(|_| RunError::ResourcesShutDown)?;

        let concurrency = bounds.concurrency.max(1);
        info!(
            batch_id = %batch.id,
            items = len,
            concurrency,
            "Dispatching batch"
        );
        self.emit(RunEvent::BatchStarted {
            run_id: ctx.run_id.to_string(),
            batch_id: batch.id.clone(),
            items: len,
            concurrency,
            timestamp: Utc::now(),
        });
        self.progress.set_batch_size(len);

        let started = Instant::now();
        let mut pending = stream::iter(batch.items)
            .map(|item| self.process_item(item, ctx))
            .buffer_unordered(concurrency);
        while let Some(outcome) = pending.next().await {
            buffer.push(outcome);
        }
        let elapsed = started.elapsed();

        drop(pending);
        let outcomes = std::mem::take(&mut *buffer);
        drop(buffer);

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let cache_hits = outcomes.iter().filter(|o| o.cache_hit).count();
        let failed = len - succeeded;

        self.metrics.record_batch(len);
        if self.config.performance_tracking() {
            self.collector.record(
                OperationRecord::new("batch", elapsed, len, succeeded, len, cache_hits)
                    .with_strategy(ctx.strategy),
            );
        }

        info!(
            batch_id = %batch.id,
            succeeded,
            failed,
            duration_ms = elapsed.as_millis() as u64,
            "Batch complete"
        );
        self.emit(RunEvent::BatchCompleted {
            run_id: ctx.run_id.to_string(),
            batch_id: batch.id,
            succeeded,
            failed,
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        });

        Ok(outcomes)
    }
}
