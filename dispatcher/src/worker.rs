use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use garimpo_hub::NotificationHub;
use garimpo_lib::{Probe, Source, Task, TaskStatus};
use garimpo_taskpool::{
    BreakerRegistry, PoolResult, ProgressTracker, QueueManager, RetryScheduler, TaskStore,
};
use tokio_util::sync::CancellationToken;

use crate::Dispatcher;

/// One logical worker per source: drains that source's priority bands,
/// runs the probe under the per-source deadline and records the outcome.
pub struct Worker {
    source: Source,
    probe: Arc<dyn Probe>,
    timeout: Duration,
    idle_delay: Duration,
    store: TaskStore,
    queue: QueueManager,
    retry: RetryScheduler,
    breaker: BreakerRegistry,
    progress: ProgressTracker,
    hub: NotificationHub,
}

impl Worker {
    pub fn new(source: Source, probe: Arc<dyn Probe>, dispatcher: &Dispatcher) -> Self {
        Self {
            source,
            probe,
            timeout: dispatcher.config.worker_timeout(source),
            idle_delay: dispatcher.config.worker_idle_delay(),
            store: dispatcher.store.clone(),
            queue: dispatcher.queue.clone(),
            retry: dispatcher.retry.clone(),
            breaker: dispatcher.breaker.clone(),
            progress: dispatcher.progress.clone(),
            hub: dispatcher.hub.clone(),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Worker {} started", self.source);
        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Storage faults surface here; log and keep looping.
            let processed = match self.step().await {
                Ok(processed) => processed,
                Err(e) => {
                    tracing::error!("Worker {}: {e}", self.source);
                    false
                }
            };

            if !processed {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_delay) => {}
                }
            }
        }
        tracing::info!("Worker {} stopped", self.source);
    }

    /// Process at most one task; returns whether one was processed.
    async fn step(&mut self) -> PoolResult<bool> {
        let Some(task) = self.queue.dequeue(self.source)? else {
            return Ok(false);
        };

        self.hub.notify_task_started(&task);
        tracing::info!("Worker {}: running {}", self.source, task.id);

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.probe.probe(&task.params)).await;
        match outcome {
            Ok(Ok(result)) => {
                garimpo_metrics::observe_probe_duration(
                    self.source.as_str(),
                    "success",
                    started.elapsed(),
                );
                self.complete(task, result)?;
            }
            Ok(Err(error)) => {
                garimpo_metrics::observe_probe_duration(
                    self.source.as_str(),
                    "failure",
                    started.elapsed(),
                );
                self.handle_failure(task, error.to_string())?;
            }
            Err(_elapsed) => {
                garimpo_metrics::observe_probe_duration(
                    self.source.as_str(),
                    "timeout",
                    started.elapsed(),
                );
                self.handle_failure(
                    task,
                    format!("probe timed out after {}s", self.timeout.as_secs()),
                )?;
            }
        }
        Ok(true)
    }

    fn complete(&mut self, task: Task, result: serde_json::Value) -> PoolResult<()> {
        let completed = self.store.mutate(&task.id, |task| {
            task.status = TaskStatus::Completed;
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
        })?;

        self.progress.on_transition(
            &completed.investigation_id,
            &completed.id,
            TaskStatus::Completed,
        )?;
        self.breaker.record_success(self.source)?;
        garimpo_metrics::inc_task_outcome_count(self.source.as_str(), "completed");

        self.hub.notify_task_completed(&completed);
        let snapshot = self.progress.snapshot(&completed.investigation_id)?;
        self.hub.notify_investigation_progress(&snapshot);
        Ok(())
    }

    /// Shared failure path for probe errors and timeouts: either park the
    /// task for another attempt or settle it as FAILED, and account the
    /// failure on the breaker either way.
    fn handle_failure(&mut self, task: Task, error: String) -> PoolResult<()> {
        // A cancelled investigation forfeits the remaining attempts.
        let cancel_requested = self.progress.cancel_requested(&task.investigation_id)?;
        let will_retry = task.attempt + 1 < task.max_attempts && !cancel_requested;

        let updated = self.store.mutate(&task.id, |task| {
            task.attempt += 1;
            task.error = Some(error.clone());
            if will_retry {
                task.status = TaskStatus::Retrying;
            } else {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(Utc::now());
            }
        })?;

        let (failures, just_opened) = self.breaker.record_failure(self.source)?;
        if just_opened {
            garimpo_metrics::inc_circuit_breaker_opened_count(self.source.as_str());
            self.hub.notify_circuit_breaker_opened(self.source, failures);
        }

        if will_retry {
            self.progress.on_transition(
                &updated.investigation_id,
                &updated.id,
                TaskStatus::Retrying,
            )?;
            self.retry.schedule(&updated)?;
            garimpo_metrics::inc_task_retry_scheduled_count(self.source.as_str());
            self.hub.notify_task_retrying(&updated);
        } else {
            self.progress.on_transition(
                &updated.investigation_id,
                &updated.id,
                TaskStatus::Failed,
            )?;
            garimpo_metrics::inc_task_outcome_count(self.source.as_str(), "failed");
            tracing::error!(
                "Worker {}: {} failed after {} attempt(s): {error}",
                self.source,
                updated.id,
                updated.attempt
            );
            self.hub.notify_task_failed(&updated);
            let snapshot = self.progress.snapshot(&updated.investigation_id)?;
            self.hub.notify_investigation_progress(&snapshot);
        }
        Ok(())
    }
}
