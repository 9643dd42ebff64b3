use std::collections::HashMap;

use chrono::Utc;
use garimpo_hub::{AlertLevel, NotificationHub};
use garimpo_lib::{PipelineConfig, Priority, Source, Task, TaskStatus};
use garimpo_taskpool::{
    BreakerRegistry, BreakerSnapshot, PoolError, PoolResult, ProgressSnapshot, ProgressTracker,
    QueueManager, RetryScheduler, TaskStore,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PipelineStats {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub queue: garimpo_taskpool::QueueStats,
    /// Tasks parked in the retry set.
    pub retry_parked: u64,
}

/// The thin API the REST layer talks to: launch investigations, inspect
/// tasks and progress, cancel. Cheap to clone; every clone shares the same
/// storage handles and hub.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) store: TaskStore,
    pub(crate) queue: QueueManager,
    pub(crate) retry: RetryScheduler,
    pub(crate) breaker: BreakerRegistry,
    pub(crate) progress: ProgressTracker,
    pub(crate) hub: NotificationHub,
    pub(crate) config: PipelineConfig,
}

impl Dispatcher {
    pub fn new(store: TaskStore, hub: NotificationHub, config: PipelineConfig) -> Self {
        let breaker = BreakerRegistry::new(
            store.clone(),
            config.breaker_threshold,
            config.breaker_recovery_window(),
        );
        let progress = ProgressTracker::new(store.clone());
        let queue = QueueManager::new(store.clone(), breaker.clone(), progress.clone());
        let retry = RetryScheduler::new(
            store.clone(),
            config.retry_base_delay(),
            config.retry_max_delay(),
        );

        Self {
            store,
            queue,
            retry,
            breaker,
            progress,
            hub,
            config,
        }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn new_task_id(investigation_id: &str, source: Source) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        format!("{investigation_id}_{source}_{}", &nonce[..8])
    }

    /// Fan an investigation out to every source.
    ///
    /// Each task gets the shared params and a per-source priority
    /// adjustment to smooth long-tail latency. Sources whose breaker is
    /// open are skipped; the returned map only holds admitted tasks.
    pub fn launch_investigation(
        &mut self,
        investigation_id: &str,
        params: HashMap<String, serde_json::Value>,
        priority: Priority,
    ) -> PoolResult<HashMap<Source, String>> {
        let mut task_ids = HashMap::new();

        for source in Source::all() {
            let adjusted = priority.nudge(self.config.priority_adjustment(source));
            let task = Task::new(
                Self::new_task_id(investigation_id, source),
                source,
                adjusted,
                investigation_id.to_string(),
                params.clone(),
                self.config.default_max_attempts,
            );

            match self.queue.enqueue(&task) {
                Ok(()) => {
                    garimpo_metrics::inc_task_enqueued_count(source.as_str(), adjusted.as_str());
                    task_ids.insert(source, task.id);
                }
                Err(PoolError::AdmissionRefused(source)) => {
                    garimpo_metrics::inc_task_admission_refused_count(source.as_str());
                    tracing::warn!(
                        "Dispatcher: skipping {source} for {investigation_id}, circuit breaker open"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Dispatcher: launched {} probe task(s) for investigation {investigation_id}",
            task_ids.len()
        );
        Ok(task_ids)
    }

    /// Enqueue one probe for one source. Unlike the fan-out, an open
    /// breaker surfaces as an error here.
    pub fn launch_single(
        &mut self,
        source: Source,
        investigation_id: &str,
        params: HashMap<String, serde_json::Value>,
        priority: Priority,
        max_attempts: Option<u32>,
    ) -> PoolResult<String> {
        let task = Task::new(
            Self::new_task_id(investigation_id, source),
            source,
            priority,
            investigation_id.to_string(),
            params,
            max_attempts.unwrap_or(self.config.default_max_attempts),
        );

        match self.queue.enqueue(&task) {
            Ok(()) => {
                garimpo_metrics::inc_task_enqueued_count(source.as_str(), priority.as_str());
                Ok(task.id)
            }
            Err(e) => {
                if let PoolError::AdmissionRefused(source) = &e {
                    garimpo_metrics::inc_task_admission_refused_count(source.as_str());
                }
                Err(e)
            }
        }
    }

    /// Fetch one task record.
    pub fn status(&mut self, task_id: &str) -> PoolResult<Option<Task>> {
        self.store.get(task_id)
    }

    pub fn progress(&mut self, investigation_id: &str) -> PoolResult<ProgressSnapshot> {
        self.progress.snapshot(investigation_id)
    }

    /// Cancel every queued or parked task of an investigation.
    ///
    /// RUNNING tasks are not preempted: they finish (or time out) and their
    /// failure handler sees the cancel flag and gives up remaining attempts.
    /// Returns how many tasks were actually cancelled; calling twice is a
    /// no-op the second time.
    pub fn cancel_investigation(&mut self, investigation_id: &str) -> PoolResult<u32> {
        self.progress.request_cancel(investigation_id)?;

        let snapshot = self.progress.snapshot(investigation_id)?;
        let mut cancelled = 0;
        for task_id in snapshot.task_states.keys() {
            let Some(task) = self.store.get(task_id)? else {
                continue;
            };
            if !matches!(task.status, TaskStatus::Pending | TaskStatus::Retrying) {
                continue;
            }

            let updated = self.store.mutate(task_id, |task| {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
            })?;
            self.queue.remove(&updated)?;
            self.retry.remove(task_id)?;
            self.progress
                .on_transition(investigation_id, task_id, TaskStatus::Cancelled)?;
            cancelled += 1;
        }

        tracing::info!("Dispatcher: cancelled {cancelled} task(s) of {investigation_id}");
        if cancelled > 0 {
            let snapshot = self.progress.snapshot(investigation_id)?;
            self.hub.notify_investigation_progress(&snapshot);
        }
        Ok(cancelled)
    }

    pub fn queue_stats(&mut self, source: Option<Source>) -> PoolResult<PipelineStats> {
        Ok(PipelineStats {
            queue: self.queue.stats(source)?,
            retry_parked: self.retry.parked()?,
        })
    }

    pub fn circuit_breaker(&mut self, source: Source) -> PoolResult<BreakerSnapshot> {
        self.breaker.snapshot(source)
    }

    /// Broadcast an operator alert to every connected client.
    pub fn system_alert(&self, level: AlertLevel, message: impl Into<String>) {
        self.hub.notify_system_alert(level, message);
    }
}
