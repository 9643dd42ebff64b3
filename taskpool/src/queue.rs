use std::collections::HashMap;

use chrono::Utc;
use garimpo_lib::{Priority, Source, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{BreakerRegistry, PoolError, PoolResult, ProgressTracker, TaskStore};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceQueueStats {
    pub source: Source,
    #[schema(value_type = Object)]
    pub bands: HashMap<Priority, u64>,
    pub queued: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    pub sources: Vec<SourceQueueStats>,
    pub total_queued: u64,
}

/// Priority-banded dispatch queues: one sorted set per (source, priority),
/// members are task ids, scores are enqueue times in epoch millis.
///
/// Admission and dispatch are decoupled on purpose: `enqueue` consults the
/// circuit breaker, `dequeue` does not, so an open breaker stops new work
/// while already-admitted work keeps draining.
#[derive(Debug, Clone)]
pub struct QueueManager {
    store: TaskStore,
    breaker: BreakerRegistry,
    progress: ProgressTracker,
}

impl QueueManager {
    pub fn new(store: TaskStore, breaker: BreakerRegistry, progress: ProgressTracker) -> Self {
        Self {
            store,
            breaker,
            progress,
        }
    }

    fn band_key(source: Source, priority: Priority) -> String {
        format!("queue:{}:{}", source, u8::from(priority))
    }

    /// Admit a new task: persist the record as PENDING, place its id in the
    /// band matching its priority, and grow the investigation's `total`.
    pub fn enqueue(&mut self, task: &Task) -> PoolResult<()> {
        if self.breaker.is_open(task.source)? {
            return Err(PoolError::AdmissionRefused(task.source));
        }

        let mut task = task.clone();
        task.status = TaskStatus::Pending;
        self.store.put(&task)?;
        self.store.conn()?.zadd(
            &Self::band_key(task.source, task.priority),
            &task.id,
            Utc::now().timestamp_millis(),
        )?;
        self.progress.on_enqueued(&task)?;

        tracing::info!(
            "QueueManager.enqueue: {} ({}, {})",
            task.id,
            task.source,
            task.priority
        );
        Ok(())
    }

    /// Put a known-admitted task back into its band. Used by the retry pump;
    /// skips the breaker (the task was admitted before) and does not touch
    /// the investigation's `total`.
    pub fn requeue(&mut self, task: &Task) -> PoolResult<()> {
        self.store.conn()?.zadd(
            &Self::band_key(task.source, task.priority),
            &task.id,
            Utc::now().timestamp_millis(),
        )?;
        Ok(())
    }

    /// Pop the most urgent queued task for `source` and flip it to RUNNING.
    ///
    /// Bands are scanned CRITICAL→BACKGROUND; within a band the oldest
    /// enqueue wins. Stale ids (expired or already-terminal records) are
    /// dropped and the scan continues.
    pub fn dequeue(&mut self, source: Source) -> PoolResult<Option<Task>> {
        for priority in Priority::bands() {
            let band = Self::band_key(source, priority);
            loop {
                let Some(task_id) = self.store.conn()?.zfirst(&band)? else {
                    break;
                };
                if self.store.conn()?.zrem(&band, &task_id)? == 0 {
                    // Another consumer raced us to this id.
                    continue;
                }

                match self.store.get(&task_id)? {
                    None => {
                        tracing::warn!(
                            "QueueManager.dequeue: dropping stale queue entry {task_id} (record gone)"
                        );
                        continue;
                    }
                    Some(task) if task.status != TaskStatus::Pending => {
                        tracing::warn!(
                            "QueueManager.dequeue: dropping {task_id}, no longer pending ({})",
                            task.status
                        );
                        continue;
                    }
                    Some(_) => {
                        let running = self.store.mutate(&task_id, |task| {
                            task.status = TaskStatus::Running;
                            task.started_at = Some(Utc::now());
                        })?;
                        self.progress.on_transition(
                            &running.investigation_id,
                            &running.id,
                            TaskStatus::Running,
                        )?;
                        return Ok(Some(running));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Drop a task id from its band; used by cancellation.
    pub fn remove(&mut self, task: &Task) -> PoolResult<usize> {
        let removed = self
            .store
            .conn()?
            .zrem(&Self::band_key(task.source, task.priority), &task.id)?;
        Ok(removed)
    }

    pub fn stats(&mut self, source: Option<Source>) -> PoolResult<QueueStats> {
        let sources: Vec<Source> = match source {
            Some(source) => vec![source],
            None => Source::all().to_vec(),
        };

        let mut out = Vec::with_capacity(sources.len());
        let mut total_queued = 0;
        for source in sources {
            let mut bands = HashMap::new();
            let mut queued = 0;
            for priority in Priority::bands() {
                let depth = self
                    .store
                    .conn()?
                    .zcard(&Self::band_key(source, priority))?;
                queued += depth;
                bands.insert(priority, depth);
            }
            total_queued += queued;
            out.push(SourceQueueStats {
                source,
                bands,
                queued,
            });
        }

        Ok(QueueStats {
            sources: out,
            total_queued,
        })
    }
}
