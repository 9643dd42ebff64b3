use std::time::Duration;

use chrono::Utc;
use garimpo_lib::TaskStatus;
use garimpo_taskpool::{PoolResult, ProgressTracker, QueueManager, RetryScheduler, TaskStore};
use tokio_util::sync::CancellationToken;

use crate::Dispatcher;

/// Background pump that promotes due retry slots back into their source's
/// priority band. Promotion skips the circuit breaker: a parked task was
/// admitted once and is only being resumed.
pub struct RetryPump {
    store: TaskStore,
    queue: QueueManager,
    retry: RetryScheduler,
    progress: ProgressTracker,
    interval: Duration,
}

impl RetryPump {
    pub fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            store: dispatcher.store.clone(),
            queue: dispatcher.queue.clone(),
            retry: dispatcher.retry.clone(),
            progress: dispatcher.progress.clone(),
            interval: dispatcher.config.retry_pump_interval(),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("RetryPump started, tick {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.pump_once() {
                        tracing::error!("RetryPump: {e}");
                    }
                }
            }
        }
        tracing::info!("RetryPump stopped");
    }

    /// Drain every due slot once; returns how many tasks were re-queued.
    pub fn pump_once(&mut self) -> PoolResult<usize> {
        let due = self.retry.drain_due(Utc::now())?;
        let mut promoted = 0;

        for task_id in due {
            match self.store.get(&task_id)? {
                None => {
                    tracing::warn!("RetryPump: dropping slot for {task_id}, record gone");
                }
                Some(task) if task.status != TaskStatus::Retrying => {
                    // Cancelled (or otherwise settled) while parked.
                    tracing::info!(
                        "RetryPump: discarding slot for {task_id}, status {}",
                        task.status
                    );
                }
                Some(_) => {
                    let pending = self.store.mutate(&task_id, |task| {
                        task.status = TaskStatus::Pending;
                    })?;
                    self.progress.on_transition(
                        &pending.investigation_id,
                        &pending.id,
                        TaskStatus::Pending,
                    )?;
                    self.queue.requeue(&pending)?;
                    promoted += 1;
                }
            }
        }

        if promoted > 0 {
            tracing::info!("RetryPump: promoted {promoted} task(s)");
        }
        Ok(promoted)
    }
}
