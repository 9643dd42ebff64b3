use std::time::Duration;

use chrono::{DateTime, Utc};
use garimpo_lib::Task;

use crate::{PoolResult, TaskStore};

/// The shared time-indexed set of parked tasks, keyed `retry`, scored by
/// due time in epoch millis.
const RETRY_KEY: &str = "retry";

/// Parks failed tasks until their next attempt is due.
///
/// The delay grows exponentially with the attempt count and is clamped, so
/// transient upstream outages are absorbed without starving long-running
/// investigations.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    store: TaskStore,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryScheduler {
    pub fn new(store: TaskStore, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            store,
            base_delay,
            max_delay,
        }
    }

    /// `base * 2^attempt`, clamped to the configured maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(20))
            .min(self.max_delay)
    }

    /// Park `task` until its backoff elapses. The caller is responsible for
    /// having flipped the record to RETRYING first.
    pub fn schedule(&mut self, task: &Task) -> PoolResult<DateTime<Utc>> {
        let delay = self.delay_for(task.attempt);
        let due_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        self.store
            .conn()?
            .zadd(RETRY_KEY, &task.id, due_at.timestamp_millis())?;
        tracing::info!(
            "RetryScheduler.schedule: {} attempt {} due in {:?}",
            task.id,
            task.attempt,
            delay
        );
        Ok(due_at)
    }

    /// Remove and return every task id whose due time has passed.
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> PoolResult<Vec<String>> {
        let due = self
            .store
            .conn()?
            .zrangebyscore_upto(RETRY_KEY, now.timestamp_millis())?;

        let mut drained = Vec::with_capacity(due.len());
        for task_id in due {
            // Keep only the ids we actually removed, in case another pump
            // instance drained the same window.
            if self.store.conn()?.zrem(RETRY_KEY, &task_id)? > 0 {
                drained.push(task_id);
            }
        }
        Ok(drained)
    }

    /// Drop a parked task's slot; used by cancellation.
    pub fn remove(&mut self, task_id: &str) -> PoolResult<usize> {
        let removed = self.store.conn()?.zrem(RETRY_KEY, task_id)?;
        Ok(removed)
    }

    pub fn parked(&mut self) -> PoolResult<u64> {
        let count = self.store.conn()?.zcard(RETRY_KEY)?;
        Ok(count)
    }
}
