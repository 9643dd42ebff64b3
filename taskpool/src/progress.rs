use std::collections::HashMap;

use garimpo_lib::{Task, TaskStatus};
use redis::RedisResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{impl_display_using_json, impl_redis_value, PoolResult, TaskStore};

/// Stored per investigation under `progress:{investigation_id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ProgressRecord {
    task_states: HashMap<String, TaskStatus>,
    total: u32,
    completed: u32,
    failed: u32,
    running: u32,
    cancelled: u32,
    /// Set once `cancel_investigation` ran; running tasks consult it at
    /// their terminal transition to skip re-enqueueing.
    #[serde(default)]
    cancel_requested: bool,
}

impl_redis_value!(ProgressRecord);

impl ProgressRecord {
    fn leave_bucket(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Running => self.running = self.running.saturating_sub(1),
            TaskStatus::Completed => self.completed = self.completed.saturating_sub(1),
            TaskStatus::Failed => self.failed = self.failed.saturating_sub(1),
            TaskStatus::Cancelled => self.cancelled = self.cancelled.saturating_sub(1),
            // Pending and Retrying live in the derived `pending` bucket.
            TaskStatus::Pending | TaskStatus::Retrying => {}
        }
    }

    fn enter_bucket(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
            TaskStatus::Pending | TaskStatus::Retrying => {}
        }
    }
}

/// Point-in-time view of an investigation, as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressSnapshot {
    pub investigation_id: String,
    #[schema(value_type = Object)]
    pub task_states: HashMap<String, TaskStatus>,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub running: u32,
    pub cancelled: u32,
    pub pending: u32,
    /// Share of settled (completed + failed) tasks, 0.0..=100.0.
    pub percentage: f64,
}

impl_display_using_json!(ProgressSnapshot);

impl ProgressSnapshot {
    fn empty(investigation_id: &str) -> Self {
        Self {
            investigation_id: investigation_id.to_string(),
            task_states: HashMap::new(),
            total: 0,
            completed: 0,
            failed: 0,
            running: 0,
            cancelled: 0,
            pending: 0,
            percentage: 0.0,
        }
    }
}

/// Per-investigation map of task states plus derived counters.
///
/// All mutations arrive from the queue manager, the workers and the
/// cancellation path; the tracker has no scheduling of its own.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    store: TaskStore,
}

impl ProgressTracker {
    pub fn new(store: TaskStore) -> Self {
        Self { store }
    }

    fn key(investigation_id: &str) -> String {
        format!("progress:{investigation_id}")
    }

    fn load(&mut self, investigation_id: &str) -> PoolResult<ProgressRecord> {
        let result: RedisResult<ProgressRecord> =
            self.store.conn()?.get(&Self::key(investigation_id));
        match result {
            Ok(record) => Ok(record),
            Err(e) if e.kind() == redis::ErrorKind::TypeError => Ok(ProgressRecord::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, investigation_id: &str, record: &ProgressRecord) -> PoolResult<()> {
        let ttl = self.store.ttl();
        self.store
            .conn()?
            .set_ex(Self::key(investigation_id), record.clone(), ttl)?;
        Ok(())
    }

    /// Account for a task entering the pipeline. `total` grows only on the
    /// first enqueue of an id; retry re-admissions leave it untouched.
    pub fn on_enqueued(&mut self, task: &Task) -> PoolResult<()> {
        let mut record = self.load(&task.investigation_id)?;
        if !record.task_states.contains_key(&task.id) {
            record.total += 1;
        }
        record
            .task_states
            .insert(task.id.clone(), TaskStatus::Pending);
        self.save(&task.investigation_id, &record)
    }

    /// Move a task between counter buckets following a status transition.
    pub fn on_transition(
        &mut self,
        investigation_id: &str,
        task_id: &str,
        new_status: TaskStatus,
    ) -> PoolResult<()> {
        let mut record = self.load(investigation_id)?;
        match record.task_states.get(task_id).copied() {
            Some(old_status) => record.leave_bucket(old_status),
            None => record.total += 1,
        }
        record.enter_bucket(new_status);
        record.task_states.insert(task_id.to_string(), new_status);
        self.save(investigation_id, &record)
    }

    /// Flag the investigation as cancelled; running tasks read this at their
    /// terminal transition and give up their remaining attempts.
    pub fn request_cancel(&mut self, investigation_id: &str) -> PoolResult<()> {
        let mut record = self.load(investigation_id)?;
        record.cancel_requested = true;
        self.save(investigation_id, &record)
    }

    pub fn cancel_requested(&mut self, investigation_id: &str) -> PoolResult<bool> {
        Ok(self.load(investigation_id)?.cancel_requested)
    }

    pub fn snapshot(&mut self, investigation_id: &str) -> PoolResult<ProgressSnapshot> {
        let record = self.load(investigation_id)?;
        if record.total == 0 && record.task_states.is_empty() {
            return Ok(ProgressSnapshot::empty(investigation_id));
        }

        let settled = record.completed + record.failed;
        let percentage = if record.total > 0 {
            let raw = settled as f64 / record.total as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        };
        let pending = record
            .total
            .saturating_sub(record.completed + record.failed + record.running + record.cancelled);

        Ok(ProgressSnapshot {
            investigation_id: investigation_id.to_string(),
            task_states: record.task_states,
            total: record.total,
            completed: record.completed,
            failed: record.failed,
            running: record.running,
            cancelled: record.cancelled,
            pending,
            percentage,
        })
    }
}
