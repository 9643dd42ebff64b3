use std::collections::HashMap;

use chrono::{DateTime, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::source::Source;

/// Priority band of a queued task. Lower number wins.
#[derive(
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Clone,
    Copy,
    Deserialize,
    Serialize,
    ToSchema,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Priority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    Background = 5,
}

impl Priority {
    /// All bands from most to least urgent, the order dequeue scans them.
    pub fn bands() -> [Priority; 5] {
        [
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
            Priority::Background,
        ]
    }

    /// Shift by `offset` bands, saturating at CRITICAL and BACKGROUND.
    pub fn nudge(self, offset: i8) -> Priority {
        let band = (u8::from(self) as i16 + offset as i16).clamp(1, 5);
        Priority::try_from(band as u8).expect("band clamped to 1..=5")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Lifecycle state of a task.
pub enum TaskStatus {
    /// Queued in a priority band, waiting for its worker.
    Pending,
    /// Picked up by a worker, probe in flight.
    Running,
    /// Probe returned a result.
    Completed,
    /// Probe failed on its last allowed attempt.
    Failed,
    /// Parked in the retry set waiting for its next attempt.
    Retrying,
    /// Removed before completion by an investigation cancel.
    Cancelled,
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical unit of work: one probe invocation against one source.
///
/// The record is owned by the task store; queues, retry slots and progress
/// counters only hold the id.
#[derive(PartialEq, Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct Task {
    pub id: String,
    pub source: Source,
    pub priority: Priority,
    pub investigation_id: String,
    /// Opaque parameters handed verbatim to the probe.
    #[schema(value_type = Object)]
    pub params: HashMap<String, serde_json::Value>,
    pub status: TaskStatus,
    /// Completed attempts so far. Incremented on every failure.
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last failure message.
    pub error: Option<String>,
    /// Probe output, opaque to the pipeline.
    #[schema(value_type = Object)]
    pub result: Option<serde_json::Value>,
}

impl Task {
    pub fn new(
        id: String,
        source: Source,
        priority: Priority,
        investigation_id: String,
        params: HashMap<String, serde_json::Value>,
        max_attempts: u32,
    ) -> Self {
        Self {
            id,
            source,
            priority,
            investigation_id,
            params,
            status: TaskStatus::Pending,
            attempt: 0,
            max_attempts,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_nudge_saturates() {
        assert_eq!(Priority::Normal.nudge(-1), Priority::High);
        assert_eq!(Priority::Normal.nudge(1), Priority::Low);
        assert_eq!(Priority::Critical.nudge(-1), Priority::Critical);
        assert_eq!(Priority::Background.nudge(3), Priority::Background);
        assert_eq!(Priority::Normal.nudge(0), Priority::Normal);
    }

    #[test]
    fn test_band_order() {
        let bands = Priority::bands();
        for pair in bands.windows(2) {
            assert!(u8::from(pair[0]) < u8::from(pair[1]));
        }
    }

    #[test]
    fn test_terminal_split() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new(
            "inv-1_car_0a1b2c3d".to_string(),
            Source::Car,
            Priority::Normal,
            "inv-1".to_string(),
            HashMap::new(),
            3,
        );
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt, 0);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
    }
}
