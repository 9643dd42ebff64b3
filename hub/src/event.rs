use chrono::{DateTime, Utc};
use garimpo_lib::{Source, Task, TaskStatus};
use garimpo_taskpool::ProgressSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// Everything the hub can push to a client, tagged by `type` on the wire.
///
/// Task lifecycle events and progress snapshots are scoped to one
/// investigation; breaker openings and system alerts go to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Greeting sent right after a subscription is registered.
    Connected {
        investigation_id: String,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        investigation_id: String,
        task_id: String,
        source: Source,
        status: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        investigation_id: String,
        task_id: String,
        source: Source,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
    TaskRetrying {
        investigation_id: String,
        task_id: String,
        source: Source,
        status: TaskStatus,
        error: String,
        attempt: u32,
        max_attempts: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        investigation_id: String,
        task_id: String,
        source: Source,
        status: TaskStatus,
        error: String,
        attempt: u32,
        max_attempts: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    InvestigationProgress {
        investigation_id: String,
        total: u32,
        completed: u32,
        failed: u32,
        running: u32,
        cancelled: u32,
        pending: u32,
        percentage: f64,
        timestamp: DateTime<Utc>,
    },
    CircuitBreakerOpened {
        source: Source,
        failures: u32,
        timestamp: DateTime<Utc>,
    },
    SystemAlert {
        level: AlertLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn connected(investigation_id: &str) -> Self {
        Event::Connected {
            investigation_id: investigation_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_started(task: &Task) -> Self {
        Event::TaskStarted {
            investigation_id: task.investigation_id.clone(),
            task_id: task.id.clone(),
            source: task.source,
            status: TaskStatus::Running,
            timestamp: Utc::now(),
        }
    }

    pub fn task_completed(task: &Task) -> Self {
        Event::TaskCompleted {
            investigation_id: task.investigation_id.clone(),
            task_id: task.id.clone(),
            source: task.source,
            status: TaskStatus::Completed,
            result: task.result.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_retrying(task: &Task) -> Self {
        Event::TaskRetrying {
            investigation_id: task.investigation_id.clone(),
            task_id: task.id.clone(),
            source: task.source,
            status: TaskStatus::Retrying,
            error: task.error.clone().unwrap_or_default(),
            attempt: task.attempt,
            max_attempts: task.max_attempts,
            will_retry: true,
            timestamp: Utc::now(),
        }
    }

    pub fn task_failed(task: &Task) -> Self {
        Event::TaskFailed {
            investigation_id: task.investigation_id.clone(),
            task_id: task.id.clone(),
            source: task.source,
            status: TaskStatus::Failed,
            error: task.error.clone().unwrap_or_default(),
            attempt: task.attempt,
            max_attempts: task.max_attempts,
            will_retry: false,
            timestamp: Utc::now(),
        }
    }

    pub fn investigation_progress(snapshot: &ProgressSnapshot) -> Self {
        Event::InvestigationProgress {
            investigation_id: snapshot.investigation_id.clone(),
            total: snapshot.total,
            completed: snapshot.completed,
            failed: snapshot.failed,
            running: snapshot.running,
            cancelled: snapshot.cancelled,
            pending: snapshot.pending,
            percentage: snapshot.percentage,
            timestamp: Utc::now(),
        }
    }

    pub fn circuit_breaker_opened(source: Source, failures: u32) -> Self {
        Event::CircuitBreakerOpened {
            source,
            failures,
            timestamp: Utc::now(),
        }
    }

    pub fn system_alert(level: AlertLevel, message: impl Into<String>) -> Self {
        Event::SystemAlert {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// The wire tag, used as a metrics label.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "connected",
            Event::TaskStarted { .. } => "task_started",
            Event::TaskCompleted { .. } => "task_completed",
            Event::TaskRetrying { .. } => "task_retrying",
            Event::TaskFailed { .. } => "task_failed",
            Event::InvestigationProgress { .. } => "investigation_progress",
            Event::CircuitBreakerOpened { .. } => "circuit_breaker_opened",
            Event::SystemAlert { .. } => "system_alert",
        }
    }

    /// The investigation this event is scoped to; `None` for system-wide
    /// events, which fan out to every subscriber.
    pub fn investigation_id(&self) -> Option<&str> {
        match self {
            Event::Connected {
                investigation_id, ..
            }
            | Event::TaskStarted {
                investigation_id, ..
            }
            | Event::TaskCompleted {
                investigation_id, ..
            }
            | Event::TaskRetrying {
                investigation_id, ..
            }
            | Event::TaskFailed {
                investigation_id, ..
            }
            | Event::InvestigationProgress {
                investigation_id, ..
            } => Some(investigation_id),
            Event::CircuitBreakerOpened { .. } | Event::SystemAlert { .. } => None,
        }
    }
}

impl garimpo_metrics::ToLabel for &Event {
    fn to_label(&self) -> &'static str {
        self.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garimpo_lib::Priority;
    use std::collections::HashMap;

    #[test]
    fn test_wire_format_tags() {
        let mut task = Task::new(
            "t-1".to_string(),
            Source::Car,
            Priority::Normal,
            "inv-1".to_string(),
            HashMap::new(),
            3,
        );
        task.error = Some("upstream 503".to_string());
        task.attempt = 1;

        let json = serde_json::to_value(Event::task_retrying(&task)).unwrap();
        assert_eq!(json["type"], "task_retrying");
        assert_eq!(json["source"], "car");
        assert_eq!(json["status"], "retrying");
        assert_eq!(json["error"], "upstream 503");
        assert_eq!(json["will_retry"], true);
        assert!(json["timestamp"].is_string());

        let json = serde_json::to_value(Event::system_alert(AlertLevel::Warning, "redis slow"))
            .unwrap();
        assert_eq!(json["type"], "system_alert");
        assert_eq!(json["level"], "warning");
    }

    #[test]
    fn test_scoping() {
        let task = Task::new(
            "t-1".to_string(),
            Source::Car,
            Priority::Normal,
            "inv-1".to_string(),
            HashMap::new(),
            3,
        );
        assert_eq!(Event::task_started(&task).investigation_id(), Some("inv-1"));
        assert_eq!(
            Event::circuit_breaker_opened(Source::Car, 5).investigation_id(),
            None
        );
    }
}
