mod dispatcher;
mod probes;
mod pump;
mod runtime;
mod worker;

// Re-export
pub use dispatcher::{Dispatcher, PipelineStats};
pub use probes::{MockOutcome, MockProbe, ProbeSet};
pub use pump::RetryPump;
pub use runtime::spawn;
pub use worker::Worker;

pub use garimpo_hub::{AlertLevel, Event, NotificationHub};
pub use garimpo_lib::{PipelineConfig, Priority, Probe, Source, Task, TaskStatus};
pub use garimpo_taskpool::{PoolConfig, PoolError, ProgressSnapshot, TaskStore};
