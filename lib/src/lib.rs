pub mod config;
pub mod probe;
pub mod source;
pub mod task;

// Re-export
pub use config::PipelineConfig;
pub use probe::{Probe, ProbeError, ProbeResult};
pub use source::Source;
pub use task::{Priority, Task, TaskStatus};
