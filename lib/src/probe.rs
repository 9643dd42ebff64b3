use std::collections::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("ProbeError::Upstream `{0}`")]
    Upstream(String),
    #[error("ProbeError::Io `{0}`")]
    Io(#[from] std::io::Error),
    #[error("ProbeError::Param `{0}`")]
    Param(#[from] serde_json::Error),
}

impl From<String> for ProbeError {
    fn from(e: String) -> Self {
        ProbeError::Upstream(e)
    }
}

pub type ProbeResult<T, E = ProbeError> = core::result::Result<T, E>;

/// One external lookup for one task.
///
/// Implementations (scrapers, government API clients) live outside the
/// pipeline: they receive the task params verbatim and either return an
/// opaque result value or fail. The worker runs them under the per-source
/// deadline, so implementations must be cancel-safe: dropping the future
/// aborts the lookup.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, params: &HashMap<String, serde_json::Value>) -> ProbeResult<serde_json::Value>;
}
