use garimpo_lib::Source;

#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// Enqueue refused because the source's circuit breaker is open. New
    /// work is rejected until the recovery window elapses; already-queued
    /// tasks keep flowing.
    #[error("admission refused: circuit breaker open for source `{0}`")]
    AdmissionRefused(Source),

    #[error("task `{0}` not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<redis::RedisError> for PoolError {
    fn from(e: redis::RedisError) -> Self {
        PoolError::Storage(e.to_string())
    }
}

pub type PoolResult<T, E = PoolError> = core::result::Result<T, E>;
