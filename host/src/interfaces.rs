use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use garimpo_taskpool::PoolError;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The source's circuit breaker refused the enqueue.
    #[error("Admission refused: {0}")]
    Admission(String),

    /// The requested task or resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backing store failed.
    #[error("Storage fault: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<PoolError> for HostError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::AdmissionRefused(source) => {
                HostError::Admission(format!("circuit breaker open for source `{source}`"))
            }
            PoolError::NotFound(task_id) => HostError::NotFound(task_id),
            PoolError::Storage(message) => HostError::Storage(message),
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let status = match &self {
            HostError::Admission(_) => StatusCode::SERVICE_UNAVAILABLE,
            HostError::NotFound(_) => StatusCode::NOT_FOUND,
            HostError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            HostError::Storage(_)
            | HostError::Io(_)
            | HostError::Serde(_)
            | HostError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({
                "status": "error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

pub type HostResult<T> = Result<T, HostError>;
