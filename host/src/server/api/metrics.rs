use axum::{routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use utoipa::OpenApi;

use crate::{
    interfaces::{HostError, HostResult},
    AppState,
};

#[utoipa::path(get, path = "/metrics",
    tag = "Metrics",
    responses (
        (status = 200, description = "The current snapshot of the prometheus registry")
    )
)]
/// Expose every pipeline metric in the prometheus text format.
async fn metrics_handler() -> HostResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| HostError::Storage(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| HostError::Storage(e.to_string()))
}

#[derive(OpenApi)]
#[openapi(paths(metrics_handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics_handler))
}
