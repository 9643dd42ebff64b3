use axum::{
    debug_handler,
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use garimpo_dispatcher::PipelineStats;
use garimpo_lib::Source;
use garimpo_taskpool::BreakerSnapshot;
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use crate::{
    interfaces::{HostError, HostResult},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StatsQuery {
    /// Restrict the report to one source.
    pub source: Option<String>,
}

#[utoipa::path(get, path = "/stats",
    tag = "Queue",
    params(StatsQuery),
    responses (
        (status = 200, description = "Per-band queue depths plus the retry set size", body = PipelineStats)
    )
)]
#[debug_handler(state = AppState)]
/// Queue depths per (source, priority) band and the number of parked retries.
async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> HostResult<Json<PipelineStats>> {
    let source = query
        .source
        .map(|s| s.parse::<Source>())
        .transpose()
        .map_err(HostError::InvalidRequest)?;
    let mut dispatcher = state.dispatcher.clone();
    Ok(Json(dispatcher.queue_stats(source)?))
}

#[utoipa::path(get, path = "/breaker/{source}",
    tag = "Queue",
    responses (
        (status = 200, description = "The source's circuit breaker state", body = BreakerSnapshot)
    )
)]
#[debug_handler(state = AppState)]
/// Inspect one source's circuit breaker.
async fn breaker_handler(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> HostResult<Json<BreakerSnapshot>> {
    let source: Source = source.parse().map_err(HostError::InvalidRequest)?;
    let mut dispatcher = state.dispatcher.clone();
    Ok(Json(dispatcher.circuit_breaker(source)?))
}

#[derive(OpenApi)]
#[openapi(paths(stats_handler, breaker_handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/breaker/:source", get(breaker_handler))
}
