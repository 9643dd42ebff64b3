use std::collections::HashMap;

use axum::{
    debug_handler,
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use garimpo_lib::{Priority, Source};
use garimpo_taskpool::ProgressSnapshot;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{OpenApi, ToSchema};

use crate::{
    interfaces::{HostError, HostResult},
    AppState,
};

fn default_priority() -> Priority {
    Priority::Normal
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(default)]
/// Target of a fan-out launch: the shared probe parameters.
pub struct LaunchRequest {
    pub target_name: Option<String>,
    pub target_cpf_cnpj: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub priority: Priority,
}

impl Default for LaunchRequest {
    fn default() -> Self {
        Self {
            target_name: None,
            target_cpf_cnpj: None,
            state: None,
            city: None,
            priority: default_priority(),
        }
    }
}

impl LaunchRequest {
    fn params(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("name".to_string(), serde_json::json!(self.target_name)),
            ("cpf_cnpj".to_string(), serde_json::json!(self.target_cpf_cnpj)),
            ("state".to_string(), serde_json::json!(self.state)),
            ("city".to_string(), serde_json::json!(self.city)),
        ])
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LaunchResponse {
    pub investigation_id: String,
    #[schema(value_type = Object)]
    pub task_ids: HashMap<Source, String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(default)]
pub struct LaunchSingleRequest {
    #[schema(value_type = Object)]
    pub params: HashMap<String, serde_json::Value>,
    pub priority: Priority,
    pub max_attempts: Option<u32>,
}

impl Default for LaunchSingleRequest {
    fn default() -> Self {
        Self {
            params: HashMap::new(),
            priority: default_priority(),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LaunchSingleResponse {
    pub investigation_id: String,
    pub source: Source,
    pub task_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub investigation_id: String,
    pub cancelled: u32,
}

#[utoipa::path(post, path = "/{investigation_id}/scrapers",
    tag = "Investigations",
    request_body = LaunchRequest,
    responses (
        (status = 200, description = "One probe task enqueued per admitted source", body = LaunchResponse)
    )
)]
#[debug_handler(state = AppState)]
/// Launch an investigation: fan one probe task out to every source.
///
/// Sources whose circuit breaker is open are skipped and absent from the
/// returned map.
async fn launch_handler(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    Json(req): Json<LaunchRequest>,
) -> HostResult<Json<LaunchResponse>> {
    info!(
        "# Launching investigation {investigation_id} (priority {})",
        req.priority
    );
    let mut dispatcher = state.dispatcher.clone();
    let task_ids =
        dispatcher.launch_investigation(&investigation_id, req.params(), req.priority)?;
    Ok(Json(LaunchResponse {
        investigation_id,
        task_ids,
    }))
}

#[utoipa::path(post, path = "/{investigation_id}/scrapers/{source}",
    tag = "Investigations",
    request_body = LaunchSingleRequest,
    responses (
        (status = 200, description = "Probe task enqueued", body = LaunchSingleResponse),
        (status = 503, description = "The source's circuit breaker is open")
    )
)]
#[debug_handler(state = AppState)]
/// Enqueue one probe for one source with explicit params.
async fn launch_single_handler(
    State(state): State<AppState>,
    Path((investigation_id, source)): Path<(String, String)>,
    Json(req): Json<LaunchSingleRequest>,
) -> HostResult<Json<LaunchSingleResponse>> {
    let source: Source = source
        .parse()
        .map_err(HostError::InvalidRequest)?;
    let mut dispatcher = state.dispatcher.clone();
    let task_id = dispatcher.launch_single(
        source,
        &investigation_id,
        req.params,
        req.priority,
        req.max_attempts,
    )?;
    Ok(Json(LaunchSingleResponse {
        investigation_id,
        source,
        task_id,
    }))
}

#[utoipa::path(get, path = "/{investigation_id}/progress",
    tag = "Investigations",
    responses (
        (status = 200, description = "Current progress snapshot", body = ProgressSnapshot)
    )
)]
#[debug_handler(state = AppState)]
/// Progress counters and per-task states of one investigation.
async fn progress_handler(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
) -> HostResult<Json<ProgressSnapshot>> {
    let mut dispatcher = state.dispatcher.clone();
    Ok(Json(dispatcher.progress(&investigation_id)?))
}

#[utoipa::path(delete, path = "/{investigation_id}/scrapers",
    tag = "Investigations",
    responses (
        (status = 200, description = "Queued and parked tasks cancelled", body = CancelResponse)
    )
)]
#[debug_handler(state = AppState)]
/// Cancel every queued or parked task of an investigation. Running tasks
/// finish their current attempt and then settle.
async fn cancel_handler(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
) -> HostResult<Json<CancelResponse>> {
    let mut dispatcher = state.dispatcher.clone();
    let cancelled = dispatcher.cancel_investigation(&investigation_id)?;
    Ok(Json(CancelResponse {
        investigation_id,
        cancelled,
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        launch_handler,
        launch_single_handler,
        progress_handler,
        cancel_handler
    ),
    components(schemas(
        LaunchRequest,
        LaunchResponse,
        LaunchSingleRequest,
        LaunchSingleResponse,
        CancelResponse
    ))
)]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:investigation_id/scrapers", post(launch_handler))
        .route("/:investigation_id/scrapers", delete(cancel_handler))
        .route(
            "/:investigation_id/scrapers/:source",
            post(launch_single_handler),
        )
        .route("/:investigation_id/progress", get(progress_handler))
}
