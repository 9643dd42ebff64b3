use axum::{
    debug_handler,
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use garimpo_lib::Task;
use utoipa::OpenApi;

use crate::{
    interfaces::{HostError, HostResult},
    AppState,
};

#[utoipa::path(get, path = "/{task_id}",
    tag = "Tasks",
    responses (
        (status = 200, description = "The canonical task record", body = Task),
        (status = 404, description = "No task with this id")
    )
)]
#[debug_handler(state = AppState)]
/// Fetch the canonical record of one probe task.
async fn status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> HostResult<Json<Task>> {
    let mut dispatcher = state.dispatcher.clone();
    match dispatcher.status(&task_id)? {
        Some(task) => Ok(Json(task)),
        None => Err(HostError::NotFound(task_id)),
    }
}

#[derive(OpenApi)]
#[openapi(paths(status_handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/:task_id", get(status_handler))
}
