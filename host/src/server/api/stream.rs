use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use garimpo_hub::HubStats;
use tracing::debug;
use utoipa::OpenApi;

use crate::{interfaces::HostResult, AppState};

#[utoipa::path(get, path = "/{investigation_id}",
    tag = "Stream",
    responses (
        (status = 101, description = "Upgrade to a WebSocket streaming lifecycle events for the investigation")
    )
)]
#[debug_handler(state = AppState)]
/// Subscribe to an investigation's live event stream.
///
/// The socket receives a `connected` greeting, then every lifecycle event
/// of the investigation plus system-wide alerts, each as one JSON text
/// frame. Delivery is best effort: a client that stops reading is dropped.
async fn subscribe_handler(
    State(state): State<AppState>,
    Path(investigation_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state, investigation_id))
}

async fn stream_events(mut socket: WebSocket, state: AppState, investigation_id: String) {
    let mut events = state.dispatcher.hub().subscribe(&investigation_id);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    // Client went away; dropping the receiver makes the hub
                    // evict this subscription on its next send.
                    break;
                }
            }
            message = socket.recv() => {
                match message {
                    // Clients only listen; anything they send is ignored.
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }
    debug!("event stream for {investigation_id} closed");
}

#[utoipa::path(get, path = "/stats",
    tag = "Stream",
    responses (
        (status = 200, description = "Subscriber counts per investigation", body = HubStats)
    )
)]
#[debug_handler(state = AppState)]
/// Connection statistics of the notification hub.
async fn stats_handler(State(state): State<AppState>) -> HostResult<Json<HubStats>> {
    Ok(Json(state.dispatcher.hub().stats().await))
}

#[derive(OpenApi)]
#[openapi(paths(subscribe_handler, stats_handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/:investigation_id", get(subscribe_handler))
}
