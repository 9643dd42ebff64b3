use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower::{limit::GlobalConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{self, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

mod health;
mod investigations;
mod metrics;
mod queue;
mod stream;
mod tasks;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Garimpo Investigation Host API",
        version = "1.0",
        description = "Execution substrate of the patrimonial intelligence platform: \
                       launches per-source probe tasks, tracks their lifecycle and \
                       streams progress to subscribed clients.",
    ),
    components(
        schemas(
            garimpo_lib::Source,
            garimpo_lib::Priority,
            garimpo_lib::TaskStatus,
            garimpo_lib::Task,
            garimpo_taskpool::ProgressSnapshot,
            garimpo_taskpool::BreakerSnapshot,
            garimpo_taskpool::QueueStats,
            garimpo_taskpool::SourceQueueStats,
            garimpo_dispatcher::PipelineStats,
            garimpo_hub::HubStats,
        )
    ),
    tags(
        (name = "Investigations", description = "Routes that launch and cancel investigations"),
        (name = "Tasks", description = "Routes that inspect single probe tasks"),
        (name = "Queue", description = "Routes that report queue and circuit breaker state"),
        (name = "Stream", description = "Routes that stream lifecycle events"),
        (name = "Health", description = "Routes that report the server health status"),
        (name = "Metrics", description = "Routes that give detailed insight into the server")
    )
)]
/// The root API struct which is generated from the `OpenApi` derive macro.
pub struct Docs;

#[must_use]
pub fn create_docs() -> utoipa::openapi::OpenApi {
    [
        health::create_docs(),
        metrics::create_docs(),
        investigations::create_docs(),
        tasks::create_docs(),
        queue::create_docs(),
        stream::create_docs(),
    ]
    .into_iter()
    .fold(Docs::openapi(), |mut doc, sub_doc| {
        doc.merge(sub_doc);
        doc
    })
}

async fn count_requests(request: Request, next: Next) -> Response {
    garimpo_metrics::inc_http_request_count();
    next.run(request).await
}

pub fn create_router(concurrency_limit: usize) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_origin(cors::Any);

    let middleware = ServiceBuilder::new()
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .layer(cors);

    let docs = create_docs();

    Router::new()
        // Only the launch/cancel routes get the concurrency limit; health,
        // metrics and the stream stay reachable under load.
        .nest(
            "/v1/investigations",
            investigations::create_router()
                .layer(GlobalConcurrencyLimitLayer::new(concurrency_limit)),
        )
        .nest("/v1/tasks", tasks::create_router())
        .nest("/v1/queue", queue::create_router())
        .nest("/v1/ws", stream::create_router())
        .merge(health::create_router())
        .merge(metrics::create_router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs.clone()))
        .merge(Scalar::with_url("/scalar", docs))
        .layer(middleware)
        .layer(middleware::from_fn(count_requests))
}
