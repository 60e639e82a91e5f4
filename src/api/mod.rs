use crate::config::ServerConfig;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod messages;
pub mod schemas;

#[derive(Clone, Debug)]
pub struct AppState {
    pub message_service: MessageService,
    pub public_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

/// Configures and returns the public API router.
pub fn app_router(config: &ServerConfig, message_service: MessageService) -> Router {
    let state = AppState { message_service, public_url: config.public_url.clone() };

    let api_routes = Router::new()
        .route("/message", post(messages::create_message))
        .route("/message/", get(messages::get_message_without_id))
        .route("/message/{id}", get(messages::get_message));

    Router::new()
        .nest("/api", api_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(|response: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                    let status = response.status();
                    span.record("http.response.status_code", status.as_u16());

                    tracing::info!(
                        latency_ms = %latency.as_millis(),
                        status = %status.as_u16(),
                        "request completed"
                    );
                })
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
