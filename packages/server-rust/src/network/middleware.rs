//! Transport-level HTTP middleware.
//!
//! Ordering follows the outer-to-inner convention: the first layer listed
//! sees the request first and the response last. Pipeline middleware
//! (recovery, timeout, metrics) lives in `service::middleware`.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::HeaderName;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;
use gatehouse_core::{ApiError, ErrorKind};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::shutdown::ShutdownController;
use crate::service::state::REQUEST_ID_HEADER;
use crate::service::ErrorResponse;

/// The composed layer type produced by [`build_http_layers`], innermost first.
type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        CorsLayer,
        Stack<
            CompressionLayer,
            Stack<
                TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
                Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
            >,
        >,
    >,
>;

/// Builds the transport middleware stack.
///
/// **Outermost to innermost:**
/// 1. `SetRequestId`: assigns a UUID v4 `x-request-id` when the client sent none
/// 2. `Trace`: request/response spans
/// 3. `Compression`: gzip responses
/// 4. `CORS`: configured origins
/// 5. `PropagateRequestId`: echoes `x-request-id` on the response
///
/// The body limit is not part of this stack: its response body has no
/// `Default`, which CORS and compression require. See [`apply_http_layers`].
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// Wraps `router` in the body size limit and then the transport stack.
///
/// `RequestBodyLimitLayer` is applied as a router layer so each route
/// converts its response back into an axum body before CORS and compression
/// see it. Oversized declared lengths get 413 up front; streamed bodies are
/// cut off at `max_body_bytes` when read.
pub fn apply_http_layers(router: Router, config: &NetworkConfig) -> Router {
    router
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(build_http_layers(config))
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

/// Counts in-flight requests and refuses new ones while draining.
///
/// Health probes stay reachable so orchestrators can observe the drain.
pub async fn track_in_flight(
    State(shutdown): State<Arc<ShutdownController>>,
    request: Request,
    next: Next,
) -> Response {
    if shutdown.is_draining() && !request.uri().path().starts_with("/health") {
        return ErrorResponse::from(ApiError::new(
            ErrorKind::ServiceUnavailable,
            "server is shutting down",
        ))
        .into_response();
    }
    let _guard = shutdown.in_flight_guard();
    next.run(request).await
}
