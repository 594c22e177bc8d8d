//! Panic recovery middleware.
//!
//! Catches panics raised while building or polling the inner service's
//! future and turns them into a single error response. A panic payload that
//! is an [`ApiError`] or an [`ErrorKind`] keeps its declared kind and status;
//! anything else becomes a generic `UnexpectedError`. Panic messages are
//! logged, never sent to the client.

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use gatehouse_core::{ApiError, ErrorKind};
use tower::{Layer, Service};
use tracing::error;

use crate::service::error::ErrorResponse;

/// Renders the response for a recovered fault.
pub type RecoverHandler = Arc<dyn Fn(&ApiError) -> Response + Send + Sync>;

/// Default [`RecoverHandler`]: the JSON error envelope with the kind's status.
#[must_use]
pub fn default_recover_handler() -> RecoverHandler {
    Arc::new(|err: &ApiError| ErrorResponse::from(err.clone()).into_response())
}

/// Maps a panic payload to the error it declares.
#[must_use]
pub fn fault_to_error(payload: &(dyn Any + Send)) -> ApiError {
    if let Some(err) = payload.downcast_ref::<ApiError>() {
        return err.clone();
    }
    if let Some(kind) = payload.downcast_ref::<ErrorKind>() {
        return ApiError::from_kind(*kind);
    }
    ApiError::unexpected()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else if let Some(err) = payload.downcast_ref::<ApiError>() {
        err.message()
    } else {
        "non-string panic payload"
    }
}

fn recover(handler: &RecoverHandler, payload: &(dyn Any + Send)) -> Response {
    let err = fault_to_error(payload);
    error!(
        kind = %err.kind(),
        panic = panic_message(payload),
        "recovered from panic while serving request"
    );
    metrics::counter!("gatehouse_panics_recovered_total").increment(1);
    handler(&err)
}

// ---------------------------------------------------------------------------
// RecoveryLayer
// ---------------------------------------------------------------------------

/// Tower layer that converts panics in the wrapped service into responses.
#[derive(Clone)]
pub struct RecoveryLayer {
    handler: RecoverHandler,
}

impl RecoveryLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_handler(default_recover_handler())
    }

    #[must_use]
    pub fn with_handler(handler: RecoverHandler) -> Self {
        Self { handler }
    }
}

impl Default for RecoveryLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService {
            inner,
            handler: Arc::clone(&self.handler),
        }
    }
}

// ---------------------------------------------------------------------------
// RecoveryService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RecoveryService<S> {
    inner: S,
    handler: RecoverHandler,
}

impl<S> Service<Request> for RecoveryService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Send,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let handler = Arc::clone(&self.handler);

        let future = match catch_unwind(AssertUnwindSafe(|| self.inner.call(request))) {
            Ok(future) => future,
            Err(payload) => {
                let response = recover(&handler, payload.as_ref());
                return Box::pin(async move { Ok(response) });
            }
        };

        Box::pin(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Ok(recover(&handler, payload.as_ref())),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::routing::get;
    use axum::Router;
    use http::header::CONTENT_TYPE;
    use http::StatusCode;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    async fn call(router: Router, path: &str) -> Response {
        router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route(
                "/boom",
                get(|| async {
                    if true {
                        panic!("index out of bounds: secret detail");
                    }
                    "unreachable"
                }),
            )
            .route(
                "/declared",
                get(|| async {
                    if true {
                        std::panic::panic_any(ApiError::permission_denied("nope"));
                    }
                    "unreachable"
                }),
            )
            .route(
                "/kind",
                get(|| async {
                    if true {
                        std::panic::panic_any(ErrorKind::ServiceUnavailable);
                    }
                    "unreachable"
                }),
            )
    }

    #[tokio::test]
    async fn passes_through_normal_responses() {
        let response = call(app().layer(RecoveryLayer::new()), "/ok").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn panic_becomes_generic_json_500() {
        let response = call(app().layer(RecoveryLayer::new()), "/boom").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body = body_json(response).await;
        assert_eq!(body["error"]["name"], "UnexpectedError");
        assert_eq!(body["error"]["code"], 10_000);
        assert!(!body.to_string().contains("secret detail"));
    }

    #[tokio::test]
    async fn declared_error_payload_keeps_its_status() {
        let response = call(app().layer(RecoveryLayer::new()), "/declared").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"]["message"], "nope");

        let response = call(app().layer(RecoveryLayer::new()), "/kind").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn custom_handler_is_used() {
        let handler: RecoverHandler =
            Arc::new(|err: &ApiError| (StatusCode::IM_A_TEAPOT, err.kind().name()).into_response());
        let response = call(app().layer(RecoveryLayer::with_handler(handler)), "/boom").await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn panic_while_building_future_is_caught() {
        #[derive(Clone)]
        struct PanicsOnCall;

        impl Service<Request> for PanicsOnCall {
            type Response = Response;
            type Error = Infallible;
            type Future = std::future::Ready<Result<Response, Infallible>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _request: Request) -> Self::Future {
                panic!("synchronous fault");
            }
        }

        let response = RecoveryLayer::new()
            .layer(PanicsOnCall)
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn fault_mapping() {
        let payload: Box<dyn Any + Send> = Box::new("plain");
        assert_eq!(fault_to_error(payload.as_ref()).kind(), ErrorKind::UnexpectedError);

        let payload: Box<dyn Any + Send> = Box::new(ErrorKind::TenantNotFound);
        assert_eq!(fault_to_error(payload.as_ref()).kind(), ErrorKind::TenantNotFound);
    }
}
