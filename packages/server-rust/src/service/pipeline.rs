//! The dispatch pipeline.
//!
//! Every routed request runs these steps strictly in order:
//!
//! 1. create the [`RequestState`] (no tenant, unresolved auth context)
//! 2. bind the tenant configuration, failing with `TenantNotFound` on a miss
//! 3. construct the handler through its factory
//! 4. resolve the auth context with a resolver built for this tenant
//! 5. evaluate the factory's policy; a rejection is written and nothing
//!    further runs
//! 6. serve the request with the handler
//!
//! Expected failures travel as values and come back as exactly one JSON
//! error response. Panics are left to the recovery layer.

use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use gatehouse_core::{ApiError, ErrorKind};
use http::header::{HeaderValue, ALLOW};
use http::Method;
use tracing::{debug, error, info, warn, Span};

use super::config::PipelineConfig;
use super::error::ErrorResponse;
use super::factory::{Dependencies, HandlerFactory};
use super::state::{Decision, RequestState};
use crate::auth::AuthContextResolverFactory;
use crate::tenant::TenantLookupError;
use crate::traits::TenantConfigStore;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// One registered factory and the methods it answers. `None` means any.
pub(crate) struct RouteEntry {
    pub(crate) methods: Option<Vec<Method>>,
    pub(crate) factory: Arc<dyn HandlerFactory>,
}

impl RouteEntry {
    fn accepts(&self, method: &Method) -> bool {
        self.methods
            .as_ref()
            .is_none_or(|methods| methods.contains(method))
    }
}

/// All factories registered under one path, in registration order.
pub(crate) struct RouteSet {
    pub(crate) path: String,
    pub(crate) entries: Vec<RouteEntry>,
}

impl RouteSet {
    fn select(&self, method: &Method) -> Option<&Arc<dyn HandlerFactory>> {
        self.entries
            .iter()
            .find(|entry| entry.accepts(method))
            .map(|entry| &entry.factory)
    }

    fn allowed_methods(&self) -> Vec<&Method> {
        let mut methods: Vec<&Method> = self
            .entries
            .iter()
            .filter_map(|entry| entry.methods.as_ref())
            .flatten()
            .collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods.dedup();
        methods
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Shared, immutable collaborators of the dispatch pipeline.
pub(crate) struct Pipeline {
    pub(crate) tenants: Arc<dyn TenantConfigStore>,
    pub(crate) resolvers: Arc<dyn AuthContextResolverFactory>,
    pub(crate) deps: Arc<Dependencies>,
    pub(crate) config: PipelineConfig,
}

impl Pipeline {
    /// Runs the pipeline for a request matched to `routes`.
    pub(crate) async fn dispatch(&self, routes: &RouteSet, request: Request) -> Response {
        let Some(factory) = routes.select(request.method()) else {
            return method_not_allowed(routes, request.method());
        };

        let (parts, body) = request.into_parts();
        let state = RequestState::from_request(&parts);
        Span::current().record("request_id", state.request_id());

        // Cancels the request token if this future is dropped mid-flight.
        let guard = state.cancel_on_drop();
        let response = match self.run(factory.as_ref(), &state, parts, body).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
        let _ = guard.disarm();
        response
    }

    async fn run(
        &self,
        factory: &dyn HandlerFactory,
        state: &RequestState,
        parts: http::request::Parts,
        body: axum::body::Body,
    ) -> Result<Response, ErrorResponse> {
        let tenant = match tokio::time::timeout(
            self.config.tenant_lookup_timeout(),
            self.tenants.get_tenant_config(&parts),
        )
        .await
        {
            Ok(Ok(tenant)) => tenant,
            Ok(Err(err)) => {
                match &err {
                    TenantLookupError::NotFound => {
                        debug!(request_id = state.request_id(), "no tenant for request");
                    }
                    TenantLookupError::Invalid { .. } | TenantLookupError::Unavailable(_) => {
                        warn!(
                            request_id = state.request_id(),
                            error = %err,
                            "tenant lookup failed"
                        );
                    }
                }
                return Err(err.to_api_error().into());
            }
            Err(_elapsed) => {
                warn!(
                    request_id = state.request_id(),
                    timeout_ms = self.config.tenant_lookup_timeout_ms,
                    "tenant lookup timed out"
                );
                return Err(
                    ApiError::new(ErrorKind::ResolutionTimeout, "tenant lookup timed out").into(),
                );
            }
        };
        Span::current().record("tenant", tenant.tenant_id.as_str());
        state.bind_tenant(Arc::clone(&tenant));

        let handler = factory.new_handler(&self.deps, &parts).map_err(|err| {
            error!(
                request_id = state.request_id(),
                tenant = %tenant.tenant_id,
                error = %err,
                "handler construction failed"
            );
            ErrorResponse::from(ApiError::unexpected())
        })?;

        let resolver = self.resolvers.new_resolver(state, &tenant)?;
        let auth = state.resolve_auth(resolver.as_ref(), &parts).await;

        if let Err(rejection) = factory.provide_authz_policy().is_allowed(&parts, auth) {
            info!(
                request_id = state.request_id(),
                tenant = %tenant.tenant_id,
                policy = rejection.policy(),
                reason = rejection.reason(),
                "request rejected by policy"
            );
            metrics::counter!("gatehouse_policy_rejections_total", "policy" => rejection.policy())
                .increment(1);
            state.record_decision(Decision::Rejected(rejection.clone()));
            return Err(rejection.into());
        }
        state.record_decision(Decision::Allowed);

        let request = Request::from_parts(parts, body);
        handler.serve(request, state).await.map_err(|err| {
            if err.status().is_server_error() {
                error!(request_id = state.request_id(), error = %err, "handler failed");
            } else {
                debug!(request_id = state.request_id(), error = %err, "handler returned error");
            }
            ErrorResponse::from(err)
        })
    }
}

fn method_not_allowed(routes: &RouteSet, method: &Method) -> Response {
    debug!(path = %routes.path, %method, "method not allowed");
    let allowed = routes
        .allowed_methods()
        .iter()
        .map(|method| method.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mut response = ErrorResponse::from(ErrorKind::MethodNotAllowed).into_response();
    if let Ok(value) = HeaderValue::from_str(&allowed) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}
