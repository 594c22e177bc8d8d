//! Route registration and assembly of the axum [`Router`].

use std::sync::Arc;

use axum::extract::Request;
use axum::routing::{any, Route};
use axum::Router;
use gatehouse_core::ErrorKind;
use http::Method;
use tower::{Layer, Service};

use super::config::PipelineConfig;
use super::error::ErrorResponse;
use super::factory::{Dependencies, HandlerFactory};
use super::middleware::{
    default_recover_handler, MetricsLayer, RecoverHandler, RecoveryLayer, RequestTimeoutLayer,
};
use super::pipeline::{Pipeline, RouteEntry, RouteSet};
use crate::auth::AuthContextResolverFactory;
use crate::traits::TenantConfigStore;

type ApplyLayer = Box<dyn FnOnce(Router) -> Router + Send>;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Route table plus the collaborators every route's pipeline shares.
///
/// Routes and layers are registered at startup; [`into_router`](Self::into_router)
/// freezes them into an immutable axum router.
pub struct Server {
    tenants: Arc<dyn TenantConfigStore>,
    resolvers: Arc<dyn AuthContextResolverFactory>,
    deps: Dependencies,
    config: PipelineConfig,
    routes: Vec<(String, RouteEntry)>,
    layers: Vec<ApplyLayer>,
    recover: RecoverHandler,
}

impl Server {
    pub fn new(
        tenants: Arc<dyn TenantConfigStore>,
        resolvers: Arc<dyn AuthContextResolverFactory>,
        deps: Dependencies,
        config: PipelineConfig,
    ) -> Self {
        Self {
            tenants,
            resolvers,
            deps,
            config,
            routes: Vec::new(),
            layers: Vec::new(),
            recover: default_recover_handler(),
        }
    }

    /// Registers `factory` for `path` (axum path syntax, e.g. `/items/{id}`).
    ///
    /// The route answers every method unless restricted through the returned
    /// handle. Several factories may share a path with disjoint methods.
    pub fn handle(
        &mut self,
        path: impl Into<String>,
        factory: impl HandlerFactory,
    ) -> RouteHandle<'_> {
        let index = self.routes.len();
        self.routes.push((
            path.into(),
            RouteEntry {
                methods: None,
                factory: Arc::new(factory),
            },
        ));
        RouteHandle {
            entry: &mut self.routes[index].1,
        }
    }

    /// Installs a global layer ahead of routing. Layers registered first run
    /// first; all of them run inside panic recovery.
    pub fn use_layer<L>(&mut self, layer: L) -> &mut Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: axum::response::IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<std::convert::Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers
            .push(Box::new(move |router: Router| router.layer(layer)));
        self
    }

    /// Replaces the response written for recovered panics.
    pub fn set_recover_handler(&mut self, handler: RecoverHandler) -> &mut Self {
        self.recover = handler;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Builds the router. Layers from outermost to innermost: metrics,
    /// recovery, user layers, request timeout, routes.
    ///
    /// # Panics
    ///
    /// Panics if a registered path is not a valid axum route path.
    pub fn into_router(self) -> Router {
        let pipeline = Arc::new(Pipeline {
            tenants: self.tenants,
            resolvers: self.resolvers,
            deps: Arc::new(self.deps),
            config: self.config.clone(),
        });

        let mut sets: Vec<RouteSet> = Vec::new();
        for (path, entry) in self.routes {
            match sets.iter_mut().find(|set| set.path == path) {
                Some(set) => set.entries.push(entry),
                None => sets.push(RouteSet {
                    path,
                    entries: vec![entry],
                }),
            }
        }

        let mut router = Router::new();
        for set in sets {
            let path = set.path.clone();
            let set = Arc::new(set);
            let pipeline = Arc::clone(&pipeline);
            router = router.route(
                &path,
                any(move |request: Request| async move { pipeline.dispatch(&set, request).await }),
            );
        }

        router = router
            .fallback(|| async { ErrorResponse::from(ErrorKind::ResourceNotFound) })
            .layer(RequestTimeoutLayer::new(self.config.request_timeout()));
        for apply in self.layers.into_iter().rev() {
            router = apply(router);
        }
        router
            .layer(RecoveryLayer::with_handler(self.recover))
            .layer(MetricsLayer)
    }
}

/// Handle to a just-registered route.
pub struct RouteHandle<'a> {
    entry: &'a mut RouteEntry,
}

impl RouteHandle<'_> {
    /// Restricts the route to `methods`. Other methods on the same path get
    /// `405 Method Not Allowed` unless another route accepts them.
    pub fn methods<I: IntoIterator<Item = Method>>(self, methods: I) -> Self {
        self.entry.methods = Some(methods.into_iter().collect());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
