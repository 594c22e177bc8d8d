//! Handler factory protocol and the typed dependency bundle handed to it.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use gatehouse_core::{ApiError, Policy};
use http::request::Parts;

use super::state::RequestState;

// ---------------------------------------------------------------------------
// Handler / HandlerFactory
// ---------------------------------------------------------------------------

/// A request-bound handler. Consumed by the single call that serves it.
#[async_trait]
pub trait Handler: Send {
    /// Produces the response for an authorized request.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] that the pipeline renders with its declared status.
    async fn serve(
        self: Box<Self>,
        request: Request,
        state: &RequestState,
    ) -> Result<Response, ApiError>;
}

/// Capability every route provides: build a handler per request and declare
/// the policy guarding it.
///
/// Factories are registered once at startup and shared by all requests.
pub trait HandlerFactory: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`HandlerError`] when a collaborator is missing or the handler
    /// cannot be built for this request.
    fn new_handler(
        &self,
        deps: &Dependencies,
        request: &Parts,
    ) -> Result<Box<dyn Handler>, HandlerError>;

    fn provide_authz_policy(&self) -> Policy;
}

/// Handler construction failure. Always rendered as a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("missing dependency `{0}`")]
    MissingDependency(&'static str),
    #[error("handler construction failed: {0}")]
    Construction(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Typed collaborators available to every handler factory, keyed by type.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct Dependencies {
    by_type: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: Vec<&'static str>,
}

impl Dependencies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value`, replacing any earlier value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        if self
            .by_type
            .insert(TypeId::of::<T>(), Arc::new(value))
            .is_none()
        {
            self.names.push(type_name::<T>());
        }
    }

    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Like [`get`](Self::get), but reports the missing type by name.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MissingDependency`] if no `T` was registered.
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, HandlerError> {
        self.get::<T>()
            .ok_or(HandlerError::MissingDependency(type_name::<T>()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.names).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Mailer {
        from: &'static str,
    }

    struct Clock;

    #[test]
    fn get_by_type() {
        let deps = Dependencies::new().with(Mailer { from: "noreply" });
        assert_eq!(deps.get::<Mailer>().unwrap().from, "noreply");
        assert!(deps.get::<Clock>().is_none());
    }

    #[test]
    fn insert_replaces_same_type() {
        let mut deps = Dependencies::new();
        deps.insert(Mailer { from: "a" });
        deps.insert(Mailer { from: "b" });
        assert_eq!(deps.len(), 1);
        assert_eq!(deps.get::<Mailer>().unwrap().from, "b");
    }

    #[test]
    fn require_names_missing_type() {
        let deps = Dependencies::new();
        let err = deps.require::<Mailer>().unwrap_err();
        assert!(matches!(err, HandlerError::MissingDependency(name) if name.ends_with("Mailer")));
        assert!(err.to_string().contains("Mailer"));
    }

    #[test]
    fn trait_objects_register_behind_arc() {
        trait Greeter: Send + Sync {
            fn greet(&self) -> &'static str;
        }
        struct English;
        impl Greeter for English {
            fn greet(&self) -> &'static str {
                "hello"
            }
        }

        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let deps = Dependencies::new().with(greeter);
        assert_eq!(deps.require::<Arc<dyn Greeter>>().unwrap().greet(), "hello");
    }
}
