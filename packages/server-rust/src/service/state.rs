//! Per-request state threaded through every pipeline stage.

use std::sync::{Arc, OnceLock};

use gatehouse_core::{AuthContext, Rejection};
use http::request::Parts;
use tokio::sync::OnceCell;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::auth::AuthContextResolver;
use crate::tenant::TenantConfig;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

static UNRESOLVED: AuthContext = AuthContext::unresolved();

/// Outcome of the authorization step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed,
    Rejected(Rejection),
}

/// State owned by a single request.
///
/// Created at pipeline entry and dropped when the request completes. Every
/// slot is write-once: the tenant is bound once, the auth context resolved
/// once, the decision recorded once.
#[derive(Debug)]
pub struct RequestState {
    request_id: String,
    tenant: OnceLock<Arc<TenantConfig>>,
    auth: OnceCell<AuthContext>,
    decision: OnceLock<Decision>,
    cancellation: CancellationToken,
}

impl RequestState {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            tenant: OnceLock::new(),
            auth: OnceCell::new(),
            decision: OnceLock::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Uses the incoming `x-request-id` when present, otherwise a fresh v4 UUID.
    #[must_use]
    pub fn from_request(parts: &Parts) -> Self {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        Self::new(request_id)
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Binds the tenant configuration. Returns `false` if one was already bound.
    pub fn bind_tenant(&self, tenant: Arc<TenantConfig>) -> bool {
        self.tenant.set(tenant).is_ok()
    }

    #[must_use]
    pub fn tenant(&self) -> Option<&Arc<TenantConfig>> {
        self.tenant.get()
    }

    /// The resolved auth context, or the unresolved one before resolution.
    #[must_use]
    pub fn auth_context(&self) -> &AuthContext {
        self.auth.get().unwrap_or(&UNRESOLVED)
    }

    /// Runs `resolver` unless the context is already resolved.
    ///
    /// Concurrent or repeated calls observe the same result; the resolver
    /// runs at most once per request.
    pub async fn resolve_auth(
        &self,
        resolver: &dyn AuthContextResolver,
        request: &Parts,
    ) -> &AuthContext {
        self.auth
            .get_or_init(|| async { resolver.resolve(request).await })
            .await
    }

    /// Records the authorization decision. Returns `false` if one was
    /// already recorded; the first decision stands.
    pub fn record_decision(&self, decision: Decision) -> bool {
        self.decision.set(decision).is_ok()
    }

    #[must_use]
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.get()
    }

    /// Token cancelled when the request is abandoned before completing.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Guard that cancels the request token when dropped. Disarm it once the
    /// request has completed normally.
    pub(crate) fn cancel_on_drop(&self) -> DropGuard {
        self.cancellation.clone().drop_guard()
    }
}
