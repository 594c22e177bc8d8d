//! Auth context resolution.
//!
//! A resolver factory is consulted once per request and returns a resolver
//! bound to that request's tenant. Which credential strategy the resolver
//! uses comes from [`TenantConfig::auth`], so tenants on the same server
//! can authenticate differently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core::{
    AccessKey, ApiError, AuthContext, AuthFailure, AuthInfo, Authentication, ErrorKind,
};
use http::request::Parts;
use tracing::{debug, warn};

use super::access_key::detect_access_key;
use super::bearer::JwtBearerAuthenticator;
use super::session::SessionCookieAuthenticator;
use crate::service::RequestState;
use crate::tenant::{AuthStrategy, TenantConfig};
use crate::traits::{PrincipalStore, SessionStore};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Produces the authentication context for one request.
#[async_trait]
pub trait AuthContextResolver: Send + Sync {
    /// Never fails: missing credentials resolve to anonymous, bad ones to
    /// [`Authentication::Failed`].
    async fn resolve(&self, request: &Parts) -> AuthContext;
}

/// Builds a resolver scoped to a request and its tenant.
pub trait AuthContextResolverFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an `InvalidConfiguration` error if the tenant's strategy
    /// cannot be instantiated.
    fn new_resolver(
        &self,
        state: &RequestState,
        tenant: &Arc<TenantConfig>,
    ) -> Result<Box<dyn AuthContextResolver>, ApiError>;
}

/// One credential strategy (cookie, bearer, ...).
///
/// `Ok(None)` means the request carried no credentials this strategy
/// understands.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &Parts) -> Result<Option<AuthInfo>, AuthFailure>;
}

/// Strategy for tenants that never authenticate users.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(&self, _request: &Parts) -> Result<Option<AuthInfo>, AuthFailure> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// StrategyResolver
// ---------------------------------------------------------------------------

/// Resolver combining access-key detection with one credential strategy
/// under a deadline.
pub struct StrategyResolver {
    tenant: Arc<TenantConfig>,
    authenticator: Box<dyn Authenticator>,
    timeout: Duration,
    request_id: String,
}

impl StrategyResolver {
    pub fn new(
        tenant: Arc<TenantConfig>,
        authenticator: Box<dyn Authenticator>,
        request_id: impl Into<String>,
    ) -> Self {
        let timeout = tenant.resolve_timeout();
        Self {
            tenant,
            authenticator,
            timeout,
            request_id: request_id.into(),
        }
    }
}

#[async_trait]
impl AuthContextResolver for StrategyResolver {
    async fn resolve(&self, request: &Parts) -> AuthContext {
        let access_key: AccessKey = detect_access_key(request, &self.tenant);

        let authentication =
            match tokio::time::timeout(self.timeout, self.authenticator.authenticate(request))
                .await
            {
                Ok(Ok(Some(info))) => Authentication::Authenticated(info),
                Ok(Ok(None)) => Authentication::Anonymous,
                Ok(Err(failure)) => {
                    debug!(
                        request_id = %self.request_id,
                        reason = %failure,
                        "authentication failed"
                    );
                    Authentication::Failed(failure)
                }
                Err(_elapsed) => {
                    let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        request_id = %self.request_id,
                        tenant = %self.tenant.tenant_id,
                        timeout_ms,
                        "credential lookup timed out"
                    );
                    Authentication::Failed(AuthFailure::Timeout { timeout_ms })
                }
            };

        AuthContext::new(access_key, authentication)
    }
}

// ---------------------------------------------------------------------------
// DefaultResolverFactory
// ---------------------------------------------------------------------------

/// Picks the credential strategy from each tenant's configuration.
pub struct DefaultResolverFactory {
    sessions: Arc<dyn SessionStore>,
    principals: Arc<dyn PrincipalStore>,
}

impl DefaultResolverFactory {
    pub fn new(sessions: Arc<dyn SessionStore>, principals: Arc<dyn PrincipalStore>) -> Self {
        Self {
            sessions,
            principals,
        }
    }

    fn authenticator(&self, tenant: &TenantConfig) -> Result<Box<dyn Authenticator>, ApiError> {
        let authenticator: Box<dyn Authenticator> = match &tenant.auth {
            AuthStrategy::Anonymous => Box::new(AnonymousAuthenticator),
            AuthStrategy::SessionCookie { cookie_name } => {
                Box::new(SessionCookieAuthenticator::new(
                    tenant.tenant_id.clone(),
                    cookie_name.clone(),
                    Arc::clone(&self.sessions),
                    Arc::clone(&self.principals),
                ))
            }
            AuthStrategy::JwtBearer { secret, issuer } => {
                if secret.is_empty() {
                    return Err(ApiError::from_kind(ErrorKind::InvalidConfiguration));
                }
                Box::new(JwtBearerAuthenticator::new(
                    tenant.tenant_id.clone(),
                    secret,
                    issuer.as_deref(),
                    Arc::clone(&self.principals),
                ))
            }
        };
        Ok(authenticator)
    }
}

impl AuthContextResolverFactory for DefaultResolverFactory {
    fn new_resolver(
        &self,
        state: &RequestState,
        tenant: &Arc<TenantConfig>,
    ) -> Result<Box<dyn AuthContextResolver>, ApiError> {
        let authenticator = self.authenticator(tenant).inspect_err(|_| {
            warn!(tenant = %tenant.tenant_id, "tenant auth strategy is misconfigured");
        })?;
        Ok(Box::new(StrategyResolver::new(
            Arc::clone(tenant),
            authenticator,
            state.request_id(),
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use http::header::COOKIE;

    use super::*;
    use crate::auth::{InMemoryPrincipalStore, InMemorySessionStore, Session, API_KEY_HEADER};

    struct StalledSessions;

    #[async_trait]
    impl SessionStore for StalledSessions {
        async fn get_session(&self, _: &str, _: &str) -> anyhow::Result<Option<Session>> {
            std::future::pending().await
        }
    }

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = http::Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn factory(sessions: Arc<dyn SessionStore>) -> DefaultResolverFactory {
        let principals = Arc::new(InMemoryPrincipalStore::new());
        principals.insert("acme", AuthInfo::new("u1"));
        DefaultResolverFactory::new(sessions, principals)
    }

    fn cookie_tenant() -> Arc<TenantConfig> {
        Arc::new(
            TenantConfig::new("acme", "ck", "mk").with_auth(AuthStrategy::SessionCookie {
                cookie_name: "sid".into(),
            }),
        )
    }

    #[tokio::test]
    async fn anonymous_strategy_ignores_credentials() {
        let tenant = Arc::new(TenantConfig::new("acme", "ck", "mk"));
        let resolver = factory(Arc::new(InMemorySessionStore::new()))
            .new_resolver(&RequestState::new("r1"), &tenant)
            .unwrap();

        let ctx = resolver
            .resolve(&parts(&[(API_KEY_HEADER, "ck"), ("cookie", "sid=whatever")]))
            .await;
        assert_eq!(ctx, AuthContext::anonymous(AccessKey::Client));
    }

    #[tokio::test]
    async fn cookie_strategy_selected_from_config() {
        let sessions = Arc::new(InMemorySessionStore::new());
        sessions.insert(
            "acme",
            "tok",
            Session {
                user_id: "u1".into(),
                expires_at: SystemTime::now() + Duration::from_secs(60),
            },
        );
        let resolver = factory(sessions)
            .new_resolver(&RequestState::new("r1"), &cookie_tenant())
            .unwrap();

        let ctx = resolver.resolve(&parts(&[(COOKIE.as_str(), "sid=tok")])).await;
        assert_eq!(ctx.access_key(), AccessKey::None);
        assert_eq!(ctx.auth_info().unwrap().user_id, "u1");
    }

    #[tokio::test]
    async fn no_credentials_resolve_to_anonymous() {
        let resolver = factory(Arc::new(InMemorySessionStore::new()))
            .new_resolver(&RequestState::new("r1"), &cookie_tenant())
            .unwrap();
        let ctx = resolver.resolve(&parts(&[])).await;
        assert_eq!(ctx.authentication(), &Authentication::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out_as_failure() {
        let tenant = Arc::new(
            TenantConfig::new("acme", "ck", "mk")
                .with_auth(AuthStrategy::SessionCookie {
                    cookie_name: "sid".into(),
                })
                .with_resolve_timeout(Duration::from_millis(250)),
        );
        let resolver = factory(Arc::new(StalledSessions))
            .new_resolver(&RequestState::new("r1"), &tenant)
            .unwrap();

        let ctx = resolver
            .resolve(&parts(&[(API_KEY_HEADER, "ck"), ("cookie", "sid=tok")]))
            .await;
        assert_eq!(
            ctx,
            AuthContext::failed(AccessKey::Client, AuthFailure::Timeout { timeout_ms: 250 })
        );
    }

    #[test]
    fn empty_jwt_secret_is_a_configuration_error() {
        let tenant = Arc::new(TenantConfig::new("acme", "ck", "mk").with_auth(
            AuthStrategy::JwtBearer {
                secret: String::new(),
                issuer: None,
            },
        ));
        let err = factory(Arc::new(InMemorySessionStore::new()))
            .new_resolver(&RequestState::new("r1"), &tenant)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }
}
