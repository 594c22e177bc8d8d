use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_core::AuthInfo;
use http::request::Parts;

use crate::auth::Session;
use crate::tenant::{TenantConfig, TenantLookupError};

/// Maps an inbound request to the configuration of the tenant it belongs to.
/// Implementations: static table (`StaticTenantStore`), remote config
/// services (future).
#[async_trait]
pub trait TenantConfigStore: Send + Sync {
    /// Look up the tenant configuration for a request.
    async fn get_tenant_config(
        &self,
        request: &Parts,
    ) -> Result<Arc<TenantConfig>, TenantLookupError>;
}

/// Session records backing cookie authentication.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session identified by `token`, or `None` if no such session exists.
    async fn get_session(&self, tenant_id: &str, token: &str) -> anyhow::Result<Option<Session>>;
}

/// Opaque principal lookup used by resolvers to turn an identity into
/// [`AuthInfo`]. Persistence of principals lives outside this crate.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Load the user's current auth info, or `None` if the user is unknown.
    async fn get_auth_info(&self, tenant_id: &str, user_id: &str)
        -> anyhow::Result<Option<AuthInfo>>;
}
