//! Tenant configuration and lookup.

pub mod config;
pub mod store;

pub use config::{load_tenant_file, AuthStrategy, TenantConfig, TenantConfigError};
pub use store::{StaticTenantStore, TenantTable, TENANT_HEADER};

use gatehouse_core::{ApiError, ErrorKind};

/// Failure to bind a request to a tenant.
#[derive(Debug, thiserror::Error)]
pub enum TenantLookupError {
    #[error("no tenant matches the request")]
    NotFound,
    #[error("tenant `{tenant_id}` is misconfigured: {reason}")]
    Invalid { tenant_id: String, reason: String },
    #[error("tenant store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl TenantLookupError {
    /// Client-facing form. Store failures are not described to the client.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        match self {
            Self::NotFound => ApiError::from_kind(ErrorKind::TenantNotFound),
            Self::Invalid { .. } => ApiError::from_kind(ErrorKind::InvalidConfiguration),
            Self::Unavailable(_) => ApiError::from_kind(ErrorKind::ServiceUnavailable),
        }
    }
}
