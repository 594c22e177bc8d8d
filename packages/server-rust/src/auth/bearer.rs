//! JWT bearer-token authentication.

use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_core::{AuthFailure, AuthInfo};
use http::header::AUTHORIZATION;
use http::request::Parts;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

use super::principal::load_principal;
use super::resolver::Authenticator;
use crate::traits::PrincipalStore;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Authenticates `Authorization: Bearer <jwt>` headers signed with HS256.
pub struct JwtBearerAuthenticator {
    tenant_id: String,
    key: DecodingKey,
    validation: Validation,
    principals: Arc<dyn PrincipalStore>,
}

impl JwtBearerAuthenticator {
    pub fn new(
        tenant_id: impl Into<String>,
        secret: &str,
        issuer: Option<&str>,
        principals: Arc<dyn PrincipalStore>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            tenant_id: tenant_id.into(),
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            principals,
        }
    }
}

#[async_trait]
impl Authenticator for JwtBearerAuthenticator {
    async fn authenticate(&self, request: &Parts) -> Result<Option<AuthInfo>, AuthFailure> {
        let Some(header) = request.headers.get(AUTHORIZATION) else {
            return Ok(None);
        };
        let header = header
            .to_str()
            .map_err(|_| AuthFailure::InvalidCredentials)?;
        // Other schemes are not ours to judge.
        let Some(token) = bearer_token(header) else {
            return Ok(None);
        };

        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|err| {
                debug!(tenant = %self.tenant_id, error = %err, "bearer token rejected");
                match err.kind() {
                    JwtErrorKind::ExpiredSignature => AuthFailure::Expired,
                    _ => AuthFailure::InvalidCredentials,
                }
            })?
            .claims;

        load_principal(self.principals.as_ref(), &self.tenant_id, &claims.sub)
            .await
            .map(Some)
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
