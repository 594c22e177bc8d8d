//! Authentication context produced once per request by a resolver.
//!
//! The context has two independent slices: which access key the client
//! presented, and what is known about the user. Policies read these
//! slices; nothing mutates a context after the resolver hands it over.

use serde::Serialize;

use crate::types::AuthInfo;

/// Which tenant key accompanied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKey {
    /// No key, or a key matching neither tenant key.
    None,
    /// The tenant's client (api) key.
    Client,
    /// The tenant's master key.
    Master,
}

impl AccessKey {
    #[must_use]
    pub fn is_present(self) -> bool {
        !matches!(self, Self::None)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Client => "client",
            Self::Master => "master",
        }
    }
}

/// Why a resolver gave up on the credentials it found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("credentials are invalid")]
    InvalidCredentials,
    #[error("credentials have expired")]
    Expired,
    #[error("credentials reference an unknown principal")]
    UnknownPrincipal,
    #[error("credential lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),
}

/// What is known about the user behind a request.
///
/// `Unresolved` and `Failed` are kept apart on purpose: the first means no
/// resolver has run, the second means credentials were presented and
/// rejected. `Anonymous` means a resolver ran and found no credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Unresolved,
    Anonymous,
    Failed(AuthFailure),
    Authenticated(AuthInfo),
}

/// Per-request authentication context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    access_key: AccessKey,
    authentication: Authentication,
}

impl AuthContext {
    /// The state a request is in before its resolver has run.
    #[must_use]
    pub const fn unresolved() -> Self {
        Self {
            access_key: AccessKey::None,
            authentication: Authentication::Unresolved,
        }
    }

    #[must_use]
    pub fn new(access_key: AccessKey, authentication: Authentication) -> Self {
        Self {
            access_key,
            authentication,
        }
    }

    #[must_use]
    pub fn anonymous(access_key: AccessKey) -> Self {
        Self::new(access_key, Authentication::Anonymous)
    }

    #[must_use]
    pub fn authenticated(access_key: AccessKey, info: AuthInfo) -> Self {
        Self::new(access_key, Authentication::Authenticated(info))
    }

    #[must_use]
    pub fn failed(access_key: AccessKey, failure: AuthFailure) -> Self {
        Self::new(access_key, Authentication::Failed(failure))
    }

    #[must_use]
    pub fn access_key(&self) -> AccessKey {
        self.access_key
    }

    #[must_use]
    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// The authenticated user, if any.
    #[must_use]
    pub fn auth_info(&self) -> Option<&AuthInfo> {
        match &self.authentication {
            Authentication::Authenticated(info) => Some(info),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.authentication, Authentication::Authenticated(_))
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self.authentication, Authentication::Unresolved)
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::unresolved()
    }
}
