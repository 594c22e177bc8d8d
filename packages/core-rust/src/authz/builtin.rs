//! Built-in atomic policies.
//!
//! Each one looks at a single slice of the [`AuthContext`] and accepts
//! everything outside that slice, so they compose freely under `AllOf`.

use http::request::Parts;

use super::Policy;
use crate::context::{AccessKey, AuthContext, AuthFailure, Authentication};
use crate::error::{ApiError, ErrorKind};

pub const DENY_NO_ACCESS_KEY: &str = "deny_no_access_key";
pub const REQUIRE_AUTHENTICATED: &str = "require_authenticated";
pub const DENY_DISABLED_USER: &str = "deny_disabled_user";
pub const REQUIRE_MASTER_KEY: &str = "require_master_key";
pub const REQUIRE_ROLE: &str = "require_role";

/// Rejects requests that carry neither the client nor the master key,
/// whatever their authentication state.
#[must_use]
pub fn deny_no_access_key() -> Policy {
    Policy::atomic(DENY_NO_ACCESS_KEY, check_access_key)
}

/// Rejects every caller that is not fully authenticated.
#[must_use]
pub fn require_authenticated() -> Policy {
    Policy::atomic(REQUIRE_AUTHENTICATED, check_authenticated)
}

/// Rejects authenticated users whose account is disabled. Callers that are
/// not authenticated are outside this policy's slice and pass.
#[must_use]
pub fn deny_disabled_user() -> Policy {
    Policy::atomic(DENY_DISABLED_USER, check_not_disabled)
}

/// Accepts only requests made with the tenant's master key.
#[must_use]
pub fn require_master_key() -> Policy {
    Policy::atomic(REQUIRE_MASTER_KEY, |_, auth| {
        if auth.access_key() == AccessKey::Master {
            Ok(())
        } else {
            Err(ApiError::permission_denied("master key required"))
        }
    })
}

/// Accepts authenticated users holding `role`.
pub fn require_role(role: impl Into<String>) -> Policy {
    let role = role.into();
    Policy::atomic(REQUIRE_ROLE, move |_, auth| match auth.auth_info() {
        Some(info) if info.has_role(&role) => Ok(()),
        _ => Err(ApiError::permission_denied(format!("role `{role}` required"))),
    })
}

fn check_access_key(_request: &Parts, auth: &AuthContext) -> Result<(), ApiError> {
    if auth.access_key().is_present() {
        Ok(())
    } else {
        Err(ApiError::from_kind(ErrorKind::AccessKeyNotAccepted))
    }
}

fn check_authenticated(_request: &Parts, auth: &AuthContext) -> Result<(), ApiError> {
    match auth.authentication() {
        Authentication::Authenticated(_) => Ok(()),
        Authentication::Anonymous => Err(ApiError::not_authenticated("authentication required")),
        Authentication::Unresolved => Err(ApiError::not_authenticated(
            "authentication was not attempted",
        )),
        Authentication::Failed(failure @ AuthFailure::Timeout { .. }) => {
            Err(ApiError::new(ErrorKind::ResolutionTimeout, failure.to_string()))
        }
        Authentication::Failed(AuthFailure::StoreUnavailable(_)) => {
            Err(ApiError::from_kind(ErrorKind::ServiceUnavailable))
        }
        Authentication::Failed(failure) => Err(ApiError::not_authenticated(failure.to_string())),
    }
}

fn check_not_disabled(_request: &Parts, auth: &AuthContext) -> Result<(), ApiError> {
    match auth.auth_info() {
        Some(info) if info.disabled => {
            let message = info
                .disabled_message
                .clone()
                .unwrap_or_else(|| ErrorKind::UserDisabled.default_message().to_string());
            Err(ApiError::new(ErrorKind::UserDisabled, message)
                .with_info("user_id", info.user_id.clone()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::types::AuthInfo;

    fn parts() -> Parts {
        http::Request::builder().body(()).unwrap().into_parts().0
    }

    #[test]
    fn deny_no_access_key_ignores_authentication() {
        let authed = AuthContext::authenticated(AccessKey::None, AuthInfo::new("u1"));
        let rejection = deny_no_access_key().is_allowed(&parts(), &authed).unwrap_err();
        assert_eq!(rejection.policy(), DENY_NO_ACCESS_KEY);
        assert_eq!(rejection.error().kind(), ErrorKind::AccessKeyNotAccepted);
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);

        let keyed = AuthContext::anonymous(AccessKey::Client);
        assert!(deny_no_access_key().is_allowed(&parts(), &keyed).is_ok());
    }

    #[test]
    fn require_authenticated_rejects_anonymous() {
        let anon = AuthContext::anonymous(AccessKey::Client);
        let rejection = require_authenticated().is_allowed(&parts(), &anon).unwrap_err();
        assert_eq!(rejection.policy(), REQUIRE_AUTHENTICATED);
        assert_eq!(rejection.error().kind(), ErrorKind::NotAuthenticated);
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn require_authenticated_distinguishes_failure_messages() {
        let unresolved = require_authenticated()
            .is_allowed(&parts(), &AuthContext::unresolved())
            .unwrap_err();
        let expired = require_authenticated()
            .is_allowed(&parts(), &AuthContext::failed(AccessKey::Client, AuthFailure::Expired))
            .unwrap_err();
        assert_eq!(unresolved.error().kind(), ErrorKind::NotAuthenticated);
        assert_eq!(expired.error().kind(), ErrorKind::NotAuthenticated);
        assert_ne!(unresolved.reason(), expired.reason());
    }

    #[test]
    fn require_authenticated_reports_timeout_as_unavailable() {
        let ctx = AuthContext::failed(AccessKey::Client, AuthFailure::Timeout { timeout_ms: 50 });
        let rejection = require_authenticated().is_allowed(&parts(), &ctx).unwrap_err();
        assert_eq!(rejection.error().kind(), ErrorKind::ResolutionTimeout);
        assert_eq!(rejection.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn disabled_user_rejected_only_by_deny_disabled_user() {
        let ctx = AuthContext::authenticated(
            AccessKey::Client,
            AuthInfo::new("u1").disabled(Some("account locked".into())),
        );
        assert!(require_authenticated().is_allowed(&parts(), &ctx).is_ok());

        let rejection = deny_disabled_user().is_allowed(&parts(), &ctx).unwrap_err();
        assert_eq!(rejection.policy(), DENY_DISABLED_USER);
        assert_eq!(rejection.reason(), "account locked");
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn deny_disabled_user_passes_anonymous() {
        let anon = AuthContext::anonymous(AccessKey::None);
        assert!(deny_disabled_user().is_allowed(&parts(), &anon).is_ok());
    }

    #[test]
    fn reported_reason_depends_on_all_of_order() {
        let ctx = AuthContext::authenticated(AccessKey::None, AuthInfo::new("u1").disabled(None));
        let a = Policy::all_of([deny_no_access_key(), deny_disabled_user()])
            .is_allowed(&parts(), &ctx)
            .unwrap_err();
        let b = Policy::all_of([deny_disabled_user(), deny_no_access_key()])
            .is_allowed(&parts(), &ctx)
            .unwrap_err();
        assert_eq!(a.policy(), DENY_NO_ACCESS_KEY);
        assert_eq!(b.policy(), DENY_DISABLED_USER);
    }

    #[test]
    fn master_key_and_roles() {
        let master = AuthContext::authenticated(
            AccessKey::Master,
            AuthInfo::new("admin").with_roles(["admin"]),
        );
        assert!(require_master_key().is_allowed(&parts(), &master).is_ok());
        assert!(require_role("admin").is_allowed(&parts(), &master).is_ok());

        let client = AuthContext::anonymous(AccessKey::Client);
        assert!(require_master_key().is_allowed(&parts(), &client).is_err());
        let rejection = require_role("admin").is_allowed(&parts(), &client).unwrap_err();
        assert_eq!(rejection.policy(), REQUIRE_ROLE);
    }

    #[test]
    fn policies_do_not_mutate_context() {
        let ctx = AuthContext::anonymous(AccessKey::Client);
        let before = ctx.clone();
        let _ = Policy::all_of([
            deny_no_access_key(),
            require_authenticated(),
            deny_disabled_user(),
        ])
        .is_allowed(&parts(), &ctx);
        assert_eq!(ctx, before);
    }
}
