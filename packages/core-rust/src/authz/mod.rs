//! Composable authorization policies.
//!
//! A [`Policy`] is a pure predicate over the request head and the
//! resolved [`AuthContext`]. Atomic policies do the checking; `AllOf` and
//! `AnyOf` compose them:
//!
//! - `AllOf` accepts iff every branch accepts and stops at the first
//!   rejection, whose reason is reported unchanged. The accept/reject
//!   outcome does not depend on branch order, but the reported reason does:
//!   the earliest rejecting branch wins.
//! - `AnyOf` accepts iff some branch accepts. When every branch rejects,
//!   the reason of the last branch evaluated is reported.
//! - `AllOf([])` accepts everything; `AnyOf([])` rejects everything.

pub mod builtin;

use std::fmt;
use std::sync::Arc;

use http::request::Parts;
use http::StatusCode;

use crate::context::AuthContext;
use crate::error::{ApiError, ErrorKind};

pub use builtin::{
    deny_disabled_user, deny_no_access_key, require_authenticated, require_master_key,
    require_role,
};

/// Policy name reported when an empty `AnyOf` rejects.
pub const EMPTY_ANY_OF: &str = "any_of";

type PolicyCheck = dyn Fn(&Parts, &AuthContext) -> Result<(), ApiError> + Send + Sync;

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// A reject decision: which atomic policy refused, why, and with which status.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("rejected by {policy}: {error}")]
pub struct Rejection {
    policy: &'static str,
    error: ApiError,
    status: StatusCode,
}

impl Rejection {
    #[must_use]
    pub fn new(policy: &'static str, error: ApiError, status: StatusCode) -> Self {
        Self {
            policy,
            error,
            status,
        }
    }

    /// Name of the atomic policy that produced this rejection.
    #[must_use]
    pub fn policy(&self) -> &'static str {
        self.policy
    }

    #[must_use]
    pub fn error(&self) -> &ApiError {
        &self.error
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        self.error.message()
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn into_error(self) -> ApiError {
        self.error
    }
}

// ---------------------------------------------------------------------------
// AtomicPolicy
// ---------------------------------------------------------------------------

/// A named leaf predicate.
#[derive(Clone)]
pub struct AtomicPolicy {
    name: &'static str,
    check: Arc<PolicyCheck>,
    status: Option<StatusCode>,
}

impl AtomicPolicy {
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&Parts, &AuthContext) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        Self {
            name,
            check: Arc::new(check),
            status: None,
        }
    }

    /// Overrides the status written when this policy rejects. Without an
    /// override the status comes from the error kind.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&self, request: &Parts, auth: &AuthContext) -> Result<(), Rejection> {
        (self.check)(request, auth).map_err(|error| {
            tracing::trace!(policy = self.name, reason = %error, "atomic policy rejected");
            let status = self.status.unwrap_or_else(|| error.status());
            Rejection::new(self.name, error, status)
        })
    }
}

impl fmt::Debug for AtomicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicPolicy")
            .field("name", &self.name)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// An authorization expression.
#[derive(Debug, Clone)]
pub enum Policy {
    Atomic(AtomicPolicy),
    AllOf(Vec<Policy>),
    AnyOf(Vec<Policy>),
}

impl Policy {
    /// Wraps a plain function as a named atomic policy.
    pub fn atomic<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&Parts, &AuthContext) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        Self::Atomic(AtomicPolicy::new(name, check))
    }

    pub fn all_of(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self::AllOf(policies.into_iter().collect())
    }

    pub fn any_of(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self::AnyOf(policies.into_iter().collect())
    }

    /// `AllOf([])`.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::AllOf(Vec::new())
    }

    /// `AnyOf([])`.
    #[must_use]
    pub fn deny_all() -> Self {
        Self::AnyOf(Vec::new())
    }

    /// Evaluates the expression. Never mutates `auth`.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] selected by the combinator rules described
    /// in the module documentation.
    pub fn is_allowed(&self, request: &Parts, auth: &AuthContext) -> Result<(), Rejection> {
        match self {
            Self::Atomic(atomic) => atomic.evaluate(request, auth),
            Self::AllOf(policies) => {
                for policy in policies {
                    policy.is_allowed(request, auth)?;
                }
                Ok(())
            }
            Self::AnyOf(policies) => {
                let mut last = None;
                for policy in policies {
                    match policy.is_allowed(request, auth) {
                        Ok(()) => return Ok(()),
                        Err(rejection) => last = Some(rejection),
                    }
                }
                Err(last.unwrap_or_else(|| {
                    let error = ApiError::new(
                        ErrorKind::PermissionDenied,
                        "no policy accepted the request",
                    );
                    let status = error.status();
                    Rejection::new(EMPTY_ANY_OF, error, status)
                }))
            }
        }
    }
}

impl From<AtomicPolicy> for Policy {
    fn from(atomic: AtomicPolicy) -> Self {
        Self::Atomic(atomic)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::context::{AccessKey, AuthFailure, Authentication};
    use crate::types::AuthInfo;

    fn parts() -> Parts {
        http::Request::builder()
            .uri("/me")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn accept(name: &'static str) -> Policy {
        Policy::atomic(name, |_, _| Ok(()))
    }

    fn reject(name: &'static str) -> Policy {
        Policy::atomic(name, move |_, _| Err(ApiError::permission_denied(name)))
    }

    #[test]
    fn empty_all_of_accepts() {
        let auth = AuthContext::unresolved();
        assert!(Policy::allow_all().is_allowed(&parts(), &auth).is_ok());
    }

    #[test]
    fn empty_any_of_rejects() {
        let auth = AuthContext::unresolved();
        let rejection = Policy::deny_all().is_allowed(&parts(), &auth).unwrap_err();
        assert_eq!(rejection.policy(), EMPTY_ANY_OF);
        assert_eq!(rejection.error().kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn all_of_reports_first_rejection() {
        let policy = Policy::all_of([accept("a"), reject("b"), reject("c")]);
        let rejection = policy
            .is_allowed(&parts(), &AuthContext::unresolved())
            .unwrap_err();
        assert_eq!(rejection.policy(), "b");
        assert_eq!(rejection.reason(), "b");
    }

    #[test]
    fn all_of_short_circuits() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let policy = Policy::all_of([
            reject("first"),
            Policy::atomic("second", move |_, _| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ]);

        assert!(policy.is_allowed(&parts(), &AuthContext::unresolved()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn any_of_accepts_when_one_accepts() {
        let policy = Policy::any_of([reject("a"), accept("b"), reject("c")]);
        assert!(policy.is_allowed(&parts(), &AuthContext::unresolved()).is_ok());
    }

    #[test]
    fn any_of_reports_last_rejection() {
        let policy = Policy::any_of([reject("a"), reject("b"), reject("c")]);
        let rejection = policy
            .is_allowed(&parts(), &AuthContext::unresolved())
            .unwrap_err();
        assert_eq!(rejection.policy(), "c");
    }

    #[test]
    fn nested_combinators() {
        let policy = Policy::all_of([
            Policy::any_of([reject("x"), accept("y")]),
            Policy::all_of([accept("z"), reject("w")]),
        ]);
        let rejection = policy
            .is_allowed(&parts(), &AuthContext::unresolved())
            .unwrap_err();
        assert_eq!(rejection.policy(), "w");
    }

    #[test]
    fn status_override_wins_over_kind() {
        let policy: Policy =
            AtomicPolicy::new("teapot", |_, _| Err(ApiError::permission_denied("no")))
                .with_status(StatusCode::IM_A_TEAPOT)
                .into();
        let rejection = policy
            .is_allowed(&parts(), &AuthContext::unresolved())
            .unwrap_err();
        assert_eq!(rejection.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn status_defaults_to_kind_status() {
        let rejection = reject("r")
            .is_allowed(&parts(), &AuthContext::unresolved())
            .unwrap_err();
        assert_eq!(rejection.status(), StatusCode::FORBIDDEN);
    }

    fn arb_auth() -> impl Strategy<Value = AuthContext> {
        let key = prop_oneof![
            Just(AccessKey::None),
            Just(AccessKey::Client),
            Just(AccessKey::Master),
        ];
        let authn = prop_oneof![
            Just(Authentication::Unresolved),
            Just(Authentication::Anonymous),
            Just(Authentication::Failed(AuthFailure::Expired)),
            Just(Authentication::Failed(AuthFailure::Timeout { timeout_ms: 10 })),
            any::<bool>().prop_map(|disabled| {
                let info = AuthInfo::new("u1");
                Authentication::Authenticated(if disabled { info.disabled(None) } else { info })
            }),
        ];
        (key, authn).prop_map(|(k, a)| AuthContext::new(k, a))
    }

    fn builtin(index: usize) -> Policy {
        match index {
            0 => deny_no_access_key(),
            1 => require_authenticated(),
            2 => deny_disabled_user(),
            _ => require_master_key(),
        }
    }

    proptest! {
        #[test]
        fn all_of_outcome_is_commutative(auth in arb_auth(), p in 0usize..4, q in 0usize..4) {
            let req = parts();
            let pq = Policy::all_of([builtin(p), builtin(q)]).is_allowed(&req, &auth);
            let qp = Policy::all_of([builtin(q), builtin(p)]).is_allowed(&req, &auth);
            prop_assert_eq!(pq.is_ok(), qp.is_ok());
        }

        #[test]
        fn all_of_matches_conjunction(auth in arb_auth(), p in 0usize..4, q in 0usize..4) {
            let req = parts();
            let left = builtin(p).is_allowed(&req, &auth);
            let right = builtin(q).is_allowed(&req, &auth);
            let both = Policy::all_of([builtin(p), builtin(q)]).is_allowed(&req, &auth);
            prop_assert_eq!(both.is_ok(), left.is_ok() && right.is_ok());
            if let Err(expected) = left {
                prop_assert_eq!(both.unwrap_err(), expected);
            } else if let Err(expected) = right {
                prop_assert_eq!(both.unwrap_err(), expected);
            }
        }

        #[test]
        fn any_of_matches_disjunction(auth in arb_auth(), p in 0usize..4, q in 0usize..4) {
            let req = parts();
            let left = builtin(p).is_allowed(&req, &auth);
            let right = builtin(q).is_allowed(&req, &auth);
            let either = Policy::any_of([builtin(p), builtin(q)]).is_allowed(&req, &auth);
            prop_assert_eq!(either.is_ok(), left.is_ok() || right.is_ok());
            if let (Err(_), Err(last)) = (left, right) {
                prop_assert_eq!(either.unwrap_err(), last);
            }
        }
    }
}
