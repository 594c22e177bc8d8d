//! Gatehouse Core: authentication context, error taxonomy and composable
//! authorization policies shared by every request pipeline.

pub mod authz;
pub mod context;
pub mod error;
pub mod types;

pub use authz::{AtomicPolicy, Policy, Rejection};
pub use context::{AccessKey, AuthContext, AuthFailure, Authentication};
pub use error::{ApiError, ErrorEnvelope, ErrorKind};
pub use types::AuthInfo;
