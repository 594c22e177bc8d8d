//! Gatehouse Server: multi-tenant HTTP request pipeline on axum. Tenant
//! binding, auth context resolution, policy checks, and panic recovery.

pub mod auth;
pub mod network;
pub mod service;
pub mod tenant;
pub mod traits;

pub use service::{Dependencies, Handler, HandlerFactory, PipelineConfig, Server};
pub use traits::{PrincipalStore, SessionStore, TenantConfigStore};
