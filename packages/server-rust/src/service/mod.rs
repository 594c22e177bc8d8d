//! Request dispatch framework.
//!
//! 1. **State** (`state`): per-request tenant, auth context and decision slots
//! 2. **Factories** (`factory`): the handler factory protocol and typed dependencies
//! 3. **Pipeline** (`pipeline`): tenant binding, resolution, authorization, dispatch
//! 4. **Routing** (`router`): `Server` route registration and router assembly
//! 5. **Middleware** (`middleware`): recovery, request timeout, metrics
//! 6. **Domain** (`domain`): built-in endpoints

pub mod config;
pub mod domain;
pub mod error;
pub mod factory;
pub mod middleware;
mod pipeline;
pub mod router;
pub mod state;

// Re-export key types for convenient access.
pub use config::PipelineConfig;
pub use error::ErrorResponse;
pub use factory::{Dependencies, Handler, HandlerError, HandlerFactory};
pub use middleware::{RecoverHandler, RecoveryLayer};
pub use router::{RouteHandle, Server};
pub use state::{Decision, RequestState};
