//! `POST /me`: the caller's identity as the pipeline resolved it.

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gatehouse_core::authz::builtin::{
    deny_disabled_user, deny_no_access_key, require_authenticated,
};
use gatehouse_core::{ApiError, ErrorKind, Policy};
use http::request::Parts;
use http::Method;
use serde_json::json;

use crate::service::factory::{Dependencies, Handler, HandlerError, HandlerFactory};
use crate::service::router::Server;
use crate::service::state::RequestState;

pub const ME_PATH: &str = "/me";

/// Factory for the `/me` endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeHandlerFactory;

impl HandlerFactory for MeHandlerFactory {
    fn new_handler(
        &self,
        _deps: &Dependencies,
        _request: &Parts,
    ) -> Result<Box<dyn Handler>, HandlerError> {
        Ok(Box::new(MeHandler))
    }

    fn provide_authz_policy(&self) -> Policy {
        Policy::all_of([
            deny_no_access_key(),
            require_authenticated(),
            deny_disabled_user(),
        ])
    }
}

struct MeHandler;

#[async_trait]
impl Handler for MeHandler {
    async fn serve(
        self: Box<Self>,
        _request: Request,
        state: &RequestState,
    ) -> Result<Response, ApiError> {
        let auth = state.auth_context();
        // The policy guarantees an authenticated caller.
        let info = auth
            .auth_info()
            .ok_or_else(|| ApiError::from_kind(ErrorKind::NotAuthenticated))?;
        let tenant_id = state.tenant().map(|tenant| tenant.tenant_id.as_str());

        Ok(Json(json!({
            "result": {
                "tenant_id": tenant_id,
                "access_key": auth.access_key(),
                "user": info,
            }
        }))
        .into_response())
    }
}

/// Registers `POST /me` on `server`.
pub fn attach_me_handler(server: &mut Server) {
    server
        .handle(ME_PATH, MeHandlerFactory)
        .methods([Method::POST]);
}
