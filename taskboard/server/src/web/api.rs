use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tower::ServiceBuilder;
use utoipa::ToSchema;

use crate::auth::{self, AuthState};
use crate::web::AppState;

/// JSON body returned by every failing API request.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorResponse {
    /// Always `false`
    success: bool,
    /// HTTP status code of the response
    status_code: u16,
    /// Human readable description of the failure
    message: String,
}

impl ServerErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: status.as_u16(),
            message: message.into(),
        }
    }
}

/// Builds an error response with the given status and message.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ServerErrorResponse::new(status, message))).into_response()
}

/// JSON body of requests that only report what happened.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Message sent to clients for failures whose details must stay in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str =
    "An unexpected error occurred while processing your request. Please try again later.";

/// Creates the API routes for JSON API endpoints.
///
/// Sign-up and sign-in are public, everything else requires a session.
/// Admin-only routes add their own role check inside the resource routers.
pub fn create_api_router(auth_state: Arc<AuthState>, app_state: AppState) -> Router {
    let auth_routes = auth::api::v1::create_api_router(auth_state.clone());
    let protected_routes = Router::new()
        .nest("/users", crate::user::api::v1::create_api_router(app_state.clone()))
        .nest("/tasks", crate::task::api::v1::create_api_router(app_state.clone()))
        .nest("/reports", crate::report::api::v1::create_api_router(app_state))
        .route_layer(ServiceBuilder::new().layer(from_fn(auth::require_auth_middleware)));
    let api_routes = Router::new().nest("/auth", auth_routes).merge(protected_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            auth_state,
            auth::auth_user_middleware,
        )))
}
