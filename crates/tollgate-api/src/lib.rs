//! Account provisioning REST API
//!
//! Routes are served on the proxy's own listener, next to the CONNECT
//! endpoint:
//!
//! - `POST /account` creates an account and returns its token once
//! - `GET /account/{id}` returns the account's quota state
//! - `GET /api/openapi.json` returns the OpenAPI document

pub mod handlers;
pub mod models;

use axum::{
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tollgate_accounts::AccountProvisioner;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Application state shared across handlers
pub struct AppState {
    pub provisioner: AccountProvisioner,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tollgate API",
        version = "0.1.0",
        description = "Account provisioning for the tollgate CONNECT proxy",
        contact(
            name = "Tollgate Team",
            email = "team@tollgate.dev"
        )
    ),
    paths(handlers::create_account, handlers::get_account),
    components(schemas(
        models::CreateAccountRequest,
        models::CreateAccountResponse,
        models::AccountResponse,
        models::ErrorResponse,
    )),
    tags(
        (name = "accounts", description = "Account provisioning endpoints")
    )
)]
pub struct ApiDoc;

pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(provisioner: AccountProvisioner) -> Self {
        Self {
            state: Arc::new(AppState { provisioner }),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_doc = ApiDoc::openapi();

        Router::new()
            .route("/account", post(handlers::create_account))
            .route("/account/{id}", get(handlers::get_account))
            .route(
                "/api/openapi.json",
                get(move || async move { Json(api_doc) }),
            )
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }
}
