use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tollgate_accounts::ProvisionError;
use tollgate_auth::PROXY_ERROR_HEADER;
use tracing::{debug, error};

use crate::models::*;
use crate::AppState;

/// Error rendered as `{"message": ...}` plus the [`PROXY_ERROR_HEADER`] header
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(e: ProvisionError) -> Self {
        match e {
            ProvisionError::Validation(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            ProvisionError::NotFound(id) => {
                ApiError::new(StatusCode::NOT_FOUND, format!("Account '{}' not found", id))
            }
            other => {
                error!("Provisioning failed: {}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let header = HeaderValue::from_str(&self.message).ok();
        let mut response = (
            self.status,
            Json(ErrorResponse {
                message: self.message,
            }),
        )
            .into_response();

        if let Some(value) = header {
            response.headers_mut().insert(PROXY_ERROR_HEADER, value);
        }
        response
    }
}

/// Create an account and issue its proxy token
#[utoipa::path(
    post,
    path = "/account",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = CreateAccountResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateAccountResponse>), ApiError> {
    let Json(request) = payload?;
    debug!("Creating account: {}", request.name);

    let provisioned = state
        .provisioner
        .register(&request.name, request.request_limit)
        .await?;

    Ok((StatusCode::CREATED, Json(provisioned.into())))
}

/// Get an account's quota state
#[utoipa::path(
    get,
    path = "/account/{id}",
    params(
        ("id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Account found", body = AccountResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    debug!("Getting account: {}", id);

    let account = state.provisioner.lookup(&id).await?;
    Ok(Json(account.into()))
}
