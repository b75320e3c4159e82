//! Error taxonomy for the CONNECT pipeline and its HTTP rendering
//!
//! Every stage fails fast with a [`ProxyError`]; the variant alone decides the
//! status code. All error responses share one shape:
//!
//! ```text
//! HTTP/1.1 <status>
//! Content-Type: application/json
//! X-Proxy-Error: <message>
//!
//! {"message":"<message>"}
//! ```

use axum::body::Body;
use http::{header, HeaderValue, Response, StatusCode};
use thiserror::Error;
use tollgate_accounts::StoreError;
use tollgate_auth::{CredentialError, JwtError, BASIC_REALM, PROXY_ERROR_HEADER};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Proxy authorization required")]
    MissingCredential,

    #[error("Invalid proxy authorization header")]
    MalformedCredential,

    #[error("Invalid proxy authorization header")]
    UnsupportedScheme,

    #[error("Invalid JWT")]
    InvalidToken,

    #[error("Account not found for API key: {0}")]
    AccountNotFound(String),

    #[error("Rate limit exceeded")]
    QuotaExceeded,

    #[error("Invalid CONNECT target: {0}")]
    InvalidDestination(String),

    #[error("{0}")]
    DestinationUnreachable(String),

    #[error("Proxying not supported: {0}")]
    HijackUnsupported(String),

    #[error("{0}")]
    PersistenceError(String),

    #[error("Internal server error")]
    InternalFault(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::MissingCredential => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            ProxyError::MalformedCredential
            | ProxyError::UnsupportedScheme
            | ProxyError::InvalidToken
            | ProxyError::InvalidDestination(_) => StatusCode::BAD_REQUEST,
            ProxyError::AccountNotFound(_) => StatusCode::UNAUTHORIZED,
            ProxyError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::DestinationUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::HijackUnsupported(_)
            | ProxyError::PersistenceError(_)
            | ProxyError::InternalFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the terminal response for this error
    pub fn into_response(self) -> Response<Body> {
        let challenge = matches!(self, ProxyError::MissingCredential);
        json_error(self.status_code(), &self.to_string(), challenge)
    }
}

impl From<CredentialError> for ProxyError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Missing => ProxyError::MissingCredential,
            CredentialError::UnsupportedScheme => ProxyError::UnsupportedScheme,
            CredentialError::Malformed => ProxyError::MalformedCredential,
        }
    }
}

impl From<JwtError> for ProxyError {
    fn from(_: JwtError) -> Self {
        ProxyError::InvalidToken
    }
}

impl From<StoreError> for ProxyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ProxyError::AccountNotFound(id),
            other => ProxyError::PersistenceError(other.to_string()),
        }
    }
}

fn json_error(status: StatusCode, message: &str, challenge: bool) -> Response<Body> {
    let body = serde_json::json!({ "message": message }).to_string();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    // Messages that embed OS error text may not be valid header values
    if let Ok(value) = HeaderValue::from_str(message) {
        headers.insert(PROXY_ERROR_HEADER, value);
    }
    if challenge {
        if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", BASIC_REALM)) {
            headers.insert(header::PROXY_AUTHENTICATE, value);
        }
    }

    response
}
