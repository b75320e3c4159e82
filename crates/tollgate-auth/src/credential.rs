//! Proxy credential parsing (RFC 7617 Basic scheme)
//!
//! Clients authenticate to the proxy with
//!
//! ```text
//! Proxy-Authorization: Basic <base64(attribution:token)>
//! ```
//!
//! The "username" half is a free-text attribution label that is only ever
//! logged. The "password" half is the signed account token.

use base64::Engine;
use thiserror::Error;
use tracing::debug;

/// Realm advertised in `Proxy-Authenticate` when the header is missing
pub const BASIC_REALM: &str = "tollgate";

/// Response header repeating the `{"message": ...}` body of an error
pub const PROXY_ERROR_HEADER: &str = "x-proxy-error";

/// Credential parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Proxy authorization required")]
    Missing,

    #[error("Unsupported proxy authorization scheme")]
    UnsupportedScheme,

    #[error("Invalid proxy authorization header")]
    Malformed,
}

/// Decoded `Proxy-Authorization` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredential {
    /// Unauthenticated caller label, used for logging only
    pub attribution: String,
    /// Signed account token
    pub token: String,
}

impl ProxyCredential {
    /// Parse the raw header value.
    ///
    /// `None` means the header was absent. The value must be exactly two
    /// space-separated parts, the first being `Basic` (any case), and the
    /// decoded payload must contain exactly one `:`.
    ///
    /// # Example
    /// ```
    /// use tollgate_auth::ProxyCredential;
    ///
    /// // base64("svc:abc.def.ghi")
    /// let credential = ProxyCredential::parse(Some("Basic c3ZjOmFiYy5kZWYuZ2hp")).unwrap();
    /// assert_eq!(credential.attribution, "svc");
    /// assert_eq!(credential.token, "abc.def.ghi");
    /// ```
    pub fn parse(header: Option<&str>) -> Result<Self, CredentialError> {
        let header = header.ok_or(CredentialError::Missing)?;

        let parts: Vec<&str> = header.split(' ').collect();
        if parts.len() != 2 {
            debug!("Proxy credential: expected '<scheme> <value>'");
            return Err(CredentialError::Malformed);
        }
        if !parts[0].eq_ignore_ascii_case("basic") {
            debug!("Proxy credential: unsupported scheme '{}'", parts[0]);
            return Err(CredentialError::UnsupportedScheme);
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(parts[1])
            .map_err(|_| CredentialError::Malformed)?;
        let payload = String::from_utf8(decoded).map_err(|_| CredentialError::Malformed)?;

        let mut pair = payload.split(':');
        match (pair.next(), pair.next(), pair.next()) {
            (Some(attribution), Some(token), None) => Ok(Self {
                attribution: attribution.to_string(),
                token: token.to_string(),
            }),
            _ => {
                debug!("Proxy credential: payload is not a single user:pass pair");
                Err(CredentialError::Malformed)
            }
        }
    }

    /// Build the header value a client would send. Used by tooling and tests.
    pub fn to_header_value(&self) -> String {
        let raw = format!("{}:{}", self.attribution, self.token);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}
