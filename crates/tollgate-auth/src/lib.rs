//! Authentication for the tollgate proxy
//!
//! Two independent pieces make up a proxy login:
//!
//! - [`credential`] splits a `Proxy-Authorization: Basic ...` header into the
//!   caller's attribution label and the signed account token.
//! - [`jwt`] signs and verifies that token. The only claim it carries is the
//!   account id it authorizes.

pub mod credential;
pub mod jwt;

pub use credential::{CredentialError, ProxyCredential, BASIC_REALM, PROXY_ERROR_HEADER};
pub use jwt::{AccountClaims, JwtError, JwtVerifier, SIGNING_ALGORITHM};
