//! Account tokens (JSON Web Tokens)
//!
//! A token asserts exactly one claim, the id of the account it authorizes.
//! Tokens carry no expiry and no scope; possession of a validly signed token
//! is the whole authorization proof.

use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// The only algorithm tokens may be signed with
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT claims for proxy authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountClaims {
    /// Account id this token authorizes
    pub id: String,
}

impl AccountClaims {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            id: account_id.into(),
        }
    }
}

/// JWT errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Unexpected signing method: {0:?}")]
    AlgorithmMismatch(Algorithm),

    #[error("Invalid token")]
    InvalidToken,
}

/// Signs and verifies account tokens with a process-wide HMAC secret.
///
/// The secret is handed in once at startup and never changes afterwards.
pub struct JwtVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier using HMAC-SHA256 (symmetric secret)
    ///
    /// Validates ONLY the signature. There is no `exp`, `nbf`, `iss` or `aud`
    /// claim to check.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify `token` and return the account id it asserts.
    ///
    /// The declared `alg` is checked against [`SIGNING_ALGORITHM`] before the
    /// signature or any claim is looked at.
    pub fn verify(&self, token: &str) -> Result<String, JwtError> {
        let header = decode_header(token)?;
        if header.alg != SIGNING_ALGORITHM {
            debug!("Rejecting token signed with {:?}", header.alg);
            return Err(JwtError::AlgorithmMismatch(header.alg));
        }

        let token_data = decode::<AccountClaims>(token, &self.decoding_key, &self.validation)?;

        if token_data.claims.id.is_empty() {
            return Err(JwtError::InvalidToken);
        }

        Ok(token_data.claims.id)
    }

    /// Issue a token for `account_id`
    pub fn issue(&self, account_id: &str) -> Result<String, JwtError> {
        let header = Header::new(SIGNING_ALGORITHM);
        Ok(encode(&header, &AccountClaims::new(account_id), &self.encoding_key)?)
    }
}
