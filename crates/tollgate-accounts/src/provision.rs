//! Account registration
//!
//! Creates the record and issues its token. The token is returned exactly
//! once, at creation; nothing stores it and it cannot be fetched again.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tollgate_auth::{JwtError, JwtVerifier};
use tracing::info;

use crate::{Account, AccountStore, StoreError};

/// Longest accepted account name, in characters
pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Failed to store account: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to issue token: {0}")]
    Token(#[from] JwtError),
}

/// Freshly created account together with its one-time token
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedAccount {
    #[serde(flatten)]
    pub account: Account,
    pub api_key: String,
}

pub struct AccountProvisioner {
    store: Arc<dyn AccountStore>,
    verifier: Arc<JwtVerifier>,
}

impl AccountProvisioner {
    pub fn new(store: Arc<dyn AccountStore>, verifier: Arc<JwtVerifier>) -> Self {
        Self { store, verifier }
    }

    /// Validate, persist and sign a new account
    pub async fn register(
        &self,
        name: &str,
        request_limit: i64,
    ) -> Result<ProvisionedAccount, ProvisionError> {
        validate(name, request_limit)?;

        let account = self.store.create(Account::new(name, request_limit)).await?;
        let api_key = self.verifier.issue(&account.id)?;

        info!(
            "Created account {} ({}) with a limit of {} calls",
            account.id, account.name, account.request_limit
        );

        Ok(ProvisionedAccount { account, api_key })
    }

    pub async fn lookup(&self, id: &str) -> Result<Account, ProvisionError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(id.to_string()))
    }
}

fn validate(name: &str, request_limit: i64) -> Result<(), ProvisionError> {
    let mut problems = Vec::new();

    let name_len = name.chars().count();
    if name_len == 0 || name_len > MAX_NAME_LEN {
        problems.push(format!(
            "name must be between 1 and {} characters",
            MAX_NAME_LEN
        ));
    }
    if request_limit < 1 {
        problems.push("request_limit must be at least 1".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::Validation(problems.join(", ")))
    }
}
