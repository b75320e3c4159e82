use async_trait::async_trait;
use thiserror::Error;

use crate::Account;

/// Account store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Account already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(e: sea_orm::DbErr) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Outcome of an attempt to spend one call from an account's quota
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumption {
    /// One call was consumed; carries the record after the increment
    Granted(Account),
    /// The quota was already spent; the record is unchanged
    Exhausted(Account),
    NotFound,
}

/// Capability interface over the account backend
///
/// `try_consume` must be atomic per account id: the limit check and the
/// increment happen as one step, never as a read followed by a write.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Account>, StoreError>;

    async fn create(&self, account: Account) -> Result<Account, StoreError>;

    /// Overwrite an existing record. Fails with `NotFound` for unknown ids.
    async fn update(&self, account: Account) -> Result<(), StoreError>;

    async fn try_consume(&self, id: &str) -> Result<Consumption, StoreError>;
}
