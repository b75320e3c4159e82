//! Per-account call quota

use std::sync::Arc;
use tollgate_accounts::{Account, AccountStore, Consumption};
use tracing::debug;

use crate::ProxyError;

/// Spends one call from an account's quota per granted tunnel.
///
/// The check and the increment are a single [`AccountStore::try_consume`]
/// call, so the gate never grants past the limit under concurrency.
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn AccountStore>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Charge one call to `account_id`, returning the updated record
    pub async fn admit(&self, account_id: &str) -> Result<Account, ProxyError> {
        match self.store.try_consume(account_id).await? {
            Consumption::Granted(account) => {
                debug!(
                    "Account {} admitted ({}/{})",
                    account.id, account.call_count, account.request_limit
                );
                Ok(account)
            }
            Consumption::Exhausted(account) => {
                debug!(
                    "Account {} exhausted ({}/{})",
                    account.id, account.call_count, account.request_limit
                );
                Err(ProxyError::QuotaExceeded)
            }
            Consumption::NotFound => Err(ProxyError::AccountNotFound(account_id.to_string())),
        }
    }
}
