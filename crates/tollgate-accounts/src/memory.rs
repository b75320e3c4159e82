use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Account, AccountStore, Consumption, StoreError};

/// In-process account store
///
/// Every operation holds the map lock for its whole duration, which makes
/// `try_consume` a single critical section per call.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts.into_iter().map(|a| (a.id.clone(), a)).collect()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Account>> {
        // A panic while holding the lock cannot leave a half-written record,
        // every mutation below is a single insert or field bump.
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn create(&self, account: Account) -> Result<Account, StoreError> {
        let mut accounts = self.lock();
        if accounts.contains_key(&account.id) {
            return Err(StoreError::AlreadyExists(account.id));
        }
        accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn update(&self, mut account: Account) -> Result<(), StoreError> {
        let mut accounts = self.lock();
        match accounts.get_mut(&account.id) {
            Some(existing) => {
                account.updated_at = Utc::now();
                *existing = account;
                Ok(())
            }
            None => Err(StoreError::NotFound(account.id)),
        }
    }

    async fn try_consume(&self, id: &str) -> Result<Consumption, StoreError> {
        let mut accounts = self.lock();
        let Some(account) = accounts.get_mut(id) else {
            return Ok(Consumption::NotFound);
        };

        if account.is_exhausted() {
            return Ok(Consumption::Exhausted(account.clone()));
        }

        account.call_count += 1;
        account.updated_at = Utc::now();
        Ok(Consumption::Granted(account.clone()))
    }
}
