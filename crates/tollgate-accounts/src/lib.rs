//! Account storage and quota accounting
//!
//! The proxy core only ever talks to [`AccountStore`]. Two backends ship with
//! the crate:
//!
//! - [`MemoryAccountStore`] keeps everything in a mutex-guarded map (tests,
//!   throwaway deployments).
//! - [`DbAccountStore`] persists through SeaORM (SQLite or PostgreSQL).
//!
//! Both implement [`AccountStore::try_consume`] as a single atomic
//! increment-if-below-limit, so two concurrent requests can never both take
//! the last remaining call.

mod account;
mod database;
mod memory;
mod provision;
mod store;

pub use account::Account;
pub use database::DbAccountStore;
pub use memory::MemoryAccountStore;
pub use provision::{AccountProvisioner, ProvisionError, ProvisionedAccount, MAX_NAME_LEN};
pub use store::{AccountStore, Consumption, StoreError};
