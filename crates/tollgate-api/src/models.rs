use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_accounts::{Account, ProvisionedAccount};
use utoipa::ToSchema;

/// Account creation request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    /// Free-text label (1 to 100 characters)
    pub name: String,
    /// Number of tunnels the account may open (at least 1)
    pub request_limit: i64,
}

/// Account record as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub request_limit: i64,
    /// Tunnels granted so far
    pub call_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            request_limit: account.request_limit,
            call_count: account.call_count,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Account creation response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountResponse {
    #[serde(flatten)]
    pub account: AccountResponse,
    /// Proxy token for this account (only shown once!)
    pub api_key: String,
}

impl From<ProvisionedAccount> for CreateAccountResponse {
    fn from(provisioned: ProvisionedAccount) -> Self {
        Self {
            account: provisioned.account.into(),
            api_key: provisioned.api_key,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub message: String,
}
