use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_relay_db::entities::account;

/// Account record: identity plus quota state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub request_limit: i64,
    pub call_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A fresh account with no calls consumed and a newly generated id
    pub fn new(name: impl Into<String>, request_limit: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            request_limit,
            call_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.call_count >= self.request_limit
    }
}

impl From<account::Model> for Account {
    fn from(model: account::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            request_limit: model.request_limit,
            call_count: model.call_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
