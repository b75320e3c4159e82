use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use tollgate_relay_db::entities::account;
use tracing::debug;

use crate::{Account, AccountStore, Consumption, StoreError};

/// SeaORM-backed account store
#[derive(Clone)]
pub struct DbAccountStore {
    db: DatabaseConnection,
}

impl DbAccountStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for DbAccountStore {
    async fn get(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let model = account::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(Account::from))
    }

    async fn create(&self, account: Account) -> Result<Account, StoreError> {
        if self.get(&account.id).await?.is_some() {
            return Err(StoreError::AlreadyExists(account.id));
        }

        let active = account::ActiveModel {
            id: Set(account.id),
            name: Set(account.name),
            request_limit: Set(account.request_limit),
            call_count: Set(account.call_count),
            created_at: Set(account.created_at),
            updated_at: Set(account.updated_at),
        };
        let inserted = active.insert(&self.db).await?;
        Ok(inserted.into())
    }

    async fn update(&self, account: Account) -> Result<(), StoreError> {
        let id = account.id.clone();
        let active = account::ActiveModel {
            id: Set(account.id),
            name: Set(account.name),
            request_limit: Set(account.request_limit),
            call_count: Set(account.call_count),
            created_at: Set(account.created_at),
            updated_at: Set(Utc::now()),
        };

        match active.update(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_consume(&self, id: &str) -> Result<Consumption, StoreError> {
        // Single conditional UPDATE: the limit check and the increment are
        // one statement, so concurrent callers serialize in the database.
        let result = account::Entity::update_many()
            .col_expr(
                account::Column::CallCount,
                Expr::col(account::Column::CallCount).add(1),
            )
            .col_expr(account::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(account::Column::Id.eq(id))
            .filter(
                Expr::col(account::Column::CallCount)
                    .lt(Expr::col(account::Column::RequestLimit)),
            )
            .exec(&self.db)
            .await?;

        let current = self.get(id).await?;
        match (result.rows_affected, current) {
            (1, Some(account)) => Ok(Consumption::Granted(account)),
            (_, Some(account)) => {
                debug!("Account {} has no calls left", id);
                Ok(Consumption::Exhausted(account))
            }
            (_, None) => Ok(Consumption::NotFound),
        }
    }
}
