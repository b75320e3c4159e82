//! Account entity: identity plus quota state

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "account")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(StringLen::N(36))")]
    pub id: String,

    #[sea_orm(column_type = "String(StringLen::N(100))")]
    pub name: String,

    /// Ceiling on granted tunnels
    pub request_limit: i64,

    /// Tunnels granted so far; never exceeds `request_limit`
    pub call_count: i64,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
