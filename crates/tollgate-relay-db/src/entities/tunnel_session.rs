//! Completed CONNECT tunnel, recorded for audit

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tunnel_session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(StringLen::None)")]
    pub id: String,

    #[sea_orm(column_type = "String(StringLen::None)")]
    pub account_id: String,

    /// Caller-supplied label, not authenticated
    #[sea_orm(column_type = "String(StringLen::None)")]
    pub attribution: String,

    #[sea_orm(column_type = "String(StringLen::None)")]
    pub destination: String,

    #[sea_orm(column_type = "String(StringLen::None)")]
    pub client_addr: String,

    pub bytes_from_client: i64,

    pub bytes_from_destination: i64,

    pub connected_at: ChronoDateTimeUtc,

    pub duration_ms: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
