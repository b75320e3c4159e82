use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Account::Table)
                    .if_not_exists()
                    .col(string_len(Account::Id, 36).primary_key())
                    .col(string_len(Account::Name, 100))
                    .col(big_integer(Account::RequestLimit))
                    .col(big_integer(Account::CallCount).default(0))
                    .col(
                        timestamp_with_time_zone(Account::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Account::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    // The quota gate relies on this holding even if a writer misbehaves
                    .check(Expr::col(Account::CallCount).lte(Expr::col(Account::RequestLimit)))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Account::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Account {
    Table,
    Id,
    Name,
    RequestLimit,
    CallCount,
    CreatedAt,
    UpdatedAt,
}
