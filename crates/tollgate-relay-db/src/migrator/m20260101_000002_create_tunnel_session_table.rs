use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TunnelSession::Table)
                    .if_not_exists()
                    .col(string(TunnelSession::Id).primary_key())
                    .col(string(TunnelSession::AccountId))
                    .col(string(TunnelSession::Attribution))
                    .col(string(TunnelSession::Destination))
                    .col(string(TunnelSession::ClientAddr))
                    .col(big_integer(TunnelSession::BytesFromClient).default(0))
                    .col(big_integer(TunnelSession::BytesFromDestination).default(0))
                    .col(timestamp_with_time_zone(TunnelSession::ConnectedAt))
                    .col(big_integer(TunnelSession::DurationMs))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tunnel_session_account_id")
                    .table(TunnelSession::Table)
                    .col(TunnelSession::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tunnel_session_connected_at")
                    .table(TunnelSession::Table)
                    .col(TunnelSession::ConnectedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TunnelSession::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TunnelSession {
    Table,
    Id,
    AccountId,
    Attribution,
    Destination,
    ClientAddr,
    BytesFromClient,
    BytesFromDestination,
    ConnectedAt,
    DurationMs,
}
