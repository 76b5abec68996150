//! Migration to create the portal_magic_tokens table used for client portal
//! sign-in links.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PortalMagicTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PortalMagicTokens::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PortalMagicTokens::ClientId).text().not_null())
                    .col(ColumnDef::new(PortalMagicTokens::TenantId).text().not_null())
                    .col(ColumnDef::new(PortalMagicTokens::Email).text().not_null())
                    .col(
                        ColumnDef::new(PortalMagicTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PortalMagicTokens::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PortalMagicTokens::UsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PortalMagicTokens::IpAddress).text().null())
                    .col(ColumnDef::new(PortalMagicTokens::UserAgent).text().null())
                    .col(
                        ColumnDef::new(PortalMagicTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_portal_magic_tokens_client")
                    .table(PortalMagicTokens::Table)
                    .col(PortalMagicTokens::TenantId)
                    .col(PortalMagicTokens::ClientId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PortalMagicTokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PortalMagicTokens {
    Table,
    Id,
    ClientId,
    TenantId,
    Email,
    ExpiresAt,
    Used,
    UsedAt,
    IpAddress,
    UserAgent,
    CreatedAt,
}
