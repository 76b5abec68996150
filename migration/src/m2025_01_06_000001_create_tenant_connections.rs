//! Migration to create the tenant_connections table.
//!
//! One row per tenant: where its operational database lives, how to reach it,
//! which schema adapter understands it, and where its external secrets are.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantConnections::TenantId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TenantConnections::Name).text().not_null())
                    .col(ColumnDef::new(TenantConnections::DbHost).text().not_null())
                    .col(
                        ColumnDef::new(TenantConnections::DbPort)
                            .integer()
                            .not_null()
                            .default(5432),
                    )
                    .col(ColumnDef::new(TenantConnections::DbUser).text().not_null())
                    .col(
                        ColumnDef::new(TenantConnections::DbPassword)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TenantConnections::DbName).text().not_null())
                    .col(
                        ColumnDef::new(TenantConnections::DbSslmode)
                            .text()
                            .not_null()
                            .default("require"),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::SchemaPrefix)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::AdapterKind)
                            .text()
                            .not_null()
                            .default("standard"),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::StorageProvider)
                            .text()
                            .not_null()
                            .default("gcs"),
                    )
                    .col(ColumnDef::new(TenantConnections::StorageBucket).text().null())
                    .col(
                        ColumnDef::new(TenantConnections::StorageCredentialsSecret)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::StorageCredentialsPath)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::SigningKeySecret)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(TenantConnections::SigningKeyPath).text().null())
                    .col(
                        ColumnDef::new(TenantConnections::SigningIntegrationKey)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::SigningAccountId)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(TenantConnections::SigningUserId).text().null())
                    .col(
                        ColumnDef::new(TenantConnections::SigningApiBaseUrl)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(TenantConnections::CreatedBy).text().null())
                    .col(ColumnDef::new(TenantConnections::Notes).text().null())
                    .col(
                        ColumnDef::new(TenantConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TenantConnections::UpdatedAt)
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
                    .name("idx_tenant_connections_active")
                    .table(TenantConnections::Table)
                    .col(TenantConnections::IsActive)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TenantConnections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantConnections {
    Table,
    TenantId,
    Name,
    DbHost,
    DbPort,
    DbUser,
    DbPassword,
    DbName,
    DbSslmode,
    SchemaPrefix,
    AdapterKind,
    StorageProvider,
    StorageBucket,
    StorageCredentialsSecret,
    StorageCredentialsPath,
    SigningKeySecret,
    SigningKeyPath,
    SigningIntegrationKey,
    SigningAccountId,
    SigningUserId,
    SigningApiBaseUrl,
    IsActive,
    CreatedBy,
    Notes,
    CreatedAt,
    UpdatedAt,
}
