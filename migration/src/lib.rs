//! Control-plane database migrations.
//!
//! Tenant databases are owned by each tenant's upstream platform and are never
//! migrated from here.

pub use sea_orm_migration::prelude::*;

mod m2025_01_06_000001_create_tenant_connections;
mod m2025_01_06_000002_create_audit_log;
mod m2025_01_06_000003_create_portal_magic_tokens;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_06_000001_create_tenant_connections::Migration),
            Box::new(m2025_01_06_000002_create_audit_log::Migration),
            Box::new(m2025_01_06_000003_create_portal_magic_tokens::Migration),
        ]
    }
}
