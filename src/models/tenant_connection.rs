//! Tenant connection entity model
//!
//! SeaORM entity for the control-plane `tenant_connections` table. Rows are
//! never handed out directly; the tenant registry converts them into
//! [`crate::repositories::tenant_connection::TenantConnectionRecord`] or
//! [`crate::repositories::tenant_connection::TenantSummary`], neither of which
//! serializes the password.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Connection coordinates and integration settings for one tenant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_connections")]
pub struct Model {
    /// Opaque, globally unique tenant identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: String,

    pub name: String,

    pub db_host: String,
    pub db_port: i32,
    pub db_user: String,

    /// Sealed ciphertext (`pwd:v1:` prefix) or legacy plaintext
    pub db_password: String,

    pub db_name: String,
    pub db_sslmode: String,

    /// Qualifies every table name the schema adapter references
    pub schema_prefix: String,

    pub adapter_kind: String,

    pub storage_provider: String,
    pub storage_bucket: Option<String>,
    pub storage_credentials_secret: Option<String>,
    pub storage_credentials_path: Option<String>,

    pub signing_key_secret: Option<String>,
    pub signing_key_path: Option<String>,
    pub signing_integration_key: Option<String>,
    pub signing_account_id: Option<String>,
    pub signing_user_id: Option<String>,
    pub signing_api_base_url: Option<String>,

    pub is_active: bool,
    pub created_by: Option<String>,
    pub notes: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
