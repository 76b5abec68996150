//! Audit log entity model
//!
//! Append-only access records written after protected operations.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Employee that performed the action
    pub employee_id: Uuid,

    pub tenant_id: String,

    /// Tenant-local client the action concerned, when there is one
    pub client_id: Option<String>,

    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,

    /// Serialized [`crate::audit::AuditDetails`]
    pub details: String,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
