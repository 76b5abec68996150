//! # Data Models
//!
//! SeaORM entities for the control-plane database plus small shared response
//! types. Tenant-database rows are modelled in [`crate::adapters::types`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod audit_log;
pub mod portal_magic_token;
pub mod tenant_connection;

pub use audit_log::Entity as AuditLog;
pub use portal_magic_token::Entity as PortalMagicToken;
pub use tenant_connection::Entity as TenantConnection;

/// Liveness response for `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    #[schema(example = "ok")]
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
