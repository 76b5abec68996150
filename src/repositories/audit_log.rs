//! Control-plane `audit_log` writer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditSink};
use crate::error::CoreError;
use crate::models::audit_log::{self, Entity as AuditLog};

/// [`AuditSink`] backed by the control-plane database.
#[derive(Debug, Clone)]
pub struct DbAuditSink {
    db: Arc<DatabaseConnection>,
}

impl DbAuditSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Most recent records for a tenant, newest first.
    pub async fn list_for_tenant(
        &self,
        tenant_id: &str,
        limit: u64,
    ) -> Result<Vec<audit_log::Model>, CoreError> {
        Ok(AuditLog::find()
            .filter(audit_log::Column::TenantId.eq(tenant_id))
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), CoreError> {
        let row = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            employee_id: Set(entry.actor_id),
            tenant_id: Set(entry.tenant_id),
            client_id: Set(entry.client_id),
            action: Set(entry.action.as_str().to_string()),
            resource_type: Set(entry.resource_kind.as_str().to_string()),
            resource_id: Set(entry.resource_id),
            details: Set(entry.details.to_json_string()),
            ip_address: Set(entry.remote_addr),
            user_agent: Set(entry.user_agent),
            created_at: Set(Utc::now().into()),
        };

        AuditLog::insert(row)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}
