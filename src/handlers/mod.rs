//! # API Handlers
//!
//! Thin axum handlers over the tenant routing core. Every per-tenant handler
//! checks the caller's identity first, then obtains the tenant's pooled
//! handle and adapter through [`TenantScope`].

use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::Json,
};
use sea_orm::DatabaseConnection;

use crate::adapters::SchemaAdapter;
use crate::audit::{AuditAction, AuditDetails, AuditEntry, ResourceKind, record_best_effort};
use crate::auth::RequestOrigin;
use crate::context::Identity;
use crate::db;
use crate::error::CoreError;
use crate::models::HealthStatus;
use crate::server::AppState;
use crate::tenant_cache::TenantHandle;

pub mod affiliates;
pub mod clients;
pub mod commissions;
pub mod discount_codes;
pub mod documents;
pub mod tenants;
pub mod types;

/// Liveness and control-plane reachability
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus),
        (status = 503, description = "Control-plane database unreachable", body = HealthStatus)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    match db::health_check(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(HealthStatus::default())),
        Err(e) => {
            tracing::warn!(error = %e, "control-plane health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "degraded".to_string(),
                }),
            )
        }
    }
}

/// Tenant handle, schema prefix and adapter for one request.
pub struct TenantScope {
    tenant_id: String,
    handle: Arc<TenantHandle>,
    schema: String,
    adapter: Arc<dyn SchemaAdapter>,
}

impl TenantScope {
    pub async fn open(state: &AppState, tenant_id: &str) -> Result<Self, CoreError> {
        let (handle, record) = state.cache.obtain(tenant_id).await?;
        let adapter = state.adapters.for_kind(&record.adapter_kind)?;
        Ok(Self {
            tenant_id: record.tenant_id,
            handle,
            schema: record.schema_prefix,
            adapter,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.handle.connection()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn adapter(&self) -> &dyn SchemaAdapter {
        self.adapter.as_ref()
    }
}

/// Where an audited request came from and what it asked for.
pub struct AuditedRequest {
    pub method: Method,
    pub uri: Uri,
    pub origin: RequestOrigin,
}

impl AuditedRequest {
    pub fn new(method: Method, uri: Uri, origin: RequestOrigin) -> Self {
        Self {
            method,
            uri,
            origin,
        }
    }

    pub fn details(&self) -> AuditDetails {
        AuditDetails::new(
            self.method.as_str(),
            self.uri.path(),
            self.uri.query().map(str::to_string),
        )
    }

    pub fn entry(
        &self,
        identity: &Identity,
        tenant_id: &str,
        action: AuditAction,
        kind: ResourceKind,
    ) -> AuditEntry {
        AuditEntry::new(identity.actor_id(), tenant_id, action, kind)
            .details(self.details().with("actor", identity.kind()))
            .origin(
                self.origin.remote_addr.clone(),
                self.origin.user_agent.clone(),
            )
    }
}

pub(crate) async fn audit(state: &AppState, entry: AuditEntry) {
    record_best_effort(state.audit.as_ref(), entry).await;
}
