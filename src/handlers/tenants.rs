//! # Tenant Administration Handlers
//!
//! Admin-only CRUD over control-plane tenant records. Responses are
//! [`TenantSummary`] values, which never carry the database password.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::context::{EmployeeRole, RequestContext};
use crate::error::ApiError;
use crate::handlers::types::{ApiJson, ListResponse};
use crate::repositories::{NewTenantConnection, TenantConnectionUpdate, TenantSummary};
use crate::server::AppState;

const ADMIN_ONLY: &[EmployeeRole] = &[EmployeeRole::Admin];

/// List every tenant, newest first
#[utoipa::path(
    get,
    path = "/api/v1/admin/tenants",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Tenant records", body = ListResponse<TenantSummary>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ListResponse<TenantSummary>>, ApiError> {
    ctx.require_employee(ADMIN_ONLY)?;
    let tenants = state.registry.list_all().await?;
    Ok(Json(ListResponse::new(tenants)))
}

/// Register a tenant
#[utoipa::path(
    post,
    path = "/api/v1/admin/tenants",
    security(("bearer_auth" = [])),
    request_body = NewTenantConnection,
    responses(
        (status = 201, description = "Tenant registered", body = TenantSummary),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 409, description = "Tenant id already registered", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<NewTenantConnection>,
) -> Result<(StatusCode, Json<TenantSummary>), ApiError> {
    let employee = ctx.require_employee(ADMIN_ONLY)?;
    let created = state
        .registry
        .create(request, Some(employee.email.clone()))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Fetch one tenant, including inactive ones
#[utoipa::path(
    get,
    path = "/api/v1/admin/tenants/{tenantId}",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Tenant record", body = TenantSummary),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantSummary>, ApiError> {
    ctx.require_employee(ADMIN_ONLY)?;
    Ok(Json(state.registry.find(&tenant_id).await?))
}

/// Update a tenant. The pooled handle is dropped so the next request
/// reconnects with the new coordinates.
#[utoipa::path(
    put,
    path = "/api/v1/admin/tenants/{tenantId}",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id")),
    request_body = TenantConnectionUpdate,
    responses(
        (status = 200, description = "Tenant updated", body = TenantSummary),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
    ApiJson(update): ApiJson<TenantConnectionUpdate>,
) -> Result<Json<TenantSummary>, ApiError> {
    ctx.require_employee(ADMIN_ONLY)?;
    let updated = state.registry.update(&tenant_id, update).await?;
    state.cache.invalidate(&tenant_id).await;
    Ok(Json(updated))
}

/// Deactivate a tenant. A pooled handle is left to age out; new
/// connections are refused from now on.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/tenants/{tenantId}",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id")),
    responses(
        (status = 204, description = "Tenant deactivated"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller is not an admin", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn deactivate_tenant(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    ctx.require_employee(ADMIN_ONLY)?;
    state.registry.deactivate(&tenant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
