//! # Commission Handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;

use crate::adapters::{Commission, CommissionFilter};
use crate::context::{Access, RequestContext};
use crate::error::ApiError;
use crate::handlers::TenantScope;
use crate::handlers::types::ListResponse;
use crate::server::AppState;

/// List commissions, newest first
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/commissions",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id"), CommissionFilter),
    responses(
        (status = 200, description = "Commissions", body = ListResponse<Commission>),
        (status = 400, description = "Unknown status filter", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError)
    ),
    tag = "commissions"
)]
pub async fn list_commissions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
    Query(filter): Query<CommissionFilter>,
) -> Result<Json<ListResponse<Commission>>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let commissions = scope
        .adapter()
        .list_commissions(scope.db(), scope.schema(), filter)
        .await?;
    Ok(Json(ListResponse::new(commissions)))
}

/// Approve a pending commission
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenantId}/commissions/{commissionId}/approve",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("commissionId" = String, Path, description = "Commission id")
    ),
    responses(
        (status = 200, description = "Commission approved", body = Commission),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Commission not found", body = ApiError),
        (status = 409, description = "Commission is not pending", body = ApiError)
    ),
    tag = "commissions"
)]
pub async fn approve_commission(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, commission_id)): Path<(String, String)>,
) -> Result<Json<Commission>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let commission = scope
        .adapter()
        .approve_commission(scope.db(), scope.schema(), &commission_id, Utc::now())
        .await?;
    Ok(Json(commission))
}

/// Mark an approved commission paid
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenantId}/commissions/{commissionId}/pay",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("commissionId" = String, Path, description = "Commission id")
    ),
    responses(
        (status = 200, description = "Commission paid", body = Commission),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Commission not found", body = ApiError),
        (status = 409, description = "Commission is not approved", body = ApiError)
    ),
    tag = "commissions"
)]
pub async fn pay_commission(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, commission_id)): Path<(String, String)>,
) -> Result<Json<Commission>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let commission = scope
        .adapter()
        .mark_commission_paid(scope.db(), scope.schema(), &commission_id, Utc::now())
        .await?;
    Ok(Json(commission))
}

/// Cancel a pending or approved commission
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenantId}/commissions/{commissionId}/cancel",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("commissionId" = String, Path, description = "Commission id")
    ),
    responses(
        (status = 200, description = "Commission cancelled", body = Commission),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Commission not found", body = ApiError),
        (status = 409, description = "Commission is already paid or cancelled", body = ApiError)
    ),
    tag = "commissions"
)]
pub async fn cancel_commission(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, commission_id)): Path<(String, String)>,
) -> Result<Json<Commission>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let commission = scope
        .adapter()
        .cancel_commission(scope.db(), scope.schema(), &commission_id, Utc::now())
        .await?;
    Ok(Json(commission))
}
