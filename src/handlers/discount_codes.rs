//! # Discount Code Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;

use crate::adapters::{DiscountCode, DiscountCodeFilter, DiscountCodeUpdate, NewDiscountCode};
use crate::context::{Access, RequestContext};
use crate::error::ApiError;
use crate::handlers::TenantScope;
use crate::handlers::types::{ApiJson, DiscountCodeLookup, ListResponse};
use crate::server::AppState;

/// List discount codes
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/discount-codes",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id"), DiscountCodeFilter),
    responses(
        (status = 200, description = "Discount codes", body = ListResponse<DiscountCode>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError)
    ),
    tag = "discount-codes"
)]
pub async fn list_discount_codes(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
    Query(filter): Query<DiscountCodeFilter>,
) -> Result<Json<ListResponse<DiscountCode>>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let codes = scope
        .adapter()
        .list_discount_codes(scope.db(), scope.schema(), filter)
        .await?;
    Ok(Json(ListResponse::new(codes)))
}

/// Create a discount code. Codes are stored upper-case.
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenantId}/discount-codes",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id")),
    request_body = NewDiscountCode,
    responses(
        (status = 201, description = "Discount code created", body = DiscountCode),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 409, description = "Code already exists", body = ApiError)
    ),
    tag = "discount-codes"
)]
pub async fn create_discount_code(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
    ApiJson(request): ApiJson<NewDiscountCode>,
) -> Result<(StatusCode, Json<DiscountCode>), ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let code = scope
        .adapter()
        .create_discount_code(scope.db(), scope.schema(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(code)))
}

/// Look a discount code up by its code, case-insensitively
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/discount-codes/by-code/{code}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("code" = String, Path, description = "Discount code")
    ),
    responses(
        (status = 200, description = "Discount code with current validity", body = DiscountCodeLookup),
        (status = 403, description = "Caller may not read this tenant", body = ApiError),
        (status = 404, description = "Code not found", body = ApiError)
    ),
    tag = "discount-codes"
)]
pub async fn lookup_discount_code(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, code)): Path<(String, String)>,
) -> Result<Json<DiscountCodeLookup>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let discount_code = scope
        .adapter()
        .discount_code_by_code(scope.db(), scope.schema(), &code)
        .await?;
    let valid_now = discount_code.is_valid(Utc::now());
    Ok(Json(DiscountCodeLookup {
        discount_code,
        valid_now,
    }))
}

/// Fetch one discount code
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/discount-codes/{codeId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("codeId" = String, Path, description = "Discount code id")
    ),
    responses(
        (status = 200, description = "Discount code", body = DiscountCode),
        (status = 403, description = "Caller may not read this tenant", body = ApiError),
        (status = 404, description = "Code not found", body = ApiError)
    ),
    tag = "discount-codes"
)]
pub async fn get_discount_code(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, code_id)): Path<(String, String)>,
) -> Result<Json<DiscountCode>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let code = scope
        .adapter()
        .discount_code_by_id(scope.db(), scope.schema(), &code_id)
        .await?;
    Ok(Json(code))
}

/// Update a discount code
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{tenantId}/discount-codes/{codeId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("codeId" = String, Path, description = "Discount code id")
    ),
    request_body = DiscountCodeUpdate,
    responses(
        (status = 200, description = "Discount code updated", body = DiscountCode),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Code not found", body = ApiError)
    ),
    tag = "discount-codes"
)]
pub async fn update_discount_code(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, code_id)): Path<(String, String)>,
    ApiJson(update): ApiJson<DiscountCodeUpdate>,
) -> Result<Json<DiscountCode>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let code = scope
        .adapter()
        .update_discount_code(scope.db(), scope.schema(), &code_id, update)
        .await?;
    Ok(Json(code))
}

/// Deactivate a discount code
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenantId}/discount-codes/{codeId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("codeId" = String, Path, description = "Discount code id")
    ),
    responses(
        (status = 204, description = "Discount code deactivated"),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Code not found", body = ApiError)
    ),
    tag = "discount-codes"
)]
pub async fn deactivate_discount_code(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, code_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    scope
        .adapter()
        .deactivate_discount_code(scope.db(), scope.schema(), &code_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
