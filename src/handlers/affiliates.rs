//! # Affiliate Handlers
//!
//! Staff routes manage affiliates and their portal tokens. The dashboard,
//! stats and commission routes are public and authenticate with an
//! affiliate token in `?token=`; the token's affiliate must be the one named
//! in the path.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::adapters::{
    Affiliate, AffiliateStats, AffiliateUpdate, Commission, CommissionFilter, NewAffiliate,
};
use crate::affiliate_tokens::{AffiliateToken, AffiliateTokens, GenerateTokenRequest, IssuedToken};
use crate::context::{Access, RequestContext};
use crate::error::{ApiError, forbidden};
use crate::handlers::TenantScope;
use crate::handlers::types::{AffiliateDashboard, ApiJson, ListResponse, TokenQuery};
use crate::server::AppState;

const DASHBOARD_COMMISSIONS: u64 = 10;

/// List affiliates
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/affiliates",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Affiliates", body = ListResponse<Affiliate>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "affiliates"
)]
pub async fn list_affiliates(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
) -> Result<Json<ListResponse<Affiliate>>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let affiliates = scope
        .adapter()
        .list_affiliates(scope.db(), scope.schema())
        .await?;
    Ok(Json(ListResponse::new(affiliates)))
}

/// Create an affiliate
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenantId}/affiliates",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id")),
    request_body = NewAffiliate,
    responses(
        (status = 201, description = "Affiliate created", body = Affiliate),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError)
    ),
    tag = "affiliates"
)]
pub async fn create_affiliate(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(tenant_id): Path<String>,
    ApiJson(request): ApiJson<NewAffiliate>,
) -> Result<(StatusCode, Json<Affiliate>), ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let affiliate = scope
        .adapter()
        .create_affiliate(scope.db(), scope.schema(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(affiliate)))
}

/// Fetch one affiliate
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/affiliates/{affiliateId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("affiliateId" = String, Path, description = "Affiliate id")
    ),
    responses(
        (status = 200, description = "Affiliate", body = Affiliate),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError),
        (status = 404, description = "Tenant or affiliate not found", body = ApiError)
    ),
    tag = "affiliates"
)]
pub async fn get_affiliate(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, affiliate_id)): Path<(String, String)>,
) -> Result<Json<Affiliate>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let affiliate = scope
        .adapter()
        .affiliate_by_id(scope.db(), scope.schema(), &affiliate_id)
        .await?;
    Ok(Json(affiliate))
}

/// Update an affiliate
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{tenantId}/affiliates/{affiliateId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("affiliateId" = String, Path, description = "Affiliate id")
    ),
    request_body = AffiliateUpdate,
    responses(
        (status = 200, description = "Affiliate updated", body = Affiliate),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Tenant or affiliate not found", body = ApiError)
    ),
    tag = "affiliates"
)]
pub async fn update_affiliate(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, affiliate_id)): Path<(String, String)>,
    ApiJson(update): ApiJson<AffiliateUpdate>,
) -> Result<Json<Affiliate>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let affiliate = scope
        .adapter()
        .update_affiliate(scope.db(), scope.schema(), &affiliate_id, update)
        .await?;
    Ok(Json(affiliate))
}

/// Issue a portal token for an affiliate. The plaintext is returned once.
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenantId}/affiliates/{affiliateId}/tokens",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("affiliateId" = String, Path, description = "Affiliate id")
    ),
    request_body = GenerateTokenRequest,
    responses(
        (status = 201, description = "Token issued", body = IssuedToken),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Tenant or affiliate not found", body = ApiError)
    ),
    tag = "affiliates"
)]
pub async fn generate_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, affiliate_id)): Path<(String, String)>,
    ApiJson(request): ApiJson<GenerateTokenRequest>,
) -> Result<(StatusCode, Json<IssuedToken>), ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let affiliate = scope
        .adapter()
        .affiliate_by_id(scope.db(), scope.schema(), &affiliate_id)
        .await?;
    let issued = AffiliateTokens::new(scope.db(), scope.schema())
        .generate(&affiliate.id, request.expires_at, request.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// Token metadata for an affiliate
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/affiliates/{affiliateId}/tokens",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("affiliateId" = String, Path, description = "Affiliate id")
    ),
    responses(
        (status = 200, description = "Tokens, newest first", body = ListResponse<AffiliateToken>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError)
    ),
    tag = "affiliates"
)]
pub async fn list_tokens(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, affiliate_id)): Path<(String, String)>,
) -> Result<Json<ListResponse<AffiliateToken>>, ApiError> {
    ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    let tokens = AffiliateTokens::new(scope.db(), scope.schema())
        .list_for_affiliate(&affiliate_id)
        .await?;
    Ok(Json(ListResponse::new(tokens)))
}

/// Revoke an affiliate token
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenantId}/affiliate-tokens/{tokenId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("tokenId" = String, Path, description = "Token id")
    ),
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Missing or invalid bearer token, or unknown token", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError)
    ),
    tag = "affiliates"
)]
pub async fn revoke_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((tenant_id, token_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;
    AffiliateTokens::new(scope.db(), scope.schema())
        .revoke(&token_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Validate `token` against the path affiliate.
async fn affiliate_session(
    state: &AppState,
    tenant_id: &str,
    affiliate_id: &str,
    token: &str,
) -> Result<TenantScope, ApiError> {
    let scope = TenantScope::open(state, tenant_id).await?;
    let owner = AffiliateTokens::new(scope.db(), scope.schema())
        .validate(token)
        .await?;
    if owner != affiliate_id {
        return Err(forbidden(Some("Token does not belong to this affiliate")));
    }
    Ok(scope)
}

/// Affiliate dashboard
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/affiliates/{affiliateId}/dashboard",
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("affiliateId" = String, Path, description = "Affiliate id"),
        TokenQuery
    ),
    responses(
        (status = 200, description = "Dashboard", body = AffiliateDashboard),
        (status = 401, description = "Invalid or expired token", body = ApiError),
        (status = 403, description = "Token belongs to another affiliate", body = ApiError)
    ),
    tag = "affiliate-portal"
)]
pub async fn affiliate_dashboard(
    State(state): State<AppState>,
    Path((tenant_id, affiliate_id)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<AffiliateDashboard>, ApiError> {
    let scope = affiliate_session(&state, &tenant_id, &affiliate_id, &query.token).await?;
    let adapter = scope.adapter();

    let affiliate = adapter
        .affiliate_by_id(scope.db(), scope.schema(), &affiliate_id)
        .await?;
    let stats = adapter
        .affiliate_stats(scope.db(), scope.schema(), &affiliate_id)
        .await?;
    let recent_commissions = adapter
        .list_commissions(
            scope.db(),
            scope.schema(),
            CommissionFilter {
                affiliate_id: Some(affiliate_id.clone()),
                status: None,
                limit: Some(DASHBOARD_COMMISSIONS),
            },
        )
        .await?;

    Ok(Json(AffiliateDashboard {
        affiliate,
        stats,
        recent_commissions,
    }))
}

/// Affiliate commission totals
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/affiliates/{affiliateId}/stats",
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("affiliateId" = String, Path, description = "Affiliate id"),
        TokenQuery
    ),
    responses(
        (status = 200, description = "Totals", body = AffiliateStats),
        (status = 401, description = "Invalid or expired token", body = ApiError),
        (status = 403, description = "Token belongs to another affiliate", body = ApiError)
    ),
    tag = "affiliate-portal"
)]
pub async fn affiliate_stats(
    State(state): State<AppState>,
    Path((tenant_id, affiliate_id)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<AffiliateStats>, ApiError> {
    let scope = affiliate_session(&state, &tenant_id, &affiliate_id, &query.token).await?;
    let stats = scope
        .adapter()
        .affiliate_stats(scope.db(), scope.schema(), &affiliate_id)
        .await?;
    Ok(Json(stats))
}

/// The affiliate's own commissions
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/affiliates/{affiliateId}/commissions",
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("affiliateId" = String, Path, description = "Affiliate id"),
        TokenQuery
    ),
    responses(
        (status = 200, description = "Commissions, newest first", body = ListResponse<Commission>),
        (status = 401, description = "Invalid or expired token", body = ApiError),
        (status = 403, description = "Token belongs to another affiliate", body = ApiError)
    ),
    tag = "affiliate-portal"
)]
pub async fn affiliate_commissions(
    State(state): State<AppState>,
    Path((tenant_id, affiliate_id)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ListResponse<Commission>>, ApiError> {
    let scope = affiliate_session(&state, &tenant_id, &affiliate_id, &query.token).await?;
    let commissions = scope
        .adapter()
        .list_commissions(
            scope.db(),
            scope.schema(),
            CommissionFilter {
                affiliate_id: Some(affiliate_id),
                status: None,
                limit: None,
            },
        )
        .await?;
    Ok(Json(ListResponse::new(commissions)))
}
