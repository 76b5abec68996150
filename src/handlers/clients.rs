//! # Client Handlers
//!
//! Client reads are audited. Staff may read any client of a tenant they can
//! access; a portal user may read only their own record.

use axum::{
    extract::{Path, Query, State},
    http::{Method, Uri},
    response::Json,
};

use crate::adapters::{Client, ClientComprehensive, ClientWithFilings, PageRequest, Paginated};
use crate::audit::{AuditAction, ResourceKind};
use crate::auth::RequestOrigin;
use crate::context::{Access, RequestContext};
use crate::error::ApiError;
use crate::handlers::{AuditedRequest, TenantScope, audit};
use crate::server::AppState;

/// List clients of a tenant
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/clients",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id"), PageRequest),
    responses(
        (status = 200, description = "One page of clients", body = Paginated<Client>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "clients"
)]
pub async fn list_clients(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path(tenant_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paginated<Client>>, ApiError> {
    let identity = ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let clients = scope
        .adapter()
        .list_clients(scope.db(), scope.schema(), page)
        .await?;

    let request = AuditedRequest::new(method, uri, origin);
    audit(
        &state,
        request.entry(identity, scope.tenant_id(), AuditAction::View, ResourceKind::Client),
    )
    .await;

    Ok(Json(clients))
}

/// Clients that have at least one filing, each with its filings
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/clients/with-filings",
    security(("bearer_auth" = [])),
    params(("tenantId" = String, Path, description = "Tenant id"), PageRequest),
    responses(
        (status = 200, description = "One page of clients with filings", body = Paginated<ClientWithFilings>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "clients"
)]
pub async fn list_clients_with_filings(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path(tenant_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Paginated<ClientWithFilings>>, ApiError> {
    let identity = ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let clients = scope
        .adapter()
        .clients_with_filings(scope.db(), scope.schema(), page)
        .await?;

    let request = AuditedRequest::new(method, uri, origin);
    audit(
        &state,
        request.entry(identity, scope.tenant_id(), AuditAction::View, ResourceKind::Filing),
    )
    .await;

    Ok(Json(clients))
}

/// Fetch one client
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/clients/{clientId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("clientId" = String, Path, description = "Client id")
    ),
    responses(
        (status = 200, description = "Client", body = Client),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this client", body = ApiError),
        (status = 404, description = "Tenant or client not found", body = ApiError)
    ),
    tag = "clients"
)]
pub async fn get_client(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path((tenant_id, client_id)): Path<(String, String)>,
) -> Result<Json<Client>, ApiError> {
    let identity = ctx.require_client_access(&tenant_id, &client_id)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let client = scope
        .adapter()
        .client_by_id(scope.db(), scope.schema(), &client_id)
        .await?;

    let request = AuditedRequest::new(method, uri, origin);
    audit(
        &state,
        request
            .entry(identity, scope.tenant_id(), AuditAction::View, ResourceKind::Client)
            .client(client.id.clone())
            .resource(client.id.clone()),
    )
    .await;

    Ok(Json(client))
}

/// Client with dependents, filings and documents
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/clients/{clientId}/comprehensive",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("clientId" = String, Path, description = "Client id")
    ),
    responses(
        (status = 200, description = "Client detail", body = ClientComprehensive),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this client", body = ApiError),
        (status = 404, description = "Tenant or client not found", body = ApiError)
    ),
    tag = "clients"
)]
pub async fn get_client_comprehensive(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path((tenant_id, client_id)): Path<(String, String)>,
) -> Result<Json<ClientComprehensive>, ApiError> {
    let identity = ctx.require_client_access(&tenant_id, &client_id)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let detail = scope
        .adapter()
        .client_comprehensive(scope.db(), scope.schema(), &client_id)
        .await?;

    let request = AuditedRequest::new(method, uri, origin);
    let mut entry = request
        .entry(identity, scope.tenant_id(), AuditAction::View, ResourceKind::Client)
        .client(client_id.clone())
        .resource(client_id);
    entry.details = entry
        .details
        .with("dependents", detail.dependents.len())
        .with("filings", detail.filings.len())
        .with("documents", detail.documents.len());
    audit(&state, entry).await;

    Ok(Json(detail))
}
