//! # Document Handlers
//!
//! Document metadata for filings. Reads, uploads and deletes are audited.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::adapters::{Document, NewDocument};
use crate::audit::{AuditAction, ResourceKind};
use crate::auth::RequestOrigin;
use crate::context::{Access, RequestContext};
use crate::error::ApiError;
use crate::handlers::types::{ApiJson, ListResponse};
use crate::handlers::{AuditedRequest, TenantScope, audit};
use crate::server::AppState;

/// Metadata of a file already placed in object storage
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadDocumentRequest {
    pub client_id: String,
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub storage_path: String,
    #[serde(default)]
    pub size_bytes: i64,
}

/// Documents attached to a filing
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/filings/{filingId}/documents",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("filingId" = String, Path, description = "Filing id")
    ),
    responses(
        (status = 200, description = "Documents of the filing", body = ListResponse<Document>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "documents"
)]
pub async fn list_filing_documents(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path((tenant_id, filing_id)): Path<(String, String)>,
) -> Result<Json<ListResponse<Document>>, ApiError> {
    let identity = ctx.require_staff(&tenant_id, Access::Read)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let documents = scope
        .adapter()
        .documents_by_filing(scope.db(), scope.schema(), &filing_id)
        .await?;

    let request = AuditedRequest::new(method, uri, origin);
    let mut entry = request
        .entry(identity, scope.tenant_id(), AuditAction::View, ResourceKind::Document)
        .resource(filing_id);
    if let Some(first) = documents.first() {
        entry = entry.client(first.client_id.clone());
    }
    entry.details = entry.details.with("documents", documents.len());
    audit(&state, entry).await;

    Ok(Json(ListResponse::new(documents)))
}

/// Record a document for a filing
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenantId}/filings/{filingId}/documents",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("filingId" = String, Path, description = "Filing id")
    ),
    request_body = UploadDocumentRequest,
    responses(
        (status = 201, description = "Document recorded", body = Document),
        (status = 400, description = "Filing does not belong to the client", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Tenant or filing not found", body = ApiError)
    ),
    tag = "documents"
)]
pub async fn upload_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path((tenant_id, filing_id)): Path<(String, String)>,
    ApiJson(request): ApiJson<UploadDocumentRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let identity = ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let document = scope
        .adapter()
        .create_document(
            scope.db(),
            scope.schema(),
            NewDocument {
                filing_id,
                client_id: request.client_id,
                file_name: request.file_name,
                content_type: request.content_type,
                storage_path: request.storage_path,
                size_bytes: request.size_bytes,
                uploaded_by: Some(identity.actor_id().to_string()),
            },
        )
        .await?;

    let audited = AuditedRequest::new(method, uri, origin);
    audit(
        &state,
        audited
            .entry(identity, scope.tenant_id(), AuditAction::Upload, ResourceKind::Document)
            .client(document.client_id.clone())
            .resource(document.id.clone()),
    )
    .await;

    Ok((StatusCode::CREATED, Json(document)))
}

/// Fetch one document's metadata
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenantId}/documents/{documentId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("documentId" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Document", body = Document),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not read this document", body = ApiError),
        (status = 404, description = "Tenant or document not found", body = ApiError)
    ),
    tag = "documents"
)]
pub async fn get_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path((tenant_id, document_id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    ctx.require_identity()?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let document = scope
        .adapter()
        .document_by_id(scope.db(), scope.schema(), &document_id)
        .await?;
    let identity = ctx.require_client_access(&tenant_id, &document.client_id)?;

    let request = AuditedRequest::new(method, uri, origin);
    audit(
        &state,
        request
            .entry(identity, scope.tenant_id(), AuditAction::View, ResourceKind::Document)
            .client(document.client_id.clone())
            .resource(document.id.clone()),
    )
    .await;

    Ok(Json(document))
}

/// Delete a document's metadata row
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenantId}/documents/{documentId}",
    security(("bearer_auth" = [])),
    params(
        ("tenantId" = String, Path, description = "Tenant id"),
        ("documentId" = String, Path, description = "Document id")
    ),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Caller may not write to this tenant", body = ApiError),
        (status = 404, description = "Tenant or document not found", body = ApiError)
    ),
    tag = "documents"
)]
pub async fn delete_document(
    State(state): State<AppState>,
    ctx: RequestContext,
    origin: RequestOrigin,
    method: Method,
    uri: Uri,
    Path((tenant_id, document_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let identity = ctx.require_staff(&tenant_id, Access::Write)?;
    let scope = TenantScope::open(&state, &tenant_id).await?;

    let document = scope
        .adapter()
        .document_by_id(scope.db(), scope.schema(), &document_id)
        .await?;
    scope
        .adapter()
        .delete_document(scope.db(), scope.schema(), &document_id)
        .await?;

    let request = AuditedRequest::new(method, uri, origin);
    audit(
        &state,
        request
            .entry(identity, scope.tenant_id(), AuditAction::Delete, ResourceKind::Document)
            .client(document.client_id)
            .resource(document.id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
