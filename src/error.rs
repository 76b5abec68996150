//! # Error Handling
//!
//! [`CoreError`] is the taxonomy surfaced by the tenant routing core. The HTTP
//! boundary converts it into [`ApiError`], a problem+json body carrying the
//! request trace id. Messages leaving through `ApiError` are fixed strings per
//! kind so that no credential or secret reference text reaches a client.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::secrets::SecretError;
use crate::telemetry;

/// Failure kinds of the tenant routing core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("tenant not found: {0}")]
    TenantNotFound(String),
    #[error("tenant inactive: {0}")]
    TenantInactive(String),
    #[error("credentials unavailable for tenant {0}")]
    CredentialUnavailable(String),
    #[error("failed to connect to tenant {tenant_id}: {reason}")]
    ConnectFailed { tenant_id: String, reason: String },
    #[error("secret unavailable: {reference}")]
    SecretUnavailable { reference: String },
    #[error("no adapter for kind {0:?}")]
    AdapterUnavailable(String),
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("token not found: {0}")]
    TokenNotFound(String),
    #[error("illegal state transition from {from} to {to}")]
    IllegalStateTransition { from: String, to: String },
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("tenant {tenant_id} is misconfigured: {reason}")]
    TenantMisconfigured { tenant_id: String, reason: String },
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        CoreError::MalformedInput(message.into())
    }

    /// HTTP status for this kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::TenantNotFound(_) | CoreError::TenantInactive(_) => StatusCode::NOT_FOUND,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::InvalidOrExpiredToken
            | CoreError::TokenNotFound(_)
            | CoreError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            CoreError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            CoreError::IllegalStateTransition { .. } => StatusCode::CONFLICT,
            CoreError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            CoreError::CredentialUnavailable(_)
            | CoreError::ConnectFailed { .. }
            | CoreError::SecretUnavailable { .. }
            | CoreError::AdapterUnavailable(_)
            | CoreError::TenantMisconfigured { .. }
            | CoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable SCREAMING_SNAKE_CASE code
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            CoreError::TenantInactive(_) => "TENANT_INACTIVE",
            CoreError::CredentialUnavailable(_) => "CREDENTIAL_UNAVAILABLE",
            CoreError::ConnectFailed { .. } => "CONNECT_FAILED",
            CoreError::SecretUnavailable { .. } => "SECRET_UNAVAILABLE",
            CoreError::AdapterUnavailable(_) => "ADAPTER_UNAVAILABLE",
            CoreError::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            CoreError::TokenNotFound(_) => "TOKEN_NOT_FOUND",
            CoreError::IllegalStateTransition { .. } => "ILLEGAL_STATE_TRANSITION",
            CoreError::NotAuthenticated => "UNAUTHORIZED",
            CoreError::NotAuthorized(_) => "FORBIDDEN",
            CoreError::MalformedInput(_) => "VALIDATION_FAILED",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::TenantMisconfigured { .. } => "TENANT_MISCONFIGURED",
            CoreError::Database(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// One-line message safe to hand to a client
    fn client_message(&self) -> String {
        match self {
            CoreError::TenantNotFound(_) | CoreError::TenantInactive(_) => {
                "Tenant not found".to_string()
            }
            CoreError::InvalidOrExpiredToken => "Invalid or expired token".to_string(),
            CoreError::TokenNotFound(_) => "Token not found".to_string(),
            CoreError::IllegalStateTransition { from, to } => {
                format!("Cannot transition from {} to {}", from, to)
            }
            CoreError::NotAuthenticated => "Authentication required".to_string(),
            CoreError::NotAuthorized(reason) => reason.clone(),
            CoreError::MalformedInput(reason) => reason.clone(),
            CoreError::NotFound { entity, .. } => format!("{} not found", entity),
            _ => "An internal error occurred".to_string(),
        }
    }
}

impl From<SecretError> for CoreError {
    fn from(error: SecretError) -> Self {
        CoreError::SecretUnavailable {
            reference: error.reference().to_string(),
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let status = error.status_code();
        if status.is_server_error() {
            tracing::error!(error = %error, code = error.error_code(), "request failed");
        } else {
            tracing::debug!(error = %error, code = error.error_code(), "request rejected");
        }

        if let CoreError::Database(db_error) = &error
            && is_unique_violation(db_error)
        {
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        Self::new(status, error.error_code(), &error.client_message())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => {
                return validation_error(
                    "Request body does not match the expected shape",
                    serde_json::json!({ "body": err.body_text() }),
                );
            }
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header"
            }
            _ => "Invalid request body",
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        CoreError::Database(error).into()
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, details: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(details)
}

/// Create a forbidden error (403)
pub fn forbidden(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Insufficient permissions");
    ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
}
