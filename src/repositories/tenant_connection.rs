//! # Tenant Registry
//!
//! Control-plane access to `tenant_connections`. The registry is the only
//! component that holds decrypted tenant credentials; everything it returns
//! to admin callers is a [`TenantSummary`], which has no password field.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::adapters::AdapterKind;
use crate::error::CoreError;
use crate::models::tenant_connection::{self, Entity as TenantConnection};
use crate::secret_box::{SealCategory, SecretBox, SecretString, is_sealed};

static SCHEMA_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("static regex"));

static TENANT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("static regex"));

const SSL_MODES: &[&str] = &[
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];

/// Decrypted tenant connection record.
///
/// Only the tenant connection cache and integration code receive this type.
/// `db_password` is a [`SecretString`], so `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct TenantConnectionRecord {
    pub tenant_id: String,
    pub name: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: SecretString,
    pub db_name: String,
    pub db_sslmode: String,
    pub schema_prefix: String,
    pub adapter_kind: String,
    pub storage_provider: String,
    pub storage_bucket: Option<String>,
    pub storage_credentials_secret: Option<String>,
    pub storage_credentials_path: Option<String>,
    pub signing_key_secret: Option<String>,
    pub signing_key_path: Option<String>,
    pub signing_integration_key: Option<String>,
    pub signing_account_id: Option<String>,
    pub signing_user_id: Option<String>,
    pub signing_api_base_url: Option<String>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantConnectionRecord {
    /// Authoritative reference for object-storage credentials.
    ///
    /// A managed secret wins over a file path when both are set.
    pub fn storage_credentials(&self) -> Option<&str> {
        authoritative(
            &self.storage_credentials_secret,
            &self.storage_credentials_path,
        )
    }

    /// Authoritative reference for the signature-service private key.
    pub fn signing_key(&self) -> Option<&str> {
        authoritative(&self.signing_key_secret, &self.signing_key_path)
    }
}

fn authoritative<'a>(managed: &'a Option<String>, path: &'a Option<String>) -> Option<&'a str> {
    managed
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| path.as_deref().filter(|s| !s.trim().is_empty()))
}

/// Admin view of a tenant. Never carries the password.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TenantSummary {
    pub tenant_id: String,
    pub name: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_name: String,
    pub db_sslmode: String,
    pub schema_prefix: String,
    pub adapter_kind: String,
    pub storage_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_credentials_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_credentials_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_integration_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_api_base_url: Option<String>,
    pub is_active: bool,
    /// Whether the stored password is sealed (false means it awaits rotation)
    pub password_sealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<tenant_connection::Model> for TenantSummary {
    fn from(model: tenant_connection::Model) -> Self {
        Self {
            password_sealed: is_sealed(&model.db_password),
            tenant_id: model.tenant_id,
            name: model.name,
            db_host: model.db_host,
            db_port: u16::try_from(model.db_port).unwrap_or_default(),
            db_user: model.db_user,
            db_name: model.db_name,
            db_sslmode: model.db_sslmode,
            schema_prefix: model.schema_prefix,
            adapter_kind: model.adapter_kind,
            storage_provider: model.storage_provider,
            storage_bucket: model.storage_bucket,
            storage_credentials_secret: model.storage_credentials_secret,
            storage_credentials_path: model.storage_credentials_path,
            signing_key_secret: model.signing_key_secret,
            signing_key_path: model.signing_key_path,
            signing_integration_key: model.signing_integration_key,
            signing_account_id: model.signing_account_id,
            signing_user_id: model.signing_user_id,
            signing_api_base_url: model.signing_api_base_url,
            is_active: model.is_active,
            created_by: model.created_by,
            notes: model.notes,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Admin request to register a tenant.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewTenantConnection {
    pub tenant_id: String,
    pub name: String,
    pub db_host: String,
    #[serde(default)]
    pub db_port: Option<u16>,
    pub db_user: String,
    #[schema(value_type = String, format = Password)]
    pub db_password: SecretString,
    pub db_name: String,
    #[serde(default)]
    pub db_sslmode: Option<String>,
    pub schema_prefix: String,
    #[serde(default)]
    pub adapter_kind: Option<String>,
    #[serde(default)]
    pub storage_provider: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default)]
    pub storage_credentials_secret: Option<String>,
    #[serde(default)]
    pub storage_credentials_path: Option<String>,
    #[serde(default)]
    pub signing_key_secret: Option<String>,
    #[serde(default)]
    pub signing_key_path: Option<String>,
    #[serde(default)]
    pub signing_integration_key: Option<String>,
    #[serde(default)]
    pub signing_account_id: Option<String>,
    #[serde(default)]
    pub signing_user_id: Option<String>,
    #[serde(default)]
    pub signing_api_base_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Admin request to change a tenant. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TenantConnectionUpdate {
    pub name: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    #[schema(value_type = Option<String>, format = Password)]
    pub db_password: Option<SecretString>,
    pub db_name: Option<String>,
    pub db_sslmode: Option<String>,
    pub schema_prefix: Option<String>,
    pub adapter_kind: Option<String>,
    pub storage_provider: Option<String>,
    pub storage_bucket: Option<String>,
    pub storage_credentials_secret: Option<String>,
    pub storage_credentials_path: Option<String>,
    pub signing_key_secret: Option<String>,
    pub signing_key_path: Option<String>,
    pub signing_integration_key: Option<String>,
    pub signing_account_id: Option<String>,
    pub signing_user_id: Option<String>,
    pub signing_api_base_url: Option<String>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

/// Outcome of [`TenantRegistry::seal_plaintext_passwords`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SealReport {
    pub examined: usize,
    pub sealed: usize,
}

/// Source of authoritative tenant records for the connection cache.
#[async_trait]
pub trait TenantSource: Send + Sync {
    /// Active record with the password unsealed.
    async fn get(&self, tenant_id: &str) -> Result<TenantConnectionRecord, CoreError>;
}

/// Registry over the control-plane `tenant_connections` table.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    db: Arc<DatabaseConnection>,
    secret_box: Arc<SecretBox>,
}

impl TenantRegistry {
    pub fn new(db: Arc<DatabaseConnection>, secret_box: Arc<SecretBox>) -> Self {
        Self { db, secret_box }
    }

    /// Active tenant with its password unsealed.
    ///
    /// Inactive rows are refused with [`CoreError::TenantInactive`].
    pub async fn get(&self, tenant_id: &str) -> Result<TenantConnectionRecord, CoreError> {
        let model = TenantConnection::find_by_id(tenant_id.to_string())
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))?;

        if !model.is_active {
            return Err(CoreError::TenantInactive(tenant_id.to_string()));
        }

        self.into_record(model)
    }

    /// Admin point read; includes inactive tenants.
    pub async fn find(&self, tenant_id: &str) -> Result<TenantSummary, CoreError> {
        TenantConnection::find_by_id(tenant_id.to_string())
            .one(self.db.as_ref())
            .await?
            .map(TenantSummary::from)
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))
    }

    /// Every tenant, newest first.
    pub async fn list_all(&self) -> Result<Vec<TenantSummary>, CoreError> {
        let rows = TenantConnection::find()
            .order_by_desc(tenant_connection::Column::CreatedAt)
            .order_by_asc(tenant_connection::Column::TenantId)
            .all(self.db.as_ref())
            .await?;

        Ok(rows.into_iter().map(TenantSummary::from).collect())
    }

    /// Register a tenant. The password is sealed before it is stored.
    pub async fn create(
        &self,
        request: NewTenantConnection,
        created_by: Option<String>,
    ) -> Result<TenantSummary, CoreError> {
        validate_tenant_id(&request.tenant_id)?;
        require_non_empty("name", &request.name)?;
        require_non_empty("db_host", &request.db_host)?;
        require_non_empty("db_user", &request.db_user)?;
        require_non_empty("db_name", &request.db_name)?;
        if request.db_password.is_empty() {
            return Err(CoreError::malformed("db_password is required"));
        }
        validate_schema_prefix(&request.schema_prefix)?;
        let adapter_kind = normalize_adapter_kind(request.adapter_kind.as_deref())?;
        let sslmode = normalize_sslmode(request.db_sslmode.as_deref())?;
        let port = validate_port(request.db_port.unwrap_or(5432))?;

        let sealed = self.seal_password(&request.tenant_id, &request.db_password)?;
        let now = Utc::now();

        let active = tenant_connection::ActiveModel {
            tenant_id: Set(request.tenant_id),
            name: Set(request.name),
            db_host: Set(request.db_host),
            db_port: Set(port),
            db_user: Set(request.db_user),
            db_password: Set(sealed),
            db_name: Set(request.db_name),
            db_sslmode: Set(sslmode),
            schema_prefix: Set(request.schema_prefix),
            adapter_kind: Set(adapter_kind),
            storage_provider: Set(request
                .storage_provider
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "gcs".to_string())),
            storage_bucket: Set(request.storage_bucket),
            storage_credentials_secret: Set(request.storage_credentials_secret),
            storage_credentials_path: Set(request.storage_credentials_path),
            signing_key_secret: Set(request.signing_key_secret),
            signing_key_path: Set(request.signing_key_path),
            signing_integration_key: Set(request.signing_integration_key),
            signing_account_id: Set(request.signing_account_id),
            signing_user_id: Set(request.signing_user_id),
            signing_api_base_url: Set(request.signing_api_base_url),
            is_active: Set(true),
            created_by: Set(created_by),
            notes: Set(request.notes),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let model = active.insert(self.db.as_ref()).await?;
        tracing::info!(tenant_id = %model.tenant_id, "tenant registered");
        Ok(model.into())
    }

    /// Apply an admin update. A supplied password is sealed before it is stored.
    pub async fn update(
        &self,
        tenant_id: &str,
        update: TenantConnectionUpdate,
    ) -> Result<TenantSummary, CoreError> {
        let model = TenantConnection::find_by_id(tenant_id.to_string())
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))?;

        let mut active = model.into_active_model();

        if let Some(name) = update.name {
            require_non_empty("name", &name)?;
            active.name = Set(name);
        }
        if let Some(host) = update.db_host {
            require_non_empty("db_host", &host)?;
            active.db_host = Set(host);
        }
        if let Some(port) = update.db_port {
            active.db_port = Set(validate_port(port)?);
        }
        if let Some(user) = update.db_user {
            require_non_empty("db_user", &user)?;
            active.db_user = Set(user);
        }
        if let Some(password) = update.db_password {
            if password.is_empty() {
                return Err(CoreError::malformed("db_password must not be empty"));
            }
            active.db_password = Set(self.seal_password(tenant_id, &password)?);
        }
        if let Some(db_name) = update.db_name {
            require_non_empty("db_name", &db_name)?;
            active.db_name = Set(db_name);
        }
        if let Some(sslmode) = update.db_sslmode {
            active.db_sslmode = Set(normalize_sslmode(Some(&sslmode))?);
        }
        if let Some(prefix) = update.schema_prefix {
            validate_schema_prefix(&prefix)?;
            active.schema_prefix = Set(prefix);
        }
        if let Some(kind) = update.adapter_kind {
            active.adapter_kind = Set(normalize_adapter_kind(Some(&kind))?);
        }
        if let Some(provider) = update.storage_provider {
            require_non_empty("storage_provider", &provider)?;
            active.storage_provider = Set(provider);
        }
        if let Some(value) = update.storage_bucket {
            active.storage_bucket = Set(non_empty(value));
        }
        if let Some(value) = update.storage_credentials_secret {
            active.storage_credentials_secret = Set(non_empty(value));
        }
        if let Some(value) = update.storage_credentials_path {
            active.storage_credentials_path = Set(non_empty(value));
        }
        if let Some(value) = update.signing_key_secret {
            active.signing_key_secret = Set(non_empty(value));
        }
        if let Some(value) = update.signing_key_path {
            active.signing_key_path = Set(non_empty(value));
        }
        if let Some(value) = update.signing_integration_key {
            active.signing_integration_key = Set(non_empty(value));
        }
        if let Some(value) = update.signing_account_id {
            active.signing_account_id = Set(non_empty(value));
        }
        if let Some(value) = update.signing_user_id {
            active.signing_user_id = Set(non_empty(value));
        }
        if let Some(value) = update.signing_api_base_url {
            active.signing_api_base_url = Set(non_empty(value));
        }
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(notes) = update.notes {
            active.notes = Set(non_empty(notes));
        }
        active.updated_at = Set(Utc::now().into());

        let model = active.update(self.db.as_ref()).await?;
        tracing::info!(tenant_id = %model.tenant_id, "tenant updated");
        Ok(model.into())
    }

    /// Soft-retire a tenant. Cached handles stay open until evicted; new
    /// cache populations are refused by [`TenantRegistry::get`].
    pub async fn deactivate(&self, tenant_id: &str) -> Result<(), CoreError> {
        let result = TenantConnection::update_many()
            .col_expr(tenant_connection::Column::IsActive, Expr::value(false))
            .col_expr(
                tenant_connection::Column::UpdatedAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(tenant_connection::Column::TenantId.eq(tenant_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(CoreError::TenantNotFound(tenant_id.to_string()));
        }

        tracing::info!(tenant_id = %tenant_id, "tenant deactivated");
        Ok(())
    }

    /// Re-seal any password still stored as plaintext.
    pub async fn seal_plaintext_passwords(&self) -> Result<SealReport, CoreError> {
        let rows = TenantConnection::find().all(self.db.as_ref()).await?;
        let mut report = SealReport {
            examined: rows.len(),
            sealed: 0,
        };

        for model in rows {
            if is_sealed(&model.db_password) {
                continue;
            }

            let tenant_id = model.tenant_id.clone();
            let sealed =
                self.seal_password(&tenant_id, &SecretString::new(model.db_password.clone()))?;
            let mut active = model.into_active_model();
            active.db_password = Set(sealed);
            active.updated_at = Set(Utc::now().into());
            active.update(self.db.as_ref()).await?;

            report.sealed += 1;
            tracing::info!(tenant_id = %tenant_id, "sealed plaintext tenant password");
        }

        Ok(report)
    }

    fn seal_password(&self, tenant_id: &str, password: &SecretString) -> Result<String, CoreError> {
        self.secret_box
            .seal(SealCategory::Password, password.expose())
            .map_err(|e| {
                tracing::error!(tenant_id = %tenant_id, error = %e, "failed to seal tenant password");
                CoreError::CredentialUnavailable(tenant_id.to_string())
            })
    }

    fn into_record(&self, model: tenant_connection::Model) -> Result<TenantConnectionRecord, CoreError> {
        let tenant_id = model.tenant_id.clone();

        // Stored rows are re-validated: the prefix is spliced into SQL.
        if !SCHEMA_PREFIX_RE.is_match(&model.schema_prefix) {
            return Err(CoreError::TenantMisconfigured {
                tenant_id,
                reason: "schema prefix is not a bare lowercase identifier".to_string(),
            });
        }
        let db_port =
            u16::try_from(model.db_port)
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| CoreError::TenantMisconfigured {
                    tenant_id: tenant_id.clone(),
                    reason: "database port out of range".to_string(),
                })?;

        let db_password = if is_sealed(&model.db_password) {
            self.secret_box
                .open_as(SealCategory::Password, &model.db_password)
                .map(SecretString::new)
                .map_err(|e| {
                    tracing::error!(tenant_id = %tenant_id, error = %e, "failed to unseal tenant password");
                    CoreError::CredentialUnavailable(tenant_id.clone())
                })?
        } else {
            tracing::warn!(
                tenant_id = %tenant_id,
                "tenant password stored unsealed; run `taxdesk-provision seal-passwords`"
            );
            SecretString::new(model.db_password.clone())
        };

        Ok(TenantConnectionRecord {
            tenant_id: model.tenant_id,
            name: model.name,
            db_host: model.db_host,
            db_port,
            db_user: model.db_user,
            db_password,
            db_name: model.db_name,
            db_sslmode: model.db_sslmode,
            schema_prefix: model.schema_prefix,
            adapter_kind: model.adapter_kind,
            storage_provider: model.storage_provider,
            storage_bucket: model.storage_bucket,
            storage_credentials_secret: model.storage_credentials_secret,
            storage_credentials_path: model.storage_credentials_path,
            signing_key_secret: model.signing_key_secret,
            signing_key_path: model.signing_key_path,
            signing_integration_key: model.signing_integration_key,
            signing_account_id: model.signing_account_id,
            signing_user_id: model.signing_user_id,
            signing_api_base_url: model.signing_api_base_url,
            is_active: model.is_active,
            created_by: model.created_by,
            notes: model.notes,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl TenantSource for TenantRegistry {
    async fn get(&self, tenant_id: &str) -> Result<TenantConnectionRecord, CoreError> {
        TenantRegistry::get(self, tenant_id).await
    }
}

/// Whether `prefix` is safe to splice into SQL as a bare identifier.
pub fn is_valid_schema_prefix(prefix: &str) -> bool {
    SCHEMA_PREFIX_RE.is_match(prefix)
}

fn validate_schema_prefix(prefix: &str) -> Result<(), CoreError> {
    if is_valid_schema_prefix(prefix) {
        Ok(())
    } else {
        Err(CoreError::malformed(
            "schema_prefix must match ^[a-z_][a-z0-9_]{0,62}$",
        ))
    }
}

fn validate_tenant_id(tenant_id: &str) -> Result<(), CoreError> {
    if TENANT_ID_RE.is_match(tenant_id) {
        Ok(())
    } else {
        Err(CoreError::malformed(
            "tenant_id must be 1-64 characters of letters, digits, '-' or '_'",
        ))
    }
}

fn validate_port(port: u16) -> Result<i32, CoreError> {
    if port == 0 {
        return Err(CoreError::malformed("db_port must be between 1 and 65535"));
    }
    Ok(i32::from(port))
}

fn normalize_adapter_kind(kind: Option<&str>) -> Result<String, CoreError> {
    match kind.map(str::trim).filter(|k| !k.is_empty()) {
        None => Ok(AdapterKind::default().as_str().to_string()),
        Some(kind) => kind
            .parse::<AdapterKind>()
            .map(|k| k.as_str().to_string())
            .map_err(|_| CoreError::malformed(format!("unknown adapter_kind '{}'", kind))),
    }
}

fn normalize_sslmode(mode: Option<&str>) -> Result<String, CoreError> {
    match mode.map(str::trim).filter(|m| !m.is_empty()) {
        None => Ok("require".to_string()),
        Some(mode) if SSL_MODES.contains(&mode) => Ok(mode.to_string()),
        Some(mode) => Err(CoreError::malformed(format!("unknown db_sslmode '{}'", mode))),
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::malformed(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_prefix_rules() {
        for ok in ["taxapp", "_private", "tenant_01", "a"] {
            assert!(is_valid_schema_prefix(ok), "{ok} should be valid");
        }
        for bad in [
            "",
            "Tax",
            "1abc",
            "tax-app",
            "tax app",
            "tax;drop",
            "\"quoted\"",
        ] {
            assert!(!is_valid_schema_prefix(bad), "{bad} should be rejected");
        }
        assert!(is_valid_schema_prefix(&"a".repeat(63)));
        assert!(!is_valid_schema_prefix(&"a".repeat(64)));
    }

    #[test]
    fn test_tenant_id_rules() {
        assert!(validate_tenant_id("acme-tax_01").is_ok());
        assert!(validate_tenant_id("").is_err());
        assert!(validate_tenant_id("-leading").is_err());
        assert!(validate_tenant_id("has space").is_err());
    }

    #[test]
    fn test_adapter_kind_defaults_and_rejects_unknown() {
        assert_eq!(normalize_adapter_kind(None).unwrap(), "standard");
        assert_eq!(normalize_adapter_kind(Some("  ")).unwrap(), "standard");
        assert_eq!(normalize_adapter_kind(Some("standard")).unwrap(), "standard");
        assert!(normalize_adapter_kind(Some("mystery")).is_err());
    }

    #[test]
    fn test_sslmode_defaults_to_require() {
        assert_eq!(normalize_sslmode(None).unwrap(), "require");
        assert_eq!(normalize_sslmode(Some("verify-full")).unwrap(), "verify-full");
        assert!(normalize_sslmode(Some("sometimes")).is_err());
    }

    #[test]
    fn test_authoritative_reference_prefers_managed() {
        let managed = Some("projects/p/secrets/s".to_string());
        let path = Some("/etc/creds.json".to_string());
        assert_eq!(authoritative(&managed, &path), Some("projects/p/secrets/s"));
        assert_eq!(authoritative(&None, &path), Some("/etc/creds.json"));
        assert_eq!(authoritative(&Some(" ".to_string()), &path), Some("/etc/creds.json"));
        assert_eq!(authoritative(&None, &None), None);
    }
}
