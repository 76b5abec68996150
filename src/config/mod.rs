//! Configuration loading for the taxdesk service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `TAXDESK_`, producing a typed [`AppConfig`]. The encryption key is also
//! read from the unprefixed `SSN_ENCRYPTION_KEY`.

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secret_box::{CryptoError, CryptoKey};

const ENV_PREFIX: &str = "TAXDESK_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `TAXDESK_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub firebase: FirebaseConfig,
    #[serde(default)]
    pub sendgrid: SendgridConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default)]
    pub tenant_cache: TenantCacheConfig,
    #[serde(default)]
    pub secret_manager: SecretManagerConfig,
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// Base64 of the 32-byte Secret Box key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

/// Control-plane database coordinates and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_host")]
    pub host: String,
    #[serde(default = "default_database_port")]
    pub port: u16,
    #[serde(default = "default_database_user")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_database_name")]
    pub dbname: String,
    #[serde(default = "default_database_sslmode")]
    pub sslmode: String,
    /// Full URL overriding the composed coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CorsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FirebaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SendgridConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_from_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_from_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PortalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Tenant connection cache timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TenantCacheConfig {
    /// Idle threshold after which a handle is evicted
    #[serde(default = "default_tenant_cache_idle_seconds")]
    pub idle_seconds: u64,
    /// Eviction tick period
    #[serde(default = "default_tenant_cache_sweep_seconds")]
    pub sweep_seconds: u64,
}

/// Managed-secret service access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SecretManagerConfig {
    #[serde(default = "default_secret_manager_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_secret_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            server_port: default_server_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database: DatabaseConfig::default(),
            cors: CorsConfig::default(),
            firebase: FirebaseConfig::default(),
            sendgrid: SendgridConfig::default(),
            portal: PortalConfig::default(),
            operator_tokens: Vec::new(),
            tenant_cache: TenantCacheConfig::default(),
            secret_manager: SecretManagerConfig::default(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            encryption_key: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_database_host(),
            port: default_database_port(),
            user: default_database_user(),
            password: None,
            dbname: default_database_name(),
            sslmode: default_database_sslmode(),
            url: None,
            max_connections: default_db_max_connections(),
            min_connections: default_db_min_connections(),
            acquire_timeout_ms: default_db_acquire_timeout_ms(),
        }
    }
}

impl Default for TenantCacheConfig {
    fn default() -> Self {
        Self {
            idle_seconds: default_tenant_cache_idle_seconds(),
            sweep_seconds: default_tenant_cache_sweep_seconds(),
        }
    }
}

impl Default for SecretManagerConfig {
    fn default() -> Self {
        Self {
            base_url: default_secret_manager_base_url(),
            access_token: None,
            cache_ttl_seconds: default_secret_cache_ttl_seconds(),
        }
    }
}

impl DatabaseConfig {
    /// Control-plane connection URL.
    ///
    /// `DATABASE_URL` wins; otherwise a postgres URL is composed from the
    /// individual coordinates with the password percent-encoded.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let mut url = url::Url::parse("postgres://localhost")
            .map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))?;
        url.set_host(Some(&self.host))
            .map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))?;
        url.set_port(Some(self.port))
            .map_err(|_| ConfigError::InvalidDatabaseUrl("invalid port".to_string()))?;
        url.set_username(&self.user)
            .map_err(|_| ConfigError::InvalidDatabaseUrl("invalid user".to_string()))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| ConfigError::InvalidDatabaseUrl("invalid password".to_string()))?;
        }
        url.set_path(&self.dbname);
        url.query_pairs_mut().append_pair("sslmode", &self.sslmode);
        Ok(url.into())
    }
}

impl TenantCacheConfig {
    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_seconds)
    }

    pub fn sweep_every(&self) -> Duration {
        Duration::from_secs(self.sweep_seconds)
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.server_port))
    }

    /// Whether this profile may fall back to the built-in development key.
    pub fn allows_development_key(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Decode the Secret Box key.
    ///
    /// A malformed key always fails. A missing key yields the development
    /// key on `local`/`test` profiles and fails everywhere else.
    pub fn crypto_key(&self) -> Result<CryptoKey, ConfigError> {
        match &self.encryption_key {
            Some(encoded) => {
                CryptoKey::from_base64(encoded).map_err(ConfigError::InvalidEncryptionKey)
            }
            None if self.allows_development_key() => {
                tracing::warn!(
                    profile = %self.profile,
                    "SSN_ENCRYPTION_KEY not set; using the built-in development key"
                );
                Ok(CryptoKey::development())
            }
            None => Err(ConfigError::MissingEncryptionKey),
        }
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        let redact = |value: &mut Option<String>| {
            if value.is_some() {
                *value = Some(REDACTED.to_string());
            }
        };

        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec![REDACTED.to_string()];
        }
        redact(&mut config.encryption_key);
        redact(&mut config.database.password);
        redact(&mut config.database.url);
        redact(&mut config.firebase.api_key);
        redact(&mut config.sendgrid.api_key);
        redact(&mut config.portal.jwt_secret);
        redact(&mut config.secret_manager.access_token);
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::InvalidServerPort);
        }

        if let Some(encoded) = &self.encryption_key {
            CryptoKey::from_base64(encoded).map_err(ConfigError::InvalidEncryptionKey)?;
        } else if !self.allows_development_key() {
            return Err(ConfigError::MissingEncryptionKey);
        }

        if self.database.max_connections == 0
            || self.database.min_connections > self.database.max_connections
        {
            return Err(ConfigError::InvalidPoolBounds {
                min: self.database.min_connections,
                max: self.database.max_connections,
            });
        }

        if self.tenant_cache.sweep_seconds == 0
            || self.tenant_cache.idle_seconds < self.tenant_cache.sweep_seconds
        {
            return Err(ConfigError::InvalidCacheTiming {
                idle: self.tenant_cache.idle_seconds,
                sweep: self.tenant_cache.sweep_seconds,
            });
        }

        if self.secret_manager.cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidSecretCacheTtl);
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_host() -> String {
    "localhost".to_string()
}

fn default_database_port() -> u16 {
    5432
}

fn default_database_user() -> String {
    "postgres".to_string()
}

fn default_database_name() -> String {
    "taxdesk".to_string()
}

fn default_database_sslmode() -> String {
    "disable".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    5
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_tenant_cache_idle_seconds() -> u64 {
    300
}

fn default_tenant_cache_sweep_seconds() -> u64 {
    60
}

fn default_secret_manager_base_url() -> String {
    "https://secretmanager.googleapis.com".to_string()
}

fn default_secret_cache_ttl_seconds() -> u64 {
    3600
}

fn default_shutdown_grace_seconds() -> u64 {
    10
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("server port must be non-zero")]
    InvalidServerPort,
    #[error("SSN_ENCRYPTION_KEY is missing; required outside the local and test profiles")]
    MissingEncryptionKey,
    #[error("SSN_ENCRYPTION_KEY is invalid: {0}")]
    InvalidEncryptionKey(#[source] CryptoError),
    #[error("invalid database url: {0}")]
    InvalidDatabaseUrl(String),
    #[error("database pool bounds are invalid (min: {min}, max: {max})")]
    InvalidPoolBounds { min: u32, max: u32 },
    #[error("tenant cache idle threshold ({idle}s) must be at least the sweep period ({sweep}s)")]
    InvalidCacheTiming { idle: u64, sweep: u64 },
    #[error("secret cache ttl must be positive")]
    InvalidSecretCacheTtl,
    #[error("log format must be 'json' or 'pretty', got {value}")]
    InvalidLogFormat { value: String },
}

/// Loads configuration using layered `.env` files and `TAXDESK_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads the process configuration from `.env` layers and the environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }
        if let Ok(key) = env::var("SSN_ENCRYPTION_KEY") {
            layered
                .entry("SSN_ENCRYPTION_KEY".to_string())
                .or_insert(key);
        }

        let config = Self::from_layered(layered, profile_hint)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from already-collected, prefix-stripped keys.
    pub fn from_layered(
        mut layered: BTreeMap<String, String>,
        profile_hint: String,
    ) -> Result<AppConfig, ConfigError> {
        let mut take = |key: &str| layered.remove(key).filter(|v| !v.trim().is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let server_port = parse_or(take("SERVER_PORT"), "SERVER_PORT", default_server_port)?;
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);

        let database = DatabaseConfig {
            host: take("DATABASE_HOST").unwrap_or_else(default_database_host),
            port: parse_or(take("DATABASE_PORT"), "DATABASE_PORT", default_database_port)?,
            user: take("DATABASE_USER").unwrap_or_else(default_database_user),
            password: take("DATABASE_PASSWORD"),
            dbname: take("DATABASE_DBNAME").unwrap_or_else(default_database_name),
            sslmode: take("DATABASE_SSLMODE").unwrap_or_else(default_database_sslmode),
            url: take("DATABASE_URL"),
            max_connections: parse_or(
                take("DB_MAX_CONNECTIONS"),
                "DB_MAX_CONNECTIONS",
                default_db_max_connections,
            )?,
            min_connections: parse_or(
                take("DB_MIN_CONNECTIONS"),
                "DB_MIN_CONNECTIONS",
                default_db_min_connections,
            )?,
            acquire_timeout_ms: parse_or(
                take("DB_ACQUIRE_TIMEOUT_MS"),
                "DB_ACQUIRE_TIMEOUT_MS",
                default_db_acquire_timeout_ms,
            )?,
        };

        let cors = CorsConfig {
            allowed_origins: split_list(take("CORS_ALLOWED_ORIGINS")),
            allowed_methods: split_list(take("CORS_ALLOWED_METHODS")),
            allowed_headers: split_list(take("CORS_ALLOWED_HEADERS")),
            allow_credentials: parse_or(
                take("CORS_ALLOW_CREDENTIALS"),
                "CORS_ALLOW_CREDENTIALS",
                || false,
            )?,
        };

        let firebase = FirebaseConfig {
            api_key: take("FIREBASE_API_KEY"),
            service_account_path: take("FIREBASE_SERVICE_ACCOUNT_PATH"),
        };

        let sendgrid = SendgridConfig {
            api_key: take("SENDGRID_API_KEY"),
            default_from_email: take("SENDGRID_DEFAULT_FROM_EMAIL"),
            default_from_name: take("SENDGRID_DEFAULT_FROM_NAME"),
        };

        let portal = PortalConfig {
            jwt_secret: take("PORTAL_JWT_SECRET"),
            base_url: take("PORTAL_BASE_URL"),
        };

        // Support both a single token and a comma-separated list
        let operator_tokens = match take("OPERATOR_TOKENS") {
            Some(tokens) => split_list(Some(tokens)),
            None => take("OPERATOR_TOKEN").into_iter().collect(),
        };

        let tenant_cache = TenantCacheConfig {
            idle_seconds: parse_or(
                take("TENANT_CACHE_IDLE_SECONDS"),
                "TENANT_CACHE_IDLE_SECONDS",
                default_tenant_cache_idle_seconds,
            )?,
            sweep_seconds: parse_or(
                take("TENANT_CACHE_SWEEP_SECONDS"),
                "TENANT_CACHE_SWEEP_SECONDS",
                default_tenant_cache_sweep_seconds,
            )?,
        };

        let secret_manager = SecretManagerConfig {
            base_url: take("SECRET_MANAGER_BASE_URL")
                .unwrap_or_else(default_secret_manager_base_url),
            access_token: take("SECRET_MANAGER_ACCESS_TOKEN"),
            cache_ttl_seconds: parse_or(
                take("SECRET_CACHE_TTL_SECONDS"),
                "SECRET_CACHE_TTL_SECONDS",
                default_secret_cache_ttl_seconds,
            )?,
        };

        let shutdown_grace_seconds = parse_or(
            take("SHUTDOWN_GRACE_SECONDS"),
            "SHUTDOWN_GRACE_SECONDS",
            default_shutdown_grace_seconds,
        )?;

        let encryption_key = take("SSN_ENCRYPTION_KEY");

        Ok(AppConfig {
            profile,
            server_port,
            log_level,
            log_format,
            database,
            cors,
            firebase,
            sendgrid,
            portal,
            operator_tokens,
            tenant_cache,
            secret_manager,
            shutdown_grace_seconds,
            encryption_key,
        })
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("TAXDESK_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    } else if key == "SSN_ENCRYPTION_KEY" {
                        values.insert(key, value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &str,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        None => Ok(default()),
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};
    use std::fs;
    use tempfile::TempDir;

    fn layered(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_key() -> String {
        general_purpose::STANDARD.encode([9u8; 32])
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::from_layered(BTreeMap::new(), "local".to_string()).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.min_connections, 5);
        assert_eq!(config.tenant_cache.idle_seconds, 300);
        assert_eq!(config.tenant_cache.sweep_seconds, 60);
        assert_eq!(config.secret_manager.cache_ttl_seconds, 3600);
        assert_eq!(config.shutdown_grace_seconds, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_keys_are_mapped() {
        let config = ConfigLoader::from_layered(
            layered(&[
                ("SERVER_PORT", "9090"),
                ("DATABASE_HOST", "db.internal"),
                ("DATABASE_PASSWORD", "s3cr3t"),
                ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
                ("CORS_ALLOW_CREDENTIALS", "true"),
                ("PORTAL_JWT_SECRET", "jwt-secret"),
                ("OPERATOR_TOKENS", "one,two"),
            ]),
            "local".to_string(),
        )
        .unwrap();

        assert_eq!(config.server_port, 9090);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(config.cors.allow_credentials);
        assert_eq!(config.portal.jwt_secret.as_deref(), Some("jwt-secret"));
        assert_eq!(config.operator_tokens, vec!["one", "two"]);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = ConfigLoader::from_layered(
            layered(&[("SERVER_PORT", "not-a-port")]),
            "local".to_string(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_key_outside_local_fails() {
        let config =
            ConfigLoader::from_layered(BTreeMap::new(), "production".to_string()).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEncryptionKey)
        ));
        assert!(matches!(
            config.crypto_key(),
            Err(ConfigError::MissingEncryptionKey)
        ));
    }

    #[test]
    fn test_missing_key_in_test_profile_uses_development_key() {
        let config = ConfigLoader::from_layered(BTreeMap::new(), "test".to_string()).unwrap();
        let key = config.crypto_key().unwrap();
        assert_eq!(key.as_bytes(), CryptoKey::development().as_bytes());
    }

    #[test]
    fn test_malformed_key_always_fails() {
        let short = general_purpose::STANDARD.encode([1u8; 16]);
        for profile in ["local", "production"] {
            let config = ConfigLoader::from_layered(
                layered(&[("SSN_ENCRYPTION_KEY", &short)]),
                profile.to_string(),
            )
            .unwrap();
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidEncryptionKey(_))
            ));
        }
    }

    #[test]
    fn test_valid_key_in_production() {
        let config = ConfigLoader::from_layered(
            layered(&[("SSN_ENCRYPTION_KEY", &valid_key())]),
            "production".to_string(),
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.crypto_key().unwrap().as_bytes(), &[9u8; 32]);
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let config = ConfigLoader::from_layered(
            layered(&[
                ("SSN_ENCRYPTION_KEY", &valid_key()),
                ("DATABASE_PASSWORD", "db-password-value"),
                ("PORTAL_JWT_SECRET", "jwt-secret-value"),
                ("OPERATOR_TOKENS", "operator-token-value"),
                ("SENDGRID_API_KEY", "sendgrid-key-value"),
            ]),
            "local".to_string(),
        )
        .unwrap();

        let json = config.redacted_json().unwrap();
        assert!(!json.contains("db-password-value"));
        assert!(!json.contains("jwt-secret-value"));
        assert!(!json.contains("operator-token-value"));
        assert!(!json.contains("sendgrid-key-value"));
        assert!(!json.contains(&valid_key()));
        assert!(json.contains(REDACTED));
    }

    #[test]
    fn test_connection_url_encodes_password() {
        let database = DatabaseConfig {
            password: Some("p@ss/word".to_string()),
            ..DatabaseConfig::default()
        };
        let url = database.connection_url().unwrap();
        assert!(url.starts_with("postgres://postgres:"));
        assert!(!url.contains("p@ss/word"));
        assert!(url.ends_with("/taxdesk?sslmode=disable"));
    }

    #[test]
    fn test_cache_timing_validation() {
        let mut config = AppConfig::default();
        config.tenant_cache.idle_seconds = 30;
        config.tenant_cache.sweep_seconds = 60;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCacheTiming { .. })
        ));
    }

    #[test]
    fn test_layered_dotenv_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".env"),
            "TAXDESK_PROFILE=local\nTAXDESK_SERVER_PORT=7000\nUNRELATED=1\n",
        )
        .unwrap();
        fs::write(dir.path().join(".env.local"), "TAXDESK_LOG_FORMAT=pretty\n").unwrap();

        let loader = ConfigLoader::with_base_dir(dir.path().to_path_buf());
        let (values, profile) = loader.collect_layered_env().unwrap();

        assert_eq!(profile, "local");
        assert_eq!(values.get("SERVER_PORT").map(String::as_str), Some("7000"));
        assert_eq!(values.get("LOG_FORMAT").map(String::as_str), Some("pretty"));
        assert!(!values.contains_key("UNRELATED"));
    }
}
