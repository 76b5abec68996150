//! Control-plane database pool.
//!
//! The control plane holds tenant records, the audit log and portal
//! magic-link tokens. Tenant databases are not opened here; see
//! [`crate::tenant_cache`].

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tokio::time::sleep;

use crate::config::{AppConfig, ConfigError};

const CONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to connect to control-plane database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("invalid control-plane database configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
}

/// Open the control-plane pool, retrying transient failures with
/// exponential backoff.
///
/// Pool bounds come from `DB_MAX_CONNECTIONS` / `DB_MIN_CONNECTIONS`
/// (10 open, 5 kept warm by default).
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection, DatabaseError> {
    let url = cfg.database.connection_url()?;

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(cfg.database.max_connections)
        .min_connections(cfg.database.min_connections)
        .acquire_timeout(Duration::from_millis(cfg.database.acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut retry_delay = Duration::from_millis(100);
    let mut attempt = 1;

    loop {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                tracing::info!(attempt, "connected to control-plane database");
                return Ok(conn);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = retry_delay.as_millis() as u64,
                    "control-plane connection attempt failed"
                );
                sleep(retry_delay).await;
                retry_delay *= 2;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempts = CONNECT_ATTEMPTS, error = %e, "giving up on control-plane database");
                return Err(e.into());
            }
        }
    }
}

/// Round-trip `SELECT 1` against `db`.
pub async fn health_check(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_on_sqlite() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        assert!(health_check(&db).await.is_ok());
    }

    #[tokio::test]
    async fn test_init_pool_with_url_override() {
        let mut config = AppConfig::default();
        config.database.url = Some("sqlite::memory:".to_string());
        config.database.max_connections = 1;
        config.database.min_connections = 1;
        let db = init_pool(&config).await.unwrap();
        assert!(health_check(&db).await.is_ok());
    }
}
