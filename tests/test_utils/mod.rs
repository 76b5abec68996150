//! Test utilities for database testing.
//!
//! Control-plane tests run against an in-memory SQLite database with every
//! migration applied. Tenant databases are simulated with a second in-memory
//! SQLite database ATTACHed under the tenant's schema prefix, so adapter SQL
//! qualified as `"<prefix>"."<table>"` resolves the same way it does against a
//! Postgres schema.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement,
    Value,
};
use taxdesk::config::AppConfig;
use taxdesk::error::CoreError;
use taxdesk::repositories::{TenantConnectionRecord, TenantSource};
use taxdesk::secret_box::SecretString;
use taxdesk::tenant_cache::HandleConnector;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    // Fixtures do not always satisfy cross-table relations.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Sets up an in-memory SQLite database with all migrations applied and returns an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

const TENANT_TABLES: &[&str] = &[
    "CREATE TABLE {schema}.clients (
        id TEXT PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        address TEXT,
        affiliate_id TEXT,
        ssn_encrypted TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE {schema}.dependents (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        relationship TEXT,
        date_of_birth TEXT
    )",
    "CREATE TABLE {schema}.filings (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        tax_year INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT
    )",
    "CREATE TABLE {schema}.documents (
        id TEXT PRIMARY KEY,
        filing_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        content_type TEXT,
        storage_path TEXT NOT NULL,
        size_bytes INTEGER NOT NULL DEFAULT 0,
        uploaded_by TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE {schema}.affiliates (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        commission_rate REAL NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE {schema}.commissions (
        id TEXT PRIMARY KEY,
        affiliate_id TEXT NOT NULL,
        client_id TEXT,
        filing_id TEXT,
        amount_cents INTEGER NOT NULL,
        status TEXT NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL,
        approved_at TEXT,
        paid_at TEXT,
        cancelled_at TEXT
    )",
    "CREATE TABLE {schema}.discount_codes (
        id TEXT PRIMARY KEY,
        affiliate_id TEXT,
        code TEXT NOT NULL UNIQUE,
        amount_off_cents INTEGER,
        percent_off REAL,
        valid_from TEXT,
        valid_until TEXT,
        max_uses INTEGER,
        current_uses INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE {schema}.affiliate_tokens (
        id TEXT PRIMARY KEY,
        affiliate_id TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        expires_at TEXT,
        last_used_at TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        notes TEXT,
        created_at TEXT NOT NULL
    )",
];

/// In-memory tenant database with the standard layout under `schema`.
///
/// The pool is pinned to one connection: an ATTACHed in-memory database only
/// exists on the connection that attached it.
pub async fn setup_tenant_db(schema: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    db.execute_unprepared(&format!("ATTACH DATABASE ':memory:' AS {schema}"))
        .await?;
    for ddl in TENANT_TABLES {
        db.execute_unprepared(&ddl.replace("{schema}", schema)).await?;
    }

    Ok(db)
}

async fn insert(
    db: &DatabaseConnection,
    schema: &str,
    table: &str,
    columns: &[&str],
    values: Vec<Value>,
) -> Result<()> {
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {schema}.{table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    db.execute(Statement::from_sql_and_values(DbBackend::Sqlite, sql, values))
        .await?;
    Ok(())
}

pub async fn insert_client(
    db: &DatabaseConnection,
    schema: &str,
    id: &str,
    name: (&str, &str),
    affiliate_id: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<()> {
    insert(
        db,
        schema,
        "clients",
        &[
            "id",
            "first_name",
            "last_name",
            "email",
            "affiliate_id",
            "ssn_encrypted",
            "created_at",
            "updated_at",
        ],
        vec![
            id.into(),
            name.0.into(),
            name.1.into(),
            format!("{id}@example.com").into(),
            affiliate_id.map(str::to_string).into(),
            "ssn:v1:not-a-real-ciphertext".into(),
            created_at.into(),
            created_at.into(),
        ],
    )
    .await
}

pub async fn insert_dependent(
    db: &DatabaseConnection,
    schema: &str,
    id: &str,
    client_id: &str,
    name: (&str, &str),
) -> Result<()> {
    insert(
        db,
        schema,
        "dependents",
        &["id", "client_id", "first_name", "last_name", "relationship"],
        vec![
            id.into(),
            client_id.into(),
            name.0.into(),
            name.1.into(),
            "child".into(),
        ],
    )
    .await
}

pub async fn insert_filing(
    db: &DatabaseConnection,
    schema: &str,
    id: &str,
    client_id: &str,
    tax_year: i32,
    created_at: DateTime<Utc>,
) -> Result<()> {
    insert(
        db,
        schema,
        "filings",
        &[
            "id",
            "client_id",
            "tax_year",
            "status",
            "created_at",
            "updated_at",
        ],
        vec![
            id.into(),
            client_id.into(),
            tax_year.into(),
            "in_progress".into(),
            created_at.into(),
            created_at.into(),
        ],
    )
    .await
}

pub async fn insert_affiliate(db: &DatabaseConnection, schema: &str, id: &str) -> Result<()> {
    let now = Utc::now();
    insert(
        db,
        schema,
        "affiliates",
        &[
            "id",
            "name",
            "email",
            "commission_rate",
            "is_active",
            "created_at",
            "updated_at",
        ],
        vec![
            id.into(),
            format!("Affiliate {id}").into(),
            format!("{id}@partners.example.com").into(),
            0.1f64.into(),
            true.into(),
            now.into(),
            now.into(),
        ],
    )
    .await
}

pub async fn insert_commission(
    db: &DatabaseConnection,
    schema: &str,
    id: &str,
    affiliate_id: &str,
    amount_cents: i64,
    status: &str,
    created_at: DateTime<Utc>,
) -> Result<()> {
    insert(
        db,
        schema,
        "commissions",
        &[
            "id",
            "affiliate_id",
            "amount_cents",
            "status",
            "created_at",
        ],
        vec![
            id.into(),
            affiliate_id.into(),
            amount_cents.into(),
            status.into(),
            created_at.into(),
        ],
    )
    .await
}

/// Active tenant record pointing nowhere in particular.
pub fn tenant_record(tenant_id: &str, schema_prefix: &str) -> TenantConnectionRecord {
    let now = Utc::now();
    TenantConnectionRecord {
        tenant_id: tenant_id.to_string(),
        name: format!("{tenant_id} tax"),
        db_host: "127.0.0.1".to_string(),
        db_port: 5432,
        db_user: "app".to_string(),
        db_password: SecretString::new("hunter2"),
        db_name: tenant_id.to_string(),
        db_sslmode: "disable".to_string(),
        schema_prefix: schema_prefix.to_string(),
        adapter_kind: "standard".to_string(),
        storage_provider: "gcs".to_string(),
        storage_bucket: None,
        storage_credentials_secret: None,
        storage_credentials_path: None,
        signing_key_secret: None,
        signing_key_path: None,
        signing_integration_key: None,
        signing_account_id: None,
        signing_user_id: None,
        signing_api_base_url: None,
        is_active: true,
        created_by: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

/// In-memory [`TenantSource`] with per-tenant lookup counts.
#[derive(Default)]
pub struct StaticTenants {
    records: Mutex<HashMap<String, TenantConnectionRecord>>,
    lookups: AtomicUsize,
}

impl StaticTenants {
    pub fn with(records: impl IntoIterator<Item = TenantConnectionRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.tenant_id.clone(), record))
                    .collect(),
            ),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_active(&self, tenant_id: &str, is_active: bool) {
        if let Some(record) = self.records.lock().unwrap().get_mut(tenant_id) {
            record.is_active = is_active;
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantSource for StaticTenants {
    async fn get(&self, tenant_id: &str) -> Result<TenantConnectionRecord, CoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().unwrap();
        let record = records
            .get(tenant_id)
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))?;
        if !record.is_active {
            return Err(CoreError::TenantInactive(tenant_id.to_string()));
        }
        Ok(record.clone())
    }
}

/// [`HandleConnector`] that never touches the network.
///
/// Tenants registered with [`FakeConnector::with_database`] get a clone of that
/// pool; anyone else gets a fresh in-memory SQLite database. Opens can be
/// slowed down, refused or crashed, and probes can be made to fail.
#[derive(Default)]
pub struct FakeConnector {
    databases: Mutex<HashMap<String, DatabaseConnection>>,
    refused: Mutex<HashSet<String>>,
    crashing: Mutex<HashSet<String>>,
    probe_fails: AtomicBool,
    delay: Duration,
    opens: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_database(self, tenant_id: &str, db: DatabaseConnection) -> Self {
        self.databases
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), db);
        self
    }

    pub fn refuse(&self, tenant_id: &str) {
        self.refused.lock().unwrap().insert(tenant_id.to_string());
    }

    /// Make opens for `tenant_id` panic once the delay has elapsed.
    pub fn crash_on_open(&self, tenant_id: &str) {
        self.crashing.lock().unwrap().insert(tenant_id.to_string());
    }

    pub fn fail_probes(&self, fail: bool) {
        self.probe_fails.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandleConnector for FakeConnector {
    async fn open(&self, record: &TenantConnectionRecord) -> Result<DatabaseConnection, DbErr> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.crashing.lock().unwrap().contains(&record.tenant_id) {
            panic!("connector crashed while opening {}", record.tenant_id);
        }
        if self.refused.lock().unwrap().contains(&record.tenant_id) {
            return Err(DbErr::Custom(format!(
                "connection to {} refused",
                record.db_host
            )));
        }

        let prepared = self
            .databases
            .lock()
            .unwrap()
            .get(&record.tenant_id)
            .cloned();
        match prepared {
            Some(db) => Ok(db),
            None => Database::connect("sqlite::memory:").await,
        }
    }

    async fn probe(&self, conn: &DatabaseConnection) -> Result<(), DbErr> {
        if self.probe_fails.load(Ordering::SeqCst) {
            return Err(DbErr::Custom("probe failed".to_string()));
        }
        conn.ping().await
    }
}

/// Configuration for router tests: one operator token and a portal secret.
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        portal: taxdesk::config::PortalConfig {
            jwt_secret: Some(PORTAL_SECRET.to_string()),
            base_url: None,
        },
        ..AppConfig::default()
    }
}

pub const OPERATOR_TOKEN: &str = "operator-test-token";
pub const PORTAL_SECRET: &str = "portal-test-secret";
