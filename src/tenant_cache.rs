//! # Tenant Connection Cache
//!
//! Process-wide map from tenant id to an open, pooled database handle.
//!
//! Slots move through `Connecting -> Live` on a successful open and probe, and
//! are removed on failure, on idle eviction and at shutdown. Only one caller
//! opens a handle for a given tenant; concurrent callers wait on the
//! connecting slot and then share the winner's handle.
//!
//! The map lock is never held across a network round-trip: the open and the
//! liveness probe run with no lock held, and the result is installed under a
//! second exclusive section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::TenantCacheConfig;
use crate::error::CoreError;
use crate::repositories::tenant_connection::{TenantConnectionRecord, TenantSource};

/// Per-tenant pool limits, fixed when the handle is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_open: u32,
    /// Advisory; sqlx pools have no separate idle cap, so idle connections
    /// are bounded by `max_open` and reaped after `max_lifetime`.
    pub max_idle: u32,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_open: 5,
            max_idle: 2,
            max_lifetime: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Eviction timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub idle_after: Duration,
    pub sweep_every: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            idle_after: Duration::from_secs(300),
            sweep_every: Duration::from_secs(60),
        }
    }
}

impl From<&TenantCacheConfig> for CacheSettings {
    fn from(config: &TenantCacheConfig) -> Self {
        Self {
            idle_after: config.idle_after(),
            sweep_every: config.sweep_every(),
        }
    }
}

/// Opens tenant database handles.
#[async_trait]
pub trait HandleConnector: Send + Sync {
    async fn open(&self, record: &TenantConnectionRecord) -> Result<DatabaseConnection, DbErr>;

    /// Liveness probe issued once before a handle is installed.
    async fn probe(&self, conn: &DatabaseConnection) -> Result<(), DbErr> {
        conn.ping().await
    }
}

/// Connector for Postgres tenants through sea-orm pools.
#[derive(Debug, Clone, Default)]
pub struct SeaOrmConnector {
    limits: PoolLimits,
}

impl SeaOrmConnector {
    pub fn new(limits: PoolLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// Connection URL for a tenant record. Holds the password, so the
    /// returned string is zeroized on drop and must never be logged.
    pub fn connection_url(record: &TenantConnectionRecord) -> Result<Zeroizing<String>, DbErr> {
        let invalid = |what: &str| {
            DbErr::Custom(format!(
                "invalid {what} for tenant {}",
                record.tenant_id
            ))
        };

        let mut url = url::Url::parse("postgres://localhost").map_err(|_| invalid("url"))?;
        url.set_host(Some(&record.db_host))
            .map_err(|_| invalid("host"))?;
        url.set_port(Some(record.db_port))
            .map_err(|_| invalid("port"))?;
        url.set_username(&record.db_user)
            .map_err(|_| invalid("user"))?;
        url.set_password(Some(record.db_password.expose()))
            .map_err(|_| invalid("password"))?;
        url.set_path(&record.db_name);
        url.query_pairs_mut()
            .append_pair("sslmode", &record.db_sslmode);

        Ok(Zeroizing::new(url.into()))
    }
}

#[async_trait]
impl HandleConnector for SeaOrmConnector {
    async fn open(&self, record: &TenantConnectionRecord) -> Result<DatabaseConnection, DbErr> {
        let url = Self::connection_url(record)?;

        let mut options = ConnectOptions::new(url.as_str());
        options
            .max_connections(self.limits.max_open)
            .min_connections(0)
            .idle_timeout(self.limits.max_lifetime)
            .max_lifetime(self.limits.max_lifetime)
            .acquire_timeout(self.limits.acquire_timeout)
            .connect_timeout(self.limits.acquire_timeout)
            .sqlx_logging(false);

        Database::connect(options).await
    }
}

/// Open handle owned by the cache.
#[derive(Debug)]
pub struct TenantHandle {
    tenant_id: String,
    conn: DatabaseConnection,
    opened_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl TenantHandle {
    fn new(tenant_id: String, conn: DatabaseConnection) -> Self {
        Self {
            tenant_id,
            conn,
            opened_at: Utc::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.conn.clone().close().await {
            debug!(tenant_id = %self.tenant_id, error = %e, "tenant pool close reported an error");
        }
    }
}

type ConnectOutcome = Option<Result<(), String>>;

enum Slot {
    Connecting(watch::Receiver<ConnectOutcome>),
    Live {
        handle: Arc<TenantHandle>,
        last_access: Instant,
    },
}

struct CacheInner {
    slots: RwLock<HashMap<String, Slot>>,
    source: Arc<dyn TenantSource>,
    connector: Arc<dyn HandleConnector>,
    settings: CacheSettings,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Shared tenant connection cache. Cloning is cheap and shares the map.
#[derive(Clone)]
pub struct TenantConnectionCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for TenantConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnectionCache")
            .field("settings", &self.inner.settings)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TenantConnectionCache {
    pub fn new(
        source: Arc<dyn TenantSource>,
        connector: Arc<dyn HandleConnector>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: RwLock::new(HashMap::new()),
                source,
                connector,
                settings,
                shutdown: CancellationToken::new(),
                sweeper: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn settings(&self) -> CacheSettings {
        self.inner.settings
    }

    /// Open handle and the current record for `tenant_id`.
    ///
    /// The record always comes from the tenant source, even on a hit, so
    /// callers see current metadata while the handle stays pooled.
    pub async fn obtain(
        &self,
        tenant_id: &str,
    ) -> Result<(Arc<TenantHandle>, TenantConnectionRecord), CoreError> {
        self.ensure_open(tenant_id)?;

        if let Some(handle) = self.live_handle(tenant_id).await {
            let record = self.inner.source.get(tenant_id).await?;
            if self.touch(tenant_id, &handle).await {
                counter!("tenant_cache_hits_total").increment(1);
                return Ok((handle, record));
            }
            // evicted between the read and the touch
            return self.populate_or_join(record).await;
        }

        counter!("tenant_cache_misses_total").increment(1);
        let record = self.inner.source.get(tenant_id).await?;
        self.populate_or_join(record).await
    }

    /// Number of live handles.
    pub async fn len(&self) -> usize {
        self.inner
            .slots
            .read()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Live { .. }))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, tenant_id: &str) -> bool {
        self.live_handle(tenant_id).await.is_some()
    }

    /// Last access time of a live slot.
    pub async fn last_access(&self, tenant_id: &str) -> Option<Instant> {
        match self.inner.slots.read().await.get(tenant_id) {
            Some(Slot::Live { last_access, .. }) => Some(*last_access),
            _ => None,
        }
    }

    /// Drop and close the live handle for `tenant_id`, if any. Used after an
    /// admin changes connection coordinates.
    pub async fn invalidate(&self, tenant_id: &str) -> bool {
        let removed = {
            let mut slots = self.inner.slots.write().await;
            match slots.get(tenant_id) {
                Some(Slot::Live { .. }) => match slots.remove(tenant_id) {
                    Some(Slot::Live { handle, .. }) => Some(handle),
                    _ => None,
                },
                _ => None,
            }
        };

        match removed {
            Some(handle) => {
                handle.close().await;
                self.record_entries().await;
                info!(tenant_id, "tenant connection invalidated");
                true
            }
            None => false,
        }
    }

    /// Evict every live slot idle for longer than the threshold as of `now`.
    /// Returns how many handles were closed.
    pub async fn evict_idle_at(&self, now: Instant) -> usize {
        let idle_after = self.inner.settings.idle_after;

        let evicted: Vec<Arc<TenantHandle>> = {
            let mut slots = self.inner.slots.write().await;
            // last_access is read under this same exclusive section
            let stale: Vec<String> = slots
                .iter()
                .filter_map(|(id, slot)| match slot {
                    Slot::Live { last_access, .. }
                        if now.saturating_duration_since(*last_access) > idle_after =>
                    {
                        Some(id.clone())
                    }
                    _ => None,
                })
                .collect();

            stale
                .iter()
                .filter_map(|id| match slots.remove(id) {
                    Some(Slot::Live { handle, .. }) => Some(handle),
                    _ => None,
                })
                .collect()
        };

        for handle in &evicted {
            handle.close().await;
            info!(tenant_id = %handle.tenant_id(), "evicted idle tenant connection");
        }

        if !evicted.is_empty() {
            counter!("tenant_cache_evictions_total").increment(evicted.len() as u64);
            self.record_entries().await;
        }
        evicted.len()
    }

    /// Spawn the periodic eviction task. Calling it twice keeps the first task.
    pub fn start_eviction(&self) {
        let mut sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() || self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        let cache = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.settings.sweep_every;

        *sweeper = Some(tokio::spawn(async move {
            info!(sweep_seconds = period.as_secs(), "tenant cache sweeper started");
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = cache.evict_idle_at(Instant::now()).await;
                        debug!(evicted, "tenant cache sweep finished");
                    }
                }
            }
            info!("tenant cache sweeper stopped");
        }));
    }

    /// Stop the sweeper, close every handle and refuse further `obtain` calls.
    pub async fn close_all(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.cancel();

        let sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = sweeper {
            if let Err(e) = task.await {
                warn!(error = %e, "tenant cache sweeper ended abnormally");
            }
        }

        let handles: Vec<Arc<TenantHandle>> = self
            .inner
            .slots
            .write()
            .await
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Live { handle, .. } => Some(handle),
                Slot::Connecting(_) => None,
            })
            .collect();

        for handle in &handles {
            handle.close().await;
        }
        gauge!("tenant_cache_entries").set(0.0);
        info!(closed = handles.len(), "tenant connection cache closed");
    }

    fn ensure_open(&self, tenant_id: &str) -> Result<(), CoreError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CoreError::ConnectFailed {
                tenant_id: tenant_id.to_string(),
                reason: "connection cache is closed".to_string(),
            });
        }
        Ok(())
    }

    async fn live_handle(&self, tenant_id: &str) -> Option<Arc<TenantHandle>> {
        match self.inner.slots.read().await.get(tenant_id) {
            Some(Slot::Live { handle, .. }) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Refresh last-access if the slot still holds `handle`.
    async fn touch(&self, tenant_id: &str, handle: &Arc<TenantHandle>) -> bool {
        let mut slots = self.inner.slots.write().await;
        match slots.get_mut(tenant_id) {
            Some(Slot::Live {
                handle: current,
                last_access,
            }) if Arc::ptr_eq(current, handle) => {
                *last_access = Instant::now();
                true
            }
            _ => false,
        }
    }

    async fn populate_or_join(
        &self,
        record: TenantConnectionRecord,
    ) -> Result<(Arc<TenantHandle>, TenantConnectionRecord), CoreError> {
        let tenant_id = record.tenant_id.clone();

        loop {
            let mut slots = self.inner.slots.write().await;
            self.ensure_open(&tenant_id)?;

            match slots.get_mut(&tenant_id) {
                Some(Slot::Live {
                    handle,
                    last_access,
                }) => {
                    *last_access = Instant::now();
                    return Ok((Arc::clone(handle), record));
                }
                Some(Slot::Connecting(outcome)) => {
                    let mut outcome = outcome.clone();
                    drop(slots);

                    let reported = match outcome.wait_for(Option::is_some).await {
                        Ok(done) => Some(match &*done {
                            Some(Err(reason)) => Some(reason.clone()),
                            _ => None,
                        }),
                        Err(_) => None,
                    };
                    match reported {
                        Some(Some(reason)) => {
                            return Err(CoreError::ConnectFailed { tenant_id, reason });
                        }
                        Some(None) => {}
                        // The connect task died without reporting and nobody
                        // is left to clean up its slot.
                        None => self.discard_connecting(&tenant_id, &outcome).await,
                    }
                }
                None => {
                    let (done, outcome) = watch::channel(None);
                    slots.insert(tenant_id.clone(), Slot::Connecting(outcome.clone()));
                    drop(slots);

                    // Detached so a cancelled caller cannot strand the slot.
                    let task = tokio::spawn(Self::connect(
                        Arc::clone(&self.inner),
                        record.clone(),
                        done,
                    ));
                    return match task.await {
                        Ok(result) => result.map(|handle| (handle, record)),
                        Err(e) => {
                            self.discard_connecting(&tenant_id, &outcome).await;
                            Err(CoreError::ConnectFailed {
                                tenant_id,
                                reason: format!("connect task failed: {e}"),
                            })
                        }
                    };
                }
            }
        }
    }

    async fn connect(
        inner: Arc<CacheInner>,
        record: TenantConnectionRecord,
        done: watch::Sender<ConnectOutcome>,
    ) -> Result<Arc<TenantHandle>, CoreError> {
        let tenant_id = record.tenant_id.clone();
        let started = Instant::now();

        let opened = match inner.connector.open(&record).await {
            Ok(conn) => match inner.connector.probe(&conn).await {
                Ok(()) => Ok(conn),
                Err(e) => {
                    if let Err(close_err) = conn.close().await {
                        debug!(tenant_id = %tenant_id, error = %close_err, "closing unhealthy pool failed");
                    }
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        let mut slots = inner.slots.write().await;
        let failure = match opened {
            Ok(conn) if !inner.closed.load(Ordering::Acquire) => {
                let handle = Arc::new(TenantHandle::new(tenant_id.clone(), conn));
                slots.insert(
                    tenant_id.clone(),
                    Slot::Live {
                        handle: Arc::clone(&handle),
                        last_access: Instant::now(),
                    },
                );
                let live = slots
                    .values()
                    .filter(|slot| matches!(slot, Slot::Live { .. }))
                    .count();
                drop(slots);

                gauge!("tenant_cache_entries").set(live as f64);
                done.send_replace(Some(Ok(())));
                info!(
                    tenant_id = %tenant_id,
                    adapter_kind = %record.adapter_kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tenant connection opened"
                );
                return Ok(handle);
            }
            Ok(conn) => {
                slots.remove(&tenant_id);
                drop(slots);
                if let Err(e) = conn.close().await {
                    debug!(tenant_id = %tenant_id, error = %e, "closing late pool failed");
                }
                "connection cache is closed".to_string()
            }
            Err(e) => {
                slots.remove(&tenant_id);
                drop(slots);
                counter!("tenant_cache_connect_failures_total").increment(1);
                warn!(tenant_id = %tenant_id, error = %e, "tenant connection failed");
                e.to_string()
            }
        };

        done.send_replace(Some(Err(failure.clone())));
        Err(CoreError::ConnectFailed {
            tenant_id,
            reason: failure,
        })
    }

    /// Remove the `Connecting` slot fed by `outcome`, if it is still there.
    async fn discard_connecting(&self, tenant_id: &str, outcome: &watch::Receiver<ConnectOutcome>) {
        let mut slots = self.inner.slots.write().await;
        let stale = matches!(
            slots.get(tenant_id),
            Some(Slot::Connecting(current)) if current.same_channel(outcome)
        );
        if stale {
            slots.remove(tenant_id);
            warn!(tenant_id, "discarded connecting slot abandoned by its connect task");
        }
    }

    async fn record_entries(&self) {
        let live = self.len().await;
        gauge!("tenant_cache_entries").set(live as f64);
    }
}
