//! # Server Configuration
//!
//! Router assembly, shared state, and the bootstrap/shutdown sequence for the
//! taxdesk service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::Request,
    http::{HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Span, debug_span, info, warn};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::AdapterRegistry;
use crate::audit::AuditSink;
use crate::auth::{Authenticator, identity_middleware};
use crate::config::{AppConfig, CorsConfig};
use crate::handlers::{self, affiliates, clients, commissions, discount_codes, documents, tenants};
use crate::repositories::{DbAuditSink, TenantRegistry};
use crate::secret_box::SecretBox;
use crate::secrets::{SecretError, SecretResolver};
use crate::telemetry::{self, TRACE_ID_HEADER, TraceContext, with_trace_context};
use crate::tenant_cache::{
    CacheSettings, HandleConnector, PoolLimits, SeaOrmConnector, TenantConnectionCache,
};

/// Shared resources built once at bootstrap
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub secret_box: Arc<SecretBox>,
    pub registry: TenantRegistry,
    pub cache: TenantConnectionCache,
    pub adapters: AdapterRegistry,
    pub audit: Arc<dyn AuditSink>,
    pub secrets: Arc<SecretResolver>,
    pub auth: Arc<Authenticator>,
}

impl AppState {
    /// Wire the core components over an open control-plane pool.
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        secret_box: SecretBox,
        connector: Arc<dyn HandleConnector>,
    ) -> Result<Self, SecretError> {
        let db = Arc::new(db);
        let secret_box = Arc::new(secret_box);
        let registry = TenantRegistry::new(db.clone(), secret_box.clone());
        let cache = TenantConnectionCache::new(
            Arc::new(registry.clone()),
            connector,
            CacheSettings::from(&config.tenant_cache),
        );
        let secrets = Arc::new(SecretResolver::new(&config.secret_manager)?);
        let auth = Arc::new(Authenticator::from_config(&config));

        Ok(Self {
            audit: Arc::new(DbAuditSink::new(db.clone())),
            adapters: AdapterRegistry::with_builtin(),
            config: Arc::new(config),
            db,
            secret_box,
            registry,
            cache,
            secrets,
            auth,
        })
    }
}

/// Build the full router: API routes, docs, and the middleware stack.
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);
    let auth = state.auth.clone();

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1/admin", admin_routes())
        .nest("/api/v1/tenants/{tenantId}", tenant_routes())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(auth, identity_middleware))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route(
            "/tenants/{tenantId}",
            get(tenants::get_tenant)
                .put(tenants::update_tenant)
                .delete(tenants::deactivate_tenant),
        )
}

fn tenant_routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(clients::list_clients))
        .route(
            "/clients/with-filings",
            get(clients::list_clients_with_filings),
        )
        .route("/clients/{clientId}", get(clients::get_client))
        .route(
            "/clients/{clientId}/comprehensive",
            get(clients::get_client_comprehensive),
        )
        .route(
            "/filings/{filingId}/documents",
            get(documents::list_filing_documents).post(documents::upload_document),
        )
        .route(
            "/documents/{documentId}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route(
            "/affiliates",
            get(affiliates::list_affiliates).post(affiliates::create_affiliate),
        )
        .route(
            "/affiliates/{affiliateId}",
            get(affiliates::get_affiliate).put(affiliates::update_affiliate),
        )
        .route(
            "/affiliates/{affiliateId}/tokens",
            get(affiliates::list_tokens).post(affiliates::generate_token),
        )
        .route(
            "/affiliates/{affiliateId}/dashboard",
            get(affiliates::affiliate_dashboard),
        )
        .route(
            "/affiliates/{affiliateId}/stats",
            get(affiliates::affiliate_stats),
        )
        .route(
            "/affiliates/{affiliateId}/commissions",
            get(affiliates::affiliate_commissions),
        )
        .route(
            "/affiliate-tokens/{tokenId}",
            delete(affiliates::revoke_token),
        )
        .route("/commissions", get(commissions::list_commissions))
        .route(
            "/commissions/{commissionId}/approve",
            post(commissions::approve_commission),
        )
        .route(
            "/commissions/{commissionId}/pay",
            post(commissions::pay_commission),
        )
        .route(
            "/commissions/{commissionId}/cancel",
            post(commissions::cancel_commission),
        )
        .route(
            "/discount-codes",
            get(discount_codes::list_discount_codes).post(discount_codes::create_discount_code),
        )
        .route(
            "/discount-codes/by-code/{code}",
            get(discount_codes::lookup_discount_code),
        )
        .route(
            "/discount-codes/{codeId}",
            get(discount_codes::get_discount_code)
                .put(discount_codes::update_discount_code)
                .delete(discount_codes::deactivate_discount_code),
        )
}

/// Span for one request. Only the path is recorded: the public affiliate
/// routes carry their bearer token in the query string.
fn request_span(request: &Request) -> Span {
    debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

/// Run every request inside a [`TraceContext`] and echo its id.
async fn trace_id_middleware(request: Request, next: Next) -> Response {
    let context = TraceContext::from_header(
        request
            .headers()
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let trace_id = context.trace_id.clone();

    let mut response = with_trace_context(context, next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

/// CORS policy from the `CORS_*` settings.
///
/// No origins, or a `*` entry, allows any origin without credentials.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
        .collect();
    let methods = if methods.is_empty() {
        vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]
    } else {
        methods
    };

    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|h| HeaderName::from_bytes(h.trim().to_ascii_lowercase().as_bytes()).ok())
        .collect();
    let headers = if headers.is_empty() {
        vec![
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static(TRACE_ID_HEADER),
        ]
    } else {
        headers
    };

    let layer = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers([HeaderName::from_static(TRACE_ID_HEADER)]);

    let wildcard = config.allowed_origins.iter().any(|o| o.trim() == "*");
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();

    if wildcard || origins.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(config.allow_credentials)
    }
}

/// Bootstrap, serve until Ctrl-C or SIGTERM, then drain and close.
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing(&config)?;
    config.validate()?;

    let secret_box = SecretBox::new(&config.crypto_key()?);
    let db = crate::db::init_pool(&config).await?;
    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    let addr = config.bind_addr();

    let connector: Arc<dyn HandleConnector> =
        Arc::new(SeaOrmConnector::new(PoolLimits::default()));
    let state = AppState::new(config, db, secret_box, connector)?;
    state.cache.start_eviction();

    let app = create_app(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %state.config.profile, "taxdesk listening");

    let shutdown = CancellationToken::new();
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        })
    };

    shutdown_signal().await;
    info!(grace_seconds = grace.as_secs(), "shutdown requested; draining requests");
    shutdown.cancel();

    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => info!("in-flight requests drained"),
        Ok(Ok(Err(e))) => warn!(error = %e, "server exited with an error"),
        Ok(Err(e)) => warn!(error = %e, "server task failed"),
        Err(_) => warn!("grace period elapsed with requests still in flight"),
    }

    state.cache.close_all().await;
    state.secrets.clear().await;
    // Clones share one sqlx pool; closing any of them closes it.
    if let Err(e) = state.db.as_ref().clone().close().await {
        warn!(error = %e, "control-plane pool close reported an error");
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::tenants::list_tenants,
        crate::handlers::tenants::create_tenant,
        crate::handlers::tenants::get_tenant,
        crate::handlers::tenants::update_tenant,
        crate::handlers::tenants::deactivate_tenant,
        crate::handlers::clients::list_clients,
        crate::handlers::clients::list_clients_with_filings,
        crate::handlers::clients::get_client,
        crate::handlers::clients::get_client_comprehensive,
        crate::handlers::documents::list_filing_documents,
        crate::handlers::documents::upload_document,
        crate::handlers::documents::get_document,
        crate::handlers::documents::delete_document,
        crate::handlers::affiliates::list_affiliates,
        crate::handlers::affiliates::create_affiliate,
        crate::handlers::affiliates::get_affiliate,
        crate::handlers::affiliates::update_affiliate,
        crate::handlers::affiliates::generate_token,
        crate::handlers::affiliates::list_tokens,
        crate::handlers::affiliates::revoke_token,
        crate::handlers::affiliates::affiliate_dashboard,
        crate::handlers::affiliates::affiliate_stats,
        crate::handlers::affiliates::affiliate_commissions,
        crate::handlers::commissions::list_commissions,
        crate::handlers::commissions::approve_commission,
        crate::handlers::commissions::pay_commission,
        crate::handlers::commissions::cancel_commission,
        crate::handlers::discount_codes::list_discount_codes,
        crate::handlers::discount_codes::create_discount_code,
        crate::handlers::discount_codes::lookup_discount_code,
        crate::handlers::discount_codes::get_discount_code,
        crate::handlers::discount_codes::update_discount_code,
        crate::handlers::discount_codes::deactivate_discount_code,
    ),
    components(
        schemas(
            crate::models::HealthStatus,
            crate::error::ApiError,
            crate::repositories::TenantSummary,
            crate::repositories::NewTenantConnection,
            crate::repositories::TenantConnectionUpdate,
            crate::adapters::Client,
            crate::adapters::ClientComprehensive,
            crate::adapters::ClientWithFilings,
            crate::adapters::Document,
            crate::adapters::Affiliate,
            crate::adapters::AffiliateStats,
            crate::adapters::Commission,
            crate::adapters::CommissionStatus,
            crate::adapters::DiscountCode,
            crate::affiliate_tokens::AffiliateToken,
            crate::affiliate_tokens::IssuedToken,
            crate::handlers::documents::UploadDocumentRequest,
            crate::handlers::types::AffiliateDashboard,
            crate::handlers::types::DiscountCodeLookup,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "tenants", description = "Tenant administration"),
        (name = "clients", description = "Tenant clients"),
        (name = "documents", description = "Filing documents"),
        (name = "affiliates", description = "Affiliates and their tokens"),
        (name = "affiliate-portal", description = "Token-authenticated affiliate views"),
        (name = "commissions", description = "Affiliate commissions"),
        (name = "discount-codes", description = "Discount codes"),
    ),
    info(
        title = "Taxdesk API",
        description = "Multi-tenant tax practice routing core",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
