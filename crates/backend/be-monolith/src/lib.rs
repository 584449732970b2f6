use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
};
use be_auth_core::{SessionAuth, SessionConfig};
use be_auth_service::init_auth_service;
use be_forge_service::init_forge_service;
use be_payment_service::init_payment_service;
use be_remote_db::DatabaseManager;
use serde_json::json;
use tokio::{sync::watch, task::JoinHandle};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const SERVICE_NAME: &str = "CommandCore Forge API";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,https://commandcore.app";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for running the monolith server.
pub struct ServerConfig {
    pub database_url: String,
    pub http_addr: SocketAddr,
    /// Auth and payment initialisation failures only disable those routes.
    pub local_mode: bool,
    pub allowed_origins: Vec<String>,
    /// When this receiver gets a value, the server shuts down gracefully.
    pub shutdown: watch::Receiver<()>,
}

impl ServerConfig {
    pub fn from_env(shutdown: watch::Receiver<()>) -> Result<Self, BoxError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or("DATABASE_URL environment variable must be set")?;

        let raw_addr = std::env::var("HTTP_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid HTTP_ADDR '{raw_addr}': {e}"))?;

        let local_mode = std::env::var("LOCAL_MODE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let allowed_origins = split_origins(
            &std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string()),
        );

        Ok(Self {
            database_url,
            http_addr,
            local_mode,
            allowed_origins,
            shutdown,
        })
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn build_cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|s| match s.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin '{}': {}", s, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn root() -> impl IntoResponse {
    Json(json!({ "name": SERVICE_NAME, "version": VERSION }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": VERSION }))
}

async fn health_db(State(db): State<Arc<DatabaseManager>>) -> impl IntoResponse {
    match db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "connected" })),
        ),
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "database": "unreachable" })),
            )
        }
    }
}

pub fn health_router(db: Arc<DatabaseManager>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/db", get(health_db))
        .with_state(db)
}

// ---------------------------------------------------------------------------
// Background sweep
// ---------------------------------------------------------------------------

/// Resolves once shutdown is requested. A dropped sender never requests one.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<()>) {
    if shutdown.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Deletes expired sessions and OAuth states every hour until `shutdown`
/// fires.
pub fn spawn_expiry_sweeper(
    db: Arc<DatabaseManager>,
    mut shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    tracing::info!("Stopping expiry sweeper");
                    break;
                }
                _ = ticker.tick() => sweep_expired(&db).await,
            }
        }
    })
}

async fn sweep_expired(db: &DatabaseManager) {
    match db.delete_expired_sessions().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Deleted expired sessions"),
        Err(e) => tracing::warn!("Failed to delete expired sessions: {}", e),
    }
    match db.delete_expired_oauth_states().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Deleted expired OAuth states"),
        Err(e) => tracing::warn!("Failed to delete expired OAuth states: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Mounts every service router. In local mode, auth and payment routers that
/// fail to initialise are left out instead of aborting startup.
pub fn build_router(
    db: Arc<DatabaseManager>,
    session_config: Arc<SessionConfig>,
    config: &ServerConfig,
) -> Result<Router, BoxError> {
    let session_auth = SessionAuth::new(db.clone(), session_config.clone());

    let auth_router = match init_auth_service(db.clone(), session_config) {
        Ok(router) => router,
        Err(e) if config.local_mode => {
            tracing::warn!("Auth service disabled in local mode: {}", e);
            Router::new()
        }
        Err(e) => {
            tracing::error!("Failed to initialize auth service: {}", e);
            return Err(e.into());
        }
    };

    let payment_router = match init_payment_service(db.clone(), session_auth) {
        Ok(router) => router,
        Err(e) if config.local_mode => {
            tracing::warn!("Payment service disabled in local mode: {}", e);
            Router::new()
        }
        Err(e) => {
            tracing::error!("Failed to initialize payment service: {}", e);
            return Err(e.into());
        }
    };

    Ok(health_router(db)
        .merge(auth_router)
        .merge(payment_router)
        .merge(init_forge_service())
        .layer(build_cors(&config.allowed_origins)))
}

pub async fn run_server(config: ServerConfig) -> Result<(), BoxError> {
    if let Some(posthog_key) = std::env::var("POSTHOG_API_KEY")
        .ok()
        .filter(|s| !s.is_empty())
    {
        match posthog_rs::init_global(posthog_key.as_str()).await {
            Ok(()) => tracing::info!("PostHog analytics initialized"),
            Err(e) => tracing::warn!("Failed to initialize PostHog: {}", e),
        }
    } else {
        tracing::info!("POSTHOG_API_KEY not set, analytics disabled");
    }

    let db_manager = Arc::new(DatabaseManager::new(&config.database_url).await?);
    let session_config = Arc::new(SessionConfig::from_env());

    let http_router = build_router(db_manager.clone(), session_config, &config)?;

    let sweeper = spawn_expiry_sweeper(db_manager, config.shutdown.clone());

    tracing::info!("Starting HTTP server at {}", config.http_addr);

    let mut http_shutdown = config.shutdown.clone();
    let http_listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    let result = axum::serve(
        http_listener,
        http_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_requested(&mut http_shutdown).await;
        tracing::info!("Shutting down HTTP server...");
    })
    .await;

    sweeper.abort();

    if let Err(e) = result {
        tracing::error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
