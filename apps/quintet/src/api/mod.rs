//! # Quintet HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Store counters
//! - `POST /facts` - Append a batch of statements
//! - `POST /facts/retract` - Append a tombstone
//! - `POST /query` - Literal read, property read or evaluation
//! - `POST /explain` - Requirements and evaluation trace
//! - `POST /subscriptions` - Register a trigger
//! - `DELETE /subscriptions/{id}` - Remove a trigger
//! - `GET /firings` - Drain recorded firings
//! - `GET /export` - Canonical export with checksum and hash
//!
//! ## Security Configuration
//!
//! - `QUINTET_CORS_ORIGINS` / `[server] cors_origins`: comma-separated
//!   allowed origins, or "*" for all (default: localhost only)
//! - `[server] rate_limit`: requests per second (default: 100, 0 to disable)
//! - `QUINTET_API_KEY` (or the variable named by `[server] api_key_env`):
//!   if set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{DEFAULT_API_KEY_ENV, get_api_key_from_env, keys_match};
pub use handlers::execute_query;
pub use middleware::{IDENTITY_HEADER, create_rate_limiter, reader_from_headers};
pub use types::{
    AssertRequest, AssertResponse, ErrorJson, ExplainRequest, ExplainResponse, ExportResponse,
    FactJson, FiringJson, FiringsResponse, HealthResponse, MutationJson, QueryRequest,
    QueryResponse, ResolvedFactJson, RetractRequest, RetractResponse, SolutionJson,
    StatementJson, StatusResponse, SubjectJson, SubscribeRequest, SubscribeResponse, ValueJson,
    parse_operator,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use quintet_core::{QuintetError, Session};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the session.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub server: ServerConfig,
    api_key: Option<Arc<str>>,
}

impl AppState {
    /// State with default server settings; the API key comes from
    /// `QUINTET_API_KEY`.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self::with_config(session, ServerConfig::default())
    }

    #[must_use]
    pub fn with_config(session: Session, server: ServerConfig) -> Self {
        let api_key = get_api_key_from_env(&server.api_key_env).map(Arc::from);
        Self {
            session: Arc::new(RwLock::new(session)),
            server,
            api_key,
        }
    }

    /// Override the API key. `None` disables authentication.
    #[must_use]
    pub fn with_api_key(mut self, key: Option<&str>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

fn allowed_headers() -> [HeaderName; 3] {
    [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(IDENTITY_HEADER),
    ]
}

/// Build the CORS layer.
///
/// - `"*"`: allows all origins (development only)
/// - unset: localhost only
/// - otherwise: the comma-separated list of allowed origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (QUINTET_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                    .allow_headers(allowed_headers())
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(allowed_headers())
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting - if enabled
/// 4. Authentication - if an API key is configured
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(state.server.cors_origins.as_deref());

    let rate_limiter = if state.server.rate_limit > 0 {
        tracing::info!(
            "Rate limiting enabled: {} requests/second",
            state.server.rate_limit
        );
        Some(create_rate_limiter(state.server.rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = state.api_key().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set {} to enable authentication.",
            state.server.api_key_env
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/facts", post(handlers::assert_handler))
        .route("/facts/retract", post(handlers::retract_handler))
        .route("/query", post(handlers::query_handler))
        .route("/explain", post(handlers::explain_handler))
        .route("/subscriptions", post(handlers::subscribe_handler))
        .route("/subscriptions/{id}", delete(handlers::unsubscribe_handler))
        .route("/firings", get(handlers::firings_handler))
        .route("/export", get(handlers::export_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_auth_middleware,
        ));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// TIMER DRIVER
// =============================================================================

/// Wall-clock milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Tick timer subscriptions every `tick_ms` until the task is dropped.
pub fn spawn_timer_driver(state: AppState) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_millis(state.server.tick_ms.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let mut session = state.session.write().await;
            match session.tick(now_ms()) {
                Ok(0) => {}
                Ok(fired) => tracing::debug!(fired, "timer tick"),
                Err(e) => tracing::warn!(error = %e, "timer tick failed"),
            }
        }
    })
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `state` and drive its timers until Ctrl+C.
pub async fn run_server(state: AppState) -> Result<(), QuintetError> {
    let addr = format!("{}:{}", state.server.host, state.server.port);
    let timers = spawn_timer_driver(state.clone());
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| QuintetError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Quintet HTTP server listening on {}", addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| QuintetError::IoError(format!("Server error: {}", e)));
    timers.abort();
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
