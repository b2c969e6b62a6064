//! API Router and Application State
//!
//! Central routing configuration and shared state.

mod error;
mod handlers;
mod store;

pub use error::{ApiError, ErrorResponse};

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::analytics::AnalyticsService;
use crate::config::Config;
use crate::council::ConfigProvider;
use crate::health::HealthTracker;
use crate::orchestrator::Orchestrator;
use crate::pool::ProviderPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,
    /// Server configuration
    pub config: Arc<Config>,
    /// Council configuration provider, re-read per request
    pub config_provider: Arc<dyn ConfigProvider>,
    /// Request orchestrator
    pub orchestrator: Arc<Orchestrator>,
    /// Provider health tracker
    pub health: Arc<HealthTracker>,
    /// Provider pool
    pub pool: Arc<ProviderPool>,
    /// Cache-first analytics
    pub analytics: Arc<AnalyticsService>,
}

/// Configuration for creating a new [`AppState`].
pub struct AppStateConfig {
    pub db: PgPool,
    pub config: Config,
    pub config_provider: Arc<dyn ConfigProvider>,
    pub orchestrator: Orchestrator,
    pub pool: Arc<ProviderPool>,
    pub analytics: AnalyticsService,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(cfg: AppStateConfig) -> Self {
        let health = Arc::clone(cfg.pool.health_tracker());
        Self {
            db: cfg.db,
            config: Arc::new(cfg.config),
            config_provider: cfg.config_provider,
            orchestrator: Arc::new(cfg.orchestrator),
            health,
            pool: cfg.pool,
            analytics: Arc::new(cfg.analytics),
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    // In production, set CORS_ALLOWED_ORIGINS to specific origins.
    let cors = if state.config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/deliberate", post(handlers::deliberate))
        .route("/api/providers/health", get(handlers::providers_health))
        .route(
            "/api/providers/{provider_id}/enable",
            post(handlers::enable_provider),
        )
        .route("/api/analytics/latency", get(handlers::analytics_latency))
        .route(
            "/api/analytics/agreement",
            get(handlers::analytics_agreement),
        )
        .route(
            "/api/analytics/influence",
            get(handlers::analytics_influence),
        )
        .route("/api/analytics/costs", get(handlers::analytics_costs))
        .route(
            "/api/analytics/cost-quality",
            get(handlers::analytics_cost_quality),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}
