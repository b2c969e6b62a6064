//! Conclave Server - Main Entry Point
//!
//! Multi-model deliberation proxy backend.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use cv_server::analytics::{AnalyticsCache, AnalyticsService};
use cv_server::api;
use cv_server::config::Config;
use cv_server::council::JsonFileConfigProvider;
use cv_server::db;
use cv_server::health::HealthTracker;
use cv_server::observability;
use cv_server::orchestrator::Orchestrator;
use cv_server::pool::ProviderPool;
use cv_server::synthesis::SimilaritySynthesizer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cv_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Conclave Server"
    );

    // Initialize metrics (inert when disabled); the guard flushes the
    // provider on exit
    let _metrics = observability::metrics::init(&config.observability);

    // Initialize database
    let db_pool = db::connect(&config).await?;

    // Initialize Redis (optional - analytics cache falls back to memory)
    let redis = match &config.redis_url {
        Some(url) => match db::create_cache_client(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Redis connection failed: {}. Analytics cache runs in-memory.", e);
                None
            }
        },
        None => None,
    };

    // Provider health tracker
    let mut tracker = HealthTracker::with_settings(
        chrono::Duration::minutes(config.health_window_minutes),
        config.health_failure_threshold,
    );
    if config.persist_provider_health {
        tracker = tracker.with_persistence(db_pool.clone());
    }
    let tracker = Arc::new(tracker);

    // Provider pool. Model adapters are registered by the hosting
    // deployment; an empty pool refuses all traffic with
    // ADAPTER_NOT_CONFIGURED.
    let pool = Arc::new(ProviderPool::new(Arc::clone(&tracker)));
    if pool.registered_providers().is_empty() {
        warn!("No provider adapters registered; deliberation requests will fail");
    }

    // Council configuration, re-read per request
    let config_provider = Arc::new(JsonFileConfigProvider::new(&config.council_config_path));

    // Orchestrator with the built-in synthesis strategy
    let orchestrator = Orchestrator::new(
        Arc::clone(&pool),
        config_provider.clone(),
        Arc::new(SimilaritySynthesizer),
    );

    // Analytics over the persisted rows
    let cache = redis.map_or_else(AnalyticsCache::in_memory, AnalyticsCache::redis);
    let analytics = AnalyticsService::new(db_pool.clone(), cache);

    // Build application state and router
    let state = api::AppState::new(api::AppStateConfig {
        db: db_pool,
        config: config.clone(),
        config_provider,
        orchestrator,
        pool,
        analytics,
    });
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
