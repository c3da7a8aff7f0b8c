use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use event_locator_api::background::BackgroundScheduler;
use event_locator_api::cache::CacheLayer;
use event_locator_api::channel::{MessageChannel, NoopChannel, RedisChannel};
use event_locator_api::config::Config;
use event_locator_api::middleware::auth::auth_middleware;
use event_locator_api::{database, handlers, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "event_locator_api=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting Event Locator API server...");

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!("Configuration loaded");

    // Initialize database pool
    let db_pool = database::new_pool(&config.database_url).await?;
    info!("Database connection pool created");

    // Event cache; runs disabled when Redis is unreachable.
    let cache = CacheLayer::connect(&config.redis_url, config.cache_ttl_seconds).await;

    // Notification channel; falls back to a no-op sink so event mutations
    // keep working without the message transport.
    let channel: Arc<dyn MessageChannel> =
        match RedisChannel::connect(&config.redis_url, &config.notification_channel).await {
            Ok(channel) => Arc::new(channel),
            Err(e) => {
                warn!("Message channel connection failed - continuing without message queue functionality: {}", e);
                Arc::new(NoopChannel)
            }
        };

    // Background scheduler (upcoming-event reminders)
    let scheduler = Arc::new(
        BackgroundScheduler::new(db_pool.clone(), config.clone(), channel.clone()).await?,
    );
    info!("Background scheduler started");

    // Build application state
    let app_state = AppState {
        db_pool: db_pool.clone(),
        config: config.clone(),
        cache,
        channel,
    };

    // Build API routes
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/events", post(handlers::create_event))
        .route("/api/events/search", get(handlers::search_events))
        .route("/api/events/:id", get(handlers::get_event))
        .route("/api/events/:id", put(handlers::update_event))
        .route("/api/events/:id", delete(handlers::delete_event))
        .route("/api/events/:id/favorite", put(handlers::favorite_event))
        .route("/api/events/:id/favorite", delete(handlers::unfavorite_event))
        .route("/api/users/location", put(handlers::update_location))
        .route("/api/users/preferences", get(handlers::get_preferences))
        .route("/api/users/preferences", put(handlers::update_preferences))
        .route("/api/users/notifications", get(handlers::get_notifications))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    // Graceful shutdown
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutting down gracefully...");
            scheduler.shutdown().await;
        }
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
