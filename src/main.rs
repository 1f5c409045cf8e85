use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geopolitics_watch::cache::TtlCache;
use geopolitics_watch::config::Config;
use geopolitics_watch::db::Database;
use geopolitics_watch::fetcher::HttpFeedClient;
use geopolitics_watch::routes::{self, AppState};
use geopolitics_watch::scheduler::{spawn_housekeeping, spawn_ingestion, Ingestor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geopolitics_watch=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("GEOWATCH_CONFIG").unwrap_or_else(|_| "sources.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} sources from {}",
        config.sources.len(),
        config_path
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:geopolitics_watch.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    db.seed_reference_data().await?;
    db.sync_sources(&config.sources).await?;
    info!("Database initialized");

    let db = Arc::new(db);
    let cache = Arc::new(TtlCache::from_config(&config.cache));
    let client = Arc::new(HttpFeedClient::new(config.fetch_timeout())?);
    let ingestor = Arc::new(Ingestor::new(client, db.clone(), cache.clone(), &config));

    // Background jobs
    spawn_ingestion(
        ingestor.clone(),
        config.refresh_period(),
        config.initial_delay(),
    );
    spawn_housekeeping(cache.clone(), config.cache_cleanup_period());

    let state = Arc::new(AppState {
        db,
        ingestor,
        cache,
    });
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
