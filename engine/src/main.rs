use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Context as _;
use sqlx::postgres::PgPoolOptions;

use scorekeeper::config::Config;
use scorekeeper::feed::ChangeFeed;
use scorekeeper::ingest;
use scorekeeper::providers::{ProviderRegistry, PubgClient, WarzoneClient};
use scorekeeper::routes;
use scorekeeper::state::AppState;

fn setup_tracing() -> color_eyre::Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::builder()
        .parse(&rust_log)
        .wrap_err_with(|| format!("Couldn't create env filter from {rust_log}"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    setup_tracing()?;

    let config = Config::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .wrap_err("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .wrap_err("Failed to run migrations")?;

    let http = reqwest::Client::builder()
        .user_agent("scorekeeper/0.1")
        .build()
        .wrap_err("Failed to build HTTP client")?;

    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(PubgClient::new(
        http.clone(),
        config.pubg_api_base.clone(),
        config.pubg_api_key.clone(),
        config.provider_timeout,
    )));
    providers.register(Arc::new(WarzoneClient::new(
        http,
        config.warzone_api_base.clone(),
        config.provider_timeout,
    )));

    let state = AppState {
        db,
        providers,
        feed: ChangeFeed::new(),
        config: config.clone(),
    };

    // Scheduled ingestion: poll every in-progress tournament on an interval.
    let ingest_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ingest_state.config.ingest_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            ingest::ingest_all_active(&ingest_state).await;
        }
    });

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Leaderboard engine listening");
    axum::serve(listener, app).await.wrap_err("Server error")?;

    Ok(())
}
