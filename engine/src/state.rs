use sqlx::PgPool;

use crate::config::Config;
use crate::feed::ChangeFeed;
use crate::providers::ProviderRegistry;

/// Shared service state handed to routes and ingestion jobs.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub providers: ProviderRegistry,
    pub feed: ChangeFeed,
    pub config: Config,
}
