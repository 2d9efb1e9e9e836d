//! Environment-driven configuration, read once at startup.

use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::Context as _;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub pubg_api_base: String,
    pub pubg_api_key: String,
    pub warzone_api_base: String,
    /// Bound on every single provider request.
    pub provider_timeout: Duration,
    /// How often the loop polls in-progress tournaments.
    pub ingest_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").wrap_err("DATABASE_URL must be set")?,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            pubg_api_base: env_or("PUBG_API_BASE", "https://api.pubginspector.com"),
            pubg_api_key: std::env::var("PUBG_API_KEY").unwrap_or_default(),
            warzone_api_base: env_or("WARZONE_API_BASE", "https://api.codapi.dev"),
            provider_timeout: Duration::from_secs(env_seconds("PROVIDER_TIMEOUT_SECS", 10)?),
            ingest_interval: Duration::from_secs(env_seconds("INGEST_INTERVAL_SECS", 300)?),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_seconds(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .wrap_err_with(|| format!("{key} must be an integer, got {value:?}")),
        Err(_) => Ok(default),
    }
}
