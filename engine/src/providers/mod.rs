//! Statistics-provider adapters.
//!
//! Every supported game title gets a client implementing the same
//! three-operation contract: list a player's recent matches, fetch a match's
//! detail, and resolve a player name + platform to a stable external id.
//! Tournaments select their adapter through [`ProviderRegistry`], populated
//! once at process start.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::tournament::GameTitle;

pub mod pubg;
pub mod warzone;

pub use pubg::PubgClient;
pub use warzone::WarzoneClient;

/// Client-side failure talking to a statistics vendor.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{vendor} returned status {status} for {url}")]
    Api {
        vendor: &'static str,
        status: u16,
        url: String,
    },

    #[error("failed to decode {vendor} response from {url}: {message}")]
    Decode {
        vendor: &'static str,
        url: String,
        message: String,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("player not found: {0}")]
    PlayerNotFound(String),
}

impl ProviderError {
    /// Vendor and network trouble is retryable on the next scheduled run; a
    /// player the vendor does not know is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::PlayerNotFound(_))
    }
}

/// Reference to one match in a player's recent history, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRef {
    pub match_id: String,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One player's raw statistics within a match, normalized across vendors.
/// Damage and survival time are carried for the audit trail but never scored.
#[derive(Debug, Clone)]
pub struct PlayerStats {
    pub player_id: String,
    pub player_name: String,
    pub placement: i32,
    pub kills: i32,
    pub damage: Option<f64>,
    pub survival_time: Option<f64>,
}

/// Normalized match detail with the vendor payload retained opaquely.
#[derive(Debug, Clone)]
pub struct MatchDetail {
    pub match_id: String,
    pub map_name: Option<String>,
    pub mode: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
    pub players: Vec<PlayerStats>,
}

/// A verified external player identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub player_id: String,
    pub name: String,
    pub platform: String,
}

/// The three-operation contract every statistics vendor is adapted to.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    fn title(&self) -> GameTitle;

    /// Recent matches for one player, newest first, bounded by the vendor's
    /// page size. `since` is the last processed match reference; results stop
    /// before it. Callers needing repeatability persist the cursor themselves.
    async fn recent_matches(
        &self,
        player_external_id: &str,
        platform: &str,
        since: Option<&str>,
    ) -> Result<Vec<MatchRef>, ProviderError>;

    async fn match_detail(&self, match_id: &str) -> Result<MatchDetail, ProviderError>;

    /// Resolve a human-readable player name + platform to a stable player id.
    async fn resolve_player(
        &self,
        name: &str,
        platform: &str,
    ) -> Result<PlayerIdentity, ProviderError>;
}

/// Capability lookup from game title to adapter. Built once at startup so no
/// call site branches on vendor.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<GameTitle, Arc<dyn StatsProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn StatsProvider>) {
        self.providers.insert(provider.title(), provider);
    }

    pub fn get(&self, title: GameTitle) -> Option<Arc<dyn StatsProvider>> {
        self.providers.get(&title).cloned()
    }
}

/// Truncate a newest-first match list at the last processed reference.
pub(crate) fn truncate_at_cursor(refs: Vec<MatchRef>, since: Option<&str>) -> Vec<MatchRef> {
    match since {
        Some(cursor) => refs
            .into_iter()
            .take_while(|r| r.match_id != cursor)
            .collect(),
        None => refs,
    }
}

/// Shared GET-and-decode helper for the vendor clients, with a bounded
/// timeout around the whole request.
pub(crate) async fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &Client,
    vendor: &'static str,
    url: &str,
    bearer_token: Option<&str>,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let mut request = http.get(url);
    if let Some(token) = bearer_token {
        request = request.bearer_auth(token);
    }

    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| ProviderError::Timeout {
            url: url.to_string(),
        })?
        .map_err(|source| ProviderError::Network {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Api {
            vendor,
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|source| ProviderError::Decode {
            vendor,
            url: url.to_string(),
            message: source.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[&str]) -> Vec<MatchRef> {
        ids.iter()
            .map(|id| MatchRef {
                match_id: (*id).to_string(),
                ended_at: None,
            })
            .collect()
    }

    #[test]
    fn truncate_stops_before_cursor() {
        let truncated = truncate_at_cursor(refs(&["m-4", "m-3", "m-2", "m-1"]), Some("m-2"));
        assert_eq!(
            truncated.iter().map(|r| r.match_id.as_str()).collect::<Vec<_>>(),
            ["m-4", "m-3"]
        );
    }

    #[test]
    fn truncate_without_cursor_keeps_everything() {
        assert_eq!(truncate_at_cursor(refs(&["m-2", "m-1"]), None).len(), 2);
    }

    #[test]
    fn truncate_with_unknown_cursor_keeps_everything() {
        // Cursor fell out of the vendor's lookback window; the natural-key
        // dedupe downstream catches any reprocessing.
        assert_eq!(
            truncate_at_cursor(refs(&["m-2", "m-1"]), Some("m-99")).len(),
            2
        );
    }

    #[test]
    fn provider_errors_classify_retryability() {
        let err = ProviderError::Api {
            vendor: "pubg",
            status: 503,
            url: "http://x".into(),
        };
        assert!(err.is_retryable());
        assert!(!ProviderError::PlayerNotFound("ghost".into()).is_retryable());
    }
}
