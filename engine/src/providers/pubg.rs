//! PUBG statistics client.
//!
//! Talks to the PUBG inspector API with bearer auth. Player ids are the
//! vendor's platform-scoped account ids, so the platform argument only
//! matters for name resolution.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{
    MatchDetail, MatchRef, PlayerIdentity, PlayerStats, ProviderError, StatsProvider, fetch_json,
    truncate_at_cursor,
};
use crate::models::tournament::GameTitle;

const VENDOR: &str = "pubg";

/// Vendor page size for a player's recent-match listing.
const RECENT_MATCH_LIMIT: usize = 20;

#[derive(Debug, Clone)]
pub struct PubgClient {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl PubgClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        fetch_json(&self.http, VENDOR, url, Some(&self.api_key), self.timeout).await
    }
}

#[derive(Debug, Deserialize)]
struct MatchListResponse {
    #[serde(default)]
    matches: Vec<MatchListItem>,
}

#[derive(Debug, Deserialize)]
struct MatchListItem {
    id: String,
    #[serde(rename = "endedAt")]
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    id: String,
    map: Option<String>,
    mode: Option<String>,
    #[serde(rename = "startedAt")]
    started_at: Option<DateTime<Utc>>,
    #[serde(rename = "endedAt")]
    ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    players: Vec<MatchPlayer>,
}

#[derive(Debug, Deserialize)]
struct MatchPlayer {
    id: String,
    name: Option<String>,
    placement: Option<i32>,
    kills: Option<i32>,
    damage: Option<f64>,
    #[serde(rename = "survivalTime")]
    survival_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PlayerSearchResponse {
    #[serde(default)]
    data: Vec<PlayerSearchEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayerSearchEntry {
    id: String,
    attributes: Option<PlayerAttributes>,
}

#[derive(Debug, Deserialize)]
struct PlayerAttributes {
    name: Option<String>,
}

fn normalize_match(raw: serde_json::Value, parsed: MatchResponse) -> MatchDetail {
    MatchDetail {
        match_id: parsed.id,
        map_name: parsed.map,
        mode: parsed.mode,
        started_at: parsed.started_at,
        ended_at: parsed.ended_at,
        raw,
        players: parsed
            .players
            .into_iter()
            .map(|p| PlayerStats {
                player_name: p.name.unwrap_or_else(|| p.id.clone()),
                player_id: p.id,
                placement: p.placement.unwrap_or(0),
                kills: p.kills.unwrap_or(0),
                damage: p.damage,
                survival_time: p.survival_time,
            })
            .collect(),
    }
}

#[async_trait]
impl StatsProvider for PubgClient {
    fn title(&self) -> GameTitle {
        GameTitle::Pubg
    }

    async fn recent_matches(
        &self,
        player_external_id: &str,
        _platform: &str,
        since: Option<&str>,
    ) -> Result<Vec<MatchRef>, ProviderError> {
        let url = format!(
            "{}/v1/players/{}/matches?limit={}",
            self.base_url,
            urlencoding::encode(player_external_id),
            RECENT_MATCH_LIMIT
        );
        let response: MatchListResponse = self.get(&url).await?;
        let refs = response
            .matches
            .into_iter()
            .map(|m| MatchRef {
                match_id: m.id,
                ended_at: m.ended_at,
            })
            .collect();
        Ok(truncate_at_cursor(refs, since))
    }

    async fn match_detail(&self, match_id: &str) -> Result<MatchDetail, ProviderError> {
        let url = format!(
            "{}/v1/matches/{}",
            self.base_url,
            urlencoding::encode(match_id)
        );
        let raw: serde_json::Value = self.get(&url).await?;
        let parsed: MatchResponse =
            serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Decode {
                vendor: VENDOR,
                url: url.clone(),
                message: e.to_string(),
            })?;
        Ok(normalize_match(raw, parsed))
    }

    async fn resolve_player(
        &self,
        name: &str,
        platform: &str,
    ) -> Result<PlayerIdentity, ProviderError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("filter[playerNames]", name)
            .append_pair("filter[platform]", platform)
            .finish();
        let url = format!("{}/v1/players?{}", self.base_url, query);
        let response: PlayerSearchResponse = self.get(&url).await?;
        let entry = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::PlayerNotFound(format!("{name} ({platform})")))?;

        Ok(PlayerIdentity {
            player_id: entry.id,
            name: entry
                .attributes
                .and_then(|a| a.name)
                .unwrap_or_else(|| name.to_string()),
            platform: platform.to_string(),
        })
    }
}
