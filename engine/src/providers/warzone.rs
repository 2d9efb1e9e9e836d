//! Warzone statistics client.
//!
//! The vendor keys players by Activision id scoped to a platform, so the
//! platform appears in every path. No auth header; the API is public but
//! rate-limited.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;

use super::{
    MatchDetail, MatchRef, PlayerIdentity, PlayerStats, ProviderError, StatsProvider, fetch_json,
    truncate_at_cursor,
};
use crate::models::tournament::GameTitle;

const VENDOR: &str = "warzone";

#[derive(Debug, Clone)]
pub struct WarzoneClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl WarzoneClient {
    pub fn new(http: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        fetch_json(&self.http, VENDOR, url, None, self.timeout).await
    }
}

#[derive(Debug, Deserialize)]
struct MatchListResponse {
    #[serde(default)]
    matches: Vec<MatchListItem>,
}

#[derive(Debug, Deserialize)]
struct MatchListItem {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "utcEndSeconds")]
    utc_end_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MatchDetailResponse {
    #[serde(rename = "matchId")]
    match_id: Option<String>,
    map: Option<String>,
    mode: Option<String>,
    #[serde(rename = "startTime")]
    start_time: Option<i64>,
    #[serde(rename = "endTime")]
    end_time: Option<i64>,
    #[serde(default)]
    players: Vec<DetailPlayer>,
}

#[derive(Debug, Deserialize)]
struct DetailPlayer {
    #[serde(rename = "activisionId")]
    activision_id: String,
    #[serde(rename = "playerName")]
    player_name: Option<String>,
    #[serde(rename = "teamPlacement")]
    team_placement: Option<i32>,
    kills: Option<i32>,
    #[serde(rename = "damageDone")]
    damage_done: Option<f64>,
    #[serde(rename = "timePlayed")]
    time_played: Option<f64>,
}

fn timestamp(seconds: Option<i64>) -> Option<chrono::DateTime<chrono::Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn normalize_match(
    fallback_match_id: &str,
    raw: serde_json::Value,
    parsed: MatchDetailResponse,
) -> MatchDetail {
    MatchDetail {
        match_id: parsed
            .match_id
            .unwrap_or_else(|| fallback_match_id.to_string()),
        map_name: parsed.map,
        mode: parsed.mode,
        started_at: timestamp(parsed.start_time),
        ended_at: timestamp(parsed.end_time),
        raw,
        players: parsed
            .players
            .into_iter()
            .map(|p| PlayerStats {
                player_name: p.player_name.unwrap_or_else(|| p.activision_id.clone()),
                player_id: p.activision_id,
                placement: p.team_placement.unwrap_or(0),
                kills: p.kills.unwrap_or(0),
                damage: p.damage_done,
                survival_time: p.time_played,
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
struct PlayerLookupResponse {
    #[serde(rename = "activisionId")]
    activision_id: Option<String>,
    #[serde(rename = "playerName")]
    player_name: Option<String>,
}

#[async_trait]
impl StatsProvider for WarzoneClient {
    fn title(&self) -> GameTitle {
        GameTitle::Warzone
    }

    async fn recent_matches(
        &self,
        player_external_id: &str,
        platform: &str,
        since: Option<&str>,
    ) -> Result<Vec<MatchRef>, ProviderError> {
        let url = format!(
            "{}/matches/{}/{}",
            self.base_url,
            urlencoding::encode(platform),
            urlencoding::encode(player_external_id)
        );
        let response: MatchListResponse = self.get(&url).await?;
        let refs = response
            .matches
            .into_iter()
            .map(|m| MatchRef {
                match_id: m.match_id,
                ended_at: timestamp(m.utc_end_seconds),
            })
            .collect();
        Ok(truncate_at_cursor(refs, since))
    }

    async fn match_detail(&self, match_id: &str) -> Result<MatchDetail, ProviderError> {
        let url = format!("{}/match/{}", self.base_url, urlencoding::encode(match_id));
        let raw: serde_json::Value = self.get(&url).await?;
        let parsed: MatchDetailResponse =
            serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Decode {
                vendor: VENDOR,
                url: url.clone(),
                message: e.to_string(),
            })?;
        Ok(normalize_match(match_id, raw, parsed))
    }

    async fn resolve_player(
        &self,
        name: &str,
        platform: &str,
    ) -> Result<PlayerIdentity, ProviderError> {
        let url = format!(
            "{}/players/{}/{}",
            self.base_url,
            urlencoding::encode(platform),
            urlencoding::encode(name)
        );
        let response: PlayerLookupResponse = self.get(&url).await?;
        let player_id = response
            .activision_id
            .ok_or_else(|| ProviderError::PlayerNotFound(format!("{name} ({platform})")))?;

        Ok(PlayerIdentity {
            player_id,
            name: response.player_name.unwrap_or_else(|| name.to_string()),
            platform: platform.to_string(),
        })
    }
}
