use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::scoring::ScoringSystem;

/// Game titles with a statistics-provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameTitle {
    Pubg,
    Warzone,
}

impl FromStr for GameTitle {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pubg" => Ok(GameTitle::Pubg),
            "warzone" => Ok(GameTitle::Warzone),
            other => Err(EngineError::InvalidInput(format!(
                "unknown game title: {other}"
            ))),
        }
    }
}

impl fmt::Display for GameTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameTitle::Pubg => write!(f, "pubg"),
            GameTitle::Warzone => write!(f, "warzone"),
        }
    }
}

// Tournament model: the engine only reads these rows; CRUD is external.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Tournament {
    pub tournament_id: Uuid,
    pub name: String,
    pub game_title: String,
    pub status: String,
    pub scoring_system: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Tournament {
    pub fn title(&self) -> Result<GameTitle> {
        self.game_title.parse()
    }

    /// Tournament-specific scoring override, falling back to the default
    /// table when absent or malformed.
    pub fn scoring(&self) -> ScoringSystem {
        self.scoring_system
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// One registered player with the external account the provider knows them by.
#[derive(Debug, Clone, FromRow)]
pub struct RosterPlayer {
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub external_player_id: String,
    pub platform: String,
}

pub async fn get_tournament(pool: &PgPool, tournament_id: Uuid) -> Result<Option<Tournament>> {
    let row = sqlx::query_as::<_, Tournament>(
        "SELECT tournament_id, name, game_title, status, scoring_system, created_at, updated_at
         FROM tournaments
         WHERE tournament_id = $1",
    )
    .bind(tournament_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Tournaments the ingestion loop should poll.
pub async fn get_in_progress_tournaments(pool: &PgPool) -> Result<Vec<Tournament>> {
    let rows = sqlx::query_as::<_, Tournament>(
        "SELECT tournament_id, name, game_title, status, scoring_system, created_at, updated_at
         FROM tournaments
         WHERE status = 'in_progress'
         ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Every registered player in a tournament with a linked provider account.
pub async fn get_roster(pool: &PgPool, tournament_id: Uuid) -> Result<Vec<RosterPlayer>> {
    let rows = sqlx::query_as::<_, RosterPlayer>(
        "SELECT tm.user_id, tm.team_id, tm.external_player_id, tm.platform
         FROM team_members tm
         JOIN teams t ON tm.team_id = t.team_id
         WHERE t.tournament_id = $1
           AND tm.external_player_id IS NOT NULL
         ORDER BY tm.created_at ASC",
    )
    .bind(tournament_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tournament(scoring_system: Option<serde_json::Value>) -> Tournament {
        Tournament {
            tournament_id: Uuid::new_v4(),
            name: "Friday Night Drop".to_string(),
            game_title: "pubg".to_string(),
            status: "in_progress".to_string(),
            scoring_system,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn game_title_round_trips() {
        for title in [GameTitle::Pubg, GameTitle::Warzone] {
            assert_eq!(title.to_string().parse::<GameTitle>().unwrap(), title);
        }
    }

    #[test]
    fn unknown_game_title_is_rejected() {
        assert!("chess".parse::<GameTitle>().is_err());
    }

    #[test]
    fn scoring_falls_back_to_default() {
        let tournament = make_tournament(None);
        assert_eq!(tournament.scoring(), ScoringSystem::default());

        let malformed = make_tournament(Some(serde_json::json!({"bogus": true})));
        assert_eq!(malformed.scoring(), ScoringSystem::default());
    }

    #[test]
    fn scoring_uses_stored_override() {
        let tournament = make_tournament(Some(serde_json::json!({
            "placement_points": {"1": 20},
            "kill_points": 3
        })));
        assert_eq!(tournament.scoring().score(1, 1).unwrap(), 23.0);
    }
}
