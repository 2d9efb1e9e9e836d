use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::Result;

// Player performance: one player's result in one match. Immutable once
// created; persisted as the audit record backing the leaderboard totals.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlayerPerformance {
    pub performance_id: Uuid,
    pub tournament_id: Uuid,
    pub match_id: String,
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub placement: i32,
    pub kills: i32,
    pub damage_done: Option<f64>,
    pub survival_time: Option<f64>,
    pub score: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A scored performance candidate that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewPerformance {
    pub tournament_id: Uuid,
    pub match_id: String,
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub placement: i32,
    pub kills: i32,
    pub damage_done: Option<f64>,
    pub survival_time: Option<f64>,
    pub score: f64,
}

/// Match metadata retained for audit alongside the performance rows.
#[derive(Debug, Clone)]
pub struct NewMatchResult {
    pub tournament_id: Uuid,
    pub match_id: String,
    pub map_name: Option<String>,
    pub mode: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub raw_payload: serde_json::Value,
}

/// Insert a performance unless its natural key (tournament, match, user) is
/// already present. Returns the stored row for a new performance, `None` for
/// a duplicate — duplicates are skipped, never re-merged.
pub async fn insert_if_new(
    tx: &mut Transaction<'_, Postgres>,
    perf: &NewPerformance,
) -> Result<Option<PlayerPerformance>> {
    let row = sqlx::query_as::<_, PlayerPerformance>(
        "INSERT INTO player_performance (
            tournament_id, match_id, user_id, team_id,
            placement, kills, damage_done, survival_time, score
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (tournament_id, match_id, user_id) DO NOTHING
         RETURNING
            performance_id, tournament_id, match_id, user_id, team_id,
            placement, kills, damage_done, survival_time, score, created_at",
    )
    .bind(perf.tournament_id)
    .bind(&perf.match_id)
    .bind(perf.user_id)
    .bind(perf.team_id)
    .bind(perf.placement)
    .bind(perf.kills)
    .bind(perf.damage_done)
    .bind(perf.survival_time)
    .bind(perf.score)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

/// Record match metadata once per (tournament, match). Returns false when the
/// match was already tracked.
pub async fn insert_match_if_new(
    tx: &mut Transaction<'_, Postgres>,
    result: &NewMatchResult,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "INSERT INTO match_results (
            tournament_id, match_id, map_name, mode, started_at, ended_at, raw_payload
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (tournament_id, match_id) DO NOTHING
         RETURNING match_result_id",
    )
    .bind(result.tournament_id)
    .bind(&result.match_id)
    .bind(&result.map_name)
    .bind(&result.mode)
    .bind(result.started_at)
    .bind(result.ended_at)
    .bind(&result.raw_payload)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.is_some())
}

/// Which of the candidate match ids have already been tracked for this
/// tournament.
pub async fn already_tracked(
    pool: &PgPool,
    tournament_id: Uuid,
    match_ids: &[String],
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT match_id
         FROM match_results
         WHERE tournament_id = $1 AND match_id = ANY($2)",
    )
    .bind(tournament_id)
    .bind(match_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Last processed match reference for a tournament, if any.
pub async fn get_cursor(pool: &PgPool, tournament_id: Uuid) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT cursor FROM ingest_cursors WHERE tournament_id = $1",
    )
    .bind(tournament_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(cursor,)| cursor))
}

pub async fn set_cursor(pool: &PgPool, tournament_id: Uuid, cursor: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO ingest_cursors (tournament_id, cursor)
         VALUES ($1, $2)
         ON CONFLICT (tournament_id)
         DO UPDATE SET cursor = EXCLUDED.cursor, updated_at = now()",
    )
    .bind(tournament_id)
    .bind(cursor)
    .execute(pool)
    .await?;

    Ok(())
}
