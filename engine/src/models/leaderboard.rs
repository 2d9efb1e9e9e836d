use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::aggregate::TeamBatch;
use crate::error::Result;

// Leaderboard entry: one row per (tournament, team). Only additive fields are
// stored; the placement average is derived from placement_sum at read time so
// merges stay commutative and free of rounding drift.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub leaderboard_entry_id: Uuid,
    pub tournament_id: Uuid,
    pub team_id: Uuid,
    pub total_points: f64,
    pub matches_played: i32,
    pub wins: i32,
    pub total_kills: i32,
    pub placement_sum: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl LeaderboardEntry {
    /// Arithmetic mean of placements across all counted match-appearances.
    /// Each performance record counts as one appearance, so a team fielding
    /// four players in one match contributes four placements.
    pub fn average_placement(&self) -> f64 {
        if self.matches_played == 0 {
            0.0
        } else {
            self.placement_sum as f64 / f64::from(self.matches_played)
        }
    }
}

/// Merge one team's batch aggregates into its entry with a single atomic
/// upsert. The database performs the increments, so concurrent merges for the
/// same key serialize on the row without a read-modify-write window.
pub async fn apply_team_batch(
    tx: &mut Transaction<'_, Postgres>,
    tournament_id: Uuid,
    team_id: Uuid,
    batch: &TeamBatch,
) -> Result<LeaderboardEntry> {
    let entry = sqlx::query_as::<_, LeaderboardEntry>(
        "INSERT INTO leaderboard_entries (
            tournament_id, team_id, total_points, matches_played, wins, total_kills, placement_sum
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (tournament_id, team_id) DO UPDATE SET
            total_points = leaderboard_entries.total_points + EXCLUDED.total_points,
            matches_played = leaderboard_entries.matches_played + EXCLUDED.matches_played,
            wins = leaderboard_entries.wins + EXCLUDED.wins,
            total_kills = leaderboard_entries.total_kills + EXCLUDED.total_kills,
            placement_sum = leaderboard_entries.placement_sum + EXCLUDED.placement_sum,
            updated_at = now()
         RETURNING
            leaderboard_entry_id, tournament_id, team_id, total_points,
            matches_played, wins, total_kills, placement_sum, created_at, updated_at",
    )
    .bind(tournament_id)
    .bind(team_id)
    .bind(batch.points)
    .bind(batch.performances)
    .bind(batch.wins)
    .bind(batch.kills)
    .bind(batch.placement_sum)
    .fetch_one(&mut **tx)
    .await?;

    Ok(entry)
}

/// All entries for a tournament in insertion order.
pub async fn get_entries(pool: &PgPool, tournament_id: Uuid) -> Result<Vec<LeaderboardEntry>> {
    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        "SELECT
            leaderboard_entry_id, tournament_id, team_id, total_points,
            matches_played, wins, total_kills, placement_sum, created_at, updated_at
         FROM leaderboard_entries
         WHERE tournament_id = $1
         ORDER BY created_at ASC, leaderboard_entry_id ASC",
    )
    .bind(tournament_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

fn rank_cmp(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.total_points
        .partial_cmp(&a.total_points)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            a.average_placement()
                .partial_cmp(&b.average_placement())
                .unwrap_or(Ordering::Equal)
        })
}

/// Sort entries for ranked display: descending total points, ties broken by
/// ascending average placement, further ties stable by entry creation order.
pub fn rank_entries(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(rank_cmp);
    entries
}

/// Current standings, freshly computed from persisted state.
pub async fn get_ranking(pool: &PgPool, tournament_id: Uuid) -> Result<Vec<LeaderboardEntry>> {
    Ok(rank_entries(get_entries(pool, tournament_id).await?))
}
