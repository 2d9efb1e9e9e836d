//! Match ingestion driver.
//!
//! Pulls recent matches for a tournament's roster from its statistics
//! provider, normalizes and scores them, and feeds each match through the
//! aggregator. Per-player and per-match failures are isolated and logged;
//! only a missing tournament aborts a batch. All fetching completes before
//! any merge transaction opens.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use uuid::Uuid;

use crate::aggregate::{self, MergeOutcome, ScoredMatch};
use crate::error::{EngineError, Result};
use crate::models::performance::{self, NewMatchResult, NewPerformance};
use crate::models::tournament::{self, RosterPlayer, Tournament};
use crate::providers::{MatchDetail, MatchRef, StatsProvider};
use crate::scoring::ScoringSystem;
use crate::state::AppState;

/// Longest accepted user-supplied match id.
const MAX_MATCH_ID_LEN: usize = 128;

/// Summary of one ingestion run for one tournament.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub players_polled: usize,
    pub players_failed: usize,
    pub matches_considered: usize,
    pub matches_applied: usize,
    pub matches_failed: usize,
    pub performances_merged: usize,
    pub duplicates_skipped: usize,
}

/// One pass over every in-progress tournament, called on an interval by the
/// service binary. Failures are isolated per tournament.
pub async fn ingest_all_active(state: &AppState) {
    let tournaments = match tournament::get_in_progress_tournaments(&state.db).await {
        Ok(tournaments) => tournaments,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list in-progress tournaments");
            return;
        }
    };

    for t in &tournaments {
        if let Err(e) = ingest_tournament(state, t.tournament_id).await {
            tracing::error!(
                tournament_id = %t.tournament_id,
                tournament_name = %t.name,
                error = ?e,
                retryable = e.is_retryable(),
                "Ingestion run failed"
            );
        }
    }
}

/// Best-effort batch job for one tournament.
pub async fn ingest_tournament(state: &AppState, tournament_id: Uuid) -> Result<IngestReport> {
    let pool = &state.db;

    let tournament = tournament::get_tournament(pool, tournament_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
    let provider = provider_for(state, &tournament)?;

    let roster = tournament::get_roster(pool, tournament_id).await?;
    if roster.is_empty() {
        tracing::debug!(
            tournament_id = %tournament_id,
            "No linked player accounts, nothing to ingest"
        );
        return Ok(IngestReport::default());
    }

    let cursor = performance::get_cursor(pool, tournament_id).await?;
    let (refs, players_failed) =
        fetch_recent_refs(provider.as_ref(), &roster, cursor.as_deref()).await;

    let mut report = IngestReport {
        players_polled: roster.len(),
        players_failed,
        ..IngestReport::default()
    };

    let candidates = filter_new_matches(pool, tournament_id, dedupe_refs(refs)).await?;
    report.matches_considered = candidates.len();
    if candidates.is_empty() {
        return Ok(report);
    }

    let scoring = tournament.scoring();
    let roster_by_external_id: HashMap<&str, &RosterPlayer> = roster
        .iter()
        .map(|p| (p.external_player_id.as_str(), p))
        .collect();

    let details = join_all(
        candidates
            .iter()
            .map(|candidate| provider.match_detail(&candidate.match_id)),
    )
    .await;

    let mut applied_refs: Vec<&MatchRef> = Vec::new();
    for (candidate, detail) in candidates.iter().zip(details) {
        let detail = match detail {
            Ok(detail) => detail,
            Err(e) => {
                // Fatal to this match only; its performances are dropped
                // whole, never partially emitted.
                report.matches_failed += 1;
                tracing::warn!(
                    tournament_id = %tournament_id,
                    match_id = %candidate.match_id,
                    error = %e,
                    "Failed to fetch match detail, dropping match"
                );
                continue;
            }
        };

        let scored = normalize_match(tournament_id, &detail, &roster_by_external_id, &scoring);
        if scored.performances.is_empty() {
            tracing::debug!(
                tournament_id = %tournament_id,
                match_id = %detail.match_id,
                "No roster performances in match, skipping"
            );
            continue;
        }

        match aggregate::apply_match(pool, &state.feed, &scored).await {
            Ok(outcome) => {
                report.matches_applied += 1;
                report.performances_merged += outcome.performances_merged;
                report.duplicates_skipped += outcome.duplicates_skipped;
                applied_refs.push(candidate);
            }
            Err(e) => {
                report.matches_failed += 1;
                tracing::warn!(
                    tournament_id = %tournament_id,
                    match_id = %candidate.match_id,
                    error = %e,
                    "Failed to merge match, deferring to next run"
                );
            }
        }
    }

    // Advance the cursor only when the whole roster listed and every
    // candidate landed; otherwise the next run re-fetches the stragglers and
    // the natural-key dedupe absorbs the overlap.
    if cursor_ready(&report)
        && let Some(newest) = newest_ref(&applied_refs)
    {
        performance::set_cursor(pool, tournament_id, &newest.match_id).await?;
    }

    tracing::info!(
        tournament_id = %tournament_id,
        players_polled = report.players_polled,
        players_failed = report.players_failed,
        matches_applied = report.matches_applied,
        matches_failed = report.matches_failed,
        performances = report.performances_merged,
        "Ingestion run complete"
    );

    Ok(report)
}

/// User-initiated tracking of a single match id.
pub async fn track_match(
    state: &AppState,
    tournament_id: Uuid,
    match_id: &str,
) -> Result<MergeOutcome> {
    let match_id = match_id.trim();
    if match_id.is_empty() || match_id.len() > MAX_MATCH_ID_LEN {
        return Err(EngineError::InvalidInput(format!(
            "match id must be 1-{MAX_MATCH_ID_LEN} characters"
        )));
    }

    let tournament = tournament::get_tournament(&state.db, tournament_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
    let provider = provider_for(state, &tournament)?;

    let roster = tournament::get_roster(&state.db, tournament_id).await?;
    let roster_by_external_id: HashMap<&str, &RosterPlayer> = roster
        .iter()
        .map(|p| (p.external_player_id.as_str(), p))
        .collect();

    let detail = provider.match_detail(match_id).await?;
    let scored = normalize_match(
        tournament_id,
        &detail,
        &roster_by_external_id,
        &tournament.scoring(),
    );

    let outcome = aggregate::apply_match(&state.db, &state.feed, &scored).await?;
    if outcome.is_duplicate() {
        return Err(EngineError::DuplicateRecord);
    }
    Ok(outcome)
}

fn provider_for(
    state: &AppState,
    tournament: &Tournament,
) -> Result<std::sync::Arc<dyn StatsProvider>> {
    let title = tournament.title()?;
    state
        .providers
        .get(title)
        .ok_or_else(|| EngineError::NotFound(format!("no statistics provider for {title}")))
}

/// Concurrent per-player fan-out. A failed player is logged and skipped so
/// the rest of the batch still lands.
async fn fetch_recent_refs(
    provider: &dyn StatsProvider,
    roster: &[RosterPlayer],
    since: Option<&str>,
) -> (Vec<MatchRef>, usize) {
    let fetches = roster.iter().map(|player| async move {
        let result = provider
            .recent_matches(&player.external_player_id, &player.platform, since)
            .await;
        (player, result)
    });

    let mut refs = Vec::new();
    let mut failed = 0;
    for (player, result) in join_all(fetches).await {
        match result {
            Ok(player_refs) => refs.extend(player_refs),
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    user_id = %player.user_id,
                    external_player_id = %player.external_player_id,
                    error = %e,
                    "Failed to fetch recent matches for player, continuing batch"
                );
            }
        }
    }
    (refs, failed)
}

/// Collapse the per-player listings: teammates share matches.
fn dedupe_refs(refs: Vec<MatchRef>) -> Vec<MatchRef> {
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter(|r| seen.insert(r.match_id.clone()))
        .collect()
}

/// Drop candidates already tracked for this tournament.
async fn filter_new_matches(
    pool: &sqlx::PgPool,
    tournament_id: Uuid,
    mut refs: Vec<MatchRef>,
) -> Result<Vec<MatchRef>> {
    if refs.is_empty() {
        return Ok(refs);
    }
    let ids: Vec<String> = refs.iter().map(|r| r.match_id.clone()).collect();
    let tracked: HashSet<String> = performance::already_tracked(pool, tournament_id, &ids)
        .await?
        .into_iter()
        .collect();
    refs.retain(|r| !tracked.contains(&r.match_id));
    Ok(refs)
}

/// Whether a run is clean enough to advance the ingest cursor. A cursor moved
/// past a failed player's unlisted history would cut that history off at the
/// next run's truncation, losing those matches for good.
fn cursor_ready(report: &IngestReport) -> bool {
    report.players_failed == 0 && report.matches_failed == 0
}

/// The most recent applied match, preferring end timestamps and falling back
/// to listing order.
fn newest_ref<'a>(applied: &[&'a MatchRef]) -> Option<&'a MatchRef> {
    applied
        .iter()
        .filter(|r| r.ended_at.is_some())
        .max_by_key(|r| r.ended_at)
        .or_else(|| applied.first())
        .copied()
}

/// Turn one match's vendor stats into scored performance candidates for
/// roster members. Non-roster players are ignored; vendor stats the score
/// calculator rejects are logged and skipped individually.
fn normalize_match(
    tournament_id: Uuid,
    detail: &MatchDetail,
    roster: &HashMap<&str, &RosterPlayer>,
    scoring: &ScoringSystem,
) -> ScoredMatch {
    let mut performances = Vec::new();
    for stats in &detail.players {
        let Some(player) = roster.get(stats.player_id.as_str()) else {
            continue;
        };
        let score = match scoring.score(stats.placement, stats.kills) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(
                    match_id = %detail.match_id,
                    player_id = %stats.player_id,
                    error = %e,
                    "Rejected vendor stats, skipping performance"
                );
                continue;
            }
        };
        performances.push(NewPerformance {
            tournament_id,
            match_id: detail.match_id.clone(),
            user_id: player.user_id,
            team_id: player.team_id,
            placement: stats.placement,
            kills: stats.kills,
            damage_done: stats.damage,
            survival_time: stats.survival_time,
            score,
        });
    }

    ScoredMatch {
        result: NewMatchResult {
            tournament_id,
            match_id: detail.match_id.clone(),
            map_name: detail.map_name.clone(),
            mode: detail.mode.clone(),
            started_at: detail.started_at,
            ended_at: detail.ended_at,
            raw_payload: detail.raw.clone(),
        },
        performances,
    }
}
