use axum::{
    Json,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::ingest;
use crate::models::leaderboard;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RankedTeam {
    pub rank: usize,
    pub team_id: Uuid,
    pub total_points: f64,
    pub matches_played: i32,
    pub wins: i32,
    pub total_kills: i32,
    pub average_placement: f64,
}

#[derive(Debug, Serialize)]
pub struct RankingResponse {
    pub tournament_id: Uuid,
    pub standings: Vec<RankedTeam>,
}

/// GET /api/tournaments/{tournament_id}/leaderboard
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(tournament_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let entries = leaderboard::get_ranking(&state.db, tournament_id)
        .await
        .map_err(|e| {
            tracing::error!(tournament_id = %tournament_id, error = %e, "Failed to fetch ranking");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        })?;

    let standings = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| RankedTeam {
            rank: i + 1,
            team_id: entry.team_id,
            total_points: entry.total_points,
            matches_played: entry.matches_played,
            wins: entry.wins,
            total_kills: entry.total_kills,
            average_placement: entry.average_placement(),
        })
        .collect();

    Ok(Json(RankingResponse {
        tournament_id,
        standings,
    }))
}

/// GET /api/tournaments/{tournament_id}/leaderboard/live
///
/// Websocket that pushes a message after every merge affecting the
/// tournament. Every message means "re-fetch the ranking"; nothing is a diff.
pub async fn leaderboard_live(
    State(state): State<AppState>,
    Path(tournament_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| live_feed(socket, state, tournament_id))
}

async fn live_feed(mut socket: WebSocket, state: AppState, tournament_id: Uuid) {
    use tokio::sync::broadcast::error::RecvError;

    let mut changes = state.feed.subscribe(tournament_id);
    loop {
        match changes.recv().await {
            Ok(change) => {
                let Ok(payload) = serde_json::to_string(&change) else {
                    continue;
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break; // client went away
                }
            }
            // A lagged receiver missed events, but they all mean the same
            // thing: re-fetch.
            Err(RecvError::Lagged(_)) => {
                let refresh = r#"{"refresh":true}"#;
                if socket.send(Message::Text(refresh.into())).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrackMatchRequest {
    pub match_id: String,
}

#[derive(Debug, Serialize)]
pub struct TrackMatchResponse {
    pub match_id: String,
    pub performances_merged: usize,
    pub duplicates_skipped: usize,
    pub teams_updated: usize,
    pub already_tracked: bool,
}

/// POST /api/tournaments/{tournament_id}/track
///
/// Manual single-match tracking. The one path where a provider or validation
/// failure is surfaced to the user who initiated it.
pub async fn track_match(
    State(state): State<AppState>,
    Path(tournament_id): Path<Uuid>,
    Json(request): Json<TrackMatchRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match ingest::track_match(&state, tournament_id, &request.match_id).await {
        Ok(outcome) => Ok(Json(TrackMatchResponse {
            match_id: request.match_id,
            performances_merged: outcome.performances_merged,
            duplicates_skipped: outcome.duplicates_skipped,
            teams_updated: outcome.teams_updated,
            already_tracked: outcome.match_already_tracked,
        })),
        Err(EngineError::InvalidInput(message)) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, message))
        }
        Err(EngineError::NotFound(message)) => Err((StatusCode::NOT_FOUND, message)),
        Err(EngineError::DuplicateRecord) => Err((
            StatusCode::CONFLICT,
            "Match already tracked for this tournament".to_string(),
        )),
        Err(EngineError::Provider(e)) => {
            tracing::warn!(
                tournament_id = %tournament_id,
                error = %e,
                "Provider failure during manual match tracking"
            );
            Err((
                StatusCode::BAD_GATEWAY,
                "Statistics provider unavailable".to_string(),
            ))
        }
        Err(e) => {
            tracing::error!(
                tournament_id = %tournament_id,
                error = %e,
                "Manual match tracking failed"
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ))
        }
    }
}
