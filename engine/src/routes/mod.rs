use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub mod leaderboard;
pub mod players;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/players/resolve", get(players::resolve_player))
        .route(
            "/api/tournaments/{tournament_id}/leaderboard",
            get(leaderboard::get_leaderboard),
        )
        .route(
            "/api/tournaments/{tournament_id}/leaderboard/live",
            get(leaderboard::leaderboard_live),
        )
        .route(
            "/api/tournaments/{tournament_id}/track",
            post(leaderboard::track_match),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
