use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::models::tournament::GameTitle;
use crate::providers::{PlayerIdentity, ProviderError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolvePlayerQuery {
    pub game: GameTitle,
    pub name: String,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    "steam".to_string()
}

/// GET /api/players/resolve
///
/// Verify a player name + platform against the vendor before linking the
/// account to a roster slot.
pub async fn resolve_player(
    State(state): State<AppState>,
    Query(query): Query<ResolvePlayerQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let provider = state.providers.get(query.game).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("no statistics provider for {}", query.game),
        )
    })?;

    match provider.resolve_player(&query.name, &query.platform).await {
        Ok(identity) => Ok(Json::<PlayerIdentity>(identity)),
        Err(ProviderError::PlayerNotFound(message)) => Err((StatusCode::NOT_FOUND, message)),
        Err(e) => {
            tracing::warn!(
                game = %query.game,
                player_name = %query.name,
                error = %e,
                "Player resolution failed"
            );
            Err((
                StatusCode::BAD_GATEWAY,
                "Statistics provider unavailable".to_string(),
            ))
        }
    }
}
