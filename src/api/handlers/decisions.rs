use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::str::FromStr;

use crate::api::{state::AppState, types::ErrorBody};
use crate::domain::{GameDecisions, League};
use crate::error::EngineError;

use super::error_response;

/// GET /api/games/:league/:event_id/decisions
///
/// Serves the cached triple from the most recent wave. Blocked markets
/// come back with their blocked release status and a null pick, never a
/// 5xx.
pub async fn get_game_decisions(
    State(state): State<AppState>,
    Path((league, event_id)): Path<(String, String)>,
) -> std::result::Result<Json<GameDecisions>, (StatusCode, Json<ErrorBody>)> {
    let league = League::from_str(&league)
        .map_err(|e| error_response(EngineError::Validation(e)))?;

    let event = state
        .store
        .get_event(&event_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(EngineError::NotFound(format!("event {}", event_id))))?;
    if event.league != league {
        return Err(error_response(EngineError::NotFound(format!(
            "event {} in {}",
            event_id, league
        ))));
    }

    let decisions = state
        .store
        .get_game_decisions(&event_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| {
            error_response(EngineError::NotFound(format!(
                "decisions for event {}",
                event_id
            )))
        })?;

    // read-through guard: a cached triple whose children disagree with the
    // meta hash is rejected, never served
    if !decisions.hash_consistent() {
        return Err(error_response(EngineError::IntegrityViolation(format!(
            "stored decisions for {} fail the inputs_hash invariant",
            event_id
        ))));
    }

    Ok(Json(decisions))
}
