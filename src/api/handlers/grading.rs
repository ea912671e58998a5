use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::api::{
    state::AppState,
    types::{ErrorBody, GradePickRequest},
};
use crate::domain::GradingRecord;

use super::error_response;

/// POST /api/grading/pick/:pick_id (admin-scoped)
pub async fn grade_pick(
    State(state): State<AppState>,
    Path(pick_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<GradePickRequest>>,
) -> std::result::Result<Json<GradingRecord>, (StatusCode, Json<ErrorBody>)> {
    require_admin(&state, &headers)?;

    let request = body.map(|Json(b)| b).unwrap_or_default();
    let record = state
        .settlement
        .grade(&pick_id, request.admin_override, request.admin_note)
        .await
        .map_err(error_response)?;

    Ok(Json(record))
}

/// Bearer-token gate for admin routes. Open when no token is configured
/// (development); a configured token must match exactly.
fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> std::result::Result<(), (StatusCode, Json<ErrorBody>)> {
    let Some(expected) = state.config.api.admin_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error_code: "UNAUTHORIZED".into(),
                message: "admin token required".into(),
                request_context: None,
            }),
        ))
    }
}
