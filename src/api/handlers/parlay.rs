use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;

use crate::api::{
    state::AppState,
    types::{ErrorBody, GenerateParlayRequest, ParlayStatsQuery, ParlayStatsResponse},
};
use crate::domain::{ParlayOutcome, ParlayRequest};
use crate::error::EngineError;
use crate::flags::PARLAY_ENABLED;
use crate::parlay::candidate_from_decision;

use super::error_response;

/// POST /api/parlay/generate
pub async fn generate_parlay(
    State(state): State<AppState>,
    Json(request): Json<GenerateParlayRequest>,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, Json<ErrorBody>)> {
    let enabled = state
        .flags
        .is_enabled(PARLAY_ENABLED)
        .await
        .map_err(error_response)?;
    if !enabled {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error_code: "PARLAY_DISABLED".into(),
                message: "parlay generation is disabled by feature flag".into(),
                request_context: None,
            }),
        ));
    }

    let parlay_request = ParlayRequest {
        profile: request.profile,
        legs: request.legs,
        allow_same_team: request.allow_same_team,
        seed: request.seed,
        sports: request.sports.clone(),
    };

    // candidate pool: decisions for upcoming events, integrity-gated
    let now = Utc::now();
    let events = state
        .store
        .events_starting_between(now, now + Duration::hours(48))
        .await
        .map_err(error_response)?;

    let mut pool = Vec::new();
    let mut blocked_integrity = 0usize;
    let mut blocked_model_view = 0usize;
    for event in events {
        if !parlay_request.sports.is_empty() && !parlay_request.sports.contains(&event.league) {
            continue;
        }
        let Some(league_cfg) = state.config.league(event.league) else {
            continue;
        };
        let Some(decisions) = state
            .store
            .get_game_decisions(&event.event_id)
            .await
            .map_err(error_response)?
        else {
            continue;
        };
        for decision in decisions.children() {
            if decision.release_status.is_blocked() {
                blocked_integrity += 1;
                continue;
            }
            match candidate_from_decision(decision, league_cfg) {
                Some(leg) => pool.push(leg),
                None => blocked_model_view += 1,
            }
        }
    }

    let attempt = state
        .parlay
        .generate(&parlay_request, pool, blocked_integrity, blocked_model_view)
        .await
        .map_err(error_response)?;

    // flatten: {status, attempt_id, ...outcome fields}
    let mut body = serde_json::to_value(&attempt.outcome).map_err(|e| {
        error_response(EngineError::Internal(format!(
            "attempt serialization: {}",
            e
        )))
    })?;
    if let Some(object) = body.as_object_mut() {
        object.insert(
            "attempt_id".to_string(),
            serde_json::Value::String(attempt.attempt_id.clone()),
        );
    }
    Ok(Json(body))
}

/// GET /api/parlay/stats?days=N
pub async fn parlay_stats(
    State(state): State<AppState>,
    Query(query): Query<ParlayStatsQuery>,
) -> std::result::Result<Json<ParlayStatsResponse>, (StatusCode, Json<ErrorBody>)> {
    let days = query.days.clamp(1, 90);
    let since = Utc::now() - Duration::days(days);
    let attempts = state
        .store
        .parlay_attempts_since(since)
        .await
        .map_err(error_response)?;

    let mut successes = 0usize;
    let mut failures = 0usize;
    let mut fail_reasons: BTreeMap<String, usize> = BTreeMap::new();
    for attempt in &attempts {
        match &attempt.outcome {
            ParlayOutcome::Parlay { .. } => successes += 1,
            ParlayOutcome::Fail { reason_code, .. } => {
                failures += 1;
                *fail_reasons.entry(reason_code.to_string()).or_default() += 1;
            }
        }
    }

    Ok(Json(ParlayStatsResponse {
        days,
        attempts: attempts.len(),
        successes,
        failures,
        fail_reasons,
    }))
}
