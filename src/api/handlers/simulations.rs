use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::str::FromStr;

use crate::api::{
    state::AppState,
    types::{ErrorBody, RunSimulationRequest, RunSimulationResponse},
};
use crate::domain::{MarketType, SettlementMode, SimTier, Wave};
use crate::error::EngineError;
use crate::settlement::rules;

use super::error_response;

/// POST /api/simulations/run
///
/// Market-contract validation happens here at the boundary: an invalid
/// (sport, market_type, market_settlement) combination returns 409 and
/// never reaches the engine.
pub async fn run_simulation(
    State(state): State<AppState>,
    Json(request): Json<RunSimulationRequest>,
) -> std::result::Result<Json<RunSimulationResponse>, (StatusCode, Json<ErrorBody>)> {
    let event = state
        .store
        .get_event(&request.event_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| {
            error_response(EngineError::NotFound(format!(
                "event {}",
                request.event_id
            )))
        })?;

    let settlement_mode = SettlementMode::from_str(&request.market_settlement)
        .map_err(EngineError::Validation)
        .map_err(error_response)?;
    let market_type = match &request.market_type {
        Some(raw) => Some(
            MarketType::from_str(raw)
                .map_err(EngineError::Validation)
                .map_err(error_response)?,
        ),
        None => None,
    };

    let checked_market = market_type.unwrap_or(MarketType::Spread);
    if !rules::contract_allowed(event.league, checked_market, settlement_mode) {
        return Err(error_response(EngineError::MarketContractMismatch {
            sport: event.league.to_string(),
            market_type: checked_market.to_string(),
            market_settlement: settlement_mode.to_string(),
        }));
    }

    let tier = SimTier::from_iterations(request.iterations).ok_or_else(|| {
        error_response(EngineError::Validation(format!(
            "iterations must be one of 10000/25000/50000/100000, got {}",
            request.iterations
        )))
    })?;

    let wave = current_wave(&event);
    let decisions = state
        .machine
        .evaluate_event_wave_with_tier(&event, wave, Some(tier))
        .await
        .map_err(error_response)?;

    let sim_run_id = decisions
        .children()
        .next()
        .map(|d| d.debug.sim_run_id.clone())
        .unwrap_or_default();

    Ok(Json(RunSimulationResponse {
        sim_run_id,
        decisions,
    }))
}

/// The wave an on-demand run belongs to, from time-to-start.
fn current_wave(event: &crate::domain::GameEvent) -> Wave {
    let minutes_out = (event.start_time - Utc::now()).num_minutes();
    if minutes_out > Wave::Validation.minutes_before_start() {
        Wave::Discovery
    } else if minutes_out > Wave::Publish.minutes_before_start() {
        Wave::Validation
    } else {
        Wave::Publish
    }
}
