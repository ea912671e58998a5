//! API request/response types.
//!
//! The decision payloads themselves are the canonical domain records,
//! serialized as-is; consumers receive every derived field from the
//! backend and compute nothing.

use serde::{Deserialize, Serialize};

use crate::domain::{GameDecisions, League, ParlayProfile, Settlement};

#[derive(Debug, Deserialize)]
pub struct RunSimulationRequest {
    pub event_id: String,
    pub iterations: u32,
    #[serde(default)]
    pub market_type: Option<String>,
    #[serde(default = "default_market_settlement")]
    pub market_settlement: String,
}

fn default_market_settlement() -> String {
    "FULL_GAME".to_string()
}

#[derive(Debug, Serialize)]
pub struct RunSimulationResponse {
    pub sim_run_id: String,
    pub decisions: GameDecisions,
}

#[derive(Debug, Deserialize)]
pub struct GenerateParlayRequest {
    pub profile: ParlayProfile,
    pub legs: usize,
    #[serde(default)]
    pub allow_same_team: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub sports: Vec<League>,
}

#[derive(Debug, Deserialize)]
pub struct ParlayStatsQuery {
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

fn default_stats_days() -> i64 {
    7
}

#[derive(Debug, Serialize)]
pub struct ParlayStatsResponse {
    pub days: i64,
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    pub fail_reasons: std::collections::BTreeMap<String, usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GradePickRequest {
    #[serde(default)]
    pub admin_override: Option<Settlement>,
    #[serde(default)]
    pub admin_note: Option<String>,
}

/// Structured error payload; the HTTP surface never leaks bare strings.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_context: Option<serde_json::Value>,
}
