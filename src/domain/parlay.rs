//! Parlay domain records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::decision::PickSide;
use super::league::League;
use super::market::MarketType;

/// Candidate-leg strength tier.
///
/// EDGE maps from an EDGE classification, PICK from a strong LEAN, LEAN
/// from the rest of the LEAN band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Edge,
    Pick,
    Lean,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Edge => "EDGE",
            Tier::Pick => "PICK",
            Tier::Lean => "LEAN",
        }
    }

    /// Base weight contributed to the parlay score.
    pub fn weight(&self) -> f64 {
        match self {
            Tier::Edge => 3.0,
            Tier::Pick => 2.0,
            Tier::Lean => 1.0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested parlay shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParlayProfile {
    Premium,
    Balanced,
    Speculative,
}

impl ParlayProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParlayProfile::Premium => "premium",
            ParlayProfile::Balanced => "balanced",
            ParlayProfile::Speculative => "speculative",
        }
    }
}

impl FromStr for ParlayProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "premium" => Ok(ParlayProfile::Premium),
            "balanced" => Ok(ParlayProfile::Balanced),
            "speculative" => Ok(ParlayProfile::Speculative),
            other => Err(format!("unknown parlay profile: {}", other)),
        }
    }
}

impl fmt::Display for ParlayProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incoming generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayRequest {
    pub profile: ParlayProfile,
    pub legs: usize,
    pub allow_same_team: bool,
    pub seed: Option<u64>,
    #[serde(default)]
    pub sports: Vec<League>,
}

/// One selected leg, carried verbatim from its decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayLeg {
    pub selection_id: String,
    pub event_id: String,
    pub league: League,
    pub market_type: MarketType,
    pub pick_side: PickSide,
    pub team_name: Option<String>,
    /// Key used for same-team exclusion; None is flagged in audit, not blocking
    pub team_key: Option<String>,
    pub line: f64,
    pub american_odds: i32,
    pub tier: Tier,
    pub weight: f64,
    pub high_volatility: bool,
}

/// Documented failure reasons. Every FAIL carries one of these plus detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailReason {
    InsufficientPool,
    ConstraintBlocked,
    LeanNotAllowed,
    ParlayWeightTooLow,
    InvalidProfile,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::InsufficientPool => "INSUFFICIENT_POOL",
            FailReason::ConstraintBlocked => "CONSTRAINT_BLOCKED",
            FailReason::LeanNotAllowed => "LEAN_NOT_ALLOWED",
            FailReason::ParlayWeightTooLow => "PARLAY_WEIGHT_TOO_LOW",
            FailReason::InvalidProfile => "INVALID_PROFILE",
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool accounting captured on every attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParlayAudit {
    pub pool_size: usize,
    pub eligible_pool_size: usize,
    pub eligible_edges: usize,
    pub eligible_picks: usize,
    pub eligible_leans: usize,
    pub blocked_integrity: usize,
    pub blocked_model_view: usize,
    /// Legs missing a team_key when same-team exclusion was requested
    pub missing_team_keys: Vec<String>,
    /// Fallback ladder steps applied, in order
    pub relaxations_applied: Vec<String>,
    pub combinations_scored: usize,
}

/// Exactly one of PARLAY or FAIL; never a silent empty result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ParlayOutcome {
    #[serde(rename = "PARLAY")]
    Parlay {
        legs: Vec<ParlayLeg>,
        parlay_weight: f64,
        audit: ParlayAudit,
    },
    #[serde(rename = "FAIL")]
    Fail {
        reason_code: FailReason,
        reason_detail: serde_json::Value,
        audit: ParlayAudit,
    },
}

/// Append-only attempt log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayAttempt {
    pub attempt_id: String,
    pub request: ParlayRequest,
    pub outcome: ParlayOutcome,
    pub created_at: DateTime<Utc>,
}
