//! Settlement records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Settlement outcome of one pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Settlement {
    Win,
    Loss,
    Push,
    Void,
}

impl Settlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Settlement::Win => "WIN",
            Settlement::Loss => "LOSS",
            Settlement::Push => "PUSH",
            Settlement::Void => "VOID",
        }
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Settlement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WIN" => Ok(Settlement::Win),
            "LOSS" => Ok(Settlement::Loss),
            "PUSH" => Ok(Settlement::Push),
            "VOID" => Ok(Settlement::Void),
            other => Err(format!("unknown settlement: {}", other)),
        }
    }
}

/// How the market settles relative to game time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementMode {
    FullGame,
    Regulation,
}

impl SettlementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementMode::FullGame => "FULL_GAME",
            SettlementMode::Regulation => "REGULATION",
        }
    }
}

impl fmt::Display for SettlementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FULL_GAME" => Ok(SettlementMode::FullGame),
            "REGULATION" => Ok(SettlementMode::Regulation),
            other => Err(format!("unknown settlement mode: {}", other)),
        }
    }
}

/// Pointer to the exact score payload a grade was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePayloadRef {
    pub provider_event_id: String,
    pub payload_hash: String,
    pub snapshot: serde_json::Value,
}

/// Append-only grading record, unique on `idempotency_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRecord {
    pub pick_id: String,
    pub event_id: String,
    pub provider_event_id: String,
    pub idempotency_key: String,
    pub settlement: Settlement,
    /// Closing line value; None when no closing snapshot existed
    pub clv: Option<f64>,
    pub score_payload_ref: ScorePayloadRef,
    /// Alert ids raised while grading this pick
    pub ops_alerts: Vec<String>,
    pub admin_override: Option<Settlement>,
    pub admin_note: Option<String>,
    pub graded_at: DateTime<Utc>,
}

/// Idempotency key: two grade calls for the same pick under the same rule
/// versions collapse into one record.
pub fn grading_idempotency_key(
    pick_id: &str,
    grade_source: &str,
    settlement_rules_version: &str,
    clv_rules_version: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pick_id.as_bytes());
    hasher.update(b"|");
    hasher.update(grade_source.as_bytes());
    hasher.update(b"|");
    hasher.update(settlement_rules_version.as_bytes());
    hasher.update(b"|");
    hasher.update(clv_rules_version.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_stable() {
        let a = grading_idempotency_key("pick-1", "engine", "sr-v1", "clv-v1");
        let b = grading_idempotency_key("pick-1", "engine", "sr-v1", "clv-v1");
        assert_eq!(a, b);

        let rules_bump = grading_idempotency_key("pick-1", "engine", "sr-v2", "clv-v1");
        assert_ne!(a, rules_bump);
    }
}
