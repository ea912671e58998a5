//! Canonical per-market decisions.
//!
//! A `MarketDecision` is produced only by the decision computer and gated
//! only by the integrity validator. Every field a consumer renders (pick,
//! line, odds, probabilities, reasons) is populated here by the backend.
//! Consumers never compute edges, select sides, or interpret spread signs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::league::League;
use super::market::MarketType;
use super::selection::SelectionPair;

/// Edge strength classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Edge,
    Lean,
    MarketAligned,
    NoAction,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Edge => "EDGE",
            Classification::Lean => "LEAN",
            Classification::MarketAligned => "MARKET_ALIGNED",
            Classification::NoAction => "NO_ACTION",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release gate applied after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Official,
    InfoOnly,
    BlockedByRisk,
    BlockedByIntegrity,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Official => "OFFICIAL",
            ReleaseStatus::InfoOnly => "INFO_ONLY",
            ReleaseStatus::BlockedByRisk => "BLOCKED_BY_RISK",
            ReleaseStatus::BlockedByIntegrity => "BLOCKED_BY_INTEGRITY",
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            ReleaseStatus::BlockedByRisk | ReleaseStatus::BlockedByIntegrity
        )
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Letter grade derived from edge magnitude, for display ordering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeGrade {
    A,
    B,
    C,
}

/// Which side of the market the decision picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickSide {
    Home,
    Away,
    Over,
    Under,
}

impl PickSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickSide::Home => "home",
            PickSide::Away => "away",
            PickSide::Over => "over",
            PickSide::Under => "under",
        }
    }
}

/// The selected team/side. For totals, team fields are None.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub team_id: Option<String>,
    pub team_name: Option<String>,
    pub side: PickSide,
    /// The line the pick is taken at (handicap or total)
    pub line: f64,
}

/// Quoted market terms for the picked side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub line: f64,
    pub american_odds: i32,
}

/// Model-side view of the market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelView {
    /// Fair line in the market's own quoting convention
    pub fair_line: f64,
    /// Model win probability for the home side (or over, for totals)
    pub win_prob: f64,
}

/// Probabilities for the picked side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    /// Model probability the pick covers/wins/hits
    pub model_prob: f64,
    /// Market-implied probability, vig removed by equal-margin normalization
    pub market_implied_prob: f64,
}

/// Signed edge metrics. Points for spread/total, EV for moneyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeMetrics {
    pub edge_points: Option<f64>,
    pub edge_ev: Option<f64>,
    pub edge_grade: EdgeGrade,
}

/// Provenance block. Populated by the computer, read-only downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDebug {
    pub inputs_hash: String,
    pub decision_version: u32,
    pub trace_id: String,
    pub computed_at: DateTime<Utc>,
    pub odds_timestamp: DateTime<Utc>,
    pub sim_run_id: String,
}

/// Canonical per-(event, market) decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDecision {
    pub league: League,
    pub event_id: String,
    pub provider_event_id: Option<String>,
    pub market_type: MarketType,
    pub selection_id: String,
    pub pick: Option<Pick>,
    pub market: MarketQuote,
    pub model: ModelView,
    pub probabilities: Probabilities,
    pub edge: Option<EdgeMetrics>,
    pub classification: Classification,
    pub release_status: ReleaseStatus,
    /// Short strings authored by the decision computer; rendered verbatim
    pub reasons: Vec<String>,
    pub debug: DecisionDebug,
    /// Empty iff release_status is not BLOCKED_*
    pub validator_failures: Vec<String>,
    /// Both canonical sides of this market, for opposite lookup and
    /// probability-normalization checks
    pub sides: SelectionPair,
}

impl MarketDecision {
    /// Signed edge value used for wave-to-wave stability comparison.
    pub fn edge_value(&self) -> Option<f64> {
        let edge = self.edge.as_ref()?;
        match self.market_type {
            MarketType::Spread | MarketType::Total => edge.edge_points,
            MarketType::Moneyline => edge.edge_ev,
        }
    }
}

/// Meta block of a served `GameDecisions` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionsMeta {
    pub inputs_hash: String,
    pub computed_at: DateTime<Utc>,
    pub league: League,
    pub event_id: String,
    pub decision_version: u32,
}

/// The single payload served to the UI: all three markets, one hash.
///
/// Invariant: every non-null child's `debug.inputs_hash` and
/// `debug.decision_version` equal the meta values. There is no partial
/// refresh; the triple is recomputed and swapped as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDecisions {
    pub spread: Option<MarketDecision>,
    pub moneyline: Option<MarketDecision>,
    pub total: Option<MarketDecision>,
    pub meta: DecisionsMeta,
}

impl GameDecisions {
    pub fn children(&self) -> impl Iterator<Item = &MarketDecision> {
        [self.spread.as_ref(), self.moneyline.as_ref(), self.total.as_ref()]
            .into_iter()
            .flatten()
    }

    pub fn child(&self, market_type: MarketType) -> Option<&MarketDecision> {
        match market_type {
            MarketType::Spread => self.spread.as_ref(),
            MarketType::Moneyline => self.moneyline.as_ref(),
            MarketType::Total => self.total.as_ref(),
        }
    }

    pub fn child_mut(&mut self, market_type: MarketType) -> Option<&mut MarketDecision> {
        match market_type {
            MarketType::Spread => self.spread.as_mut(),
            MarketType::Moneyline => self.moneyline.as_mut(),
            MarketType::Total => self.total.as_mut(),
        }
    }

    /// Whether every non-null child agrees with the meta hash and version.
    pub fn hash_consistent(&self) -> bool {
        self.children().all(|d| {
            d.debug.inputs_hash == self.meta.inputs_hash
                && d.debug.decision_version == self.meta.decision_version
        })
    }
}
