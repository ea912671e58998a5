//! Market snapshots and odds arithmetic.
//!
//! All odds conversion lives here; no other module converts american odds,
//! removes vig, or shifts prices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::signal::Wave;

/// Market types the engine decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spread,
    Moneyline,
    Total,
}

impl MarketType {
    pub const ALL: [MarketType; 3] = [MarketType::Spread, MarketType::Moneyline, MarketType::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spread => "spread",
            MarketType::Moneyline => "moneyline",
            MarketType::Total => "total",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spread" => Ok(MarketType::Spread),
            "moneyline" => Ok(MarketType::Moneyline),
            "total" => Ok(MarketType::Total),
            other => Err(format!("unknown market type: {}", other)),
        }
    }
}

/// One immutable observation of a book's lines for an event.
///
/// Spread lines are quoted handicaps from each team's perspective: home
/// favored by 5.5 is `spread_home = -5.5`, `spread_away = +5.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub event_id: String,
    pub wave: Wave,
    pub observed_at: DateTime<Utc>,
    pub spread_home: f64,
    pub spread_away: f64,
    pub total: f64,
    pub over_price: i32,
    pub under_price: i32,
    pub ml_home: i32,
    pub ml_away: i32,
    pub book_id: String,
}

/// Standard juice assumed on point-spread and total sides when the book
/// quotes lines without side prices.
pub const STANDARD_SIDE_PRICE: i32 = -110;

/// Convert american odds to decimal odds.
pub fn american_to_decimal(odds: i32) -> f64 {
    if odds >= 0 {
        1.0 + odds as f64 / 100.0
    } else {
        1.0 + 100.0 / odds.abs() as f64
    }
}

/// Implied probability of american odds (vig included).
pub fn american_implied_prob(odds: i32) -> f64 {
    if odds >= 0 {
        100.0 / (odds as f64 + 100.0)
    } else {
        let a = odds.abs() as f64;
        a / (a + 100.0)
    }
}

/// Remove vig from a two-way market by equal-margin normalization:
/// each side gives back half of the overround.
pub fn remove_vig_pair(prob_a: f64, prob_b: f64) -> (f64, f64) {
    let overround = prob_a + prob_b - 1.0;
    let fair_a = (prob_a - overround / 2.0).clamp(0.001, 0.999);
    let fair_b = (prob_b - overround / 2.0).clamp(0.001, 0.999);
    (fair_a, fair_b)
}

/// Shift american odds in the bettor-worse direction by `points`,
/// skipping over the (-100, +100) gap.
pub fn shift_american_worse(odds: i32, points: i32) -> i32 {
    let shifted = odds - points;
    if odds >= 100 && shifted < 100 {
        // +105 worse by 10 is -105, not +95
        shifted - 200
    } else {
        shifted
    }
}
