//! Closing line value.
//!
//! CLV is the signed difference between the terms frozen at publish time
//! and the market's closing terms, from the pick's perspective: positive
//! means the entry beat the close.

use crate::domain::{american_implied_prob, remove_vig_pair, MarketSnapshot, MarketType, PickSide};

/// Current CLV rules version.
pub const CLV_RULES_V1: &str = "clv-v1";

/// Compute CLV for a frozen entry against the closing snapshot.
pub fn compute(
    market_type: MarketType,
    pick_side: PickSide,
    entry_line: f64,
    entry_odds: i32,
    closing: &MarketSnapshot,
) -> f64 {
    match (market_type, pick_side) {
        // handicaps: the bettor wants the biggest handicap for their side
        (MarketType::Spread, PickSide::Home) => entry_line - closing.spread_home,
        (MarketType::Spread, PickSide::Away) => entry_line - closing.spread_away,
        // totals: over wants the line low, under wants it high
        (MarketType::Total, PickSide::Over) => closing.total - entry_line,
        (MarketType::Total, PickSide::Under) => entry_line - closing.total,
        // moneylines: probability terms; positive when the close moved
        // toward the picked side
        (MarketType::Moneyline, side) => {
            let (q_home, q_away) = remove_vig_pair(
                american_implied_prob(closing.ml_home),
                american_implied_prob(closing.ml_away),
            );
            let closing_prob = if side == PickSide::Home { q_home } else { q_away };
            closing_prob - american_implied_prob(entry_odds)
        }
        _ => 0.0,
    }
}
