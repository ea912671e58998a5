//! Stable selection identities.
//!
//! A `selection_id` names one side of one market on one event at one line
//! and book. It is the only identifier the UI or publisher may use, and
//! opposite-side resolution is a table lookup on the pair stored with the
//! decision, never string or team-name matching.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::market::MarketType;

/// Compute the stable id for one side of a market.
///
/// Hash input: `event_id | market_type | side_key | normalized_line | book`.
/// The line is normalized to one decimal so that `-5.50` and `-5.5` agree.
pub fn selection_id(
    event_id: &str,
    market_type: MarketType,
    side_key: &str,
    line: f64,
    book_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_id.as_bytes());
    hasher.update(b"|");
    hasher.update(market_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(side_key.as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{:.1}", line).as_bytes());
    hasher.update(b"|");
    hasher.update(book_id.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// One canonical side of a two-way market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSide {
    pub selection_id: String,
    /// "home" / "away" for spread and moneyline, "over" / "under" for totals
    pub side_key: String,
    pub team_id: Option<String>,
    /// Quoted line for this side (handicap for spreads, total for totals, 0 for moneyline)
    pub line: f64,
    /// Model probability this side wins/covers/hits
    pub model_prob: f64,
}

/// The two canonical sides of a market, stored on every decision so that
/// opposite resolution is pure table lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPair {
    pub primary: SelectionSide,
    pub counter: SelectionSide,
}

impl SelectionPair {
    /// Deterministic opposite-selection resolver.
    ///
    /// Property: `opposite(opposite(x)) == x` for both stored ids.
    pub fn opposite(&self, selection_id: &str) -> Option<&SelectionSide> {
        if selection_id == self.primary.selection_id {
            Some(&self.counter)
        } else if selection_id == self.counter.selection_id {
            Some(&self.primary)
        } else {
            None
        }
    }

    pub fn side(&self, selection_id: &str) -> Option<&SelectionSide> {
        if selection_id == self.primary.selection_id {
            Some(&self.primary)
        } else if selection_id == self.counter.selection_id {
            Some(&self.counter)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> SelectionPair {
        SelectionPair {
            primary: SelectionSide {
                selection_id: selection_id("evt-1", MarketType::Spread, "home", -5.5, "bk"),
                side_key: "home".into(),
                team_id: Some("t-home".into()),
                line: -5.5,
                model_prob: 0.62,
            },
            counter: SelectionSide {
                selection_id: selection_id("evt-1", MarketType::Spread, "away", 5.5, "bk"),
                side_key: "away".into(),
                team_id: Some("t-away".into()),
                line: 5.5,
                model_prob: 0.38,
            },
        }
    }

    #[test]
    fn test_selection_id_deterministic() {
        let a = selection_id("evt-1", MarketType::Spread, "home", -5.5, "bk");
        let b = selection_id("evt-1", MarketType::Spread, "home", -5.50, "bk");
        assert_eq!(a, b);

        let other_line = selection_id("evt-1", MarketType::Spread, "home", -6.0, "bk");
        assert_ne!(a, other_line);

        let other_book = selection_id("evt-1", MarketType::Spread, "home", -5.5, "bk2");
        assert_ne!(a, other_book);
    }

    #[test]
    fn test_opposite_is_involution() {
        let pair = pair();
        let home_id = pair.primary.selection_id.clone();

        let away = pair.opposite(&home_id).unwrap();
        let back = pair.opposite(&away.selection_id).unwrap();
        assert_eq!(back.selection_id, home_id);
    }

    #[test]
    fn test_opposite_unknown_id() {
        assert!(pair().opposite("deadbeef").is_none());
    }
}
