//! Copy validator.
//!
//! Hard gate between rendering and the outbound channel. Every numeric
//! token in the rendered text must reconcile against a canonical payload
//! value (probability ±0.001, lines ±0.05, odds exact); forbidden phrases
//! and selection mismatches block outright. Decision contradictions in
//! rendered text are impossible by construction because nothing
//! unreconciled can pass.

use crate::domain::{MarketDecision, MarketType};

const PROB_TOLERANCE_PCT: f64 = 0.1; // 0.001 in probability units
const LINE_TOLERANCE: f64 = 0.05;

/// Validation failure reasons recorded on the publish attempt.
pub const NUMERIC_MISMATCH: &str = "NUMERIC_MISMATCH";
pub const FORBIDDEN_PHRASE: &str = "FORBIDDEN_PHRASE";
pub const SELECTION_MISMATCH: &str = "SELECTION_MISMATCH";
pub const MISSING_FIELD: &str = "MISSING_FIELD";

#[derive(Debug, Clone, Copy, PartialEq)]
enum NumberClass {
    Probability,
    Line,
    Odds,
}

/// A canonical value a rendered token may legally express.
#[derive(Debug, Clone, Copy)]
struct Canonical {
    value: f64,
    class: NumberClass,
}

pub struct CopyValidator {
    forbidden_phrases: Vec<String>,
}

impl CopyValidator {
    pub fn new(forbidden_phrases: Vec<String>) -> Self {
        Self {
            forbidden_phrases: forbidden_phrases
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Validate rendered text against its canonical decision.
    /// Returns the failure reason, or Ok on pass.
    pub fn validate(&self, text: &str, decision: &MarketDecision) -> Result<(), String> {
        // required fields
        let Some(pick) = decision.pick.as_ref() else {
            return Err(MISSING_FIELD.to_string());
        };
        if decision.selection_id.is_empty() || text.trim().is_empty() {
            return Err(MISSING_FIELD.to_string());
        }

        // forbidden phrases
        let lowered = text.to_lowercase();
        for phrase in &self.forbidden_phrases {
            if lowered.contains(phrase) {
                return Err(format!("{}:{}", FORBIDDEN_PHRASE, phrase));
            }
        }

        // selection integrity: the canonical team name must appear for
        // team-bound markets
        if matches!(
            decision.market_type,
            MarketType::Spread | MarketType::Moneyline
        ) {
            match pick.team_name.as_deref() {
                Some(team) if text.contains(team) => {}
                _ => return Err(SELECTION_MISMATCH.to_string()),
            }
        }

        // numeric reconciliation
        let canonical = canonical_values(decision);
        for token in numeric_tokens(text) {
            if !canonical.iter().any(|c| token_matches(token, c)) {
                return Err(format!("{}:{}", NUMERIC_MISMATCH, token.value));
            }
        }

        Ok(())
    }
}

/// Values a template may print, with their tolerance classes.
fn canonical_values(decision: &MarketDecision) -> Vec<Canonical> {
    let mut values = vec![
        Canonical {
            value: decision.market.line,
            class: NumberClass::Line,
        },
        Canonical {
            value: decision.market.line.abs(),
            class: NumberClass::Line,
        },
        Canonical {
            value: decision.model.fair_line,
            class: NumberClass::Line,
        },
        Canonical {
            value: decision.market.american_odds as f64,
            class: NumberClass::Odds,
        },
        Canonical {
            value: decision.probabilities.model_prob * 100.0,
            class: NumberClass::Probability,
        },
        Canonical {
            value: decision.probabilities.market_implied_prob * 100.0,
            class: NumberClass::Probability,
        },
    ];
    if let Some(pick) = &decision.pick {
        values.push(Canonical {
            value: pick.line,
            class: NumberClass::Line,
        });
    }
    values
}

#[derive(Debug, Clone, Copy)]
struct Token {
    value: f64,
    is_percent: bool,
    has_fraction: bool,
}

fn token_matches(token: Token, canonical: &Canonical) -> bool {
    match canonical.class {
        NumberClass::Probability => {
            token.is_percent && (token.value - canonical.value).abs() <= PROB_TOLERANCE_PCT
        }
        NumberClass::Line => {
            !token.is_percent && (token.value - canonical.value).abs() <= LINE_TOLERANCE
        }
        NumberClass::Odds => {
            !token.is_percent && !token.has_fraction && token.value == canonical.value
        }
    }
}

/// Scan numeric tokens: an optional attached sign, digits, optional
/// fraction, optional '%' suffix.
fn numeric_tokens(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let mut start = i;
        // attached sign, not preceded by an alphanumeric (so "v4" stays out)
        if start > 0 && (chars[start - 1] == '-' || chars[start - 1] == '+') {
            let before_sign = start.checked_sub(2).map(|j| chars[j]);
            if !before_sign.map_or(false, |c| c.is_ascii_alphanumeric()) {
                start -= 1;
            }
        }
        let mut end = i;
        let mut has_fraction = false;
        while end < chars.len() {
            if chars[end].is_ascii_digit() {
                end += 1;
            } else if chars[end] == '.'
                && end + 1 < chars.len()
                && chars[end + 1].is_ascii_digit()
            {
                has_fraction = true;
                end += 1;
            } else {
                break;
            }
        }
        let is_percent = end < chars.len() && chars[end] == '%';
        let raw: String = chars[start..end].iter().collect();
        if let Ok(value) = raw.parse::<f64>() {
            tokens.push(Token {
                value,
                is_percent,
                has_fraction,
            });
        }
        i = end + 1;
    }
    tokens
}
