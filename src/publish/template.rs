//! Pre-registered, immutable message templates.
//!
//! One template per tier. Rendering is a pure function of canonical
//! decision fields, with no free-form copy generation, so the same payload
//! always produces a byte-identical string.

use crate::domain::{MarketDecision, MarketType, PickSide, Signal, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub template_id: &'static str,
    pub tier: Tier,
}

const EDGE_TEMPLATE: Template = Template {
    template_id: "edge-v1",
    tier: Tier::Edge,
};
const LEAN_TEMPLATE: Template = Template {
    template_id: "lean-v1",
    tier: Tier::Lean,
};

/// Template registry keyed by tier. EDGE and PICK share the edge layout.
pub fn template_for(tier: Tier) -> Template {
    match tier {
        Tier::Edge | Tier::Pick => EDGE_TEMPLATE,
        Tier::Lean => LEAN_TEMPLATE,
    }
}

/// Deterministic render from canonical fields only.
///
/// Every numeric token printed here comes from the decision payload, so
/// the copy validator can reconcile the text token-by-token.
pub fn render(template: &Template, signal: &Signal, decision: &MarketDecision) -> Option<String> {
    let pick = decision.pick.as_ref()?;
    let matchup = format!("{} vs {}", signal.team_a, signal.team_b);
    let selection = selection_text(decision.market_type, pick.side, pick.team_name.as_deref())?;
    let line_text = line_text(decision.market_type, decision.market.line);
    let odds = decision.market.american_odds;
    let model_pct = decision.probabilities.model_prob * 100.0;
    let market_pct = decision.probabilities.market_implied_prob * 100.0;

    let body = match template.template_id {
        "edge-v1" => format!(
            "{} | {}\n{} {} ({:+})\nModel {:.1}% / Market {:.1}%",
            signal.sport, matchup, selection, line_text, odds, model_pct, market_pct
        ),
        "lean-v1" => format!(
            "{} | {}\nLean: {} {} ({:+})\nModel {:.1}%",
            signal.sport, matchup, selection, line_text, odds, model_pct
        ),
        _ => return None,
    };
    Some(body)
}

fn selection_text(
    market_type: MarketType,
    side: PickSide,
    team_name: Option<&str>,
) -> Option<String> {
    match market_type {
        MarketType::Spread | MarketType::Moneyline => team_name.map(String::from),
        MarketType::Total => Some(
            match side {
                PickSide::Over => "Over",
                PickSide::Under => "Under",
                _ => return None,
            }
            .to_string(),
        ),
    }
}

fn line_text(market_type: MarketType, line: f64) -> String {
    match market_type {
        MarketType::Spread => format!("{:+.1}", line),
        MarketType::Total => format!("{:.1}", line),
        MarketType::Moneyline => "ML".to_string(),
    }
}
