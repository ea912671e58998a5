//! Integrity validator.
//!
//! Runs after the decision computer with veto power. Checks run in a fixed
//! order and failures block the market with `BLOCKED_BY_INTEGRITY`; the
//! validator never repairs a decision. A non-converged simulation is the
//! one soft case: it downgrades to MARKET_ALIGNED instead of blocking.

use tracing::warn;

use crate::domain::{
    Classification, GameDecisions, MarketDecision, MarketType, ReleaseStatus, SimulationRun,
};

/// Stable failure codes, in check order.
pub const MISSING_SELECTION_ID: &str = "MISSING_SELECTION_ID";
pub const MISSING_SNAPSHOT_HASH: &str = "MISSING_SNAPSHOT_HASH";
pub const MISSING_DEBUG_FIELD: &str = "MISSING_DEBUG_FIELD";
pub const MISSING_PROBABILITIES: &str = "MISSING_PROBABILITIES";
pub const INPUTS_HASH_MISMATCH: &str = "INPUTS_HASH_MISMATCH";
pub const PICK_SELECTION_MISMATCH: &str = "PICK_SELECTION_MISMATCH";
pub const PICK_LINE_MISMATCH: &str = "PICK_LINE_MISMATCH";
pub const PROBS_NOT_NORMALIZED: &str = "PROBS_NOT_NORMALIZED";
pub const CLASSIFICATION_INCOHERENT: &str = "CLASSIFICATION_INCOHERENT";
pub const FORBIDDEN_PHRASE: &str = "FORBIDDEN_PHRASE";

const PROB_SUM_TOLERANCE: f64 = 1e-6;
const LINE_TOLERANCE: f64 = 1e-9;
const ALIGNED_BAND_POINTS: f64 = 0.5;
const ALIGNED_BAND_EV: f64 = 0.01;

/// One blocked market and its ordered failure codes.
#[derive(Debug, Clone)]
pub struct BlockedMarket {
    pub market_type: MarketType,
    pub failures: Vec<String>,
}

/// What the validator did to a `GameDecisions` triple.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub blocked: Vec<BlockedMarket>,
    /// True when a non-converged run forced the triple to MARKET_ALIGNED
    pub downgraded_nonconvergence: bool,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.blocked.is_empty()
    }
}

pub struct IntegrityValidator {
    forbidden_phrases: Vec<String>,
}

impl IntegrityValidator {
    pub fn new(forbidden_phrases: Vec<String>) -> Self {
        Self {
            forbidden_phrases: forbidden_phrases
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Validate and gate the triple in place.
    pub fn validate(
        &self,
        decisions: &mut GameDecisions,
        run: &SimulationRun,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        // Non-convergence downgrades before the hard checks run: the
        // decision survives, but only as an aligned/informational view.
        if !run.converged {
            report.downgraded_nonconvergence = true;
            for market_type in MarketType::ALL {
                if let Some(decision) = decisions.child_mut(market_type) {
                    downgrade_to_aligned(decision);
                }
            }
        }

        let meta_hash = decisions.meta.inputs_hash.clone();
        for market_type in MarketType::ALL {
            let Some(decision) = decisions.child_mut(market_type) else {
                continue;
            };
            let failures = self.check_decision(decision, &meta_hash);
            if !failures.is_empty() {
                warn!(
                    "Integrity block on {} {}: {:?}",
                    decision.event_id, market_type, failures
                );
                block(decision, failures.clone());
                report.blocked.push(BlockedMarket {
                    market_type,
                    failures,
                });
            }
        }

        report
    }

    /// Ordered checks for one decision. Returns failure codes, empty = pass.
    fn check_decision(&self, decision: &MarketDecision, meta_hash: &str) -> Vec<String> {
        let mut failures = Vec::new();

        // 1. required fields
        if decision.selection_id.is_empty()
            || decision.sides.primary.selection_id.is_empty()
            || decision.sides.counter.selection_id.is_empty()
        {
            failures.push(MISSING_SELECTION_ID.to_string());
        }
        if decision.debug.inputs_hash.is_empty() {
            failures.push(MISSING_SNAPSHOT_HASH.to_string());
        }
        if decision.debug.trace_id.is_empty() || decision.debug.sim_run_id.is_empty() {
            failures.push(MISSING_DEBUG_FIELD.to_string());
        }
        if !decision.probabilities.model_prob.is_finite()
            || !decision.probabilities.market_implied_prob.is_finite()
        {
            failures.push(MISSING_PROBABILITIES.to_string());
        }

        // 2. one hash across the triple
        if !decision.debug.inputs_hash.is_empty() && decision.debug.inputs_hash != meta_hash {
            failures.push(INPUTS_HASH_MISMATCH.to_string());
        }

        // 3. the pick must be the team/line the selection id encodes
        if let Some(pick) = &decision.pick {
            match decision.sides.side(&decision.selection_id) {
                Some(side) => {
                    let team_matches = match decision.market_type {
                        MarketType::Spread | MarketType::Moneyline => {
                            side.team_id == pick.team_id
                        }
                        MarketType::Total => pick.team_id.is_none(),
                    };
                    if !team_matches {
                        failures.push(PICK_SELECTION_MISMATCH.to_string());
                    }
                    if (side.line - pick.line).abs() > LINE_TOLERANCE {
                        failures.push(PICK_LINE_MISMATCH.to_string());
                    }
                }
                None => failures.push(PICK_SELECTION_MISMATCH.to_string()),
            }
        }

        // 4. the two sides' model probabilities must normalize
        let prob_sum = decision.sides.primary.model_prob + decision.sides.counter.model_prob;
        if (prob_sum - 1.0).abs() > PROB_SUM_TOLERANCE {
            failures.push(PROBS_NOT_NORMALIZED.to_string());
        }

        // 5. classification coherent with the edge it claims
        if let Some(incoherent) = classification_incoherence(decision) {
            failures.push(incoherent);
        }

        // 7. blocked/aligned releases must not carry promotional copy
        let gated = decision.release_status.is_blocked()
            || decision.classification == Classification::MarketAligned;
        if gated {
            for reason in &decision.reasons {
                let lowered = reason.to_lowercase();
                if self.forbidden_phrases.iter().any(|p| lowered.contains(p)) {
                    failures.push(FORBIDDEN_PHRASE.to_string());
                    break;
                }
            }
        }

        failures
    }
}

/// Check 5: a decision may not claim an alignment band its edge contradicts.
/// Decisions with no edge metrics (downgraded runs) are exempt.
fn classification_incoherence(decision: &MarketDecision) -> Option<String> {
    let Some(edge) = &decision.edge else {
        return None;
    };
    let magnitude = match decision.market_type {
        MarketType::Spread | MarketType::Total => edge.edge_points?.abs(),
        MarketType::Moneyline => edge.edge_ev?.abs(),
    };
    let aligned_band = match decision.market_type {
        MarketType::Spread | MarketType::Total => ALIGNED_BAND_POINTS,
        MarketType::Moneyline => ALIGNED_BAND_EV,
    };

    let coherent = match decision.classification {
        Classification::MarketAligned => magnitude < aligned_band,
        Classification::Lean | Classification::Edge => magnitude >= aligned_band,
        Classification::NoAction => true,
    };
    if coherent {
        None
    } else {
        Some(CLASSIFICATION_INCOHERENT.to_string())
    }
}

/// Soft path: non-converged simulation keeps the pick visible but strips
/// the edge claim and demotes the release.
fn downgrade_to_aligned(decision: &mut MarketDecision) {
    decision.classification = Classification::MarketAligned;
    decision.release_status = ReleaseStatus::InfoOnly;
    decision.edge = None;
    decision.reasons = vec!["Simulation did not converge; holding at market".to_string()];
}

/// Hard path: block, never fix.
fn block(decision: &mut MarketDecision, failures: Vec<String>) {
    decision.release_status = ReleaseStatus::BlockedByIntegrity;
    decision.validator_failures = failures;
    decision.pick = None;
    decision.edge = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::decision::{DecisionComputer, DecisionInputs};
    use crate::domain::{
        GameEvent, Histogram, League, MarketSnapshot, ProviderEventMap, SimTier, SimulationRun,
        Wave,
    };
    use chrono::{Duration, Utc};

    fn fixture(mean_margin: f64, converged: bool) -> (GameDecisions, SimulationRun) {
        let cfg = AppConfig::default_dry_run();
        let event = GameEvent {
            event_id: "evt-v".into(),
            league: League::Nba,
            home_team_id: "lal".into(),
            home_team_name: "Lakers".into(),
            away_team_id: "bos".into(),
            away_team_name: "Celtics".into(),
            start_time: Utc::now() + Duration::hours(6),
            weather: None,
            roster: None,
            provider_event_map: ProviderEventMap::default(),
            completed: false,
        };
        let snapshot = MarketSnapshot {
            event_id: "evt-v".into(),
            wave: Wave::Discovery,
            observed_at: Utc::now(),
            spread_home: -5.5,
            spread_away: 5.5,
            total: 226.0,
            over_price: -110,
            under_price: -110,
            ml_home: -250,
            ml_away: 210,
            book_id: "bk".into(),
        };
        let mut margin_hist = Histogram::new(-60.5, 1.0, 121);
        let mut total_hist = Histogram::new(145.5, 1.0, 161);
        for i in 0..1000 {
            let offset = ((i % 41) as f64 - 20.0) * 0.6;
            margin_hist.record(mean_margin + offset);
            total_hist.record(226.0 + offset * 1.5);
        }
        let run = SimulationRun {
            sim_run_id: "sim:evt-v:discovery:0000000000000001".into(),
            event_id: "evt-v".into(),
            wave: Wave::Discovery,
            tier: SimTier::T10k,
            iterations: 1000,
            home_win_prob: margin_hist.prob_above(0.0),
            mean_margin,
            margin_variance: 50.0,
            mean_total: 226.0,
            total_variance: 120.0,
            margin_hist,
            total_hist,
            converged,
            model_version: "mc-v1".into(),
            regime_adjustments: vec![],
            seed: 1,
            created_at: Utc::now(),
        };
        let decisions = DecisionComputer::compute(&DecisionInputs {
            event: &event,
            snapshot: &snapshot,
            run: &run,
            league_cfg: cfg.league(League::Nba).unwrap(),
            config_version: &cfg.config_version,
            provider_name: "oddsapi",
            decision_version: 1,
            trace_id: "trace-v",
        });
        (decisions, run)
    }

    fn validator() -> IntegrityValidator {
        IntegrityValidator::new(AppConfig::default_dry_run().publisher.forbidden_phrases)
    }

    #[test]
    fn test_clean_triple_passes() {
        let (mut decisions, run) = fixture(8.8, true);
        let report = validator().validate(&mut decisions, &run);
        assert!(report.passed(), "blocked: {:?}", report.blocked);
        for decision in decisions.children() {
            assert!(decision.validator_failures.is_empty());
            assert!(!decision.release_status.is_blocked());
        }
    }

    #[test]
    fn test_missing_selection_id_blocks_with_code() {
        let (mut decisions, run) = fixture(8.8, true);
        decisions.spread.as_mut().unwrap().selection_id.clear();

        let report = validator().validate(&mut decisions, &run);
        assert_eq!(report.blocked.len(), 1);
        assert_eq!(report.blocked[0].market_type, MarketType::Spread);
        assert!(report.blocked[0]
            .failures
            .contains(&MISSING_SELECTION_ID.to_string()));

        let spread = decisions.spread.as_ref().unwrap();
        assert_eq!(spread.release_status, ReleaseStatus::BlockedByIntegrity);
        assert!(spread.pick.is_none());
        assert!(spread.edge.is_none());
        assert!(!spread.validator_failures.is_empty());
    }

    #[test]
    fn test_hash_mismatch_blocks() {
        let (mut decisions, run) = fixture(8.8, true);
        decisions.total.as_mut().unwrap().debug.inputs_hash = "deadbeef".into();

        let report = validator().validate(&mut decisions, &run);
        assert_eq!(report.blocked.len(), 1);
        assert!(report.blocked[0]
            .failures
            .contains(&INPUTS_HASH_MISMATCH.to_string()));
    }

    #[test]
    fn test_tampered_pick_team_blocks() {
        let (mut decisions, run) = fixture(8.8, true);
        let spread = decisions.spread.as_mut().unwrap();
        spread.pick.as_mut().unwrap().team_id = Some("bos".into());

        let report = validator().validate(&mut decisions, &run);
        assert!(report.blocked[0]
            .failures
            .contains(&PICK_SELECTION_MISMATCH.to_string()));
    }

    #[test]
    fn test_denormalized_probs_block() {
        let (mut decisions, run) = fixture(8.8, true);
        decisions.moneyline.as_mut().unwrap().sides.primary.model_prob = 0.9;
        decisions.moneyline.as_mut().unwrap().sides.counter.model_prob = 0.9;

        let report = validator().validate(&mut decisions, &run);
        assert!(report.blocked[0]
            .failures
            .contains(&PROBS_NOT_NORMALIZED.to_string()));
    }

    #[test]
    fn test_aligned_with_forbidden_phrase_blocks() {
        let (mut decisions, run) = fixture(5.7, true);
        let spread = decisions.spread.as_mut().unwrap();
        assert_eq!(spread.classification, Classification::MarketAligned);
        spread.reasons.push("Lock it in, fade the favorite".into());

        let report = validator().validate(&mut decisions, &run);
        assert!(report.blocked[0]
            .failures
            .contains(&FORBIDDEN_PHRASE.to_string()));
    }

    #[test]
    fn test_nonconverged_downgrades_without_blocking() {
        let (mut decisions, run) = fixture(8.8, false);
        let report = validator().validate(&mut decisions, &run);

        assert!(report.passed());
        assert!(report.downgraded_nonconvergence);
        for decision in decisions.children() {
            assert_eq!(decision.classification, Classification::MarketAligned);
            assert_eq!(decision.release_status, ReleaseStatus::InfoOnly);
            assert!(decision.edge.is_none());
            // downgrade keeps the pick visible
            assert!(decision.pick.is_some());
        }
    }

    #[test]
    fn test_incoherent_classification_blocks() {
        let (mut decisions, run) = fixture(8.8, true);
        let spread = decisions.spread.as_mut().unwrap();
        // claims aligned while carrying a 3.3-point edge
        spread.classification = Classification::MarketAligned;
        spread.reasons = vec!["Market line within model tolerance".into()];

        let report = validator().validate(&mut decisions, &run);
        assert!(report.blocked[0]
            .failures
            .contains(&CLASSIFICATION_INCOHERENT.to_string()));
    }
}
