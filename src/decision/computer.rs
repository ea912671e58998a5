//! Canonical decision computer.
//!
//! Turns one (snapshot, simulation run, league config) triple into the
//! three per-market decisions of a `GameDecisions` payload. Sign
//! conventions are centralized here:
//!
//! - spread lines are home-perspective handicaps; fair spread = -mean_margin;
//!   edge_points = market_line - fair_line, positive favors home
//! - total edge = mean_total - market_total, positive favors the over
//! - moneyline edge_ev = model_prob * decimal_odds - 1 at the quoted price,
//!   computed per side; the pick takes the better side and the stored edge
//!   annotates the picked side
//!
//! No caller may recompute any of these; consumers render the pick verbatim.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::LeagueConfig;
use crate::domain::{
    american_implied_prob, american_to_decimal, remove_vig_pair, selection_id, Classification,
    DecisionDebug, DecisionsMeta, EdgeGrade, EdgeMetrics, GameDecisions, GameEvent,
    MarketDecision, MarketQuote, MarketSnapshot, MarketType, ModelView, Pick, PickSide,
    Probabilities, ReleaseStatus, SelectionPair, SelectionSide, SimulationRun,
};
use crate::domain::market::STANDARD_SIDE_PRICE;

/// LEAN floor in points: below this the market is considered aligned.
const ALIGNED_BAND_POINTS: f64 = 0.5;
/// LEAN floor in EV terms for moneylines.
const ALIGNED_BAND_EV: f64 = 0.01;

/// Everything the computer consumes for one game.
pub struct DecisionInputs<'a> {
    pub event: &'a GameEvent,
    pub snapshot: &'a MarketSnapshot,
    pub run: &'a SimulationRun,
    pub league_cfg: &'a LeagueConfig,
    pub config_version: &'a str,
    pub provider_name: &'a str,
    pub decision_version: u32,
    pub trace_id: &'a str,
}

/// Envelope hashed into `inputs_hash`. Field order is fixed by this struct,
/// which makes the serialization canonical.
#[derive(Serialize)]
struct InputsEnvelope<'a> {
    snapshot: &'a MarketSnapshot,
    sim_run_id: &'a str,
    home_win_prob: f64,
    mean_margin: f64,
    margin_variance: f64,
    mean_total: f64,
    total_variance: f64,
    converged: bool,
    model_version: &'a str,
    seed: u64,
    config_version: &'a str,
    edge_threshold: f64,
    ml_edge_threshold: f64,
    decision_version: u32,
}

/// Convert a probability to fair american odds.
pub fn prob_to_american(prob: f64) -> i32 {
    let p = prob.clamp(0.001, 0.999);
    if p >= 0.5 {
        (-(p / (1.0 - p)) * 100.0).round() as i32
    } else {
        (((1.0 - p) / p) * 100.0).round() as i32
    }
}

pub struct DecisionComputer;

impl DecisionComputer {
    /// Compute the full triple. All three decisions share one inputs_hash.
    pub fn compute(inputs: &DecisionInputs<'_>) -> GameDecisions {
        let inputs_hash = Self::inputs_hash(inputs);
        let computed_at = Utc::now();

        let debug = |sim_run_id: &str| DecisionDebug {
            inputs_hash: inputs_hash.clone(),
            decision_version: inputs.decision_version,
            trace_id: inputs.trace_id.to_string(),
            computed_at,
            odds_timestamp: inputs.snapshot.observed_at,
            sim_run_id: sim_run_id.to_string(),
        };

        let spread = Self::compute_spread(inputs, debug(&inputs.run.sim_run_id));
        let moneyline = Self::compute_moneyline(inputs, debug(&inputs.run.sim_run_id));
        let total = Self::compute_total(inputs, debug(&inputs.run.sim_run_id));

        GameDecisions {
            spread: Some(spread),
            moneyline: Some(moneyline),
            total: Some(total),
            meta: DecisionsMeta {
                inputs_hash,
                computed_at,
                league: inputs.event.league,
                event_id: inputs.event.event_id.clone(),
                decision_version: inputs.decision_version,
            },
        }
    }

    /// sha256 over the canonical JSON envelope of (snapshot, sim stats,
    /// config identity, decision_version).
    pub fn inputs_hash(inputs: &DecisionInputs<'_>) -> String {
        let envelope = InputsEnvelope {
            snapshot: inputs.snapshot,
            sim_run_id: &inputs.run.sim_run_id,
            home_win_prob: inputs.run.home_win_prob,
            mean_margin: inputs.run.mean_margin,
            margin_variance: inputs.run.margin_variance,
            mean_total: inputs.run.mean_total,
            total_variance: inputs.run.total_variance,
            converged: inputs.run.converged,
            model_version: &inputs.run.model_version,
            seed: inputs.run.seed,
            config_version: inputs.config_version,
            edge_threshold: inputs.league_cfg.edge_threshold,
            ml_edge_threshold: inputs.league_cfg.ml_edge_threshold,
            decision_version: inputs.decision_version,
        };
        let json = serde_json::to_string(&envelope).expect("envelope serializes");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn compute_spread(inputs: &DecisionInputs<'_>, debug: DecisionDebug) -> MarketDecision {
        let snapshot = inputs.snapshot;
        let run = inputs.run;
        let event = inputs.event;

        let fair_line = -run.mean_margin;
        let edge_points = snapshot.spread_home - fair_line;
        let p_home_cover = run.cover_prob_home(snapshot.spread_home);
        let p_away_cover = 1.0 - p_home_cover;

        let home_side = SelectionSide {
            selection_id: selection_id(
                &event.event_id,
                MarketType::Spread,
                "home",
                snapshot.spread_home,
                &snapshot.book_id,
            ),
            side_key: "home".into(),
            team_id: Some(event.home_team_id.clone()),
            line: snapshot.spread_home,
            model_prob: p_home_cover,
        };
        let away_side = SelectionSide {
            selection_id: selection_id(
                &event.event_id,
                MarketType::Spread,
                "away",
                snapshot.spread_away,
                &snapshot.book_id,
            ),
            side_key: "away".into(),
            team_id: Some(event.away_team_id.clone()),
            line: snapshot.spread_away,
            model_prob: p_away_cover,
        };

        let classification =
            Self::classify_points(edge_points, inputs.league_cfg.edge_threshold);
        let pick_home = edge_points >= 0.0;
        let (picked, model_prob) = if pick_home {
            (&home_side, p_home_cover)
        } else {
            (&away_side, p_away_cover)
        };

        // both spread sides carry the standard juice
        let (fair_home_prob, _) = remove_vig_pair(
            american_implied_prob(STANDARD_SIDE_PRICE),
            american_implied_prob(STANDARD_SIDE_PRICE),
        );
        let market_implied_prob = if pick_home {
            fair_home_prob
        } else {
            1.0 - fair_home_prob
        };

        let pick_team_name = if pick_home {
            event.home_team_name.clone()
        } else {
            event.away_team_name.clone()
        };
        let reasons = Self::spread_reasons(
            classification,
            &pick_team_name,
            picked.line,
            fair_line,
            edge_points,
        );

        MarketDecision {
            league: event.league,
            event_id: event.event_id.clone(),
            provider_event_id: event
                .provider_event_id(inputs.provider_name)
                .map(String::from),
            market_type: MarketType::Spread,
            selection_id: picked.selection_id.clone(),
            pick: Some(Pick {
                team_id: picked.team_id.clone(),
                team_name: Some(pick_team_name),
                side: if pick_home { PickSide::Home } else { PickSide::Away },
                line: picked.line,
            }),
            market: MarketQuote {
                line: picked.line,
                american_odds: STANDARD_SIDE_PRICE,
            },
            model: ModelView {
                fair_line,
                win_prob: p_home_cover,
            },
            probabilities: Probabilities {
                model_prob,
                market_implied_prob,
            },
            edge: Some(EdgeMetrics {
                edge_points: Some(edge_points),
                edge_ev: None,
                edge_grade: Self::grade_points(edge_points, inputs.league_cfg.edge_threshold),
            }),
            classification,
            release_status: Self::provisional_release(classification),
            reasons,
            debug,
            validator_failures: Vec::new(),
            sides: SelectionPair {
                primary: home_side,
                counter: away_side,
            },
        }
    }

    fn compute_total(inputs: &DecisionInputs<'_>, debug: DecisionDebug) -> MarketDecision {
        let snapshot = inputs.snapshot;
        let run = inputs.run;
        let event = inputs.event;

        let fair_line = run.mean_total;
        let edge_points = run.mean_total - snapshot.total;
        let p_over = run.over_prob(snapshot.total);
        let p_under = 1.0 - p_over;

        let over_side = SelectionSide {
            selection_id: selection_id(
                &event.event_id,
                MarketType::Total,
                "over",
                snapshot.total,
                &snapshot.book_id,
            ),
            side_key: "over".into(),
            team_id: None,
            line: snapshot.total,
            model_prob: p_over,
        };
        let under_side = SelectionSide {
            selection_id: selection_id(
                &event.event_id,
                MarketType::Total,
                "under",
                snapshot.total,
                &snapshot.book_id,
            ),
            side_key: "under".into(),
            team_id: None,
            line: snapshot.total,
            model_prob: p_under,
        };

        let classification =
            Self::classify_points(edge_points, inputs.league_cfg.edge_threshold);
        let pick_over = edge_points >= 0.0;
        let (picked, model_prob, odds) = if pick_over {
            (&over_side, p_over, snapshot.over_price)
        } else {
            (&under_side, p_under, snapshot.under_price)
        };

        let (fair_over_prob, fair_under_prob) = remove_vig_pair(
            american_implied_prob(snapshot.over_price),
            american_implied_prob(snapshot.under_price),
        );
        let market_implied_prob = if pick_over { fair_over_prob } else { fair_under_prob };

        let reasons = Self::total_reasons(classification, pick_over, snapshot.total, fair_line);

        MarketDecision {
            league: event.league,
            event_id: event.event_id.clone(),
            provider_event_id: event
                .provider_event_id(inputs.provider_name)
                .map(String::from),
            market_type: MarketType::Total,
            selection_id: picked.selection_id.clone(),
            pick: Some(Pick {
                team_id: None,
                team_name: None,
                side: if pick_over { PickSide::Over } else { PickSide::Under },
                line: snapshot.total,
            }),
            market: MarketQuote {
                line: snapshot.total,
                american_odds: odds,
            },
            model: ModelView {
                fair_line,
                win_prob: p_over,
            },
            probabilities: Probabilities {
                model_prob,
                market_implied_prob,
            },
            edge: Some(EdgeMetrics {
                edge_points: Some(edge_points),
                edge_ev: None,
                edge_grade: Self::grade_points(edge_points, inputs.league_cfg.edge_threshold),
            }),
            classification,
            release_status: Self::provisional_release(classification),
            reasons,
            debug,
            validator_failures: Vec::new(),
            sides: SelectionPair {
                primary: over_side,
                counter: under_side,
            },
        }
    }

    fn compute_moneyline(inputs: &DecisionInputs<'_>, debug: DecisionDebug) -> MarketDecision {
        let snapshot = inputs.snapshot;
        let run = inputs.run;
        let event = inputs.event;

        let p_home = run.home_win_prob;
        let p_away = 1.0 - p_home;
        let (q_home, q_away) = remove_vig_pair(
            american_implied_prob(snapshot.ml_home),
            american_implied_prob(snapshot.ml_away),
        );

        // edge_ev = model_prob * decimal_odds - 1, per side at the quoted
        // price. The pick takes the better side and the stored edge always
        // annotates the picked side, so the decision's own fields satisfy
        // edge_ev = model_prob * decimal(american_odds) - 1.
        let ev_home = p_home * american_to_decimal(snapshot.ml_home) - 1.0;
        let ev_away = p_away * american_to_decimal(snapshot.ml_away) - 1.0;
        let pick_home = ev_home >= ev_away;
        let edge_ev = if pick_home { ev_home } else { ev_away };

        let home_side = SelectionSide {
            selection_id: selection_id(
                &event.event_id,
                MarketType::Moneyline,
                "home",
                0.0,
                &snapshot.book_id,
            ),
            side_key: "home".into(),
            team_id: Some(event.home_team_id.clone()),
            line: 0.0,
            model_prob: p_home,
        };
        let away_side = SelectionSide {
            selection_id: selection_id(
                &event.event_id,
                MarketType::Moneyline,
                "away",
                0.0,
                &snapshot.book_id,
            ),
            side_key: "away".into(),
            team_id: Some(event.away_team_id.clone()),
            line: 0.0,
            model_prob: p_away,
        };

        let classification = Self::classify_ev(edge_ev, inputs.league_cfg.ml_edge_threshold);
        let (picked, model_prob, market_implied_prob, odds) = if pick_home {
            (&home_side, p_home, q_home, snapshot.ml_home)
        } else {
            (&away_side, p_away, q_away, snapshot.ml_away)
        };

        let pick_team_name = if pick_home {
            event.home_team_name.clone()
        } else {
            event.away_team_name.clone()
        };
        let reasons =
            Self::moneyline_reasons(classification, &pick_team_name, model_prob, market_implied_prob);

        MarketDecision {
            league: event.league,
            event_id: event.event_id.clone(),
            provider_event_id: event
                .provider_event_id(inputs.provider_name)
                .map(String::from),
            market_type: MarketType::Moneyline,
            selection_id: picked.selection_id.clone(),
            pick: Some(Pick {
                team_id: picked.team_id.clone(),
                team_name: Some(pick_team_name),
                side: if pick_home { PickSide::Home } else { PickSide::Away },
                line: 0.0,
            }),
            market: MarketQuote {
                line: 0.0,
                american_odds: odds,
            },
            model: ModelView {
                fair_line: prob_to_american(p_home) as f64,
                win_prob: p_home,
            },
            probabilities: Probabilities {
                model_prob,
                market_implied_prob,
            },
            edge: Some(EdgeMetrics {
                edge_points: None,
                edge_ev: Some(edge_ev),
                edge_grade: Self::grade_ev(edge_ev, inputs.league_cfg.ml_edge_threshold),
            }),
            classification,
            release_status: Self::provisional_release(classification),
            reasons,
            debug,
            validator_failures: Vec::new(),
            sides: SelectionPair {
                primary: home_side,
                counter: away_side,
            },
        }
    }

    fn classify_points(edge_points: f64, edge_threshold: f64) -> Classification {
        let magnitude = edge_points.abs();
        if magnitude < ALIGNED_BAND_POINTS {
            Classification::MarketAligned
        } else if magnitude < edge_threshold {
            Classification::Lean
        } else {
            Classification::Edge
        }
    }

    fn classify_ev(edge_ev: f64, ml_edge_threshold: f64) -> Classification {
        let magnitude = edge_ev.abs();
        if magnitude < ALIGNED_BAND_EV {
            Classification::MarketAligned
        } else if magnitude < ml_edge_threshold {
            Classification::Lean
        } else {
            Classification::Edge
        }
    }

    fn grade_points(edge_points: f64, edge_threshold: f64) -> EdgeGrade {
        let magnitude = edge_points.abs();
        if magnitude >= 2.0 * edge_threshold {
            EdgeGrade::A
        } else if magnitude >= edge_threshold {
            EdgeGrade::B
        } else {
            EdgeGrade::C
        }
    }

    fn grade_ev(edge_ev: f64, ml_edge_threshold: f64) -> EdgeGrade {
        let magnitude = edge_ev.abs();
        if magnitude >= 2.0 * ml_edge_threshold {
            EdgeGrade::A
        } else if magnitude >= ml_edge_threshold {
            EdgeGrade::B
        } else {
            EdgeGrade::C
        }
    }

    fn provisional_release(classification: Classification) -> ReleaseStatus {
        match classification {
            Classification::Edge => ReleaseStatus::Official,
            _ => ReleaseStatus::InfoOnly,
        }
    }

    fn spread_reasons(
        classification: Classification,
        team_name: &str,
        market_line: f64,
        fair_line: f64,
        edge_points: f64,
    ) -> Vec<String> {
        match classification {
            Classification::Edge => vec![
                format!(
                    "{:.1}-point misprice on {}: market {:+.1} vs fair {:+.1}",
                    edge_points.abs(),
                    team_name,
                    market_line,
                    fair_line
                ),
                "Simulation distribution clears the market number".to_string(),
            ],
            Classification::Lean => vec![format!(
                "Model leans {} at {:+.1}; inside the official threshold",
                team_name, market_line
            )],
            _ => vec!["Market line within model tolerance".to_string()],
        }
    }

    fn total_reasons(
        classification: Classification,
        pick_over: bool,
        market_total: f64,
        fair_total: f64,
    ) -> Vec<String> {
        let side = if pick_over { "over" } else { "under" };
        match classification {
            Classification::Edge => vec![format!(
                "Total misprice: model {:.1} vs market {:.1}, {} clears",
                fair_total, market_total, side
            )],
            Classification::Lean => vec![format!(
                "Model leans {} {:.1}; inside the official threshold",
                side, market_total
            )],
            _ => vec!["Market total within model tolerance".to_string()],
        }
    }

    fn moneyline_reasons(
        classification: Classification,
        team_name: &str,
        model_prob: f64,
        market_prob: f64,
    ) -> Vec<String> {
        match classification {
            Classification::Edge => vec![format!(
                "Win probability misprice on {}: model {:.1}% vs market {:.1}%",
                team_name,
                model_prob * 100.0,
                market_prob * 100.0
            )],
            Classification::Lean => vec![format!(
                "Model leans {} ({:.1}% vs {:.1}% market)",
                team_name,
                model_prob * 100.0,
                market_prob * 100.0
            )],
            _ => vec!["Market price within model tolerance".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::{Histogram, League, ProviderEventMap, SimTier, Wave};
    use chrono::{Duration, Utc};

    fn event() -> GameEvent {
        let mut provider_event_map = ProviderEventMap::default();
        provider_event_map.set("oddsapi", "ext-900");
        GameEvent {
            event_id: "evt-900".into(),
            league: League::Nba,
            home_team_id: "lal".into(),
            home_team_name: "Lakers".into(),
            away_team_id: "bos".into(),
            away_team_name: "Celtics".into(),
            start_time: Utc::now() + Duration::hours(6),
            weather: None,
            roster: None,
            provider_event_map,
            completed: false,
        }
    }

    fn snapshot(spread_home: f64, total: f64) -> MarketSnapshot {
        MarketSnapshot {
            event_id: "evt-900".into(),
            wave: Wave::Discovery,
            observed_at: Utc::now(),
            spread_home,
            spread_away: -spread_home,
            total,
            over_price: -110,
            under_price: -110,
            ml_home: -250,
            ml_away: 210,
            book_id: "bk".into(),
        }
    }

    /// Gaussian-margin run centered at `mean_margin` with the given spread.
    fn run_with(mean_margin: f64, mean_total: f64) -> SimulationRun {
        let mut margin_hist = Histogram::new(-60.5, 1.0, 121);
        let mut total_hist = Histogram::new(mean_total - 80.5, 1.0, 161);
        // deterministic triangular-ish sample cloud around the means
        for i in 0..1000 {
            let offset = ((i % 41) as f64 - 20.0) * 0.6;
            margin_hist.record(mean_margin + offset);
            total_hist.record(mean_total + offset * 1.5);
        }
        SimulationRun {
            sim_run_id: "sim:evt-900:discovery:00000000000000aa".into(),
            event_id: "evt-900".into(),
            wave: Wave::Discovery,
            tier: SimTier::T10k,
            iterations: 1000,
            home_win_prob: margin_hist.prob_above(0.0),
            mean_margin,
            margin_variance: 50.0,
            mean_total,
            total_variance: 120.0,
            margin_hist,
            total_hist,
            converged: true,
            model_version: "mc-v1".into(),
            regime_adjustments: vec![],
            seed: 0xaa,
            created_at: Utc::now(),
        }
    }

    fn compute(spread_home: f64, total: f64, mean_margin: f64, mean_total: f64) -> GameDecisions {
        let cfg = AppConfig::default_dry_run();
        let event = event();
        let snapshot = snapshot(spread_home, total);
        let run = run_with(mean_margin, mean_total);
        DecisionComputer::compute(&DecisionInputs {
            event: &event,
            snapshot: &snapshot,
            run: &run,
            league_cfg: cfg.league(League::Nba).unwrap(),
            config_version: &cfg.config_version,
            provider_name: "oddsapi",
            decision_version: 1,
            trace_id: "trace-1",
        })
    }

    #[test]
    fn test_edge_spread_scenario() {
        // market home -5.5, model says home wins by 8.8: 3.3-point edge
        let decisions = compute(-5.5, 226.0, 8.8, 226.0);
        let spread = decisions.spread.as_ref().unwrap();

        assert_eq!(spread.classification, Classification::Edge);
        assert_eq!(spread.release_status, ReleaseStatus::Official);
        let pick = spread.pick.as_ref().unwrap();
        assert_eq!(pick.side, PickSide::Home);
        assert_eq!(pick.team_id.as_deref(), Some("lal"));

        let edge = spread.edge.as_ref().unwrap().edge_points.unwrap();
        assert!((edge - 3.3).abs() < 1e-9, "edge {}", edge);
        assert!(spread.reasons.iter().any(|r| r.contains("misprice")));
        assert!(spread.probabilities.model_prob > 0.55);
    }

    #[test]
    fn test_market_aligned_spread_scenario() {
        // market -5.5 vs fair -5.7: 0.2 points, inside the aligned band
        let decisions = compute(-5.5, 226.0, 5.7, 226.0);
        let spread = decisions.spread.as_ref().unwrap();

        assert_eq!(spread.classification, Classification::MarketAligned);
        assert_eq!(spread.release_status, ReleaseStatus::InfoOnly);
        // the pick is still populated
        let pick = spread.pick.as_ref().unwrap();
        assert!(pick.team_id.is_some());
        assert!(spread.reasons.iter().all(|r| !r.contains("misprice")));
    }

    #[test]
    fn test_total_edge_picks_over_on_positive_sign() {
        // model total 234 vs market 226: over by 8
        let decisions = compute(-5.5, 226.0, 5.5, 234.0);
        let total = decisions.total.as_ref().unwrap();

        assert_eq!(total.classification, Classification::Edge);
        assert_eq!(total.pick.as_ref().unwrap().side, PickSide::Over);
        let edge = total.edge.as_ref().unwrap().edge_points.unwrap();
        assert!((edge - 8.0).abs() < 1e-9);

        // and the mirror image picks under
        let decisions = compute(-5.5, 226.0, 5.5, 218.0);
        let total = decisions.total.as_ref().unwrap();
        assert_eq!(total.pick.as_ref().unwrap().side, PickSide::Under);
    }

    #[test]
    fn test_triple_shares_inputs_hash() {
        let decisions = compute(-5.5, 226.0, 8.8, 226.0);
        assert!(decisions.hash_consistent());
        let hashes: Vec<&str> = decisions
            .children()
            .map(|d| d.debug.inputs_hash.as_str())
            .collect();
        assert_eq!(hashes.len(), 3);
        assert!(hashes.iter().all(|h| *h == hashes[0]));
    }

    #[test]
    fn test_inputs_hash_rotates_with_version_and_config() {
        let cfg = AppConfig::default_dry_run();
        let event = event();
        let snap = snapshot(-5.5, 226.0);
        let run = run_with(8.8, 226.0);

        let base = DecisionComputer::inputs_hash(&DecisionInputs {
            event: &event,
            snapshot: &snap,
            run: &run,
            league_cfg: cfg.league(League::Nba).unwrap(),
            config_version: "cfg-v1",
            provider_name: "oddsapi",
            decision_version: 1,
            trace_id: "t",
        });
        let version_bump = DecisionComputer::inputs_hash(&DecisionInputs {
            event: &event,
            snapshot: &snap,
            run: &run,
            league_cfg: cfg.league(League::Nba).unwrap(),
            config_version: "cfg-v1",
            provider_name: "oddsapi",
            decision_version: 2,
            trace_id: "t",
        });
        let config_bump = DecisionComputer::inputs_hash(&DecisionInputs {
            event: &event,
            snapshot: &snap,
            run: &run,
            league_cfg: cfg.league(League::Nba).unwrap(),
            config_version: "cfg-v2",
            provider_name: "oddsapi",
            decision_version: 1,
            trace_id: "t",
        });

        assert_ne!(base, version_bump);
        assert_ne!(base, config_bump);
    }

    #[test]
    fn test_moneyline_edge_annotates_picked_side() {
        // model strongly on the -250 home favorite: home EV wins the pick
        let decisions = compute(-5.5, 226.0, 8.8, 226.0);
        let ml = decisions.moneyline.as_ref().unwrap();

        let pick = ml.pick.as_ref().unwrap();
        assert_eq!(pick.side, PickSide::Home);
        assert_eq!(ml.market.american_odds, -250);

        // the stored edge is the picked side's EV at the quoted price:
        // edge_ev = model_prob * decimal_odds - 1 for this very decision
        let edge_ev = ml.edge.as_ref().unwrap().edge_ev.unwrap();
        let expected =
            ml.probabilities.model_prob * american_to_decimal(ml.market.american_odds) - 1.0;
        assert!((edge_ev - expected).abs() < 1e-9, "edge {} vs {}", edge_ev, expected);
        assert_eq!(ml.classification, Classification::Edge);
    }

    #[test]
    fn test_moneyline_away_underdog_edge() {
        // model favors the away side against a -250/+210 market: the +210
        // underdog carries a large positive EV the pick must surface
        let decisions = compute(-5.5, 226.0, -4.0, 226.0);
        let ml = decisions.moneyline.as_ref().unwrap();

        let pick = ml.pick.as_ref().unwrap();
        assert_eq!(pick.side, PickSide::Away);
        assert_eq!(pick.team_id.as_deref(), Some("bos"));
        assert_eq!(ml.market.american_odds, 210);

        let edge_ev = ml.edge.as_ref().unwrap().edge_ev.unwrap();
        assert!(edge_ev > 0.0, "away underdog EV should be positive, got {}", edge_ev);
        let expected =
            ml.probabilities.model_prob * american_to_decimal(210) - 1.0;
        assert!((edge_ev - expected).abs() < 1e-9, "edge {} vs {}", edge_ev, expected);
        assert_eq!(ml.classification, Classification::Edge);

        // and the away model probability is the one the edge was priced on
        assert_eq!(ml.probabilities.model_prob, ml.sides.counter.model_prob);
    }

    #[test]
    fn test_opposite_round_trip_on_computed_decision() {
        let decisions = compute(-5.5, 226.0, 8.8, 226.0);
        let spread = decisions.spread.as_ref().unwrap();
        let opp = spread.sides.opposite(&spread.selection_id).unwrap();
        let back = spread.sides.opposite(&opp.selection_id).unwrap();
        assert_eq!(back.selection_id, spread.selection_id);
    }

    #[test]
    fn test_prob_to_american() {
        assert_eq!(prob_to_american(0.5), -100);
        assert_eq!(prob_to_american(0.6), -150);
        assert_eq!(prob_to_american(0.4), 150);
    }
}
