//! Parlay constructor.
//!
//! Deterministic multi-leg selection over integrity-passed decisions.
//! A seeded, bounded combination search scores tier- and edge-weighted
//! combinations under profile rules; a pre-declared fallback ladder may
//! relax non-integrity rules when the strict search comes up light.
//! Every attempt, success or failure, lands in the append-only attempt
//! log; there is no silent empty result.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{LeagueConfig, ParlayConfig, ParlayProfileRules};
use crate::domain::{
    Classification, FailReason, MarketDecision, MarketType, ParlayAttempt, ParlayAudit,
    ParlayLeg, ParlayOutcome, ParlayProfile, ParlayRequest, Tier,
};
use crate::error::Result;
use crate::store::{Caller, Store};
use uuid::Uuid;

/// Odds at or above this mark a leg high-volatility.
const HIGH_VOL_ODDS: i32 = 150;
/// LEAN legs at or above this share of the EDGE threshold promote to PICK.
const STRONG_LEAN_SHARE: f64 = 0.6;

/// Fallback ladder: pre-declared, bounded, applied in order. Integrity and
/// model-view gates are never on this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relaxation {
    ExtraHighVolLeg,
    DropTierMinimums,
    TrimWeightFloor,
}

impl Relaxation {
    const LADDER: [Relaxation; 3] = [
        Relaxation::ExtraHighVolLeg,
        Relaxation::DropTierMinimums,
        Relaxation::TrimWeightFloor,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Relaxation::ExtraHighVolLeg => "extra_high_vol_leg",
            Relaxation::DropTierMinimums => "drop_tier_minimums",
            Relaxation::TrimWeightFloor => "trim_weight_floor",
        }
    }

    fn apply(&self, rules: &mut ParlayProfileRules) {
        match self {
            Relaxation::ExtraHighVolLeg => rules.max_high_vol_legs += 1,
            Relaxation::DropTierMinimums => {
                rules.min_edges = 0;
                rules.min_picks = 0;
            }
            Relaxation::TrimWeightFloor => rules.min_parlay_weight *= 0.8,
        }
    }
}

/// Build a candidate leg from a decision that passed integrity.
///
/// Returns None for blocked or market-aligned decisions: those never enter
/// the pool.
pub fn candidate_from_decision(
    decision: &MarketDecision,
    league_cfg: &LeagueConfig,
) -> Option<ParlayLeg> {
    if decision.release_status.is_blocked() {
        return None;
    }
    let pick = decision.pick.as_ref()?;
    let edge = decision.edge.as_ref()?;
    let (magnitude, threshold) = match decision.market_type {
        MarketType::Spread | MarketType::Total => {
            (edge.edge_points?.abs(), league_cfg.edge_threshold)
        }
        MarketType::Moneyline => (edge.edge_ev?.abs(), league_cfg.ml_edge_threshold),
    };

    let tier = match decision.classification {
        Classification::Edge => Tier::Edge,
        Classification::Lean if magnitude >= STRONG_LEAN_SHARE * threshold => Tier::Pick,
        Classification::Lean => Tier::Lean,
        _ => return None,
    };

    let weight = tier.weight() + (magnitude / threshold).min(2.0);
    Some(ParlayLeg {
        selection_id: decision.selection_id.clone(),
        event_id: decision.event_id.clone(),
        league: decision.league,
        market_type: decision.market_type,
        pick_side: pick.side,
        team_name: pick.team_name.clone(),
        team_key: pick.team_id.clone(),
        line: pick.line,
        american_odds: decision.market.american_odds,
        tier,
        weight,
        high_volatility: decision.market_type == MarketType::Total
            || decision.market.american_odds >= HIGH_VOL_ODDS,
    })
}

pub struct ParlayConstructor {
    store: Arc<dyn Store>,
    config: ParlayConfig,
}

struct SearchResult {
    best: Option<(Vec<usize>, f64)>,
    combinations_scored: usize,
}

impl ParlayConstructor {
    pub fn new(store: Arc<dyn Store>, config: ParlayConfig) -> Self {
        Self { store, config }
    }

    fn rules_for(&self, profile: ParlayProfile) -> ParlayProfileRules {
        match profile {
            ParlayProfile::Premium => self.config.premium.clone(),
            ParlayProfile::Balanced => self.config.balanced.clone(),
            ParlayProfile::Speculative => self.config.speculative.clone(),
        }
    }

    /// Generate a parlay from the candidate pool, log the attempt, and
    /// return it. Exactly one of PARLAY or FAIL.
    pub async fn generate(
        &self,
        request: &ParlayRequest,
        pool: Vec<ParlayLeg>,
        blocked_integrity: usize,
        blocked_model_view: usize,
    ) -> Result<ParlayAttempt> {
        let outcome = self.construct(request, pool, blocked_integrity, blocked_model_view);
        let attempt = ParlayAttempt {
            attempt_id: Uuid::new_v4().to_string(),
            request: request.clone(),
            outcome,
            created_at: Utc::now(),
        };
        self.store
            .insert_parlay_attempt(Caller::ParlayConstructor, &attempt)
            .await?;
        match &attempt.outcome {
            ParlayOutcome::Parlay { legs, parlay_weight, .. } => info!(
                "Parlay attempt {}: {} legs, weight {:.2}",
                attempt.attempt_id,
                legs.len(),
                parlay_weight
            ),
            ParlayOutcome::Fail { reason_code, .. } => info!(
                "Parlay attempt {} failed: {}",
                attempt.attempt_id, reason_code
            ),
        }
        Ok(attempt)
    }

    fn construct(
        &self,
        request: &ParlayRequest,
        pool: Vec<ParlayLeg>,
        blocked_integrity: usize,
        blocked_model_view: usize,
    ) -> ParlayOutcome {
        let mut audit = ParlayAudit {
            pool_size: pool.len() + blocked_integrity + blocked_model_view,
            eligible_pool_size: pool.len(),
            eligible_edges: pool.iter().filter(|l| l.tier == Tier::Edge).count(),
            eligible_picks: pool.iter().filter(|l| l.tier == Tier::Pick).count(),
            eligible_leans: pool.iter().filter(|l| l.tier == Tier::Lean).count(),
            blocked_integrity,
            blocked_model_view,
            ..Default::default()
        };

        if !(2..=8).contains(&request.legs) {
            return ParlayOutcome::Fail {
                reason_code: FailReason::InvalidProfile,
                reason_detail: serde_json::json!({
                    "legs_requested": request.legs,
                    "allowed_range": [2, 8],
                }),
                audit,
            };
        }
        let base_rules = self.rules_for(request.profile);

        if pool.len() < request.legs {
            return ParlayOutcome::Fail {
                reason_code: FailReason::InsufficientPool,
                reason_detail: serde_json::json!({
                    "eligible_pool_size": pool.len(),
                    "legs_requested": request.legs,
                }),
                audit,
            };
        }

        let allowed: Vec<ParlayLeg> = if base_rules.allow_lean {
            pool.clone()
        } else {
            pool.iter().filter(|l| l.tier != Tier::Lean).cloned().collect()
        };
        if allowed.len() < request.legs {
            return ParlayOutcome::Fail {
                reason_code: FailReason::LeanNotAllowed,
                reason_detail: serde_json::json!({
                    "eligible_pool_size": pool.len(),
                    "non_lean_pool_size": allowed.len(),
                    "legs_requested": request.legs,
                }),
                audit,
            };
        }

        // flag missing team keys when same-team exclusion is on; they do
        // not block, the leg simply can't collide
        if !request.allow_same_team {
            audit.missing_team_keys = allowed
                .iter()
                .filter(|l| l.team_key.is_none())
                .map(|l| l.selection_id.clone())
                .collect();
        }

        // Seeded deterministic ordering: shuffle with the request seed to
        // break weight ties, then stable-sort by weight.
        let mut candidates = allowed;
        let mut rng = ChaCha8Rng::seed_from_u64(request.seed.unwrap_or(0));
        candidates.shuffle(&mut rng);
        candidates.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // strict pass, then the ladder
        let mut rules = base_rules.clone();
        let mut search = self.search(&candidates, request, &rules);
        audit.combinations_scored = search.combinations_scored;

        let mut ladder_iter = Relaxation::LADDER.iter();
        while best_weight(&search) < rules.min_parlay_weight {
            let Some(step) = ladder_iter.next() else {
                break;
            };
            step.apply(&mut rules);
            audit.relaxations_applied.push(step.as_str().to_string());
            debug!("Parlay fallback ladder step: {}", step.as_str());
            search = self.search(&candidates, request, &rules);
            audit.combinations_scored += search.combinations_scored;
        }

        match search.best {
            Some((indices, weight)) if weight >= rules.min_parlay_weight => {
                let legs: Vec<ParlayLeg> =
                    indices.into_iter().map(|i| candidates[i].clone()).collect();
                ParlayOutcome::Parlay {
                    legs,
                    parlay_weight: weight,
                    audit,
                }
            }
            Some((_, weight)) => ParlayOutcome::Fail {
                reason_code: FailReason::ParlayWeightTooLow,
                reason_detail: serde_json::json!({
                    "best_weight": weight,
                    "min_parlay_weight": rules.min_parlay_weight,
                }),
                audit,
            },
            None => {
                ParlayOutcome::Fail {
                    reason_code: FailReason::ConstraintBlocked,
                    reason_detail: serde_json::json!({
                        "eligible_pool_size": candidates.len(),
                        "legs_requested": request.legs,
                        "constraints": {
                            "max_high_vol_legs": rules.max_high_vol_legs,
                            "max_same_event": rules.max_same_event,
                            "allow_same_team": request.allow_same_team,
                        },
                    }),
                    audit,
                }
            }
        }
    }

    /// Bounded depth-first combination search with constraint pruning.
    fn search(
        &self,
        candidates: &[ParlayLeg],
        request: &ParlayRequest,
        rules: &ParlayProfileRules,
    ) -> SearchResult {
        let mut result = SearchResult {
            best: None,
            combinations_scored: 0,
        };
        let mut current: Vec<usize> = Vec::with_capacity(request.legs);
        self.descend(candidates, request, rules, 0, &mut current, &mut result);
        result
    }

    fn descend(
        &self,
        candidates: &[ParlayLeg],
        request: &ParlayRequest,
        rules: &ParlayProfileRules,
        from: usize,
        current: &mut Vec<usize>,
        result: &mut SearchResult,
    ) {
        if result.combinations_scored >= self.config.max_combinations {
            return;
        }
        if current.len() == request.legs {
            result.combinations_scored += 1;
            let edges = current
                .iter()
                .filter(|&&i| candidates[i].tier == Tier::Edge)
                .count();
            let picks = current
                .iter()
                .filter(|&&i| matches!(candidates[i].tier, Tier::Edge | Tier::Pick))
                .count();
            if edges < rules.min_edges || picks < rules.min_picks {
                return;
            }
            let weight: f64 = current.iter().map(|&i| candidates[i].weight).sum();
            if result.best.as_ref().map_or(true, |(_, w)| weight > *w) {
                result.best = Some((current.clone(), weight));
            }
            return;
        }

        for index in from..candidates.len() {
            if candidates.len() - index < request.legs - current.len() {
                break;
            }
            if !self.leg_fits(candidates, request, rules, current, index) {
                continue;
            }
            current.push(index);
            self.descend(candidates, request, rules, index + 1, current, result);
            current.pop();
        }
    }

    /// Structural constraints checked as the combination grows.
    fn leg_fits(
        &self,
        candidates: &[ParlayLeg],
        request: &ParlayRequest,
        rules: &ParlayProfileRules,
        current: &[usize],
        index: usize,
    ) -> bool {
        let candidate = &candidates[index];

        let mut event_counts: HashMap<&str, usize> = HashMap::new();
        for &i in current {
            *event_counts.entry(candidates[i].event_id.as_str()).or_default() += 1;
        }
        if event_counts.get(candidate.event_id.as_str()).copied().unwrap_or(0) + 1
            > rules.max_same_event
        {
            return false;
        }

        let high_vol = current
            .iter()
            .filter(|&&i| candidates[i].high_volatility)
            .count();
        if candidate.high_volatility && high_vol + 1 > rules.max_high_vol_legs {
            return false;
        }

        if !request.allow_same_team {
            if let Some(key) = &candidate.team_key {
                let collision = current.iter().any(|&i| {
                    candidates[i].team_key.as_deref() == Some(key.as_str())
                });
                if collision {
                    return false;
                }
            }
        }

        true
    }
}

fn best_weight(search: &SearchResult) -> f64 {
    search.best.as_ref().map(|(_, w)| *w).unwrap_or(f64::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::{League, PickSide};
    use crate::store::MemoryStore;

    fn leg(
        selection_id: &str,
        event_id: &str,
        team_key: Option<&str>,
        tier: Tier,
        weight: f64,
        high_volatility: bool,
    ) -> ParlayLeg {
        ParlayLeg {
            selection_id: selection_id.into(),
            event_id: event_id.into(),
            league: League::Nba,
            market_type: MarketType::Spread,
            pick_side: PickSide::Home,
            team_name: team_key.map(String::from),
            team_key: team_key.map(String::from),
            line: -5.5,
            american_odds: -110,
            tier,
            weight,
            high_volatility,
        }
    }

    fn constructor(store: Arc<MemoryStore>) -> ParlayConstructor {
        ParlayConstructor::new(store, AppConfig::default_dry_run().parlay)
    }

    fn request(profile: ParlayProfile, legs: usize, allow_same_team: bool) -> ParlayRequest {
        ParlayRequest {
            profile,
            legs,
            allow_same_team,
            seed: Some(42),
            sports: vec![],
        }
    }

    fn rich_pool() -> Vec<ParlayLeg> {
        vec![
            leg("s1", "e1", Some("lal"), Tier::Edge, 4.5, false),
            leg("s2", "e2", Some("bos"), Tier::Edge, 4.2, false),
            leg("s3", "e3", Some("den"), Tier::Pick, 3.0, false),
            leg("s4", "e4", Some("mia"), Tier::Pick, 2.8, true),
            leg("s5", "e5", Some("gsw"), Tier::Lean, 1.6, false),
            leg("s6", "e6", Some("nyk"), Tier::Lean, 1.4, true),
        ]
    }

    #[tokio::test]
    async fn test_premium_parlay_selects_max_weight() {
        let store = Arc::new(MemoryStore::new());
        let attempt = constructor(store.clone())
            .generate(&request(ParlayProfile::Premium, 3, false), rich_pool(), 0, 0)
            .await
            .unwrap();

        let ParlayOutcome::Parlay { legs, parlay_weight, audit } = &attempt.outcome else {
            panic!("expected PARLAY, got {:?}", attempt.outcome);
        };
        assert_eq!(legs.len(), 3);
        // greedy max weight under premium rules: the two edges + best pick
        let ids: Vec<&str> = legs.iter().map(|l| l.selection_id.as_str()).collect();
        assert!(ids.contains(&"s1") && ids.contains(&"s2") && ids.contains(&"s3"));
        assert!((parlay_weight - 11.7).abs() < 1e-9);
        assert!(audit.relaxations_applied.is_empty());

        // the attempt is in the log
        let since = Utc::now() - chrono::Duration::minutes(1);
        assert_eq!(store.parlay_attempts_since(since).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_pool_scenario() {
        let store = Arc::new(MemoryStore::new());
        let pool = vec![
            leg("s1", "e1", Some("lal"), Tier::Edge, 4.5, false),
            leg("s2", "e2", Some("bos"), Tier::Edge, 4.2, false),
        ];
        let attempt = constructor(store.clone())
            .generate(&request(ParlayProfile::Balanced, 4, false), pool, 0, 0)
            .await
            .unwrap();

        let ParlayOutcome::Fail { reason_code, reason_detail, .. } = &attempt.outcome else {
            panic!("expected FAIL");
        };
        assert_eq!(*reason_code, FailReason::InsufficientPool);
        assert_eq!(reason_detail["eligible_pool_size"], 2);
        assert_eq!(reason_detail["legs_requested"], 4);

        // failures are logged too
        let since = Utc::now() - chrono::Duration::minutes(1);
        assert_eq!(store.parlay_attempts_since(since).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lean_not_allowed_for_premium() {
        let store = Arc::new(MemoryStore::new());
        let pool = vec![
            leg("s1", "e1", Some("lal"), Tier::Edge, 4.5, false),
            leg("s5", "e5", Some("gsw"), Tier::Lean, 1.6, false),
            leg("s6", "e6", Some("nyk"), Tier::Lean, 1.4, false),
        ];
        let attempt = constructor(store)
            .generate(&request(ParlayProfile::Premium, 3, false), pool, 0, 0)
            .await
            .unwrap();

        let ParlayOutcome::Fail { reason_code, .. } = &attempt.outcome else {
            panic!("expected FAIL");
        };
        assert_eq!(*reason_code, FailReason::LeanNotAllowed);
    }

    #[tokio::test]
    async fn test_same_team_exclusion() {
        let store = Arc::new(MemoryStore::new());
        // two strong legs share a team; a weaker third exists
        let pool = vec![
            leg("s1", "e1", Some("lal"), Tier::Edge, 4.5, false),
            leg("s2", "e2", Some("lal"), Tier::Edge, 4.4, false),
            leg("s3", "e3", Some("den"), Tier::Edge, 3.9, false),
        ];
        let attempt = constructor(store)
            .generate(&request(ParlayProfile::Premium, 2, false), pool.clone(), 0, 0)
            .await
            .unwrap();

        let ParlayOutcome::Parlay { legs, .. } = &attempt.outcome else {
            panic!("expected PARLAY");
        };
        let keys: Vec<&str> = legs.iter().filter_map(|l| l.team_key.as_deref()).collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);

        // with same-team allowed the two lal legs win on weight
        let store = Arc::new(MemoryStore::new());
        let attempt = constructor(store)
            .generate(&request(ParlayProfile::Premium, 2, true), pool, 0, 0)
            .await
            .unwrap();
        let ParlayOutcome::Parlay { legs, .. } = &attempt.outcome else {
            panic!("expected PARLAY");
        };
        let ids: Vec<&str> = legs.iter().map(|l| l.selection_id.as_str()).collect();
        assert!(ids.contains(&"s1") && ids.contains(&"s2"));
    }

    #[tokio::test]
    async fn test_missing_team_key_flagged_not_blocking() {
        let store = Arc::new(MemoryStore::new());
        let pool = vec![
            leg("s1", "e1", Some("lal"), Tier::Edge, 4.5, false),
            leg("s2", "e2", None, Tier::Edge, 4.2, false),
            leg("s3", "e3", Some("den"), Tier::Pick, 3.0, false),
        ];
        let attempt = constructor(store)
            .generate(&request(ParlayProfile::Premium, 3, false), pool, 0, 0)
            .await
            .unwrap();

        let ParlayOutcome::Parlay { audit, .. } = &attempt.outcome else {
            panic!("expected PARLAY");
        };
        assert_eq!(audit.missing_team_keys, vec!["s2".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_ladder_recovers_weight_floor() {
        let store = Arc::new(MemoryStore::new());
        // speculative floor is 3.0; three thin leans only reach it after
        // the ladder trims the floor
        let pool = vec![
            leg("s1", "e1", Some("lal"), Tier::Lean, 1.0, false),
            leg("s2", "e2", Some("bos"), Tier::Lean, 0.9, false),
            leg("s3", "e3", Some("den"), Tier::Lean, 0.6, false),
        ];
        let attempt = constructor(store)
            .generate(&request(ParlayProfile::Speculative, 3, false), pool, 0, 0)
            .await
            .unwrap();

        let ParlayOutcome::Parlay { audit, parlay_weight, .. } = &attempt.outcome else {
            panic!("expected PARLAY, got {:?}", attempt.outcome);
        };
        assert!(audit
            .relaxations_applied
            .contains(&"trim_weight_floor".to_string()));
        assert!(*parlay_weight < 3.0);
    }

    #[tokio::test]
    async fn test_weight_too_low_after_ladder_exhausts() {
        let store = Arc::new(MemoryStore::new());
        let pool = vec![
            leg("s1", "e1", Some("lal"), Tier::Lean, 0.4, false),
            leg("s2", "e2", Some("bos"), Tier::Lean, 0.3, false),
        ];
        let attempt = constructor(store)
            .generate(&request(ParlayProfile::Speculative, 2, false), pool, 0, 0)
            .await
            .unwrap();

        let ParlayOutcome::Fail { reason_code, reason_detail, .. } = &attempt.outcome else {
            panic!("expected FAIL");
        };
        assert_eq!(*reason_code, FailReason::ParlayWeightTooLow);
        assert!(reason_detail["best_weight"].as_f64().unwrap() < 2.5);
    }

    #[tokio::test]
    async fn test_seeded_search_is_deterministic() {
        let store = Arc::new(MemoryStore::new());
        let constructor = constructor(store);
        let req = request(ParlayProfile::Balanced, 3, false);

        let a = constructor
            .generate(&req, rich_pool(), 0, 0)
            .await
            .unwrap();
        let b = constructor
            .generate(&req, rich_pool(), 0, 0)
            .await
            .unwrap();

        let legs_of = |attempt: &ParlayAttempt| match &attempt.outcome {
            ParlayOutcome::Parlay { legs, .. } => {
                legs.iter().map(|l| l.selection_id.clone()).collect::<Vec<_>>()
            }
            _ => panic!("expected PARLAY"),
        };
        assert_eq!(legs_of(&a), legs_of(&b));
    }
}
