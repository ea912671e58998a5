//! Monte Carlo game simulation engine.
//!
//! One run samples full-game scores for both teams, accumulates margin and
//! total statistics into coarse histograms, and reports convergence. Runs
//! are deterministic: the seed derives from (event_id, wave, snapshot
//! observed_at, model_version), so the same inputs always reproduce the
//! same `SimulationRun`.

mod drive;
mod gaussian;
mod period;

use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{LeagueConfig, SimulationConfig};
use crate::domain::{
    GameEvent, Histogram, MarketSnapshot, SimFamily, SimTier, SimulationRun, Wave,
};
use crate::error::{EngineError, Result};

pub use drive::DriveParams;
pub use gaussian::GaussianParams;
pub use period::PeriodParams;

/// Marker appended to regime adjustments when the wall-clock ceiling fired.
/// A run carrying it is never marked converged.
pub const WALL_CLOCK_ABORT: &str = "wall_clock_abort";

/// One sampled game.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GameSample {
    pub home: f64,
    pub away: f64,
}

/// Team scoring means after market anchoring and roster adjustment.
#[derive(Debug, Clone, Copy)]
struct AnchoredMeans {
    home: f64,
    away: f64,
}

pub struct SimulationEngine {
    config: SimulationConfig,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Seed derivation: first 8 bytes of
    /// sha256(event_id | wave | observed_at | model_version).
    pub fn derive_seed(
        event_id: &str,
        wave: Wave,
        snapshot: &MarketSnapshot,
        model_version: &str,
    ) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(event_id.as_bytes());
        hasher.update(b"|");
        hasher.update(wave.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(snapshot.observed_at.to_rfc3339().as_bytes());
        hasher.update(b"|");
        hasher.update(model_version.as_bytes());
        let digest = hasher.finalize();
        u64::from_be_bytes(digest[..8].try_into().expect("sha256 yields 32 bytes"))
    }

    /// Run a full simulation for one event at one wave.
    pub fn run(
        &self,
        event: &GameEvent,
        league_cfg: &LeagueConfig,
        snapshot: &MarketSnapshot,
        wave: Wave,
        tier: SimTier,
    ) -> Result<SimulationRun> {
        let seed = Self::derive_seed(&event.event_id, wave, snapshot, &self.config.model_version);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let iterations = tier.iterations();
        let deadline = Duration::from_secs(self.config.wall_clock_ceiling_secs);
        let started = Instant::now();

        let mut regime = Vec::new();
        let means = self.anchored_means(event, league_cfg, snapshot, &mut regime);

        let family = event.league.sim_family();
        let (mut margin_hist, mut total_hist) = histograms_for(family, league_cfg);

        let mut sum_home = 0.0;
        let mut sum_away = 0.0;
        let mut sum_margin = 0.0;
        let mut sum_margin_sq = 0.0;
        let mut sum_total = 0.0;
        let mut sum_total_sq = 0.0;

        // Generators own their parameter structs so per-iteration sampling
        // stays allocation-free. Weather only applies to the drive model.
        let mut drive_params = drive::DriveParams::from_config(league_cfg, means.home, means.away);
        if family == SimFamily::Drive {
            drive_params = drive_params.with_weather(event.weather.as_ref(), &mut regime);
        }
        let gaussian_params = gaussian::GaussianParams::from_config(league_cfg, means.home, means.away);
        let period_params = period::PeriodParams::from_config(league_cfg, means.home, means.away);

        // Convergence: check running means every 5% of iterations; two
        // consecutive checks moving less than 0.5% declare convergence.
        // The run still consumes its full tier; the flag only records
        // whether the estimates stabilized.
        let checkpoint = (iterations / 20).max(1);
        let mut prev_means: Option<(f64, f64)> = None;
        let mut stable_checks = 0u8;
        let mut converged = false;
        let mut completed = 0u32;
        let mut timed_out = false;

        for i in 0..iterations {
            let sample = match family {
                SimFamily::Drive => drive::simulate_game(&mut rng, &drive_params),
                SimFamily::Gaussian => gaussian::simulate_game(&mut rng, &gaussian_params),
                SimFamily::Period => period::simulate_game(&mut rng, &period_params),
            };

            let margin = sample.home - sample.away;
            let total = sample.home + sample.away;
            sum_home += sample.home;
            sum_away += sample.away;
            sum_margin += margin;
            sum_margin_sq += margin * margin;
            sum_total += total;
            sum_total_sq += total * total;
            margin_hist.record(margin);
            total_hist.record(total);
            completed = i + 1;

            if completed % checkpoint == 0 {
                let n = completed as f64;
                let mean_margin = sum_margin / n;
                let mean_total = sum_total / n;
                if let Some((prev_margin, prev_total)) = prev_means {
                    // margin means sit near zero; measure its drift against
                    // the game's total scale so 0.5% is meaningful
                    let scale = prev_total.abs().max(1.0);
                    let margin_delta = (mean_margin - prev_margin).abs() / scale;
                    let total_delta = (mean_total - prev_total).abs() / scale;
                    if margin_delta < 0.005 && total_delta < 0.005 {
                        stable_checks += 1;
                        if stable_checks >= 2 {
                            converged = true;
                        }
                    } else {
                        stable_checks = 0;
                    }
                }
                prev_means = Some((mean_margin, mean_total));

                if started.elapsed() > deadline {
                    timed_out = true;
                    break;
                }
            }
        }

        if completed == 0 {
            return Err(EngineError::SimTimeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
                completed: 0,
                requested: iterations,
            });
        }

        let n = completed as f64;
        let mut mean_margin = sum_margin / n;
        let mut mean_total = sum_total / n;
        let margin_variance = (sum_margin_sq / n - mean_margin * mean_margin).max(0.0);
        let total_variance = (sum_total_sq / n - mean_total * mean_total).max(0.0);

        // Mean reversion: pull each aggregated team mean toward the league
        // mean when it drifts past the reversion band, then translate the
        // histograms by the resulting shifts.
        let mean_home = sum_home / n;
        let mean_away = sum_away / n;
        let shift_home = reversion_shift(mean_home, league_cfg, "home", &mut regime);
        let shift_away = reversion_shift(mean_away, league_cfg, "away", &mut regime);
        if shift_home != 0.0 || shift_away != 0.0 {
            mean_margin += shift_home - shift_away;
            mean_total += shift_home + shift_away;
            margin_hist.min += shift_home - shift_away;
            total_hist.min += shift_home + shift_away;
        }

        if timed_out {
            converged = false;
            regime.push(WALL_CLOCK_ABORT.to_string());
            warn!(
                "Simulation for {} aborted at wall clock ceiling after {} iterations",
                event.event_id, completed
            );
        }

        let home_win_prob = margin_hist.prob_above(0.0);

        debug!(
            "Sim {} wave={} n={} margin={:.2} total={:.2} converged={}",
            event.event_id, wave, completed, mean_margin, mean_total, converged
        );

        Ok(SimulationRun {
            sim_run_id: format!("sim:{}:{}:{:016x}", event.event_id, wave.as_str(), seed),
            event_id: event.event_id.clone(),
            wave,
            tier,
            iterations: completed,
            home_win_prob,
            mean_margin,
            margin_variance,
            mean_total,
            total_variance,
            margin_hist,
            total_hist,
            converged,
            model_version: self.config.model_version.clone(),
            regime_adjustments: regime,
            seed,
            created_at: Utc::now(),
        })
    }

    /// Team scoring means: league baseline, roster haircut, then a soft
    /// blend (weight `market_anchor_weight`) toward the market-implied
    /// expectation from the snapshot's spread and total.
    fn anchored_means(
        &self,
        event: &GameEvent,
        league_cfg: &LeagueConfig,
        snapshot: &MarketSnapshot,
        regime: &mut Vec<String>,
    ) -> AnchoredMeans {
        let base = league_cfg.team_score_mean;
        let haircut = |starters_out: u8| base * (1.0 - 0.02 * starters_out as f64);
        let (mut home, mut away) = match event.roster {
            Some(roster) => {
                if roster.home_starters_out > 0 || roster.away_starters_out > 0 {
                    regime.push(format!(
                        "roster:home-{}:away-{}",
                        roster.home_starters_out, roster.away_starters_out
                    ));
                }
                (haircut(roster.home_starters_out), haircut(roster.away_starters_out))
            }
            None => (base, base),
        };

        // Market-implied per-team expectation: margin from the home
        // handicap, split around the quoted total.
        let implied_margin = -snapshot.spread_home;
        let implied_home = (snapshot.total + implied_margin) / 2.0;
        let implied_away = (snapshot.total - implied_margin) / 2.0;

        let w = self.config.market_anchor_weight;
        if w > 0.0 {
            home = (1.0 - w) * home + w * implied_home;
            away = (1.0 - w) * away + w * implied_away;
            regime.push(format!("market_anchor:{:.2}", w));
        }

        AnchoredMeans { home, away }
    }
}

/// Histogram layouts per simulation family: 1-point bins offset by 0.5 so
/// integer scores land mid-bin and half-point lines split at boundaries.
fn histograms_for(family: SimFamily, league_cfg: &LeagueConfig) -> (Histogram, Histogram) {
    match family {
        SimFamily::Drive => (
            Histogram::new(-60.5, 1.0, 121),
            Histogram::new(-0.5, 1.0, 121),
        ),
        SimFamily::Gaussian => {
            let expected_total = 2.0 * league_cfg.team_score_mean;
            (
                Histogram::new(-60.5, 1.0, 121),
                Histogram::new(expected_total - 80.5, 1.0, 161),
            )
        }
        SimFamily::Period => (
            Histogram::new(-15.5, 1.0, 31),
            Histogram::new(-0.5, 1.0, 31),
        ),
    }
}

/// Regression strength `min(0.25, deviation / 20)` toward the league mean,
/// applied only past a band of 5% of the league mean. Returns the shift to
/// add to the aggregated team score.
fn reversion_shift(
    team_mean: f64,
    league_cfg: &LeagueConfig,
    side: &str,
    regime: &mut Vec<String>,
) -> f64 {
    let deviation = team_mean - league_cfg.team_score_mean;
    if deviation.abs() <= 0.05 * league_cfg.team_score_mean {
        return 0.0;
    }
    let strength = (deviation.abs() / 20.0).min(0.25);
    let shift = -strength * deviation;
    regime.push(format!("mean_reversion:{}:{:+.2}", side, shift));
    shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::{League, ProviderEventMap, Weather};
    use chrono::Duration as ChronoDuration;

    fn event(league: League) -> GameEvent {
        GameEvent {
            event_id: "evt-sim".into(),
            league,
            home_team_id: "home".into(),
            home_team_name: "Home".into(),
            away_team_id: "away".into(),
            away_team_name: "Away".into(),
            start_time: Utc::now() + ChronoDuration::hours(6),
            weather: None,
            roster: None,
            provider_event_map: ProviderEventMap::default(),
            completed: false,
        }
    }

    fn snapshot(event_id: &str, spread_home: f64, total: f64) -> MarketSnapshot {
        MarketSnapshot {
            event_id: event_id.into(),
            wave: Wave::Discovery,
            observed_at: chrono::DateTime::parse_from_rfc3339("2026-01-10T18:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            spread_home,
            spread_away: -spread_home,
            total,
            over_price: -110,
            under_price: -110,
            ml_home: -220,
            ml_away: 185,
            book_id: "bk".into(),
        }
    }

    fn engine() -> SimulationEngine {
        SimulationEngine::new(AppConfig::default_dry_run().simulation)
    }

    #[test]
    fn test_same_inputs_same_statistics() {
        let cfg = AppConfig::default_dry_run();
        let league_cfg = cfg.league(League::Nba).unwrap();
        let event = event(League::Nba);
        let snap = snapshot(&event.event_id, -5.5, 226.0);

        let a = engine()
            .run(&event, league_cfg, &snap, Wave::Discovery, SimTier::T10k)
            .unwrap();
        let b = engine()
            .run(&event, league_cfg, &snap, Wave::Discovery, SimTier::T10k)
            .unwrap();

        assert_eq!(a.seed, b.seed);
        assert_eq!(a.sim_run_id, b.sim_run_id);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.mean_margin, b.mean_margin);
        assert_eq!(a.mean_total, b.mean_total);
        assert_eq!(a.home_win_prob, b.home_win_prob);
        assert_eq!(a.margin_hist, b.margin_hist);
    }

    #[test]
    fn test_different_wave_different_seed() {
        let event = event(League::Nba);
        let snap = snapshot(&event.event_id, -5.5, 226.0);
        let s1 = SimulationEngine::derive_seed(&event.event_id, Wave::Discovery, &snap, "mc-v1");
        let s2 = SimulationEngine::derive_seed(&event.event_id, Wave::Validation, &snap, "mc-v1");
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_market_anchor_tilts_favored_home() {
        let cfg = AppConfig::default_dry_run();
        let league_cfg = cfg.league(League::Nba).unwrap();
        let event = event(League::Nba);
        // home favored by 8: anchored home mean exceeds away mean
        let snap = snapshot(&event.event_id, -8.0, 226.0);

        let run = engine()
            .run(&event, league_cfg, &snap, Wave::Discovery, SimTier::T25k)
            .unwrap();

        assert!(run.mean_margin > 0.0, "margin {:.2}", run.mean_margin);
        assert!(run.home_win_prob > 0.5);
        assert!(run
            .regime_adjustments
            .iter()
            .any(|r| r.starts_with("market_anchor:")));
    }

    #[test]
    fn test_football_weather_dampens_total() {
        let cfg = AppConfig::default_dry_run();
        let league_cfg = cfg.league(League::Nfl).unwrap();
        let mut harsh = event(League::Nfl);
        harsh.weather = Some(Weather {
            wind_mph: 28.0,
            precip_pct: 80.0,
            temp_f: 15.0,
        });
        let calm = event(League::Nfl);
        let snap = snapshot("evt-sim", -3.0, 44.5);

        let run_harsh = engine()
            .run(&harsh, league_cfg, &snap, Wave::Discovery, SimTier::T25k)
            .unwrap();
        let run_calm = engine()
            .run(&calm, league_cfg, &snap, Wave::Discovery, SimTier::T25k)
            .unwrap();

        assert!(
            run_harsh.mean_total < run_calm.mean_total,
            "harsh {:.1} vs calm {:.1}",
            run_harsh.mean_total,
            run_calm.mean_total
        );
        assert!(run_harsh
            .regime_adjustments
            .iter()
            .any(|r| r.starts_with("weather:")));
    }

    #[test]
    fn test_totals_track_league_scale() {
        let cfg = AppConfig::default_dry_run();

        let nba = event(League::Nba);
        let nba_run = engine()
            .run(
                &nba,
                cfg.league(League::Nba).unwrap(),
                &snapshot("evt-sim", -2.0, 226.0),
                Wave::Discovery,
                SimTier::T25k,
            )
            .unwrap();
        assert!(nba_run.mean_total > 180.0 && nba_run.mean_total < 260.0);

        let nhl = event(League::Nhl);
        let nhl_run = engine()
            .run(
                &nhl,
                cfg.league(League::Nhl).unwrap(),
                &snapshot("evt-sim", -0.5, 6.0),
                Wave::Discovery,
                SimTier::T25k,
            )
            .unwrap();
        assert!(nhl_run.mean_total > 3.0 && nhl_run.mean_total < 9.5);
    }

    #[test]
    fn test_convergence_declared_on_long_runs() {
        let cfg = AppConfig::default_dry_run();
        let league_cfg = cfg.league(League::Nba).unwrap();
        let event = event(League::Nba);
        let snap = snapshot(&event.event_id, -5.5, 226.0);

        let run = engine()
            .run(&event, league_cfg, &snap, Wave::Publish, SimTier::T50k)
            .unwrap();
        assert!(run.converged, "50k gaussian run should stabilize");
    }
}
