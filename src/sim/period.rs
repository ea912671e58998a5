//! Per-segment Poisson scoring for baseball (innings) and hockey (periods).
//!
//! Segment samples are i.i.d. per game; the base segment rate comes from
//! league config and scales with the anchored team strength factor.

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Poisson;

use crate::config::LeagueConfig;

use super::GameSample;

#[derive(Debug, Clone, Copy)]
pub struct PeriodParams {
    pub segments: u32,
    pub lambda_home: f64,
    pub lambda_away: f64,
}

impl PeriodParams {
    pub fn from_config(league_cfg: &LeagueConfig, home_mean: f64, away_mean: f64) -> Self {
        let base = league_cfg.segment_lambda.max(0.05);
        let league_mean = league_cfg.team_score_mean.max(0.1);
        Self {
            segments: league_cfg.segments_per_game.max(1),
            lambda_home: base * (home_mean / league_mean),
            lambda_away: base * (away_mean / league_mean),
        }
    }
}

fn team_score<R: Rng>(rng: &mut R, segments: u32, lambda: f64) -> f64 {
    let dist = Poisson::new(lambda.max(0.01)).expect("positive lambda");
    let mut score = 0.0;
    for _ in 0..segments {
        score += dist.sample(rng);
    }
    score
}

pub(crate) fn simulate_game<R: Rng>(rng: &mut R, params: &PeriodParams) -> GameSample {
    GameSample {
        home: team_score(rng, params.segments, params.lambda_home),
        away: team_score(rng, params.segments, params.lambda_away),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_hockey_scale_totals() {
        let cfg = crate::config::AppConfig::default_dry_run()
            .leagues
            .get("NHL")
            .cloned()
            .unwrap();
        let params = PeriodParams::from_config(&cfg, cfg.team_score_mean, cfg.team_score_mean);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let iterations = 10_000;
        let mut total = 0.0;
        for _ in 0..iterations {
            let sample = simulate_game(&mut rng, &params);
            total += sample.home + sample.away;
        }
        let mean_total = total / iterations as f64;
        assert!(
            mean_total > 5.0 && mean_total < 7.0,
            "mean total {:.2}",
            mean_total
        );
    }

    #[test]
    fn test_stronger_team_scores_more() {
        let cfg = crate::config::AppConfig::default_dry_run()
            .leagues
            .get("MLB")
            .cloned()
            .unwrap();
        let params =
            PeriodParams::from_config(&cfg, cfg.team_score_mean * 1.2, cfg.team_score_mean * 0.9);
        assert!(params.lambda_home > params.lambda_away);
    }
}
