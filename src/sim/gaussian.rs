//! Gaussian team scoring for high-possession leagues.
//!
//! At 80+ possessions the per-possession noise washes out and a Normal
//! per-team score is a sound approximation.

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;

use crate::config::LeagueConfig;

use super::GameSample;

#[derive(Debug, Clone, Copy)]
pub struct GaussianParams {
    pub home_mean: f64,
    pub away_mean: f64,
    pub std_dev: f64,
}

impl GaussianParams {
    pub fn from_config(league_cfg: &LeagueConfig, home_mean: f64, away_mean: f64) -> Self {
        Self {
            home_mean,
            away_mean,
            std_dev: league_cfg.team_score_std.max(1.0),
        }
    }
}

pub(crate) fn simulate_game<R: Rng>(rng: &mut R, params: &GaussianParams) -> GameSample {
    // unit normal scaled per team; scores round to whole points
    let normal = Normal::new(0.0, 1.0).expect("unit normal is valid");
    let home = params.home_mean + params.std_dev * normal.sample(rng);
    let away = params.away_mean + params.std_dev * normal.sample(rng);
    GameSample {
        home: home.round().max(0.0),
        away: away.round().max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_scores_center_on_team_means() {
        let params = GaussianParams {
            home_mean: 115.0,
            away_mean: 108.0,
            std_dev: 12.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let iterations = 20_000;
        let (mut home_sum, mut away_sum) = (0.0, 0.0);
        for _ in 0..iterations {
            let sample = simulate_game(&mut rng, &params);
            home_sum += sample.home;
            away_sum += sample.away;
        }
        let home_mean = home_sum / iterations as f64;
        let away_mean = away_sum / iterations as f64;

        assert!((home_mean - 115.0).abs() < 0.5, "home mean {:.2}", home_mean);
        assert!((away_mean - 108.0).abs() < 0.5, "away mean {:.2}", away_mean);
    }
}
