//! Per-drive scoring model for football.
//!
//! Each offensive drive ends in a touchdown (7), a field goal (3), or
//! nothing. TD/FG probabilities scale with a team strength factor under
//! hard efficiency bounds, and weather trims scoring up to a 30% cap.

use rand::Rng;

use crate::config::LeagueConfig;
use crate::domain::Weather;

use super::GameSample;

const TD_POINTS: f64 = 7.0;
const FG_POINTS: f64 = 3.0;

/// Max per-drive TD rate at the efficiency bound.
const TD_RATE: f64 = 0.22;
/// Max per-drive FG rate at the efficiency bound.
const FG_RATE: f64 = 0.17;

#[derive(Debug, Clone, Copy)]
pub struct DriveParams {
    pub drives_per_team: u32,
    pub td_prob_home: f64,
    pub fg_prob_home: f64,
    pub td_prob_away: f64,
    pub fg_prob_away: f64,
}

impl DriveParams {
    pub fn from_config(league_cfg: &LeagueConfig, home_mean: f64, away_mean: f64) -> Self {
        let factor_home = home_mean / league_cfg.team_score_mean;
        let factor_away = away_mean / league_cfg.team_score_mean;
        Self {
            drives_per_team: league_cfg.drives_per_team.max(1),
            td_prob_home: TD_RATE * factor_home.clamp(0.0, 1.5),
            fg_prob_home: FG_RATE * factor_home.clamp(0.0, 1.3),
            td_prob_away: TD_RATE * factor_away.clamp(0.0, 1.5),
            fg_prob_away: FG_RATE * factor_away.clamp(0.0, 1.3),
        }
    }

    /// Apply the cumulative weather reduction to both teams' scoring rates.
    pub fn with_weather(mut self, weather: Option<&Weather>, regime: &mut Vec<String>) -> Self {
        let Some(weather) = weather else {
            return self;
        };
        let reduction = weather_reduction(weather);
        if reduction > 0.0 {
            let keep = 1.0 - reduction;
            self.td_prob_home *= keep;
            self.fg_prob_home *= keep;
            self.td_prob_away *= keep;
            self.fg_prob_away *= keep;
            regime.push(format!("weather:-{:.2}", reduction));
        }
        self
    }
}

/// Cumulative scoring reduction, capped at 30%.
fn weather_reduction(weather: &Weather) -> f64 {
    let mut reduction: f64 = 0.0;
    if weather.wind_mph > 15.0 {
        reduction += 0.10;
    }
    if weather.wind_mph > 25.0 {
        reduction += 0.10;
    }
    if weather.precip_pct > 50.0 {
        reduction += 0.08;
    }
    if weather.temp_f < 32.0 {
        reduction += 0.05;
    }
    if weather.temp_f < 20.0 {
        reduction += 0.07;
    }
    reduction.min(0.30)
}

fn team_score<R: Rng>(rng: &mut R, drives: u32, td_prob: f64, fg_prob: f64) -> f64 {
    let mut score = 0.0;
    for _ in 0..drives {
        let u: f64 = rng.gen();
        if u < td_prob {
            score += TD_POINTS;
        } else if u < td_prob + fg_prob {
            score += FG_POINTS;
        }
    }
    score
}

pub(crate) fn simulate_game<R: Rng>(rng: &mut R, params: &DriveParams) -> GameSample {
    GameSample {
        home: team_score(
            rng,
            params.drives_per_team,
            params.td_prob_home,
            params.fg_prob_home,
        ),
        away: team_score(
            rng,
            params.drives_per_team,
            params.td_prob_away,
            params.fg_prob_away,
        ),
    }
}
