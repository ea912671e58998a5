use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::league::League;

/// Per-provider opaque event ids.
///
/// The engine treats these as exact keys; the only component allowed to
/// populate them by team-name similarity is the offline backfill tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEventMap(pub BTreeMap<String, String>);

impl ProviderEventMap {
    pub fn get(&self, provider: &str) -> Option<&str> {
        self.0.get(provider).map(String::as_str)
    }

    pub fn set(&mut self, provider: impl Into<String>, event_id: impl Into<String>) {
        self.0.insert(provider.into(), event_id.into());
    }
}

/// Weather context for outdoor sports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub wind_mph: f64,
    /// Precipitation chance in percent (0-100)
    pub precip_pct: f64,
    pub temp_f: f64,
}

/// Roster availability at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterAvailability {
    /// Projected starters ruled out, home side
    pub home_starters_out: u8,
    /// Projected starters ruled out, away side
    pub away_starters_out: u8,
}

/// A scheduled contest.
///
/// Created on first odds poll, frozen at start, marked completed when a
/// score snapshot arrives. The completion flag is the only mutable field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub event_id: String,
    pub league: League,
    pub home_team_id: String,
    pub home_team_name: String,
    pub away_team_id: String,
    pub away_team_name: String,
    /// Scheduled start, UTC
    pub start_time: DateTime<Utc>,
    pub weather: Option<Weather>,
    pub roster: Option<RosterAvailability>,
    pub provider_event_map: ProviderEventMap,
    pub completed: bool,
}

impl GameEvent {
    /// Provider id for the scores/odds provider, if the mapping exists.
    pub fn provider_event_id(&self, provider: &str) -> Option<&str> {
        self.provider_event_map.get(provider)
    }

    pub fn team_name(&self, team_id: &str) -> Option<&str> {
        if team_id == self.home_team_id {
            Some(&self.home_team_name)
        } else if team_id == self.away_team_id {
            Some(&self.away_team_name)
        } else {
            None
        }
    }
}
