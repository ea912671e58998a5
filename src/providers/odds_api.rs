//! HTTP client for the odds/scores provider.
//!
//! Odds polls upsert events and append immutable market snapshots; score
//! fetches are exact-id lookups only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::domain::{GameEvent, League, MarketSnapshot, ProviderEventMap, Wave};
use crate::error::{EngineError, Result};

use super::{ProviderScore, ScoreProvider};

/// Sport keys the provider uses per league.
fn sport_key(league: League) -> &'static str {
    match league {
        League::Nba => "basketball_nba",
        League::Nfl => "americanfootball_nfl",
        League::Nhl => "icehockey_nhl",
        League::Mlb => "baseball_mlb",
        League::Ncaab => "basketball_ncaab",
        League::Ncaaf => "americanfootball_ncaaf",
    }
}

// ==================== Wire types ====================

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    home_team: String,
    away_team: String,
    commence_time: DateTime<Utc>,
    #[serde(default)]
    bookmakers: Vec<WireBookmaker>,
}

#[derive(Debug, Deserialize)]
struct WireBookmaker {
    key: String,
    #[serde(default)]
    markets: Vec<WireMarket>,
}

#[derive(Debug, Deserialize)]
struct WireMarket {
    key: String,
    #[serde(default)]
    outcomes: Vec<WireOutcome>,
}

#[derive(Debug, Deserialize)]
struct WireOutcome {
    name: String,
    price: f64,
    #[serde(default)]
    point: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireScoreEvent {
    id: String,
    home_team: String,
    away_team: String,
    completed: bool,
    #[serde(default)]
    scores: Option<Vec<WireTeamScore>>,
}

#[derive(Debug, Deserialize)]
struct WireTeamScore {
    name: String,
    score: String,
}

/// One polled event: the upserted event skeleton plus its snapshot, when
/// the book quoted all three markets.
#[derive(Debug, Clone)]
pub struct PolledEvent {
    pub event: GameEvent,
    pub snapshot: Option<MarketSnapshot>,
}

pub struct OddsApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    provider_name: String,
}

impl OddsApiClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.odds_base_url.trim_end_matches('/').to_string(),
            api_key: config.odds_api_key.clone(),
            provider_name: config.provider_name.clone(),
        })
    }

    /// Poll current odds for a league. The wave label on each snapshot is
    /// derived from time-to-start.
    pub async fn fetch_odds(&self, league: League) -> Result<Vec<PolledEvent>> {
        let url = format!(
            "{}/v4/sports/{}/odds?regions=us&markets=h2h,spreads,totals&oddsFormat=american&apiKey={}",
            self.base_url,
            sport_key(league),
            self.api_key
        );
        let response = self.http.get(&url).send().await.map_err(map_timeout)?;
        let wire: Vec<WireEvent> = response.error_for_status()?.json().await?;
        debug!("Fetched {} {} events from provider", wire.len(), league);

        let now = Utc::now();
        Ok(wire
            .into_iter()
            .map(|w| self.convert_event(league, w, now))
            .collect())
    }

    fn convert_event(&self, league: League, wire: WireEvent, now: DateTime<Utc>) -> PolledEvent {
        let event_id = format!("{}:{}", league.as_str().to_lowercase(), wire.id);
        let mut provider_event_map = ProviderEventMap::default();
        provider_event_map.set(&self.provider_name, &wire.id);

        let event = GameEvent {
            event_id: event_id.clone(),
            league,
            home_team_id: team_id(&wire.home_team),
            home_team_name: wire.home_team.clone(),
            away_team_id: team_id(&wire.away_team),
            away_team_name: wire.away_team.clone(),
            start_time: wire.commence_time,
            weather: None,
            roster: None,
            provider_event_map,
            completed: false,
        };

        let snapshot = wire.bookmakers.first().and_then(|book| {
            build_snapshot(&event, book, now, wire.commence_time)
        });

        PolledEvent { event, snapshot }
    }
}

#[async_trait]
impl ScoreProvider for OddsApiClient {
    /// Exact-id score lookup. No team-name matching happens here.
    async fn fetch_score(&self, provider_event_id: &str) -> Result<ProviderScore> {
        let url = format!(
            "{}/v4/sports/upcoming/scores?eventIds={}&daysFrom=3&apiKey={}",
            self.base_url, provider_event_id, self.api_key
        );
        let response = self.http.get(&url).send().await.map_err(map_timeout)?;
        let raw: serde_json::Value = response.error_for_status()?.json().await?;

        let events: Vec<WireScoreEvent> = serde_json::from_value(raw.clone())?;
        let event = events
            .into_iter()
            .find(|e| e.id == provider_event_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("provider event {}", provider_event_id))
            })?;

        let score_for = |team: &str| -> Option<i32> {
            event
                .scores
                .as_ref()?
                .iter()
                .find(|s| s.name == team)
                .and_then(|s| s.score.parse().ok())
        };
        let home_score = score_for(&event.home_team).unwrap_or(0);
        let away_score = score_for(&event.away_team).unwrap_or(0);

        Ok(ProviderScore {
            provider_event_id: event.id,
            home_team_name: event.home_team,
            away_team_name: event.away_team,
            home_score,
            away_score,
            regulation_home_score: None,
            regulation_away_score: None,
            completed: event.completed,
            raw,
        })
    }
}

/// Stable internal team id from the provider's canonical team name.
fn team_id(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Wave label for a snapshot observed `now` against the scheduled start.
fn wave_for_offset(start_time: DateTime<Utc>, now: DateTime<Utc>) -> Wave {
    let minutes_out = (start_time - now).num_minutes();
    if minutes_out > Wave::Validation.minutes_before_start() {
        Wave::Discovery
    } else if minutes_out > Wave::Publish.minutes_before_start() {
        Wave::Validation
    } else {
        Wave::Publish
    }
}

fn build_snapshot(
    event: &GameEvent,
    book: &WireBookmaker,
    now: DateTime<Utc>,
    start_time: DateTime<Utc>,
) -> Option<MarketSnapshot> {
    let market = |key: &str| book.markets.iter().find(|m| m.key == key);
    let outcome = |m: &WireMarket, name: &str| -> Option<(f64, Option<f64>)> {
        m.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| (o.price, o.point))
    };

    let h2h = market("h2h")?;
    let spreads = market("spreads")?;
    let totals = market("totals")?;

    let (ml_home, _) = outcome(h2h, &event.home_team_name)?;
    let (ml_away, _) = outcome(h2h, &event.away_team_name)?;
    let (_, spread_home) = outcome(spreads, &event.home_team_name)?;
    let (_, spread_away) = outcome(spreads, &event.away_team_name)?;
    let (over_price, total) = outcome(totals, "Over")?;
    let (under_price, _) = outcome(totals, "Under")?;

    Some(MarketSnapshot {
        event_id: event.event_id.clone(),
        wave: wave_for_offset(start_time, now),
        observed_at: now,
        spread_home: spread_home?,
        spread_away: spread_away?,
        total: total?,
        over_price: over_price as i32,
        under_price: under_price as i32,
        ml_home: ml_home as i32,
        ml_away: ml_away as i32,
        book_id: book.key.clone(),
    })
}

fn map_timeout(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::TransportTimeout(err.to_string())
    } else {
        EngineError::Http(err)
    }
}
