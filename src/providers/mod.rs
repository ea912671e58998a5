//! External odds and scores providers.
//!
//! Provider ids are opaque exact keys. Nothing in this module (or anywhere
//! at runtime) matches events by team-name similarity; that heuristic is
//! confined to the offline backfill tool.

pub mod odds_api;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub use odds_api::OddsApiClient;

/// Final (or in-progress) score payload fetched by exact provider id.
#[derive(Debug, Clone)]
pub struct ProviderScore {
    pub provider_event_id: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub home_score: i32,
    pub away_score: i32,
    /// Regulation-time scores when the provider reports them
    pub regulation_home_score: Option<i32>,
    pub regulation_away_score: Option<i32>,
    pub completed: bool,
    /// Raw payload, hashed into the grading record's score_payload_ref
    pub raw: serde_json::Value,
}

/// Score lookups used by the settlement engine.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    async fn fetch_score(&self, provider_event_id: &str) -> Result<ProviderScore>;
}

/// Bounded exponential backoff: min * 2^attempt, capped at max.
pub fn backoff_delay(attempt: u32, min_secs: u64, max_secs: u64) -> Duration {
    let exp = attempt.min(16);
    let secs = min_secs.saturating_mul(1u64 << exp).min(max_secs);
    Duration::from_secs(secs)
}
