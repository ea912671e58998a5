//! Offline provider-id backfill.
//!
//! The one place team-name similarity is allowed. Proposes provider ids
//! for events missing them; applying a proposal writes the exact id into
//! the event's provider map, after which runtime lookups are exact again.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::domain::GameEvent;
use crate::error::Result;
use crate::store::{Caller, Store};

/// Window around the scheduled start inside which a provider listing can
/// match an event.
const START_TIME_SLACK_HOURS: i64 = 6;
/// Minimum combined name similarity to propose a match.
const MIN_CONFIDENCE: f64 = 0.5;

/// One event from the provider's schedule listing.
#[derive(Debug, Clone)]
pub struct ProviderListing {
    pub provider_event_id: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub start_time: DateTime<Utc>,
}

/// A proposed mapping with its similarity score.
#[derive(Debug, Clone)]
pub struct BackfillCandidate {
    pub event_id: String,
    pub provider_event_id: String,
    pub provider_home: String,
    pub provider_away: String,
    pub confidence: f64,
}

/// Normalized token set for a team name.
fn tokens(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Jaccard similarity over name tokens.
fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

/// Propose provider ids for events missing one. Pure, offline.
pub fn propose(
    events: &[GameEvent],
    listings: &[ProviderListing],
    provider_name: &str,
) -> Vec<BackfillCandidate> {
    let mut candidates = Vec::new();
    for event in events {
        if event.provider_event_id(provider_name).is_some() {
            continue;
        }
        let mut best: Option<BackfillCandidate> = None;
        for listing in listings {
            let slack = Duration::hours(START_TIME_SLACK_HOURS);
            if (listing.start_time - event.start_time).abs() > slack {
                continue;
            }
            let home_sim = similarity(&event.home_team_name, &listing.home_team_name);
            let away_sim = similarity(&event.away_team_name, &listing.away_team_name);
            let confidence = (home_sim + away_sim) / 2.0;
            if confidence < MIN_CONFIDENCE {
                continue;
            }
            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(BackfillCandidate {
                    event_id: event.event_id.clone(),
                    provider_event_id: listing.provider_event_id.clone(),
                    provider_home: listing.home_team_name.clone(),
                    provider_away: listing.away_team_name.clone(),
                    confidence,
                });
            }
        }
        if let Some(candidate) = best {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Write proposed ids into the events' provider maps.
pub async fn apply(
    store: Arc<dyn Store>,
    candidates: &[BackfillCandidate],
    provider_name: &str,
) -> Result<usize> {
    let mut applied = 0;
    for candidate in candidates {
        let Some(mut event) = store.get_event(&candidate.event_id).await? else {
            continue;
        };
        event
            .provider_event_map
            .set(provider_name, &candidate.provider_event_id);
        store.upsert_event(Caller::AdminTool, &event).await?;
        applied += 1;
        info!(
            "Backfilled {} -> {} (confidence {:.2})",
            candidate.event_id, candidate.provider_event_id, candidate.confidence
        );
    }
    Ok(applied)
}
