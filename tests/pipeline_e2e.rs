//! End-to-end pipeline over the in-memory store: snapshots in, waves
//! through the state machine, publish through the copy validator, lock at
//! start, grade idempotently against a stubbed score provider.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

use edgeline::config::AppConfig;
use edgeline::domain::{
    GameEvent, League, MarketSnapshot, MarketType, ProviderEventMap, Settlement, SignalStatus,
    Wave,
};
use edgeline::error::{EngineError, Result};
use edgeline::providers::{ProviderScore, ScoreProvider};
use edgeline::publish::NoopSender;
use edgeline::store::{Caller, MemoryStore, Store};
use edgeline::{
    EngineMetrics, FeatureFlags, Publisher, SettlementEngine, SignalMachine,
};

struct StubScores {
    score: ProviderScore,
}

#[async_trait]
impl ScoreProvider for StubScores {
    async fn fetch_score(&self, provider_event_id: &str) -> Result<ProviderScore> {
        if self.score.provider_event_id != provider_event_id {
            return Err(EngineError::NotFound(format!(
                "provider event {}",
                provider_event_id
            )));
        }
        Ok(self.score.clone())
    }
}

fn event() -> GameEvent {
    let mut provider_event_map = ProviderEventMap::default();
    provider_event_map.set("oddsapi", "ext-e2e");
    GameEvent {
        event_id: "evt-e2e".into(),
        league: League::Nba,
        home_team_id: "lal".into(),
        home_team_name: "Lakers".into(),
        away_team_id: "bos".into(),
        away_team_name: "Celtics".into(),
        start_time: Utc::now(),
        weather: None,
        roster: None,
        provider_event_map,
        completed: false,
    }
}

fn snapshot(wave: Wave, minutes_ago: i64) -> MarketSnapshot {
    MarketSnapshot {
        event_id: "evt-e2e".into(),
        wave,
        observed_at: Utc::now() - Duration::minutes(minutes_ago),
        // home quoted far past the softly-anchored model: away-side edge
        spread_home: -9.5,
        spread_away: 9.5,
        total: 226.0,
        over_price: -110,
        under_price: -110,
        ml_home: -250,
        ml_away: 210,
        book_id: "bk".into(),
    }
}

#[tokio::test]
async fn full_pipeline_discovery_to_settlement() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let config = Arc::new(AppConfig::default_dry_run());
    let metrics = Arc::new(EngineMetrics::new());
    let machine = SignalMachine::new(store.clone(), config.clone(), metrics.clone());

    let event = event();
    store.upsert_event(Caller::OddsPoller, &event).await.unwrap();

    // three waves on progressively fresher snapshots
    for (wave, minutes_ago) in [
        (Wave::Discovery, 360),
        (Wave::Validation, 120),
        (Wave::Publish, 60),
    ] {
        store
            .record_snapshot(Caller::OddsPoller, &snapshot(wave, minutes_ago))
            .await
            .unwrap();
        machine.evaluate_event_wave(&event, wave).await.unwrap();
    }

    // the served triple is hash-consistent and stable across reads
    let decisions = store.get_game_decisions("evt-e2e").await.unwrap().unwrap();
    assert!(decisions.hash_consistent());
    let again = store.get_game_decisions("evt-e2e").await.unwrap().unwrap();
    assert_eq!(decisions.meta.inputs_hash, again.meta.inputs_hash);

    // opposite resolution is an involution on the served decision
    let spread = decisions.spread.as_ref().unwrap();
    let opposite = spread.sides.opposite(&spread.selection_id).unwrap();
    assert_eq!(
        spread
            .sides
            .opposite(&opposite.selection_id)
            .unwrap()
            .selection_id,
        spread.selection_id
    );

    // the spread signal published with a frozen entry
    let signal_id = edgeline::signals::signal_id("evt-e2e", MarketType::Spread);
    let signal = store.get_signal(&signal_id).await.unwrap().unwrap();
    assert_eq!(signal.status, SignalStatus::Published);
    let entry = signal.entry.clone().unwrap();
    assert_eq!(entry.selection_id, spread.selection_id);

    // publisher drains the queue exactly once
    let sender = Arc::new(NoopSender::default());
    let flags = Arc::new(FeatureFlags::new(store.clone()));
    let publisher = Publisher::new(
        store.clone(),
        sender.clone(),
        flags,
        config.publisher.clone(),
        metrics.clone(),
    );
    let summary = publisher.run_once().await.unwrap();
    assert!(summary.posted >= 1, "expected at least the spread post");
    let posted_once = sender.sent.lock().await.len();
    publisher.run_once().await.unwrap();
    assert_eq!(sender.sent.lock().await.len(), posted_once);

    // start time passes; the signal locks
    machine.lock_started_signals().await.unwrap();
    let signal = store.get_signal(&signal_id).await.unwrap().unwrap();
    assert_eq!(signal.status, SignalStatus::Locked);

    // final: home 100-95 (margin 5): away +9.5 covers
    let settlement = SettlementEngine::new(
        store.clone(),
        Arc::new(StubScores {
            score: ProviderScore {
                provider_event_id: "ext-e2e".into(),
                home_team_name: "Lakers".into(),
                away_team_name: "Celtics".into(),
                home_score: 100,
                away_score: 95,
                regulation_home_score: None,
                regulation_away_score: None,
                completed: true,
                raw: serde_json::json!({"home": 100, "away": 95}),
            },
        }),
        config.grading.clone(),
        "oddsapi".into(),
        metrics.clone(),
    );

    let record = settlement.grade(&signal_id, None, None).await.unwrap();
    assert_eq!(record.settlement, Settlement::Win);
    // closing snapshot existed, so CLV is populated
    assert!(record.clv.is_some());

    // idempotent re-grade
    let second = settlement.grade(&signal_id, None, None).await.unwrap();
    assert_eq!(record.idempotency_key, second.idempotency_key);
    assert_eq!(record.graded_at, second.graded_at);

    // terminal state: signal settled, event completed
    let signal = store.get_signal(&signal_id).await.unwrap().unwrap();
    assert_eq!(signal.status, SignalStatus::Settled);
    assert_eq!(signal.settlement, Some(Settlement::Win));
    assert!(store.get_event("evt-e2e").await.unwrap().unwrap().completed);
}
