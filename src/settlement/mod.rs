//! Settlement engine.
//!
//! Grades published picks by exact provider event id. Idempotent: one
//! grading record per (pick, grade source, rules versions); duplicate
//! calls are successful no-ops. Mapping drift freezes grading for the
//! event until an operator reconciles the canonical names; the engine
//! never matches teams by name similarity at runtime.

pub mod backfill;
pub mod clv;
pub mod rules;

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::GradingConfig;
use crate::domain::{
    grading_idempotency_key, AlertKind, AlertSeverity, GradingRecord, OpsAlert, PickSide,
    ScorePayloadRef, Settlement, Signal, Wave,
};
use crate::error::{EngineError, Result};
use crate::metrics::EngineMetrics;
use crate::providers::{ProviderScore, ScoreProvider};
use crate::store::{Caller, InsertOutcome, Store};

pub struct SettlementEngine {
    store: Arc<dyn Store>,
    scores: Arc<dyn ScoreProvider>,
    config: GradingConfig,
    provider_name: String,
    metrics: Arc<EngineMetrics>,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn Store>,
        scores: Arc<dyn ScoreProvider>,
        config: GradingConfig,
        provider_name: String,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            scores,
            config,
            provider_name,
            metrics,
        }
    }

    /// Grade one pick. `admin_override` forces the settlement outcome and
    /// requires a non-empty `admin_note` for the audit trail.
    pub async fn grade(
        &self,
        pick_id: &str,
        admin_override: Option<Settlement>,
        admin_note: Option<String>,
    ) -> Result<GradingRecord> {
        let idempotency_key = grading_idempotency_key(
            pick_id,
            &self.config.grade_source,
            &self.config.settlement_rules_version,
            &self.config.clv_rules_version,
        );
        if let Some(existing) = self.store.get_grading_by_key(&idempotency_key).await? {
            info!("Grade for {} already recorded; no-op", pick_id);
            return Ok(existing);
        }

        if admin_override.is_some()
            && admin_note.as_deref().map_or(true, |n| n.trim().is_empty())
        {
            return Err(EngineError::Validation(
                "admin_override requires a non-empty admin_note".to_string(),
            ));
        }

        let signal = self
            .store
            .get_signal(pick_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pick {}", pick_id)))?;
        let entry = signal.entry.clone().ok_or_else(|| {
            EngineError::Validation(format!("pick {} has no frozen entry", pick_id))
        })?;
        let pick_side = published_side(&signal).ok_or_else(|| {
            EngineError::Validation(format!("pick {} has no publish-wave record", pick_id))
        })?;

        let event = self
            .store
            .get_event(&signal.event_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("event {}", signal.event_id)))?;

        // 1. exact provider id, or fail loud
        let Some(provider_event_id) = event.provider_event_id(&self.provider_name) else {
            self.alert(
                AlertKind::ProviderIdMissing,
                AlertSeverity::Critical,
                &event.event_id,
                serde_json::json!({ "pick_id": pick_id, "provider": self.provider_name }),
            )
            .await?;
            return Err(EngineError::MissingProviderId {
                event_id: event.event_id.clone(),
            });
        };
        let provider_event_id = provider_event_id.to_string();

        // 2. score by exact id; not-complete is retryable
        let score = self.scores.fetch_score(&provider_event_id).await?;
        if !score.completed {
            return Err(EngineError::GameNotCompleted { provider_event_id });
        }

        // 3. canonical-name validation; drift freezes grading for the event
        if score.home_team_name != event.home_team_name
            || score.away_team_name != event.away_team_name
        {
            let expected = format!("{}/{}", event.home_team_name, event.away_team_name);
            let actual = format!("{}/{}", score.home_team_name, score.away_team_name);
            warn!(
                "Provider mapping drift on {}: expected {}, got {}",
                event.event_id, expected, actual
            );
            self.alert(
                AlertKind::MappingDrift,
                AlertSeverity::Critical,
                &event.event_id,
                serde_json::json!({
                    "pick_id": pick_id,
                    "expected": expected,
                    "actual": actual,
                }),
            )
            .await?;
            return Err(EngineError::ProviderMappingDrift {
                event_id: event.event_id.clone(),
                expected,
                actual,
            });
        }

        // 4. versioned settlement
        let settlement = match admin_override {
            Some(forced) => forced,
            None => rules::settle(
                &self.config.settlement_rules_version,
                signal.sport,
                signal.market_type,
                pick_side,
                entry.entry_line,
                score.home_score,
                score.away_score,
            )?,
        };

        // 5. CLV; a missing closing snapshot warns but never fails grading
        let mut ops_alerts = Vec::new();
        let clv = match self
            .store
            .closing_snapshot(&event.event_id, event.start_time)
            .await?
        {
            Some(closing) => Some(clv::compute(
                signal.market_type,
                pick_side,
                entry.entry_line,
                entry.entry_odds,
                &closing,
            )),
            None => {
                let alert_id = self
                    .alert(
                        AlertKind::CloseSnapshotMissing,
                        AlertSeverity::Warning,
                        &event.event_id,
                        serde_json::json!({ "pick_id": pick_id }),
                    )
                    .await?;
                ops_alerts.push(alert_id);
                None
            }
        };

        // 6. idempotent upsert
        let record = GradingRecord {
            pick_id: pick_id.to_string(),
            event_id: event.event_id.clone(),
            provider_event_id: provider_event_id.clone(),
            idempotency_key: idempotency_key.clone(),
            settlement,
            clv,
            score_payload_ref: score_payload_ref(&score),
            ops_alerts,
            admin_override,
            admin_note,
            graded_at: Utc::now(),
        };

        match self
            .store
            .insert_grading(Caller::SettlementEngine, &record)
            .await?
        {
            InsertOutcome::Inserted => {
                self.metrics.gradings_completed.record();
                self.store
                    .mark_event_completed(Caller::SettlementEngine, &event.event_id)
                    .await?;
                self.store
                    .set_signal_settlement(Caller::SettlementEngine, pick_id, settlement)
                    .await?;
                info!(
                    "Graded {}: {} (clv {:?})",
                    pick_id,
                    settlement,
                    record.clv
                );
                Ok(record)
            }
            InsertOutcome::Duplicate => {
                // lost a race with a concurrent grade; the stored record wins
                self.store
                    .get_grading_by_key(&idempotency_key)
                    .await?
                    .ok_or_else(|| EngineError::DuplicateIdempotency(idempotency_key))
            }
        }
    }

    async fn alert(
        &self,
        kind: AlertKind,
        severity: AlertSeverity,
        event_id: &str,
        details: serde_json::Value,
    ) -> Result<String> {
        let alert = OpsAlert::new(kind, severity, Some(event_id.to_string()), details);
        let alert_id = alert.alert_id.clone();
        self.store
            .insert_alert(Caller::SettlementEngine, &alert)
            .await?;
        Ok(alert_id)
    }
}

/// The side frozen at publish time, from the signal's publish-wave record.
fn published_side(signal: &Signal) -> Option<PickSide> {
    signal
        .wave_record(Wave::Publish)
        .and_then(|record| record.pick_side)
}

fn score_payload_ref(score: &ProviderScore) -> ScorePayloadRef {
    let mut hasher = Sha256::new();
    hasher.update(score.raw.to_string().as_bytes());
    ScorePayloadRef {
        provider_event_id: score.provider_event_id.clone(),
        payload_hash: hex::encode(hasher.finalize()),
        snapshot: score.raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::{
        GameEvent, League, MarketSnapshot, MarketType, ProviderEventMap, SignalEntry,
        SignalIntent, SignalStatus, WaveRecord,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::sync::RwLock;

    struct StubScores {
        score: RwLock<ProviderScore>,
    }

    #[async_trait]
    impl ScoreProvider for StubScores {
        async fn fetch_score(&self, provider_event_id: &str) -> Result<ProviderScore> {
            let score = self.score.read().await.clone();
            if score.provider_event_id != provider_event_id {
                return Err(EngineError::NotFound(format!(
                    "provider event {}",
                    provider_event_id
                )));
            }
            Ok(score)
        }
    }

    fn score(home: i32, away: i32, completed: bool) -> ProviderScore {
        ProviderScore {
            provider_event_id: "ext-1".into(),
            home_team_name: "Lakers".into(),
            away_team_name: "Celtics".into(),
            home_score: home,
            away_score: away,
            regulation_home_score: None,
            regulation_away_score: None,
            completed,
            raw: serde_json::json!({"home": home, "away": away}),
        }
    }

    fn event(with_provider_id: bool) -> GameEvent {
        let mut provider_event_map = ProviderEventMap::default();
        if with_provider_id {
            provider_event_map.set("oddsapi", "ext-1");
        }
        GameEvent {
            event_id: "evt-g".into(),
            league: League::Nba,
            home_team_id: "lal".into(),
            home_team_name: "Lakers".into(),
            away_team_id: "bos".into(),
            away_team_name: "Celtics".into(),
            start_time: Utc::now() - Duration::hours(3),
            weather: None,
            roster: None,
            provider_event_map,
            completed: false,
        }
    }

    /// A locked spread signal: home -5.5 entered at -110.
    fn signal() -> Signal {
        let now = Utc::now();
        Signal {
            signal_id: "sig:evt-g:spread".into(),
            event_id: "evt-g".into(),
            sport: League::Nba,
            market_type: MarketType::Spread,
            team_a: "Lakers".into(),
            team_b: "Celtics".into(),
            start_time: now - Duration::hours(3),
            intent: SignalIntent::TruthMode,
            status: SignalStatus::Locked,
            waves: vec![WaveRecord {
                wave: Wave::Publish,
                snapshot_observed_at: now - Duration::hours(4),
                sim_run_id: "sim:evt-g:publish:1".into(),
                classification: crate::domain::Classification::Edge,
                pick_side: Some(PickSide::Home),
                edge_value: Some(3.3),
                selection_id: Some("sel-home".into()),
                line: -5.5,
                odds: -110,
                decided_at: now - Duration::hours(4),
            }],
            entry: Some(SignalEntry {
                selection_id: "sel-home".into(),
                market_type: MarketType::Spread,
                entry_line: -5.5,
                entry_odds: -110,
                worst_acceptable_odds: -120,
                locked_at: now - Duration::hours(4),
            }),
            settlement: None,
            created_at: now - Duration::hours(10),
            updated_at: now - Duration::hours(4),
        }
    }

    async fn engine_with(
        store: Arc<MemoryStore>,
        provider_score: ProviderScore,
        with_provider_id: bool,
    ) -> SettlementEngine {
        store
            .upsert_event(Caller::OddsPoller, &event(with_provider_id))
            .await
            .unwrap();
        store
            .upsert_signal(Caller::SignalMachine, &signal())
            .await
            .unwrap();
        let config = AppConfig::default_dry_run();
        SettlementEngine::new(
            store,
            Arc::new(StubScores {
                score: RwLock::new(provider_score),
            }),
            config.grading,
            "oddsapi".into(),
            Arc::new(EngineMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_win_with_missing_closing_snapshot() {
        let store = Arc::new(MemoryStore::new());
        // home wins by 10: covers -5.5
        let engine = engine_with(store.clone(), score(116, 106, true), true).await;

        let record = engine.grade("sig:evt-g:spread", None, None).await.unwrap();
        assert_eq!(record.settlement, Settlement::Win);
        assert!(record.clv.is_none());

        // one CLOSE_SNAPSHOT_MISSING warning for the event
        let alerts = store
            .alerts_since(Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        let close_missing: Vec<_> = alerts
            .iter()
            .filter(|a| a.kind == AlertKind::CloseSnapshotMissing)
            .collect();
        assert_eq!(close_missing.len(), 1);
        assert_eq!(record.ops_alerts, vec![close_missing[0].alert_id.clone()]);

        // the event is completed and the signal settled
        assert!(store.get_event("evt-g").await.unwrap().unwrap().completed);
        let signal = store.get_signal("sig:evt-g:spread").await.unwrap().unwrap();
        assert_eq!(signal.status, SignalStatus::Settled);
        assert_eq!(signal.settlement, Some(Settlement::Win));
    }

    #[tokio::test]
    async fn test_clv_computed_from_closing_snapshot() {
        let store = Arc::new(MemoryStore::new());
        store
            .record_snapshot(
                Caller::OddsPoller,
                &MarketSnapshot {
                    event_id: "evt-g".into(),
                    wave: Wave::Publish,
                    observed_at: Utc::now() - Duration::hours(4),
                    spread_home: -8.5,
                    spread_away: 8.5,
                    total: 226.0,
                    over_price: -110,
                    under_price: -110,
                    ml_home: -300,
                    ml_away: 250,
                    book_id: "bk".into(),
                },
            )
            .await
            .unwrap();
        let engine = engine_with(store.clone(), score(116, 106, true), true).await;

        let record = engine.grade("sig:evt-g:spread", None, None).await.unwrap();
        // entered -5.5, closed -8.5: beat the close by 3
        assert!((record.clv.unwrap() - 3.0).abs() < 1e-9);
        assert!(record.ops_alerts.is_empty());
    }

    #[tokio::test]
    async fn test_grading_twice_is_single_record_noop() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), score(116, 106, true), true).await;

        let first = engine.grade("sig:evt-g:spread", None, None).await.unwrap();
        let second = engine.grade("sig:evt-g:spread", None, None).await.unwrap();

        assert_eq!(first.idempotency_key, second.idempotency_key);
        assert_eq!(first.graded_at, second.graded_at);
    }

    #[tokio::test]
    async fn test_mapping_drift_freezes_grading() {
        let store = Arc::new(MemoryStore::new());
        let mut drifted = score(116, 106, true);
        drifted.home_team_name = "Los Angeles Lakers".into();
        drifted.away_team_name = "Boston Celtics".into();
        let engine = engine_with(store.clone(), drifted, true).await;

        let err = engine.grade("sig:evt-g:spread", None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::ProviderMappingDrift { .. }));

        // no record written
        assert!(store
            .get_grading_for_pick("sig:evt-g:spread")
            .await
            .unwrap()
            .is_none());

        // a CRITICAL drift alert exists
        let alerts = store
            .alerts_since(Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.kind == AlertKind::MappingDrift
                && a.severity == AlertSeverity::Critical));

        // grading stays frozen on subsequent calls
        let err = engine.grade("sig:evt-g:spread", None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::ProviderMappingDrift { .. }));
    }

    #[tokio::test]
    async fn test_missing_provider_id_fails_typed() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), score(116, 106, true), false).await;

        let err = engine.grade("sig:evt-g:spread", None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingProviderId { .. }));
        let alerts = store
            .alerts_since(Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(alerts.iter().any(|a| a.kind == AlertKind::ProviderIdMissing));
    }

    #[tokio::test]
    async fn test_incomplete_game_is_retryable() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), score(60, 55, false), true).await;

        let err = engine.grade("sig:evt-g:spread", None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::GameNotCompleted { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_admin_override_requires_note() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), score(116, 106, true), true).await;

        let err = engine
            .grade("sig:evt-g:spread", Some(Settlement::Void), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let record = engine
            .grade(
                "sig:evt-g:spread",
                Some(Settlement::Void),
                Some("duplicate event posted by book".into()),
            )
            .await
            .unwrap();
        assert_eq!(record.settlement, Settlement::Void);
        assert_eq!(record.admin_override, Some(Settlement::Void));
        assert_eq!(
            record.admin_note.as_deref(),
            Some("duplicate event posted by book")
        );
    }
}
