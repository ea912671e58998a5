//! In-memory store implementation.
//!
//! Backs dry-run mode and tests. Enforces the same Writer Matrix as the
//! Postgres store; a refused write records the violation alert before the
//! typed error is returned, exactly as production does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{
    AlertKind, AlertSeverity, GameDecisions, GameEvent, GradingRecord, MarketSnapshot, MarketType,
    OpsAlert, ParlayAttempt, PublishRecord, Settlement, Signal, SignalStatus, SimulationRun, Wave,
};
use crate::error::{EngineError, Result};

use super::writer::{Caller, Collection, WriterMatrix};
use super::{InsertOutcome, Store};

#[derive(Default)]
struct Inner {
    events: HashMap<String, GameEvent>,
    snapshots: Vec<MarketSnapshot>,
    sim_runs: HashMap<String, SimulationRun>,
    decisions: HashMap<String, GameDecisions>,
    signals: HashMap<String, Signal>,
    grading: Vec<GradingRecord>,
    alerts: Vec<OpsAlert>,
    audit: Vec<(String, serde_json::Value, DateTime<Utc>)>,
    parlay_attempts: Vec<ParlayAttempt>,
    publish_log: Vec<PublishRecord>,
    flags: HashMap<String, bool>,
}

pub struct MemoryStore {
    matrix: WriterMatrix,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            matrix: WriterMatrix::canonical(),
            inner: RwLock::new(Inner::default()),
        }
    }

    async fn authorize(&self, caller: Caller, collection: Collection) -> Result<()> {
        match self.matrix.authorize(caller, collection) {
            Ok(()) => Ok(()),
            Err(err) => {
                // The guard itself records the violation; the write is refused.
                let alert = OpsAlert::new(
                    AlertKind::WriterUnauthorized,
                    AlertSeverity::Critical,
                    None,
                    serde_json::json!({
                        "caller": caller.as_str(),
                        "collection": collection.as_str(),
                    }),
                );
                self.inner.write().await.alerts.push(alert);
                Err(err)
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // ==================== Events ====================

    async fn upsert_event(&self, caller: Caller, event: &GameEvent) -> Result<()> {
        self.authorize(caller, Collection::Events).await?;
        self.inner
            .write()
            .await
            .events
            .insert(event.event_id.clone(), event.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<GameEvent>> {
        Ok(self.inner.read().await.events.get(event_id).cloned())
    }

    async fn mark_event_completed(&self, caller: Caller, event_id: &str) -> Result<()> {
        self.authorize(caller, Collection::Events).await?;
        let mut inner = self.inner.write().await;
        match inner.events.get_mut(event_id) {
            Some(event) => {
                event.completed = true;
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("event {}", event_id))),
        }
    }

    async fn events_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GameEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .values()
            .filter(|e| e.start_time >= from && e.start_time < to)
            .cloned()
            .collect())
    }

    // ==================== Market snapshots ====================

    async fn record_snapshot(&self, caller: Caller, snapshot: &MarketSnapshot) -> Result<()> {
        self.authorize(caller, Collection::MarketSnapshots).await?;
        let mut inner = self.inner.write().await;
        // snapshots are keyed (event_id, observed_at) and never overwritten
        let exists = inner.snapshots.iter().any(|s| {
            s.event_id == snapshot.event_id && s.observed_at == snapshot.observed_at
        });
        if !exists {
            inner.snapshots.push(snapshot.clone());
        }
        Ok(())
    }

    async fn latest_snapshot(&self, event_id: &str) -> Result<Option<MarketSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .filter(|s| s.event_id == event_id)
            .max_by_key(|s| s.observed_at)
            .cloned())
    }

    async fn snapshot_at_wave(
        &self,
        event_id: &str,
        wave: Wave,
    ) -> Result<Option<MarketSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .filter(|s| s.event_id == event_id && s.wave == wave)
            .max_by_key(|s| s.observed_at)
            .cloned())
    }

    async fn closing_snapshot(
        &self,
        event_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<MarketSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .filter(|s| s.event_id == event_id && s.observed_at < start_time)
            .max_by_key(|s| s.observed_at)
            .cloned())
    }

    // ==================== Simulation runs ====================

    async fn insert_sim_run(&self, caller: Caller, run: &SimulationRun) -> Result<()> {
        self.authorize(caller, Collection::SimRuns).await?;
        self.inner
            .write()
            .await
            .sim_runs
            .insert(run.sim_run_id.clone(), run.clone());
        Ok(())
    }

    async fn get_sim_run(&self, sim_run_id: &str) -> Result<Option<SimulationRun>> {
        Ok(self.inner.read().await.sim_runs.get(sim_run_id).cloned())
    }

    // ==================== Decisions ====================

    async fn store_game_decisions(
        &self,
        caller: Caller,
        decisions: &GameDecisions,
    ) -> Result<()> {
        self.authorize(caller, Collection::Decisions).await?;
        self.inner
            .write()
            .await
            .decisions
            .insert(decisions.meta.event_id.clone(), decisions.clone());
        Ok(())
    }

    async fn get_game_decisions(&self, event_id: &str) -> Result<Option<GameDecisions>> {
        Ok(self.inner.read().await.decisions.get(event_id).cloned())
    }

    // ==================== Signals ====================

    async fn upsert_signal(&self, caller: Caller, signal: &Signal) -> Result<()> {
        self.authorize(caller, Collection::Signals).await?;
        self.inner
            .write()
            .await
            .signals
            .insert(signal.signal_id.clone(), signal.clone());
        Ok(())
    }

    async fn get_signal(&self, signal_id: &str) -> Result<Option<Signal>> {
        Ok(self.inner.read().await.signals.get(signal_id).cloned())
    }

    async fn signals_with_status(&self, status: SignalStatus) -> Result<Vec<Signal>> {
        let inner = self.inner.read().await;
        Ok(inner
            .signals
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    async fn set_signal_settlement(
        &self,
        caller: Caller,
        signal_id: &str,
        settlement: Settlement,
    ) -> Result<()> {
        self.authorize(caller, Collection::Signals).await?;
        if caller != Caller::SettlementEngine {
            return Err(EngineError::WriterUnauthorized {
                caller: caller.to_string(),
                collection: "signals.settlement".to_string(),
            });
        }
        let mut inner = self.inner.write().await;
        match inner.signals.get_mut(signal_id) {
            Some(signal) => {
                signal.settlement = Some(settlement);
                signal.status = SignalStatus::Settled;
                signal.updated_at = Utc::now();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("signal {}", signal_id))),
        }
    }

    // ==================== Grading ====================

    async fn insert_grading(
        &self,
        caller: Caller,
        record: &GradingRecord,
    ) -> Result<InsertOutcome> {
        self.authorize(caller, Collection::Grading).await?;
        let mut inner = self.inner.write().await;
        if inner
            .grading
            .iter()
            .any(|g| g.idempotency_key == record.idempotency_key)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.grading.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_grading_by_key(&self, idempotency_key: &str) -> Result<Option<GradingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .grading
            .iter()
            .find(|g| g.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn get_grading_for_pick(&self, pick_id: &str) -> Result<Option<GradingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.grading.iter().find(|g| g.pick_id == pick_id).cloned())
    }

    // ==================== Ops alerts ====================

    async fn insert_alert(&self, caller: Caller, alert: &OpsAlert) -> Result<()> {
        self.authorize(caller, Collection::OpsAlerts).await?;
        self.inner.write().await.alerts.push(alert.clone());
        Ok(())
    }

    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<OpsAlert>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .iter()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect())
    }

    // ==================== Audit log ====================

    async fn append_audit(
        &self,
        caller: Caller,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.authorize(caller, Collection::AuditLog).await?;
        self.inner
            .write()
            .await
            .audit
            .push((kind.to_string(), payload, Utc::now()));
        Ok(())
    }

    // ==================== Parlay attempts ====================

    async fn insert_parlay_attempt(
        &self,
        caller: Caller,
        attempt: &ParlayAttempt,
    ) -> Result<()> {
        self.authorize(caller, Collection::ParlayAttempts).await?;
        self.inner.write().await.parlay_attempts.push(attempt.clone());
        Ok(())
    }

    async fn parlay_attempts_since(&self, since: DateTime<Utc>) -> Result<Vec<ParlayAttempt>> {
        let inner = self.inner.read().await;
        Ok(inner
            .parlay_attempts
            .iter()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect())
    }

    // ==================== Publish log ====================

    async fn insert_publish_record(
        &self,
        caller: Caller,
        record: &PublishRecord,
    ) -> Result<InsertOutcome> {
        self.authorize(caller, Collection::PublishLog).await?;
        let mut inner = self.inner.write().await;
        if inner
            .publish_log
            .iter()
            .any(|p| p.dedupe_key == record.dedupe_key)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.publish_log.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn mark_publish_posted(
        &self,
        caller: Caller,
        publish_id: &str,
        message_id: &str,
    ) -> Result<()> {
        self.authorize(caller, Collection::PublishLog).await?;
        let mut inner = self.inner.write().await;
        match inner
            .publish_log
            .iter_mut()
            .find(|p| p.publish_id == publish_id)
        {
            Some(record) => {
                record.posted = true;
                record.message_id = Some(message_id.to_string());
                Ok(())
            }
            None => Err(EngineError::NotFound(format!(
                "publish record {}",
                publish_id
            ))),
        }
    }

    async fn has_post_for_signal(&self, signal_id: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.publish_log.iter().any(|p| p.signal_id == signal_id))
    }

    async fn last_post_for(
        &self,
        event_id: &str,
        market_type: MarketType,
    ) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.read().await;
        Ok(inner
            .publish_log
            .iter()
            .filter(|p| p.event_id == event_id && p.market_type == market_type && p.posted)
            .map(|p| p.created_at)
            .max())
    }

    // ==================== Feature flags ====================

    async fn get_flag(&self, name: &str) -> Result<Option<bool>> {
        Ok(self.inner.read().await.flags.get(name).copied())
    }

    async fn set_flag(&self, caller: Caller, name: &str, value: bool) -> Result<()> {
        self.authorize(caller, Collection::FeatureFlags).await?;
        self.inner.write().await.flags.insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{grading_idempotency_key, League, ProviderEventMap, ScorePayloadRef};

    fn event(event_id: &str) -> GameEvent {
        GameEvent {
            event_id: event_id.to_string(),
            league: League::Nba,
            home_team_id: "lal".into(),
            home_team_name: "Lakers".into(),
            away_team_id: "bos".into(),
            away_team_name: "Celtics".into(),
            start_time: Utc::now() + chrono::Duration::hours(6),
            weather: None,
            roster: None,
            provider_event_map: ProviderEventMap::default(),
            completed: false,
        }
    }

    fn grading_record(pick_id: &str) -> GradingRecord {
        GradingRecord {
            pick_id: pick_id.to_string(),
            event_id: "evt-1".into(),
            provider_event_id: "ext-1".into(),
            idempotency_key: grading_idempotency_key(pick_id, "engine", "sr-v1", "clv-v1"),
            settlement: Settlement::Win,
            clv: None,
            score_payload_ref: ScorePayloadRef {
                provider_event_id: "ext-1".into(),
                payload_hash: "abc".into(),
                snapshot: serde_json::json!({}),
            },
            ops_alerts: vec![],
            admin_override: None,
            admin_note: None,
            graded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_write_refused_and_alerted() {
        let store = MemoryStore::new();
        let err = store
            .upsert_event(Caller::Publisher, &event("evt-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::WriterUnauthorized { .. }));

        // the guard recorded the violation
        let alerts = store
            .alerts_since(Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::WriterUnauthorized);

        // and nothing was written
        assert!(store.get_event("evt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grading_insert_is_idempotent() {
        let store = MemoryStore::new();
        let record = grading_record("pick-1");

        let first = store
            .insert_grading(Caller::SettlementEngine, &record)
            .await
            .unwrap();
        let second = store
            .insert_grading(Caller::SettlementEngine, &record)
            .await
            .unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_snapshots_never_overwritten() {
        let store = MemoryStore::new();
        let observed_at = Utc::now();
        let snap = MarketSnapshot {
            event_id: "evt-1".into(),
            wave: Wave::Discovery,
            observed_at,
            spread_home: -5.5,
            spread_away: 5.5,
            total: 224.5,
            over_price: -110,
            under_price: -110,
            ml_home: -220,
            ml_away: 185,
            book_id: "bk".into(),
        };
        store
            .record_snapshot(Caller::OddsPoller, &snap)
            .await
            .unwrap();

        let mut mutated = snap.clone();
        mutated.spread_home = -7.5;
        store
            .record_snapshot(Caller::OddsPoller, &mutated)
            .await
            .unwrap();

        let latest = store.latest_snapshot("evt-1").await.unwrap().unwrap();
        assert_eq!(latest.spread_home, -5.5);
    }

    #[tokio::test]
    async fn test_settlement_field_guard() {
        let store = MemoryStore::new();
        let err = store
            .set_signal_settlement(Caller::SignalMachine, "sig-1", Settlement::Win)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::WriterUnauthorized { .. }));
    }
}
