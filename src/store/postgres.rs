//! PostgreSQL storage implementation.
//!
//! Canonical records are persisted as JSONB documents beside their key
//! columns; each write is atomic at the document level. The Writer Matrix
//! is enforced on every write before the query runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{info, warn};

use crate::domain::{
    AlertKind, AlertSeverity, GameDecisions, GameEvent, GradingRecord, MarketSnapshot, MarketType,
    OpsAlert, ParlayAttempt, PublishRecord, Settlement, Signal, SignalStatus, SimulationRun, Wave,
};
use crate::error::{EngineError, Result};

use super::writer::{Caller, Collection, WriterMatrix};
use super::{InsertOutcome, Store};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    matrix: WriterMatrix,
}

impl PgStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self {
            pool,
            matrix: WriterMatrix::canonical(),
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            matrix: WriterMatrix::canonical(),
        }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn authorize(&self, caller: Caller, collection: Collection) -> Result<()> {
        match self.matrix.authorize(caller, collection) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    "Writer matrix refused {} -> {}",
                    caller.as_str(),
                    collection.as_str()
                );
                let alert = OpsAlert::new(
                    AlertKind::WriterUnauthorized,
                    AlertSeverity::Critical,
                    None,
                    serde_json::json!({
                        "caller": caller.as_str(),
                        "collection": collection.as_str(),
                    }),
                );
                // The guard records its own violation row.
                let _ = self.insert_alert_row(&alert).await;
                Err(err)
            }
        }
    }

    async fn insert_alert_row(&self, alert: &OpsAlert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ops_alerts (alert_id, kind, severity, event_id, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (alert_id) DO NOTHING
            "#,
        )
        .bind(&alert.alert_id)
        .bind(alert.kind.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.event_id)
        .bind(alert.created_at)
        .bind(serde_json::to_value(alert)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(doc: serde_json::Value) -> Result<T> {
        serde_json::from_value(doc).map_err(EngineError::from)
    }
}

#[async_trait]
impl Store for PgStore {
    // ==================== Events ====================

    async fn upsert_event(&self, caller: Caller, event: &GameEvent) -> Result<()> {
        self.authorize(caller, Collection::Events).await?;
        sqlx::query(
            r#"
            INSERT INTO events (event_id, league, start_time, completed, doc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO UPDATE SET
                completed = EXCLUDED.completed,
                doc = EXCLUDED.doc
            "#,
        )
        .bind(&event.event_id)
        .bind(event.league.as_str())
        .bind(event.start_time)
        .bind(event.completed)
        .bind(serde_json::to_value(event)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<GameEvent>> {
        let row = sqlx::query("SELECT doc FROM events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    async fn mark_event_completed(&self, caller: Caller, event_id: &str) -> Result<()> {
        self.authorize(caller, Collection::Events).await?;
        let result = sqlx::query(
            r#"
            UPDATE events
            SET completed = TRUE,
                doc = jsonb_set(doc, '{completed}', 'true')
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("event {}", event_id)));
        }
        Ok(())
    }

    async fn events_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GameEvent>> {
        let rows = sqlx::query(
            "SELECT doc FROM events WHERE start_time >= $1 AND start_time < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| Self::decode(r.get("doc")))
            .collect()
    }

    // ==================== Market snapshots ====================

    async fn record_snapshot(&self, caller: Caller, snapshot: &MarketSnapshot) -> Result<()> {
        self.authorize(caller, Collection::MarketSnapshots).await?;
        // keyed (event_id, observed_at); re-observations are dropped, never overwritten
        sqlx::query(
            r#"
            INSERT INTO market_snapshots (event_id, wave, observed_at, doc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id, observed_at) DO NOTHING
            "#,
        )
        .bind(&snapshot.event_id)
        .bind(snapshot.wave.as_str())
        .bind(snapshot.observed_at)
        .bind(serde_json::to_value(snapshot)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_snapshot(&self, event_id: &str) -> Result<Option<MarketSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM market_snapshots
            WHERE event_id = $1
            ORDER BY observed_at DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    async fn snapshot_at_wave(
        &self,
        event_id: &str,
        wave: Wave,
    ) -> Result<Option<MarketSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM market_snapshots
            WHERE event_id = $1 AND wave = $2
            ORDER BY observed_at DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(wave.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    async fn closing_snapshot(
        &self,
        event_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<MarketSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM market_snapshots
            WHERE event_id = $1 AND observed_at < $2
            ORDER BY observed_at DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(start_time)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    // ==================== Simulation runs ====================

    async fn insert_sim_run(&self, caller: Caller, run: &SimulationRun) -> Result<()> {
        self.authorize(caller, Collection::SimRuns).await?;
        sqlx::query(
            r#"
            INSERT INTO sim_runs (sim_run_id, event_id, wave, created_at, doc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (sim_run_id) DO NOTHING
            "#,
        )
        .bind(&run.sim_run_id)
        .bind(&run.event_id)
        .bind(run.wave.as_str())
        .bind(run.created_at)
        .bind(serde_json::to_value(run)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_sim_run(&self, sim_run_id: &str) -> Result<Option<SimulationRun>> {
        let row = sqlx::query("SELECT doc FROM sim_runs WHERE sim_run_id = $1")
            .bind(sim_run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    // ==================== Decisions ====================

    async fn store_game_decisions(
        &self,
        caller: Caller,
        decisions: &GameDecisions,
    ) -> Result<()> {
        self.authorize(caller, Collection::Decisions).await?;
        // whole-triple swap; there is no per-market update path
        sqlx::query(
            r#"
            INSERT INTO decisions (event_id, inputs_hash, decision_version, updated_at, doc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO UPDATE SET
                inputs_hash = EXCLUDED.inputs_hash,
                decision_version = EXCLUDED.decision_version,
                updated_at = EXCLUDED.updated_at,
                doc = EXCLUDED.doc
            WHERE decisions.decision_version <= EXCLUDED.decision_version
            "#,
        )
        .bind(&decisions.meta.event_id)
        .bind(&decisions.meta.inputs_hash)
        .bind(decisions.meta.decision_version as i64)
        .bind(decisions.meta.computed_at)
        .bind(serde_json::to_value(decisions)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_game_decisions(&self, event_id: &str) -> Result<Option<GameDecisions>> {
        let row = sqlx::query("SELECT doc FROM decisions WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    // ==================== Signals ====================

    async fn upsert_signal(&self, caller: Caller, signal: &Signal) -> Result<()> {
        self.authorize(caller, Collection::Signals).await?;
        sqlx::query(
            r#"
            INSERT INTO signals (signal_id, event_id, status, start_time, updated_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (signal_id) DO UPDATE SET
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                doc = EXCLUDED.doc
            "#,
        )
        .bind(&signal.signal_id)
        .bind(&signal.event_id)
        .bind(signal.status.as_str())
        .bind(signal.start_time)
        .bind(signal.updated_at)
        .bind(serde_json::to_value(signal)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_signal(&self, signal_id: &str) -> Result<Option<Signal>> {
        let row = sqlx::query("SELECT doc FROM signals WHERE signal_id = $1")
            .bind(signal_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    async fn signals_with_status(&self, status: SignalStatus) -> Result<Vec<Signal>> {
        let rows = sqlx::query(
            "SELECT doc FROM signals WHERE status = $1 ORDER BY start_time",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| Self::decode(r.get("doc")))
            .collect()
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
        let result = sqlx::query(
            r#"
            UPDATE signals
            SET status = 'settled',
                updated_at = NOW(),
                doc = jsonb_set(
                    jsonb_set(doc, '{settlement}', to_jsonb($2::text)),
                    '{status}', '"settled"'
                )
            WHERE signal_id = $1
            "#,
        )
        .bind(signal_id)
        .bind(settlement.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("signal {}", signal_id)));
        }
        Ok(())
    }

    // ==================== Grading ====================

    async fn insert_grading(
        &self,
        caller: Caller,
        record: &GradingRecord,
    ) -> Result<InsertOutcome> {
        self.authorize(caller, Collection::Grading).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO grading (idempotency_key, pick_id, event_id, graded_at, doc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING idempotency_key
            "#,
        )
        .bind(&record.idempotency_key)
        .bind(&record.pick_id)
        .bind(&record.event_id)
        .bind(record.graded_at)
        .bind(serde_json::to_value(record)?)
        .fetch_optional(&self.pool)
        .await?;

        Ok(if result.is_some() {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    async fn get_grading_by_key(&self, idempotency_key: &str) -> Result<Option<GradingRecord>> {
        let row = sqlx::query("SELECT doc FROM grading WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    async fn get_grading_for_pick(&self, pick_id: &str) -> Result<Option<GradingRecord>> {
        let row = sqlx::query(
            "SELECT doc FROM grading WHERE pick_id = $1 ORDER BY graded_at DESC LIMIT 1",
        )
        .bind(pick_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::decode(r.get("doc"))).transpose()
    }

    // ==================== Ops alerts ====================

    async fn insert_alert(&self, caller: Caller, alert: &OpsAlert) -> Result<()> {
        self.authorize(caller, Collection::OpsAlerts).await?;
        self.insert_alert_row(alert).await
    }

    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<OpsAlert>> {
        let rows = sqlx::query(
            "SELECT doc FROM ops_alerts WHERE created_at >= $1 ORDER BY created_at",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| Self::decode(r.get("doc")))
            .collect()
    }

    // ==================== Audit log ====================

    async fn append_audit(
        &self,
        caller: Caller,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.authorize(caller, Collection::AuditLog).await?;
        sqlx::query("INSERT INTO audit_log (kind, payload, created_at) VALUES ($1, $2, $3)")
            .bind(kind)
            .bind(payload)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Parlay attempts ====================

    async fn insert_parlay_attempt(
        &self,
        caller: Caller,
        attempt: &ParlayAttempt,
    ) -> Result<()> {
        self.authorize(caller, Collection::ParlayAttempts).await?;
        sqlx::query(
            r#"
            INSERT INTO parlay_attempts (attempt_id, created_at, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (attempt_id) DO NOTHING
            "#,
        )
        .bind(&attempt.attempt_id)
        .bind(attempt.created_at)
        .bind(serde_json::to_value(attempt)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn parlay_attempts_since(&self, since: DateTime<Utc>) -> Result<Vec<ParlayAttempt>> {
        let rows = sqlx::query(
            "SELECT doc FROM parlay_attempts WHERE created_at >= $1 ORDER BY created_at",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| Self::decode(r.get("doc")))
            .collect()
    }

    // ==================== Publish log ====================

    async fn insert_publish_record(
        &self,
        caller: Caller,
        record: &PublishRecord,
    ) -> Result<InsertOutcome> {
        self.authorize(caller, Collection::PublishLog).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO publish_log
                (publish_id, dedupe_key, signal_id, event_id, market_type, posted, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING publish_id
            "#,
        )
        .bind(&record.publish_id)
        .bind(&record.dedupe_key)
        .bind(&record.signal_id)
        .bind(&record.event_id)
        .bind(record.market_type.as_str())
        .bind(record.posted)
        .bind(record.created_at)
        .bind(serde_json::to_value(record)?)
        .fetch_optional(&self.pool)
        .await?;

        Ok(if result.is_some() {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    async fn mark_publish_posted(
        &self,
        caller: Caller,
        publish_id: &str,
        message_id: &str,
    ) -> Result<()> {
        self.authorize(caller, Collection::PublishLog).await?;
        let result = sqlx::query(
            r#"
            UPDATE publish_log
            SET posted = TRUE,
                doc = jsonb_set(
                    jsonb_set(doc, '{posted}', 'true'),
                    '{message_id}', to_jsonb($2::text)
                )
            WHERE publish_id = $1
            "#,
        )
        .bind(publish_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "publish record {}",
                publish_id
            )));
        }
        Ok(())
    }

    async fn has_post_for_signal(&self, signal_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM publish_log WHERE signal_id = $1")
            .bind(signal_id)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("n");
        Ok(count > 0)
    }

    async fn last_post_for(
        &self,
        event_id: &str,
        market_type: MarketType,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(created_at) AS last_post
            FROM publish_log
            WHERE event_id = $1 AND market_type = $2 AND posted
            "#,
        )
        .bind(event_id)
        .bind(market_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("last_post").ok())
    }

    // ==================== Feature flags ====================

    async fn get_flag(&self, name: &str) -> Result<Option<bool>> {
        let row = sqlx::query("SELECT value FROM feature_flags WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn set_flag(&self, caller: Caller, name: &str, value: bool) -> Result<()> {
        self.authorize(caller, Collection::FeatureFlags).await?;
        sqlx::query(
            r#"
            INSERT INTO feature_flags (name, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
