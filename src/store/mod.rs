//! Storage façade.
//!
//! All shared state (events, snapshots, runs, decisions, signals, grading,
//! alerts, logs, flags) is reached through the `Store` trait. Every write
//! names its caller module and passes through the Writer Matrix; reads are
//! unrestricted. `PgStore` is the production implementation; `MemoryStore`
//! backs dry-run mode and tests.

pub mod memory;
pub mod postgres;
pub mod writer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    GameDecisions, GameEvent, GradingRecord, MarketSnapshot, MarketType, OpsAlert, ParlayAttempt,
    PublishRecord, Settlement, Signal, SignalStatus, SimulationRun, Wave,
};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use writer::{Caller, Collection, WriterMatrix};

/// Outcome of an insert protected by a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same unique key already exists; nothing written
    Duplicate,
}

/// Storage operations used by the engine. Writes take the caller module
/// and are refused unless the Writer Matrix allows the pair.
#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Events ====================

    async fn upsert_event(&self, caller: Caller, event: &GameEvent) -> Result<()>;

    async fn get_event(&self, event_id: &str) -> Result<Option<GameEvent>>;

    async fn mark_event_completed(&self, caller: Caller, event_id: &str) -> Result<()>;

    /// Events whose scheduled start falls in [from, to).
    async fn events_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GameEvent>>;

    // ==================== Market snapshots ====================

    async fn record_snapshot(&self, caller: Caller, snapshot: &MarketSnapshot) -> Result<()>;

    async fn latest_snapshot(&self, event_id: &str) -> Result<Option<MarketSnapshot>>;

    async fn snapshot_at_wave(&self, event_id: &str, wave: Wave)
        -> Result<Option<MarketSnapshot>>;

    /// Last snapshot observed before the event's start time. Absence is
    /// non-fatal; settlement surfaces it as an ops alert and continues.
    async fn closing_snapshot(
        &self,
        event_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<MarketSnapshot>>;

    // ==================== Simulation runs ====================

    async fn insert_sim_run(&self, caller: Caller, run: &SimulationRun) -> Result<()>;

    async fn get_sim_run(&self, sim_run_id: &str) -> Result<Option<SimulationRun>>;

    // ==================== Decisions ====================

    /// Store the full triple atomically; there is no partial refresh.
    async fn store_game_decisions(&self, caller: Caller, decisions: &GameDecisions) -> Result<()>;

    async fn get_game_decisions(&self, event_id: &str) -> Result<Option<GameDecisions>>;

    // ==================== Signals ====================

    async fn upsert_signal(&self, caller: Caller, signal: &Signal) -> Result<()>;

    async fn get_signal(&self, signal_id: &str) -> Result<Option<Signal>>;

    async fn signals_with_status(&self, status: SignalStatus) -> Result<Vec<Signal>>;

    /// Field-level guard on top of the collection allowlist: only the
    /// settlement engine may touch a signal's settlement outcome.
    async fn set_signal_settlement(
        &self,
        caller: Caller,
        signal_id: &str,
        settlement: Settlement,
    ) -> Result<()>;

    // ==================== Grading ====================

    /// Insert unless a record with the same idempotency_key exists.
    async fn insert_grading(&self, caller: Caller, record: &GradingRecord)
        -> Result<InsertOutcome>;

    async fn get_grading_by_key(&self, idempotency_key: &str) -> Result<Option<GradingRecord>>;

    async fn get_grading_for_pick(&self, pick_id: &str) -> Result<Option<GradingRecord>>;

    // ==================== Ops alerts ====================

    async fn insert_alert(&self, caller: Caller, alert: &OpsAlert) -> Result<()>;

    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<OpsAlert>>;

    // ==================== Audit log ====================

    async fn append_audit(
        &self,
        caller: Caller,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<()>;

    // ==================== Parlay attempts ====================

    async fn insert_parlay_attempt(&self, caller: Caller, attempt: &ParlayAttempt) -> Result<()>;

    async fn parlay_attempts_since(&self, since: DateTime<Utc>) -> Result<Vec<ParlayAttempt>>;

    // ==================== Publish log ====================

    /// Insert unless the dedupe key exists (at-most-once send protection).
    /// The publisher reserves the key with `posted = false` before the
    /// outbound send and completes it afterwards.
    async fn insert_publish_record(
        &self,
        caller: Caller,
        record: &PublishRecord,
    ) -> Result<InsertOutcome>;

    /// Complete a reserved publish record after the channel accepted it.
    async fn mark_publish_posted(
        &self,
        caller: Caller,
        publish_id: &str,
        message_id: &str,
    ) -> Result<()>;

    /// Whether any publish attempt exists for the signal, posted or not.
    /// A published signal renders identically forever, so one attempt is
    /// final; failed renders are never retried.
    async fn has_post_for_signal(&self, signal_id: &str) -> Result<bool>;

    /// Most recent posted record for (event, market), for window limits.
    async fn last_post_for(
        &self,
        event_id: &str,
        market_type: MarketType,
    ) -> Result<Option<DateTime<Utc>>>;

    // ==================== Feature flags ====================

    async fn get_flag(&self, name: &str) -> Result<Option<bool>>;

    async fn set_flag(&self, caller: Caller, name: &str, value: bool) -> Result<()>;
}
