//! Audit service.
//!
//! The only writer of the append-only audit log. Mirrors decision
//! snapshots, parlay attempts, grading outcomes and sentinel actions for
//! later settlement review and model calibration.

use std::sync::Arc;

use crate::domain::{GameDecisions, GradingRecord, ParlayAttempt};
use crate::error::Result;
use crate::store::{Caller, Store};

pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record_decisions(&self, decisions: &GameDecisions) -> Result<()> {
        self.store
            .append_audit(
                Caller::AuditService,
                "decision_snapshot",
                serde_json::to_value(decisions)?,
            )
            .await
    }

    pub async fn record_parlay_attempt(&self, attempt: &ParlayAttempt) -> Result<()> {
        self.store
            .append_audit(
                Caller::AuditService,
                "parlay_attempt",
                serde_json::to_value(attempt)?,
            )
            .await
    }

    pub async fn record_grading(&self, record: &GradingRecord) -> Result<()> {
        self.store
            .append_audit(
                Caller::AuditService,
                "grading_record",
                serde_json::to_value(record)?,
            )
            .await
    }

    pub async fn record_sentinel_action(&self, action: serde_json::Value) -> Result<()> {
        self.store
            .append_audit(Caller::AuditService, "sentinel_action", action)
            .await
    }

    /// Nightly calibration snapshot: predicted-probability buckets against
    /// realized win rates over settled picks.
    pub async fn record_calibration(&self, snapshot: serde_json::Value) -> Result<()> {
        self.store
            .append_audit(Caller::AuditService, "calibration_snapshot", snapshot)
            .await
    }
}
