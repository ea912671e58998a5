//! Operational alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    ProviderIdMissing,
    MappingDrift,
    CloseSnapshotMissing,
    IntegrityViolation,
    WriterUnauthorized,
    EdgeRateCollapse,
    PostValidationFail,
    SimTimeout,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::ProviderIdMissing => "PROVIDER_ID_MISSING",
            AlertKind::MappingDrift => "MAPPING_DRIFT",
            AlertKind::CloseSnapshotMissing => "CLOSE_SNAPSHOT_MISSING",
            AlertKind::IntegrityViolation => "INTEGRITY_VIOLATION",
            AlertKind::WriterUnauthorized => "WRITER_UNAUTHORIZED",
            AlertKind::EdgeRateCollapse => "EDGE_RATE_COLLAPSE",
            AlertKind::PostValidationFail => "POST_VALIDATION_FAIL",
            AlertKind::SimTimeout => "SIM_TIMEOUT",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Open,
    Reconciled,
}

/// Operational alert row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsAlert {
    pub alert_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub event_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub reconciliation_status: ReconciliationStatus,
}

impl OpsAlert {
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        event_id: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4().to_string(),
            kind,
            severity,
            event_id,
            details,
            created_at: Utc::now(),
            reconciliation_status: ReconciliationStatus::Open,
        }
    }
}
