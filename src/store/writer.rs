//! Writer Matrix: runtime authorization for collection writes.
//!
//! Every write on the store names its caller module; the matrix refuses
//! writes from callers not on the collection's allowlist with a typed
//! `WriterUnauthorized` error. The allowlist below is the single source of
//! truth and is pinned by `tests/writer_matrix_allowlist.rs`.

use std::fmt;

use crate::error::{EngineError, Result};

/// Persistent collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Events,
    MarketSnapshots,
    SimRuns,
    Decisions,
    Signals,
    Grading,
    OpsAlerts,
    AuditLog,
    ParlayAttempts,
    PublishLog,
    FeatureFlags,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::MarketSnapshots => "market_snapshots",
            Collection::SimRuns => "sim_runs",
            Collection::Decisions => "decisions",
            Collection::Signals => "signals",
            Collection::Grading => "grading",
            Collection::OpsAlerts => "ops_alerts",
            Collection::AuditLog => "audit_log",
            Collection::ParlayAttempts => "parlay_attempts",
            Collection::PublishLog => "publish_log",
            Collection::FeatureFlags => "feature_flags",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modules allowed to appear as write callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caller {
    OddsPoller,
    SimulationEngine,
    DecisionPipeline,
    SignalMachine,
    SettlementEngine,
    ParlayConstructor,
    Publisher,
    IntegrityValidator,
    IntegritySentinel,
    AuditService,
    AdminTool,
}

impl Caller {
    pub fn as_str(&self) -> &'static str {
        match self {
            Caller::OddsPoller => "odds_poller",
            Caller::SimulationEngine => "simulation_engine",
            Caller::DecisionPipeline => "decision_pipeline",
            Caller::SignalMachine => "signal_machine",
            Caller::SettlementEngine => "settlement_engine",
            Caller::ParlayConstructor => "parlay_constructor",
            Caller::Publisher => "publisher",
            Caller::IntegrityValidator => "integrity_validator",
            Caller::IntegritySentinel => "integrity_sentinel",
            Caller::AuditService => "audit_service",
            Caller::AdminTool => "admin_tool",
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical allowlist. One row per collection.
const ALLOWLIST: &[(Collection, &[Caller])] = &[
    (Collection::Events, &[Caller::OddsPoller, Caller::SettlementEngine, Caller::AdminTool]),
    (Collection::MarketSnapshots, &[Caller::OddsPoller]),
    (Collection::SimRuns, &[Caller::SimulationEngine]),
    (Collection::Decisions, &[Caller::DecisionPipeline]),
    (Collection::Signals, &[Caller::SignalMachine, Caller::Publisher, Caller::SettlementEngine]),
    (Collection::Grading, &[Caller::SettlementEngine]),
    (
        Collection::OpsAlerts,
        &[
            Caller::IntegrityValidator,
            Caller::IntegritySentinel,
            Caller::SettlementEngine,
            Caller::Publisher,
            Caller::SimulationEngine,
        ],
    ),
    (Collection::AuditLog, &[Caller::AuditService]),
    (Collection::ParlayAttempts, &[Caller::ParlayConstructor]),
    (Collection::PublishLog, &[Caller::Publisher]),
    (Collection::FeatureFlags, &[Caller::IntegritySentinel, Caller::AdminTool]),
];

/// Per-collection allowlist, loaded at startup and enforced on every write.
#[derive(Debug, Clone)]
pub struct WriterMatrix {
    rows: &'static [(Collection, &'static [Caller])],
}

impl WriterMatrix {
    pub fn canonical() -> Self {
        Self { rows: ALLOWLIST }
    }

    pub fn allowed_writers(&self, collection: Collection) -> &'static [Caller] {
        self.rows
            .iter()
            .find(|(c, _)| *c == collection)
            .map(|(_, writers)| *writers)
            .unwrap_or(&[])
    }

    /// Refuse the write unless the caller is on the collection's allowlist.
    pub fn authorize(&self, caller: Caller, collection: Collection) -> Result<()> {
        if self.allowed_writers(collection).contains(&caller) {
            Ok(())
        } else {
            Err(EngineError::WriterUnauthorized {
                caller: caller.to_string(),
                collection: collection.to_string(),
            })
        }
    }
}

impl Default for WriterMatrix {
    fn default() -> Self {
        Self::canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grading_is_settlement_only() {
        let matrix = WriterMatrix::canonical();
        assert!(matrix
            .authorize(Caller::SettlementEngine, Collection::Grading)
            .is_ok());
        for caller in [
            Caller::OddsPoller,
            Caller::SignalMachine,
            Caller::Publisher,
            Caller::AuditService,
            Caller::AdminTool,
        ] {
            let err = matrix.authorize(caller, Collection::Grading).unwrap_err();
            assert!(matches!(
                err,
                crate::error::EngineError::WriterUnauthorized { .. }
            ));
        }
    }

    #[test]
    fn test_audit_log_single_writer() {
        let matrix = WriterMatrix::canonical();
        assert_eq!(
            matrix.allowed_writers(Collection::AuditLog),
            &[Caller::AuditService]
        );
    }

    #[test]
    fn test_signal_writers() {
        let matrix = WriterMatrix::canonical();
        assert!(matrix
            .authorize(Caller::SignalMachine, Collection::Signals)
            .is_ok());
        assert!(matrix.authorize(Caller::Publisher, Collection::Signals).is_ok());
        assert!(matrix
            .authorize(Caller::DecisionPipeline, Collection::Signals)
            .is_err());
    }
}
