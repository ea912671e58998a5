//! Canonical domain records.
//!
//! Every record that crosses a boundary (HTTP, persistence, publisher) is a
//! typed struct defined here. Consumers never compute derived fields; the
//! decision computer is the single producer of edges, picks and fair lines.

pub mod alert;
pub mod decision;
pub mod event;
pub mod grading;
pub mod league;
pub mod market;
pub mod parlay;
pub mod publishing;
pub mod selection;
pub mod signal;
pub mod simulation;

pub use alert::{AlertKind, AlertSeverity, OpsAlert, ReconciliationStatus};
pub use decision::{
    Classification, DecisionDebug, DecisionsMeta, EdgeGrade, EdgeMetrics, GameDecisions,
    MarketDecision, MarketQuote, ModelView, Pick, PickSide, Probabilities, ReleaseStatus,
};
pub use event::{GameEvent, ProviderEventMap, RosterAvailability, Weather};
pub use grading::{grading_idempotency_key, GradingRecord, ScorePayloadRef, Settlement, SettlementMode};
pub use league::{League, SimFamily};
pub use market::{
    american_implied_prob, american_to_decimal, remove_vig_pair, shift_american_worse,
    MarketSnapshot, MarketType,
};
pub use parlay::{
    FailReason, ParlayAttempt, ParlayAudit, ParlayLeg, ParlayOutcome, ParlayProfile,
    ParlayRequest, Tier,
};
pub use publishing::{publish_dedupe_key, rendered_hash, PublishRecord};
pub use selection::{selection_id, SelectionPair, SelectionSide};
pub use signal::{Signal, SignalEntry, SignalIntent, SignalStatus, Wave, WaveRecord};
pub use simulation::{Histogram, SimTier, SimulationRun};
