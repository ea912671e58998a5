//! Signal lifecycle records.
//!
//! A signal wraps one (event, market) pick as it moves through the three
//! scheduled waves. Once published, the signal and its frozen entry are
//! immutable; later snapshots go into history but never touch the signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::decision::{Classification, PickSide};
use super::league::League;
use super::market::MarketType;

/// A scheduled evaluation point in an event's lead-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    /// ~T-6h
    Discovery,
    /// ~T-120m
    Validation,
    /// ~T-60m
    Publish,
}

impl Wave {
    pub const ALL: [Wave; 3] = [Wave::Discovery, Wave::Validation, Wave::Publish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Wave::Discovery => "discovery",
            Wave::Validation => "validation",
            Wave::Publish => "publish",
        }
    }

    /// Minutes before start_time at which this wave fires.
    pub fn minutes_before_start(&self) -> i64 {
        match self {
            Wave::Discovery => 360,
            Wave::Validation => 120,
            Wave::Publish => 60,
        }
    }

    pub fn next(&self) -> Option<Wave> {
        match self {
            Wave::Discovery => Some(Wave::Validation),
            Wave::Validation => Some(Wave::Publish),
            Wave::Publish => None,
        }
    }
}

impl fmt::Display for Wave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    New,
    Discovered,
    Validated,
    Published,
    Locked,
    /// Terminal: the pick flipped or drifted between waves
    Unstable,
    /// Terminal: integrity validator blocked a wave
    Voided,
    Settled,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::New => "new",
            SignalStatus::Discovered => "discovered",
            SignalStatus::Validated => "validated",
            SignalStatus::Published => "published",
            SignalStatus::Locked => "locked",
            SignalStatus::Unstable => "unstable",
            SignalStatus::Voided => "voided",
            SignalStatus::Settled => "settled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignalStatus::Unstable | SignalStatus::Voided | SignalStatus::Settled
        )
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the signal is for. Only truth-mode exists today; the variant keeps
/// the wire format forward-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalIntent {
    #[serde(rename = "TRUTH_MODE")]
    TruthMode,
}

/// Entry terms frozen atomically when a signal publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub selection_id: String,
    pub market_type: MarketType,
    pub entry_line: f64,
    pub entry_odds: i32,
    /// Entry odds shifted bettor-worse by the sport tolerance; below this
    /// the publisher drops the signal instead of posting.
    pub worst_acceptable_odds: i32,
    pub locked_at: DateTime<Utc>,
}

/// Outcome of one wave evaluation, recorded on the signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    pub wave: Wave,
    pub snapshot_observed_at: DateTime<Utc>,
    pub sim_run_id: String,
    pub classification: Classification,
    pub pick_side: Option<PickSide>,
    /// Signed edge at this wave (points for spread/total, EV for moneyline)
    pub edge_value: Option<f64>,
    pub selection_id: Option<String>,
    pub line: f64,
    pub odds: i32,
    pub decided_at: DateTime<Utc>,
}

/// Lifecycle container around one (event, market) pick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub event_id: String,
    pub sport: League,
    pub market_type: MarketType,
    pub team_a: String,
    pub team_b: String,
    pub start_time: DateTime<Utc>,
    pub intent: SignalIntent,
    pub status: SignalStatus,
    pub waves: Vec<WaveRecord>,
    pub entry: Option<SignalEntry>,
    pub settlement: Option<super::grading::Settlement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signal {
    pub fn wave_record(&self, wave: Wave) -> Option<&WaveRecord> {
        self.waves.iter().find(|w| w.wave == wave)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
