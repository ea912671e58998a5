//! Three-wave signal state machine.
//!
//! Per (event, market) a signal moves through discovery (~T-6h),
//! validation (~T-120m) and the publish decision (~T-60m):
//!
//! new → discovered → validated → published → locked → settled
//!                  ↘ unstable             ↘ voided (integrity block)
//!
//! Waves are idempotent: re-invoking a completed wave returns the stored
//! run without recomputation. Advancement is serialized per signal_id, and
//! a published signal is immutable: late snapshots go into history only.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, LeagueConfig};
use crate::decision::{DecisionComputer, DecisionInputs, IntegrityValidator};
use crate::domain::{
    shift_american_worse, AlertKind, AlertSeverity, Classification, GameDecisions, GameEvent,
    MarketType, OpsAlert, ReleaseStatus, Signal, SignalEntry, SignalIntent, SignalStatus,
    SimTier, Wave, WaveRecord,
};
use crate::error::{EngineError, Result};
use crate::metrics::EngineMetrics;
use crate::sim::{SimulationEngine, WALL_CLOCK_ABORT};
use crate::store::{Caller, Store};

/// Deterministic signal id for one (event, market).
pub fn signal_id(event_id: &str, market_type: MarketType) -> String {
    format!("sig:{}:{}", event_id, market_type.as_str())
}

pub struct SignalMachine {
    store: Arc<dyn Store>,
    sim_engine: SimulationEngine,
    validator: IntegrityValidator,
    config: Arc<AppConfig>,
    metrics: Arc<EngineMetrics>,
    /// Per-signal advancement locks; a signal is owned by one worker at a time
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SignalMachine {
    pub fn new(store: Arc<dyn Store>, config: Arc<AppConfig>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            store,
            sim_engine: SimulationEngine::new(config.simulation.clone()),
            validator: IntegrityValidator::new(config.publisher.forbidden_phrases.clone()),
            config,
            metrics,
            locks: DashMap::new(),
        }
    }

    fn tier_for(&self, wave: Wave) -> SimTier {
        let raw = match wave {
            Wave::Discovery => &self.config.simulation.discovery_tier,
            Wave::Validation => &self.config.simulation.validation_tier,
            Wave::Publish => &self.config.simulation.publish_tier,
        };
        raw.parse().unwrap_or(SimTier::T25k)
    }

    /// Run one wave for an event: simulate, decide, gate, store the triple,
    /// then advance each market's signal.
    pub async fn evaluate_event_wave(
        &self,
        event: &GameEvent,
        wave: Wave,
    ) -> Result<GameDecisions> {
        self.evaluate_event_wave_with_tier(event, wave, None).await
    }

    /// Same as `evaluate_event_wave`, with an explicit iteration tier
    /// (API-triggered simulation runs override the wave default).
    pub async fn evaluate_event_wave_with_tier(
        &self,
        event: &GameEvent,
        wave: Wave,
        tier_override: Option<SimTier>,
    ) -> Result<GameDecisions> {
        let league_cfg = self
            .config
            .league(event.league)
            .ok_or_else(|| {
                EngineError::ConfigInvalid(format!("no league config for {}", event.league))
            })?
            .clone();

        let snapshot = self
            .store
            .latest_snapshot(&event.event_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("no snapshot for event {}", event.event_id))
            })?;

        // Idempotent simulation: run ids are deterministic in (event, wave,
        // snapshot, config), so a completed wave is a lookup.
        let seed = SimulationEngine::derive_seed(
            &event.event_id,
            wave,
            &snapshot,
            &self.config.simulation.model_version,
        );
        let sim_run_id = format!("sim:{}:{}:{:016x}", event.event_id, wave.as_str(), seed);
        let run = match self.store.get_sim_run(&sim_run_id).await? {
            Some(existing) => {
                debug!("Reusing stored sim run {}", sim_run_id);
                existing
            }
            None => {
                let tier = tier_override.unwrap_or_else(|| self.tier_for(wave));
                let run = self
                    .sim_engine
                    .run(event, &league_cfg, &snapshot, wave, tier)?;
                self.store
                    .insert_sim_run(Caller::SimulationEngine, &run)
                    .await?;
                self.metrics.sim_runs.record();
                if run.regime_adjustments.iter().any(|r| r == WALL_CLOCK_ABORT) {
                    self.store
                        .insert_alert(
                            Caller::SimulationEngine,
                            &OpsAlert::new(
                                AlertKind::SimTimeout,
                                AlertSeverity::Warning,
                                Some(event.event_id.clone()),
                                serde_json::json!({
                                    "sim_run_id": run.sim_run_id,
                                    "iterations_completed": run.iterations,
                                }),
                            ),
                        )
                        .await?;
                }
                run
            }
        };

        let decision_version = self
            .store
            .get_game_decisions(&event.event_id)
            .await?
            .map(|d| d.meta.decision_version + 1)
            .unwrap_or(1);
        let trace_id = Uuid::new_v4().to_string();

        let mut decisions = DecisionComputer::compute(&DecisionInputs {
            event,
            snapshot: &snapshot,
            run: &run,
            league_cfg: &league_cfg,
            config_version: &self.config.config_version,
            provider_name: &self.config.providers.provider_name,
            decision_version,
            trace_id: &trace_id,
        });
        let report = self.validator.validate(&mut decisions, &run);

        for decision in decisions.children() {
            self.metrics.decisions_computed.record();
            if decision.classification == Classification::Edge
                && !decision.release_status.is_blocked()
            {
                self.metrics.edge_decisions.record();
            }
        }
        for blocked in &report.blocked {
            self.metrics.integrity_violations.record();
            for code in &blocked.failures {
                match code.as_str() {
                    "MISSING_SELECTION_ID" => self.metrics.missing_selection_id.record(),
                    "MISSING_SNAPSHOT_HASH" => self.metrics.missing_snapshot_hash.record(),
                    _ => {}
                }
            }
            self.store
                .insert_alert(
                    Caller::IntegrityValidator,
                    &OpsAlert::new(
                        AlertKind::IntegrityViolation,
                        AlertSeverity::Critical,
                        Some(event.event_id.clone()),
                        serde_json::json!({
                            "market_type": blocked.market_type.as_str(),
                            "failures": blocked.failures,
                            "wave": wave.as_str(),
                        }),
                    ),
                )
                .await?;
        }

        self.store
            .store_game_decisions(Caller::DecisionPipeline, &decisions)
            .await?;

        for market_type in MarketType::ALL {
            self.advance_signal(event, market_type, &decisions, wave, &league_cfg)
                .await?;
        }

        Ok(decisions)
    }

    /// Advance one market's signal through `wave`, serialized per signal.
    async fn advance_signal(
        &self,
        event: &GameEvent,
        market_type: MarketType,
        decisions: &GameDecisions,
        wave: Wave,
        league_cfg: &LeagueConfig,
    ) -> Result<()> {
        let Some(decision) = decisions.child(market_type) else {
            return Ok(());
        };
        let sid = signal_id(&event.event_id, market_type);

        let lock = self
            .locks
            .entry(sid.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let existing = self.store.get_signal(&sid).await?;

        // Idempotence and immutability guards
        if let Some(signal) = &existing {
            if signal.wave_record(wave).is_some() {
                debug!("Wave {} already recorded for {}", wave, sid);
                return Ok(());
            }
            if signal.is_terminal()
                || matches!(signal.status, SignalStatus::Published | SignalStatus::Locked)
            {
                // published signals reject later wave runs
                return Ok(());
            }
        }

        let now = Utc::now();
        let record = WaveRecord {
            wave,
            snapshot_observed_at: decision.debug.odds_timestamp,
            sim_run_id: decision.debug.sim_run_id.clone(),
            classification: decision.classification,
            pick_side: decision.pick.as_ref().map(|p| p.side),
            edge_value: decision.edge_value(),
            selection_id: if decision.selection_id.is_empty() {
                None
            } else {
                Some(decision.selection_id.clone())
            },
            line: decision.market.line,
            odds: decision.market.american_odds,
            decided_at: now,
        };
        let blocked = decision.release_status == ReleaseStatus::BlockedByIntegrity;

        match existing {
            None => {
                if wave == Wave::Discovery
                    && !blocked
                    && matches!(
                        decision.classification,
                        Classification::Edge | Classification::Lean
                    )
                {
                    let signal = Signal {
                        signal_id: sid.clone(),
                        event_id: event.event_id.clone(),
                        sport: event.league,
                        market_type,
                        team_a: event.home_team_name.clone(),
                        team_b: event.away_team_name.clone(),
                        start_time: event.start_time,
                        intent: SignalIntent::TruthMode,
                        status: SignalStatus::Discovered,
                        waves: vec![record],
                        entry: None,
                        settlement: None,
                        created_at: now,
                        updated_at: now,
                    };
                    info!("Signal {} discovered ({})", sid, decision.classification);
                    self.store.upsert_signal(Caller::SignalMachine, &signal).await?;
                }
                Ok(())
            }
            Some(mut signal) => {
                if blocked {
                    warn!("Signal {} voided by integrity block at {}", sid, wave);
                    signal.status = SignalStatus::Voided;
                    signal.waves.push(record);
                    signal.updated_at = now;
                    return self.store.upsert_signal(Caller::SignalMachine, &signal).await;
                }

                let next_status = match (signal.status, wave) {
                    (SignalStatus::Discovered, Wave::Validation) => {
                        self.validation_outcome(&signal, &record, league_cfg)
                    }
                    (SignalStatus::Validated, Wave::Publish) => {
                        self.publish_outcome(&signal, &record, decision.classification)
                    }
                    // a wave arriving out of order leaves the status alone
                    _ => signal.status,
                };

                if next_status == SignalStatus::Published {
                    signal.entry = Some(SignalEntry {
                        selection_id: decision.selection_id.clone(),
                        market_type,
                        entry_line: decision.market.line,
                        entry_odds: decision.market.american_odds,
                        worst_acceptable_odds: shift_american_worse(
                            decision.market.american_odds,
                            league_cfg.odds_tolerance_cents,
                        ),
                        locked_at: now,
                    });
                    info!(
                        "Signal {} published: {} at {:+.1} ({})",
                        sid,
                        decision
                            .pick
                            .as_ref()
                            .and_then(|p| p.team_name.as_deref())
                            .unwrap_or(decision.selection_id.as_str()),
                        decision.market.line,
                        decision.market.american_odds,
                    );
                }

                signal.status = next_status;
                signal.waves.push(record);
                signal.updated_at = now;
                self.store.upsert_signal(Caller::SignalMachine, &signal).await
            }
        }
    }

    /// discovered → validated when the wave-2 pick matches wave 1 and the
    /// edge moved less than the sport's stability tolerance; otherwise the
    /// signal is unstable and never publishes.
    fn validation_outcome(
        &self,
        signal: &Signal,
        record: &WaveRecord,
        league_cfg: &LeagueConfig,
    ) -> SignalStatus {
        let Some(discovery) = signal.wave_record(Wave::Discovery) else {
            return SignalStatus::Unstable;
        };
        if !pick_stable(discovery, record, league_cfg, signal.market_type) {
            warn!("Signal {} unstable at validation", signal.signal_id);
            return SignalStatus::Unstable;
        }
        SignalStatus::Validated
    }

    /// validated → published only while the wave-3 run is still EDGE and
    /// still on the wave-2 side.
    fn publish_outcome(
        &self,
        signal: &Signal,
        record: &WaveRecord,
        classification: Classification,
    ) -> SignalStatus {
        let Some(validation) = signal.wave_record(Wave::Validation) else {
            return SignalStatus::Unstable;
        };
        if classification != Classification::Edge {
            debug!(
                "Signal {} not published: classification {} at publish wave",
                signal.signal_id, classification
            );
            return SignalStatus::Unstable;
        }
        if validation.pick_side != record.pick_side {
            return SignalStatus::Unstable;
        }
        SignalStatus::Published
    }

    /// published → locked once the event has started.
    pub async fn lock_started_signals(&self) -> Result<usize> {
        let now = Utc::now();
        let published = self
            .store
            .signals_with_status(SignalStatus::Published)
            .await?;
        let mut locked = 0;
        for mut signal in published {
            if signal.start_time <= now {
                signal.status = SignalStatus::Locked;
                signal.updated_at = now;
                self.store.upsert_signal(Caller::SignalMachine, &signal).await?;
                locked += 1;
            }
        }
        if locked > 0 {
            info!("Locked {} signals at start time", locked);
        }
        Ok(locked)
    }
}

/// Pick-side and edge-drift comparison between consecutive waves.
fn pick_stable(
    prev: &WaveRecord,
    current: &WaveRecord,
    league_cfg: &LeagueConfig,
    market_type: MarketType,
) -> bool {
    if prev.pick_side != current.pick_side {
        return false;
    }
    let tolerance = match market_type {
        MarketType::Spread | MarketType::Total => league_cfg.stability_tolerance_points,
        MarketType::Moneyline => league_cfg.stability_tolerance_ev,
    };
    match (prev.edge_value, current.edge_value) {
        (Some(a), Some(b)) => (a - b).abs() <= tolerance,
        _ => false,
    }
}
