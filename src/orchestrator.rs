//! Orchestrator.
//!
//! Owns every periodic loop: per-league odds polling, wave timers,
//! publisher drain, settlement sweep, sentinel cadence, and the nightly
//! calibration snapshot. Drives the components; never bypasses them.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::audit::AuditService;
use crate::config::AppConfig;
use crate::domain::{League, SignalStatus, Wave};
use crate::error::Result;
use crate::metrics::EngineMetrics;
use crate::providers::{backoff_delay, OddsApiClient};
use crate::publish::Publisher;
use crate::sentinel::IntegritySentinel;
use crate::settlement::SettlementEngine;
use crate::signals::SignalMachine;
use crate::store::{Caller, Store};

pub struct Orchestrator {
    store: Arc<dyn Store>,
    config: Arc<AppConfig>,
    odds: Arc<OddsApiClient>,
    machine: Arc<SignalMachine>,
    publisher: Arc<Publisher>,
    settlement: Arc<SettlementEngine>,
    sentinel: Arc<IntegritySentinel>,
    audit: Arc<AuditService>,
    metrics: Arc<EngineMetrics>,
    /// Waves already evaluated this process; the machine is idempotent,
    /// this just keeps the timers from re-running completed waves.
    completed_waves: DashSet<(String, Wave)>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        odds: Arc<OddsApiClient>,
        machine: Arc<SignalMachine>,
        publisher: Arc<Publisher>,
        settlement: Arc<SettlementEngine>,
        sentinel: Arc<IntegritySentinel>,
        audit: Arc<AuditService>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            config,
            odds,
            machine,
            publisher,
            settlement,
            sentinel,
            audit,
            metrics,
            completed_waves: DashSet::new(),
        }
    }

    /// Spawn all worker loops; they stop when `shutdown` flips true.
    pub fn spawn_loops(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        for league in League::ALL {
            let orchestrator = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut failures = 0u32;
                let poll = Duration::from_secs(orchestrator.config.orchestrator.odds_poll_secs);
                loop {
                    let delay = if failures == 0 {
                        poll
                    } else {
                        backoff_delay(
                            failures,
                            orchestrator.config.providers.backoff_min_secs,
                            orchestrator.config.providers.backoff_max_secs,
                        )
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break,
                    }
                    match orchestrator.poll_league_once(league).await {
                        Ok(count) => {
                            failures = 0;
                            debug!("Polled {}: {} events", league, count);
                        }
                        Err(err) => {
                            failures += 1;
                            warn!("Odds poll {} failed (attempt {}): {}", league, failures, err);
                        }
                    }
                }
            });
        }

        self.spawn_interval(
            shutdown.clone(),
            Duration::from_secs(self.config.orchestrator.wave_check_secs),
            "wave timer",
            |o| async move { o.wave_tick().await },
        );
        self.spawn_interval(
            shutdown.clone(),
            Duration::from_secs(self.config.orchestrator.wave_check_secs),
            "publisher",
            |o| async move {
                o.machine.lock_started_signals().await?;
                o.publisher.run_once().await.map(|_| ())
            },
        );
        self.spawn_interval(
            shutdown.clone(),
            Duration::from_secs(self.config.orchestrator.settlement_sweep_secs),
            "settlement sweep",
            |o| async move { o.settlement_sweep().await },
        );
        self.spawn_interval(
            shutdown.clone(),
            Duration::from_secs(self.config.sentinel.cadence_secs),
            "integrity sentinel",
            |o| async move { o.sentinel.sweep().await.map(|_| ()) },
        );
        self.spawn_interval(
            shutdown,
            Duration::from_secs(3600),
            "calibration",
            |o| async move { o.calibration_tick().await },
        );

        info!("Orchestrator loops spawned");
    }

    fn spawn_interval<F, Fut>(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        period: Duration,
        name: &'static str,
        task: F,
    ) where
        F: Fn(Arc<Self>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }
                if let Err(err) = task(orchestrator.clone()).await {
                    // an unauthorized write is a programming defect; the
                    // worker must not keep running on top of it
                    if matches!(err, crate::error::EngineError::WriterUnauthorized { .. }) {
                        error!("{} worker stopped on writer violation: {}", name, err);
                        break;
                    }
                    error!("{} tick failed: {}", name, err);
                }
            }
        });
    }

    /// One odds poll for a league: upsert events, append snapshots.
    pub async fn poll_league_once(&self, league: League) -> Result<usize> {
        let polled = self.odds.fetch_odds(league).await?;
        let count = polled.len();
        for item in polled {
            // the completion flag is owned by settlement; polling never
            // resurrects a completed event
            if let Some(existing) = self.store.get_event(&item.event.event_id).await? {
                if existing.completed {
                    continue;
                }
            }
            self.store.upsert_event(Caller::OddsPoller, &item.event).await?;
            if let Some(snapshot) = item.snapshot {
                self.store
                    .record_snapshot(Caller::OddsPoller, &snapshot)
                    .await?;
            }
        }
        Ok(count)
    }

    /// Fire any wave whose boundary has passed for upcoming events.
    pub async fn wave_tick(&self) -> Result<()> {
        let now = Utc::now();
        let horizon = now + ChronoDuration::minutes(Wave::Discovery.minutes_before_start());
        let events = self.store.events_starting_between(now, horizon).await?;

        for event in events {
            for wave in Wave::ALL {
                let due_at =
                    event.start_time - ChronoDuration::minutes(wave.minutes_before_start());
                if now < due_at {
                    continue;
                }
                let key = (event.event_id.clone(), wave);
                if self.completed_waves.contains(&key) {
                    continue;
                }
                match self.machine.evaluate_event_wave(&event, wave).await {
                    Ok(decisions) => {
                        self.completed_waves.insert(key);
                        self.audit.record_decisions(&decisions).await?;
                        debug!("Wave {} evaluated for {}", wave, event.event_id);
                    }
                    Err(err) if matches!(err, crate::error::EngineError::NotFound(_)) => {
                        // no snapshot yet; retry next tick
                        debug!("Wave {} deferred for {}: {}", wave, event.event_id, err);
                    }
                    Err(err) => {
                        warn!("Wave {} failed for {}: {}", wave, event.event_id, err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Grade locked signals whose games have finished. GameNotCompleted is
    /// expected and retried on the next sweep.
    pub async fn settlement_sweep(&self) -> Result<()> {
        let locked = self.store.signals_with_status(SignalStatus::Locked).await?;
        for signal in locked {
            match self.settlement.grade(&signal.signal_id, None, None).await {
                Ok(record) => {
                    self.audit.record_grading(&record).await?;
                }
                Err(err) if err.is_retryable() => {
                    debug!("Grade deferred for {}: {}", signal.signal_id, err);
                }
                Err(err) => {
                    warn!("Grade failed for {}: {}", signal.signal_id, err);
                }
            }
        }
        Ok(())
    }

    /// Nightly calibration snapshot over settled signals.
    pub async fn calibration_tick(&self) -> Result<()> {
        let now = Utc::now();
        if now.format("%H").to_string()
            != format!("{:02}", self.config.orchestrator.calibration_hour_utc)
        {
            return Ok(());
        }
        let settled = self.store.signals_with_status(SignalStatus::Settled).await?;
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut pushes = 0usize;
        let mut voids = 0usize;
        for signal in &settled {
            match signal.settlement {
                Some(crate::domain::Settlement::Win) => wins += 1,
                Some(crate::domain::Settlement::Loss) => losses += 1,
                Some(crate::domain::Settlement::Push) => pushes += 1,
                Some(crate::domain::Settlement::Void) => voids += 1,
                None => {}
            }
        }
        self.audit
            .record_calibration(serde_json::json!({
                "date": now.format("%Y-%m-%d").to_string(),
                "settled": settled.len(),
                "wins": wins,
                "losses": losses,
                "pushes": pushes,
                "voids": voids,
                "gradings_total": self.metrics.gradings_completed.total(),
            }))
            .await?;
        info!("Calibration snapshot recorded ({} settled)", settled.len());
        Ok(())
    }
}
