//! Publisher worker.
//!
//! Single worker per outbound channel. Pulls published signals, renders
//! them through the tier's immutable template, gates the text through the
//! copy validator, and posts at most once per signal. Every attempt
//! (posted, dropped, or rejected) lands in the append-only publish log.

pub mod copy_validator;
pub mod telegram;
pub mod template;

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PublisherConfig;
use crate::domain::{
    american_to_decimal, publish_dedupe_key, rendered_hash, AlertKind, AlertSeverity,
    Classification, MarketDecision, MarketSnapshot, MarketType, OpsAlert, PickSide,
    PublishRecord, Signal, SignalEntry, Tier, Wave,
};
use crate::error::Result;
use crate::flags::{FeatureFlags, PUBLISHER_AUTOPUBLISH};
use crate::metrics::EngineMetrics;
use crate::store::{Caller, InsertOutcome, Store};

pub use copy_validator::CopyValidator;
pub use telegram::{NoopSender, OutboundSender, TelegramSender};

/// Drop reasons recorded on unposted attempts.
const REASON_STALE: &str = "STALE_QUEUE_ENTRY";
const REASON_WINDOW: &str = "WINDOW_LIMIT";
const REASON_ODDS_TOLERANCE: &str = "ODDS_BEYOND_TOLERANCE";
const REASON_SELECTION_DRIFT: &str = "SELECTION_DRIFT";
const REASON_NO_DECISION: &str = "DECISION_UNAVAILABLE";

#[derive(Debug, Default, Clone, Copy)]
pub struct PublishSummary {
    pub posted: usize,
    pub dropped: usize,
    pub rejected: usize,
}

struct QueueItem {
    signal: Signal,
    entry: SignalEntry,
    tier: Tier,
    constrained: bool,
}

pub struct Publisher {
    store: Arc<dyn Store>,
    sender: Arc<dyn OutboundSender>,
    flags: Arc<FeatureFlags>,
    config: PublisherConfig,
    metrics: Arc<EngineMetrics>,
    copy_validator: CopyValidator,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn Store>,
        sender: Arc<dyn OutboundSender>,
        flags: Arc<FeatureFlags>,
        config: PublisherConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let copy_validator = CopyValidator::new(config.forbidden_phrases.clone());
        Self {
            store,
            sender,
            flags,
            config,
            metrics,
            copy_validator,
        }
    }

    /// Drain the queue once. Called from the orchestrator's publish loop.
    pub async fn run_once(&self) -> Result<PublishSummary> {
        let mut summary = PublishSummary::default();

        if !self.flags.is_enabled(PUBLISHER_AUTOPUBLISH).await? {
            debug!("publisher_autopublish is off; skipping queue drain");
            return Ok(summary);
        }

        let mut queue = Vec::new();
        for signal in self
            .store
            .signals_with_status(crate::domain::SignalStatus::Published)
            .await?
        {
            if self.store.has_post_for_signal(&signal.signal_id).await? {
                continue;
            }
            let Some(entry) = signal.entry.clone() else {
                continue;
            };
            let tier = signal
                .wave_record(Wave::Publish)
                .map(|r| match r.classification {
                    Classification::Edge => Tier::Edge,
                    _ => Tier::Lean,
                })
                .unwrap_or(Tier::Lean);
            let constrained = self.is_constrained(&signal, &entry).await?;
            queue.push(QueueItem {
                signal,
                entry,
                tier,
                constrained,
            });
        }

        // EDGE before LEAN, unconstrained before constrained, oldest first
        queue.sort_by_key(|item| {
            (
                if item.tier == Tier::Edge { 0u8 } else { 1u8 },
                item.constrained,
                item.entry.locked_at,
            )
        });

        for item in queue {
            match self.publish_one(&item).await {
                Ok(Outcome::Posted) => summary.posted += 1,
                Ok(Outcome::Dropped) => summary.dropped += 1,
                Ok(Outcome::Rejected) => summary.rejected += 1,
                Ok(Outcome::Skipped) => {}
                Err(err) => {
                    warn!("Publish failed for {}: {}", item.signal.signal_id, err);
                    return Err(err);
                }
            }
        }

        Ok(summary)
    }

    /// Whether the market has moved against the entry since lock.
    async fn is_constrained(&self, signal: &Signal, entry: &SignalEntry) -> Result<bool> {
        let Some(latest) = self.store.latest_snapshot(&signal.event_id).await? else {
            return Ok(false);
        };
        let Some(side) = signal.wave_record(Wave::Publish).and_then(|r| r.pick_side) else {
            return Ok(false);
        };
        let current = side_odds(&latest, signal.market_type, side);
        Ok(american_to_decimal(current) < american_to_decimal(entry.entry_odds))
    }

    async fn publish_one(&self, item: &QueueItem) -> Result<Outcome> {
        let signal = &item.signal;
        let entry = &item.entry;
        self.metrics.post_attempts.record();
        let now = Utc::now();

        // freshness gate
        if now - entry.locked_at > Duration::minutes(self.config.freshness_minutes) {
            self.record_unposted(signal, "none", "", REASON_STALE).await?;
            return Ok(Outcome::Dropped);
        }

        // one post per (event, market) per window
        if let Some(last) = self
            .store
            .last_post_for(&signal.event_id, signal.market_type)
            .await?
        {
            if now - last < Duration::minutes(self.config.post_window_minutes) {
                self.record_unposted(signal, "none", "", REASON_WINDOW).await?;
                return Ok(Outcome::Dropped);
            }
        }

        // odds tolerance: past worst acceptable, the pick no longer exists
        // at publishable terms
        if let Some(latest) = self.store.latest_snapshot(&signal.event_id).await? {
            if let Some(side) = signal.wave_record(Wave::Publish).and_then(|r| r.pick_side) {
                let current = side_odds(&latest, signal.market_type, side);
                if american_to_decimal(current)
                    < american_to_decimal(entry.worst_acceptable_odds)
                {
                    self.record_unposted(signal, "none", "", REASON_ODDS_TOLERANCE)
                        .await?;
                    return Ok(Outcome::Dropped);
                }
            }
        }

        // canonical payload
        let decision = match self.frozen_decision(signal, entry).await? {
            FrozenDecision::Ready(decision) => decision,
            FrozenDecision::Missing => {
                self.record_unposted(signal, "none", "", REASON_NO_DECISION).await?;
                return Ok(Outcome::Dropped);
            }
            FrozenDecision::Drifted => {
                self.record_unposted(signal, "none", "", REASON_SELECTION_DRIFT)
                    .await?;
                return Ok(Outcome::Dropped);
            }
        };

        let template = template::template_for(item.tier);
        let Some(text) = template::render(&template, signal, &decision) else {
            self.record_unposted(signal, template.template_id, "", REASON_NO_DECISION)
                .await?;
            return Ok(Outcome::Dropped);
        };
        let text_hash = rendered_hash(&text);

        // copy validator has the final word before the channel
        if let Err(reason) = self.copy_validator.validate(&text, &decision) {
            self.metrics.post_validation_failures.record();
            warn!(
                "Copy validator rejected {} render: {}",
                signal.signal_id, reason
            );
            self.store
                .insert_alert(
                    Caller::Publisher,
                    &OpsAlert::new(
                        AlertKind::PostValidationFail,
                        AlertSeverity::Warning,
                        Some(signal.event_id.clone()),
                        serde_json::json!({
                            "signal_id": signal.signal_id,
                            "template_id": template.template_id,
                            "reason": reason,
                        }),
                    ),
                )
                .await?;
            self.record_unposted(signal, template.template_id, &text_hash, &reason)
                .await?;
            return Ok(Outcome::Rejected);
        }

        // reserve the dedupe key before the send: at-most-once even across
        // a crash between send and completion
        let record = PublishRecord {
            publish_id: Uuid::new_v4().to_string(),
            signal_id: signal.signal_id.clone(),
            event_id: signal.event_id.clone(),
            market_type: signal.market_type,
            template_id: template.template_id.to_string(),
            rendered_hash: text_hash.clone(),
            dedupe_key: publish_dedupe_key(&signal.signal_id, template.template_id, &text_hash),
            posted: false,
            failure_reason: None,
            message_id: None,
            created_at: now,
        };
        match self
            .store
            .insert_publish_record(Caller::Publisher, &record)
            .await?
        {
            InsertOutcome::Inserted => {}
            InsertOutcome::Duplicate => {
                debug!("Dedupe key already reserved for {}", signal.signal_id);
                return Ok(Outcome::Skipped);
            }
        }

        let message_id = self.sender.send(&text).await?;
        self.store
            .mark_publish_posted(Caller::Publisher, &record.publish_id, &message_id)
            .await?;
        info!(
            "Posted {} ({}, message {})",
            signal.signal_id, template.template_id, message_id
        );
        Ok(Outcome::Posted)
    }

    /// The canonical payload for rendering: the stored decision with the
    /// frozen entry terms. A selection that flipped after publish is
    /// drift; the signal is immutable, so the attempt is recorded and the
    /// item dropped.
    async fn frozen_decision(
        &self,
        signal: &Signal,
        entry: &SignalEntry,
    ) -> Result<FrozenDecision> {
        let Some(decisions) = self.store.get_game_decisions(&signal.event_id).await? else {
            return Ok(FrozenDecision::Missing);
        };
        let Some(decision) = decisions.child(signal.market_type) else {
            return Ok(FrozenDecision::Missing);
        };
        if decision.selection_id != entry.selection_id {
            return Ok(FrozenDecision::Drifted);
        }
        let mut frozen = decision.clone();
        frozen.market.line = entry.entry_line;
        frozen.market.american_odds = entry.entry_odds;
        if let Some(pick) = frozen.pick.as_mut() {
            pick.line = entry.entry_line;
        }
        Ok(FrozenDecision::Ready(frozen))
    }

    async fn record_unposted(
        &self,
        signal: &Signal,
        template_id: &str,
        text_hash: &str,
        reason: &str,
    ) -> Result<()> {
        let record = PublishRecord {
            publish_id: Uuid::new_v4().to_string(),
            signal_id: signal.signal_id.clone(),
            event_id: signal.event_id.clone(),
            market_type: signal.market_type,
            template_id: template_id.to_string(),
            rendered_hash: text_hash.to_string(),
            dedupe_key: publish_dedupe_key(&signal.signal_id, template_id, text_hash),
            posted: false,
            failure_reason: Some(reason.to_string()),
            message_id: None,
            created_at: Utc::now(),
        };
        self.store
            .insert_publish_record(Caller::Publisher, &record)
            .await?;
        Ok(())
    }
}

enum Outcome {
    Posted,
    Dropped,
    Rejected,
    Skipped,
}

enum FrozenDecision {
    Ready(MarketDecision),
    Missing,
    Drifted,
}

/// Quoted odds for one side of a snapshot.
fn side_odds(snapshot: &MarketSnapshot, market_type: MarketType, side: PickSide) -> i32 {
    use crate::domain::market::STANDARD_SIDE_PRICE;
    match (market_type, side) {
        (MarketType::Moneyline, PickSide::Home) => snapshot.ml_home,
        (MarketType::Moneyline, PickSide::Away) => snapshot.ml_away,
        (MarketType::Total, PickSide::Over) => snapshot.over_price,
        (MarketType::Total, PickSide::Under) => snapshot.under_price,
        _ => STANDARD_SIDE_PRICE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DecisionDebug, DecisionsMeta, EdgeGrade, EdgeMetrics, GameDecisions, League,
        MarketQuote, ModelView, Pick, Probabilities, ReleaseStatus, SelectionPair,
        SelectionSide, SignalIntent, SignalStatus, WaveRecord,
    };
    use crate::store::MemoryStore;

    fn published_signal(signal_id: &str, locked_minutes_ago: i64, team_a: &str) -> Signal {
        let now = Utc::now();
        Signal {
            signal_id: signal_id.into(),
            event_id: "evt-p".into(),
            sport: League::Nba,
            market_type: MarketType::Spread,
            team_a: team_a.into(),
            team_b: "Celtics".into(),
            start_time: now + Duration::minutes(55),
            intent: SignalIntent::TruthMode,
            status: SignalStatus::Published,
            waves: vec![WaveRecord {
                wave: Wave::Publish,
                snapshot_observed_at: now - Duration::minutes(locked_minutes_ago),
                sim_run_id: "sim-p".into(),
                classification: Classification::Edge,
                pick_side: Some(PickSide::Home),
                edge_value: Some(3.3),
                selection_id: Some("sel-home".into()),
                line: -5.5,
                odds: -110,
                decided_at: now - Duration::minutes(locked_minutes_ago),
            }],
            entry: Some(SignalEntry {
                selection_id: "sel-home".into(),
                market_type: MarketType::Spread,
                entry_line: -5.5,
                entry_odds: -110,
                worst_acceptable_odds: -120,
                locked_at: now - Duration::minutes(locked_minutes_ago),
            }),
            settlement: None,
            created_at: now - Duration::hours(6),
            updated_at: now,
        }
    }

    fn decisions(team_name: &str) -> GameDecisions {
        let now = Utc::now();
        let side = |key: &str, team: &str, line: f64, prob: f64| SelectionSide {
            selection_id: format!("sel-{}", key),
            side_key: key.into(),
            team_id: Some(team.into()),
            line,
            model_prob: prob,
        };
        let decision = MarketDecision {
            league: League::Nba,
            event_id: "evt-p".into(),
            provider_event_id: None,
            market_type: MarketType::Spread,
            selection_id: "sel-home".into(),
            pick: Some(Pick {
                team_id: Some("lal".into()),
                team_name: Some(team_name.into()),
                side: PickSide::Home,
                line: -5.5,
            }),
            market: MarketQuote {
                line: -5.5,
                american_odds: -110,
            },
            model: ModelView {
                fair_line: -8.8,
                win_prob: 0.84,
            },
            probabilities: Probabilities {
                model_prob: 0.84,
                market_implied_prob: 0.5,
            },
            edge: Some(EdgeMetrics {
                edge_points: Some(3.3),
                edge_ev: None,
                edge_grade: EdgeGrade::B,
            }),
            classification: Classification::Edge,
            release_status: ReleaseStatus::Official,
            reasons: vec![],
            debug: DecisionDebug {
                inputs_hash: "hash-p".into(),
                decision_version: 1,
                trace_id: "t".into(),
                computed_at: now,
                odds_timestamp: now,
                sim_run_id: "sim-p".into(),
            },
            validator_failures: vec![],
            sides: SelectionPair {
                primary: side("home", "lal", -5.5, 0.84),
                counter: side("away", "bos", 5.5, 0.16),
            },
        };
        GameDecisions {
            spread: Some(decision),
            moneyline: None,
            total: None,
            meta: DecisionsMeta {
                inputs_hash: "hash-p".into(),
                computed_at: now,
                league: League::Nba,
                event_id: "evt-p".into(),
                decision_version: 1,
            },
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        sender: Arc<NoopSender>,
        publisher: Publisher,
    }

    async fn fixture(signal: Signal, team_name: &str) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_signal(Caller::SignalMachine, &signal)
            .await
            .unwrap();
        store
            .store_game_decisions(Caller::DecisionPipeline, &decisions(team_name))
            .await
            .unwrap();
        let sender = Arc::new(NoopSender::default());
        let flags = Arc::new(FeatureFlags::new(store.clone()));
        let publisher = Publisher::new(
            store.clone(),
            sender.clone(),
            flags,
            crate::config::AppConfig::default_dry_run().publisher,
            Arc::new(EngineMetrics::new()),
        );
        Fixture {
            store,
            sender,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_posts_once_and_records() {
        let f = fixture(published_signal("sig-1", 5, "Lakers"), "Lakers").await;

        let summary = f.publisher.run_once().await.unwrap();
        assert_eq!(summary.posted, 1);
        assert_eq!(f.sender.sent.lock().await.len(), 1);
        assert!(f.store.has_post_for_signal("sig-1").await.unwrap());

        // a second drain is a no-op: at most one post per signal
        let summary = f.publisher.run_once().await.unwrap();
        assert_eq!(summary.posted, 0);
        assert_eq!(f.sender.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_kill_switch_stops_posting() {
        let f = fixture(published_signal("sig-1", 5, "Lakers"), "Lakers").await;
        f.store
            .set_flag(Caller::IntegritySentinel, PUBLISHER_AUTOPUBLISH, false)
            .await
            .unwrap();

        let summary = f.publisher.run_once().await.unwrap();
        assert_eq!(summary.posted, 0);
        assert!(f.sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_entries_dropped_with_reason() {
        let f = fixture(published_signal("sig-1", 45, "Lakers"), "Lakers").await;

        let summary = f.publisher.run_once().await.unwrap();
        assert_eq!(summary.posted, 0);
        assert_eq!(summary.dropped, 1);
        assert!(f.sender.sent.lock().await.is_empty());
        // the drop is recorded, so the signal never retries
        assert!(f.store.has_post_for_signal("sig-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_forbidden_phrase_in_payload_is_rejected() {
        // canonical team name trips the phrase gate; validator blocks
        let f = fixture(
            published_signal("sig-1", 5, "Lock City"),
            "Lock City",
        )
        .await;

        let summary = f.publisher.run_once().await.unwrap();
        assert_eq!(summary.rejected, 1);
        assert!(f.sender.sent.lock().await.is_empty());

        let alerts = f
            .store
            .alerts_since(Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(alerts
            .iter()
            .any(|a| a.kind == AlertKind::PostValidationFail));
    }

    #[tokio::test]
    async fn test_selection_drift_dropped() {
        let mut signal = published_signal("sig-1", 5, "Lakers");
        signal.entry.as_mut().unwrap().selection_id = "sel-other".into();
        let f = fixture(signal, "Lakers").await;

        let summary = f.publisher.run_once().await.unwrap();
        assert_eq!(summary.dropped, 1);
        assert!(f.sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_window_limits_event_market_pair() {
        let f = fixture(published_signal("sig-1", 5, "Lakers"), "Lakers").await;
        // a recent post already exists for this (event, market)
        let prior = PublishRecord {
            publish_id: "prior".into(),
            signal_id: "sig-0".into(),
            event_id: "evt-p".into(),
            market_type: MarketType::Spread,
            template_id: "edge-v1".into(),
            rendered_hash: "other".into(),
            dedupe_key: "other-key".into(),
            posted: true,
            failure_reason: None,
            message_id: Some("m1".into()),
            created_at: Utc::now() - Duration::minutes(10),
        };
        f.store
            .insert_publish_record(Caller::Publisher, &prior)
            .await
            .unwrap();

        let summary = f.publisher.run_once().await.unwrap();
        assert_eq!(summary.posted, 0);
        assert_eq!(summary.dropped, 1);
    }
}
