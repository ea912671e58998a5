//! Integrity sentinel.
//!
//! Polls the engine metrics on a fixed cadence over a rolling window and
//! flips kill switches when violation rates cross their thresholds. The
//! optional rollback controller disables the riskier feature flags in the
//! same sweep.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::audit::AuditService;
use crate::config::SentinelConfig;
use crate::domain::{AlertKind, AlertSeverity, OpsAlert};
use crate::error::Result;
use crate::flags::{
    FeatureFlags, AUTOROLLBACK_ON_INTEGRITY, INTEGRITY_SENTINEL, LLM_COPY_AGENT,
    PARLAY_ENABLED, PUBLISHER_AUTOPUBLISH,
};
use crate::metrics::EngineMetrics;
use crate::store::{Caller, Store};

/// One threshold breach found in a sweep.
#[derive(Debug, Clone)]
pub struct Breach {
    pub metric: &'static str,
    pub rate: f64,
    pub threshold: f64,
    pub severity: AlertSeverity,
}

pub struct IntegritySentinel {
    store: Arc<dyn Store>,
    flags: Arc<FeatureFlags>,
    metrics: Arc<EngineMetrics>,
    audit: Arc<AuditService>,
    config: SentinelConfig,
}

impl IntegritySentinel {
    pub fn new(
        store: Arc<dyn Store>,
        flags: Arc<FeatureFlags>,
        metrics: Arc<EngineMetrics>,
        audit: Arc<AuditService>,
        config: SentinelConfig,
    ) -> Self {
        Self {
            store,
            flags,
            metrics,
            audit,
            config,
        }
    }

    /// One sweep: compute windowed rates, alert on breaches, flip the
    /// autopublish kill switch on any critical breach.
    pub async fn sweep(&self) -> Result<Vec<Breach>> {
        if !self.flags.is_enabled(INTEGRITY_SENTINEL).await? {
            return Ok(Vec::new());
        }

        let breaches = self.evaluate();
        if breaches.is_empty() {
            return Ok(breaches);
        }

        for breach in &breaches {
            warn!(
                "Sentinel breach: {} rate {:.4} over threshold {:.4}",
                breach.metric, breach.rate, breach.threshold
            );
            self.store
                .insert_alert(
                    Caller::IntegritySentinel,
                    &OpsAlert::new(
                        kind_for(breach.metric),
                        breach.severity,
                        None,
                        serde_json::json!({
                            "metric": breach.metric,
                            "rate": breach.rate,
                            "threshold": breach.threshold,
                            "window_secs": self.config.window_secs,
                        }),
                    ),
                )
                .await?;
        }

        if breaches
            .iter()
            .any(|b| b.severity == AlertSeverity::Critical)
        {
            info!("Critical sentinel breach: disabling autopublish");
            self.flags
                .set(Caller::IntegritySentinel, PUBLISHER_AUTOPUBLISH, false)
                .await?;
            self.audit
                .record_sentinel_action(serde_json::json!({
                    "action": "disable_autopublish",
                    "breaches": breaches
                        .iter()
                        .map(|b| b.metric)
                        .collect::<Vec<_>>(),
                }))
                .await?;

            if self.flags.is_enabled(AUTOROLLBACK_ON_INTEGRITY).await? {
                self.rollback().await?;
            }
        }

        Ok(breaches)
    }

    /// Windowed rates against thresholds. Denominator is the decision
    /// count in the same window; an idle window produces no breaches.
    fn evaluate(&self) -> Vec<Breach> {
        let window = Duration::from_secs(self.config.window_secs);
        let decisions = self.metrics.decisions_computed.count_in(window);
        let posts = self.metrics.post_attempts.count_in(window);
        let mut breaches = Vec::new();

        if decisions > 0 {
            let rate =
                |counter: &crate::metrics::WindowedCounter| counter.count_in(window) as f64 / decisions as f64;

            let violation_rate = rate(&self.metrics.integrity_violations);
            if violation_rate > self.config.integrity_violation_rate {
                breaches.push(Breach {
                    metric: "integrity_violation_rate",
                    rate: violation_rate,
                    threshold: self.config.integrity_violation_rate,
                    severity: AlertSeverity::Critical,
                });
            }

            let missing_sel = rate(&self.metrics.missing_selection_id);
            if missing_sel > self.config.missing_selection_id_rate {
                breaches.push(Breach {
                    metric: "missing_selection_id_rate",
                    rate: missing_sel,
                    threshold: self.config.missing_selection_id_rate,
                    severity: AlertSeverity::Critical,
                });
            }

            let missing_hash = rate(&self.metrics.missing_snapshot_hash);
            if missing_hash > self.config.missing_snapshot_hash_rate {
                breaches.push(Breach {
                    metric: "missing_snapshot_hash_rate",
                    rate: missing_hash,
                    threshold: self.config.missing_snapshot_hash_rate,
                    severity: AlertSeverity::Critical,
                });
            }
        }

        if posts > 0 {
            let fail_rate =
                self.metrics.post_validation_failures.count_in(window) as f64 / posts as f64;
            if fail_rate > self.config.post_validation_fail_rate {
                breaches.push(Breach {
                    metric: "post_validation_fail_rate",
                    rate: fail_rate,
                    threshold: self.config.post_validation_fail_rate,
                    severity: AlertSeverity::Critical,
                });
            }
        }

        // edge-rate collapse vs the 30-minute baseline
        let baseline_window = Duration::from_secs(30 * 60);
        let edges_baseline = self.metrics.edge_decisions.count_in(baseline_window);
        let decisions_baseline = self.metrics.decisions_computed.count_in(baseline_window);
        if decisions > 0 && decisions_baseline > 0 && edges_baseline > 0 {
            let edge_rate_now =
                self.metrics.edge_decisions.count_in(window) as f64 / decisions as f64;
            let edge_rate_baseline = edges_baseline as f64 / decisions_baseline as f64;
            let drop = 1.0 - edge_rate_now / edge_rate_baseline;
            if drop > self.config.edge_rate_collapse {
                breaches.push(Breach {
                    metric: "edge_rate_collapse",
                    rate: drop,
                    threshold: self.config.edge_rate_collapse,
                    severity: AlertSeverity::Warning,
                });
            }
        }

        breaches
    }

    /// Rollback controller: disable the risky flags in one sweep. Version
    /// pinning and queue purge happen at deploy tooling level; the flags
    /// are what this process owns.
    async fn rollback(&self) -> Result<()> {
        warn!("Autorollback triggered: disabling risky feature flags");
        for flag in [LLM_COPY_AGENT, PARLAY_ENABLED] {
            self.flags
                .set(Caller::IntegritySentinel, flag, false)
                .await?;
        }
        self.audit
            .record_sentinel_action(serde_json::json!({
                "action": "autorollback",
                "flags_disabled": [LLM_COPY_AGENT, PARLAY_ENABLED],
            }))
            .await
    }
}

fn kind_for(metric: &str) -> AlertKind {
    match metric {
        "edge_rate_collapse" => AlertKind::EdgeRateCollapse,
        "post_validation_fail_rate" => AlertKind::PostValidationFail,
        _ => AlertKind::IntegrityViolation,
    }
}
