//! Store-level integrity checker.
//!
//! Runs invariant checks against the database and prints a pass/fail
//! report. Wired to `edgeline integrity-check`; exit code 3 on failure.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::Row;
use tracing::{info, warn};

use crate::error::Result;

/// Result of a single integrity check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub count: i64,
    pub detail: Option<String>,
}

/// Full integrity report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub healthy: bool,
    pub checks: Vec<CheckResult>,
}

impl std::fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.healthy { "HEALTHY" } else { "UNHEALTHY" };
        writeln!(f, "=== Store Integrity Report: {} ===", status)?;
        for check in &self.checks {
            let icon = if check.ok { "OK" } else { "FAIL" };
            write!(f, "  [{:>4}] {} (count: {})", icon, check.name, check.count)?;
            if let Some(ref detail) = check.detail {
                write!(f, " | {}", detail)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub struct IntegrityChecker {
    pool: PgPool,
}

impl IntegrityChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the full check suite.
    pub async fn run_full_check(&self) -> Result<IntegrityReport> {
        let mut checks = Vec::new();
        checks.push(self.duplicate_grading_keys().await?);
        checks.push(self.published_signals_without_entry().await?);
        checks.push(self.blocked_decisions_with_pick().await?);
        checks.push(self.clv_null_without_alert().await?);

        let healthy = checks.iter().all(|c| c.ok);
        let report = IntegrityReport { healthy, checks };

        if healthy {
            info!("Integrity check passed: all checks OK");
        } else {
            warn!("Integrity check found issues");
        }
        Ok(report)
    }

    /// grading.idempotency_key is the primary key, so duplicates can only
    /// appear through out-of-band writes; zero is the invariant.
    async fn duplicate_grading_keys(&self) -> Result<CheckResult> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM (
                SELECT doc->>'pick_id' AS pick_id
                FROM grading
                GROUP BY doc->>'pick_id', doc->>'idempotency_key'
                HAVING COUNT(*) > 1
            ) duplicates
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("n");
        Ok(CheckResult {
            name: "duplicate_grading_keys".into(),
            ok: count == 0,
            count,
            detail: None,
        })
    }

    async fn published_signals_without_entry(&self) -> Result<CheckResult> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM signals
            WHERE status IN ('published', 'locked', 'settled')
              AND doc->'entry' = 'null'::jsonb
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("n");
        Ok(CheckResult {
            name: "published_signals_without_entry".into(),
            ok: count == 0,
            count,
            detail: None,
        })
    }

    /// Blocked markets must serve a null pick and non-empty failures.
    async fn blocked_decisions_with_pick(&self) -> Result<CheckResult> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM decisions,
                 jsonb_each(doc) AS child(market, decision)
            WHERE market IN ('spread', 'moneyline', 'total')
              AND decision->>'release_status' LIKE 'BLOCKED_%'
              AND (decision->'pick' <> 'null'::jsonb
                   OR decision->'validator_failures' = '[]'::jsonb)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("n");
        Ok(CheckResult {
            name: "blocked_decisions_with_pick".into(),
            ok: count == 0,
            count,
            detail: None,
        })
    }

    /// Every null-CLV grade must have a CLOSE_SNAPSHOT_MISSING alert for
    /// its event.
    async fn clv_null_without_alert(&self) -> Result<CheckResult> {
        let rows = sqlx::query(
            r#"
            SELECT g.pick_id
            FROM grading g
            WHERE g.doc->'clv' = 'null'::jsonb
              AND NOT EXISTS (
                  SELECT 1 FROM ops_alerts a
                  WHERE a.kind = 'CLOSE_SNAPSHOT_MISSING'
                    AND a.event_id = g.event_id
              )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let count = rows.len() as i64;
        let detail = if count > 0 {
            let ids: Vec<String> = rows
                .iter()
                .take(5)
                .map(|r| r.get::<String, _>("pick_id"))
                .collect();
            Some(format!("Unalerted null-CLV picks (first 5): {}", ids.join(", ")))
        } else {
            None
        };
        Ok(CheckResult {
            name: "clv_null_without_alert".into(),
            ok: count == 0,
            count,
            detail,
        })
    }
}
