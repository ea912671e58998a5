//! Engine metrics.
//!
//! Lifetime totals for the Prometheus export plus short-window event
//! counters the integrity sentinel polls for its rate thresholds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Retention for windowed counters; longest consumer is the sentinel's
/// 30-minute edge-rate baseline.
const RETENTION: Duration = Duration::from_secs(45 * 60);

/// Counter that answers "how many events in the last N seconds".
pub struct WindowedCounter {
    total: AtomicU64,
    events: Mutex<VecDeque<Instant>>,
}

impl WindowedCounter {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut events = self.events.lock().expect("metrics mutex");
        events.push_back(now);
        while let Some(front) = events.front() {
            if now.duration_since(*front) > RETENTION {
                events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn count_in(&self, window: Duration) -> u64 {
        let now = Instant::now();
        let events = self.events.lock().expect("metrics mutex");
        events
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) <= window)
            .count() as u64
    }
}

impl Default for WindowedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics collector for observability and the sentinel.
#[derive(Default)]
pub struct EngineMetrics {
    pub decisions_computed: WindowedCounter,
    pub edge_decisions: WindowedCounter,
    pub integrity_violations: WindowedCounter,
    pub missing_selection_id: WindowedCounter,
    pub missing_snapshot_hash: WindowedCounter,
    pub post_attempts: WindowedCounter,
    pub post_validation_failures: WindowedCounter,
    pub sim_runs: WindowedCounter,
    pub gradings_completed: WindowedCounter,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        format!(
            r#"# HELP edgeline_decisions_computed_total Decision triples computed
# TYPE edgeline_decisions_computed_total counter
edgeline_decisions_computed_total {}

# HELP edgeline_edge_decisions_total Decisions classified EDGE
# TYPE edgeline_edge_decisions_total counter
edgeline_edge_decisions_total {}

# HELP edgeline_integrity_violations_total Decisions blocked by the validator
# TYPE edgeline_integrity_violations_total counter
edgeline_integrity_violations_total {}

# HELP edgeline_post_attempts_total Publisher attempts
# TYPE edgeline_post_attempts_total counter
edgeline_post_attempts_total {}

# HELP edgeline_post_validation_failures_total Copy validator rejections
# TYPE edgeline_post_validation_failures_total counter
edgeline_post_validation_failures_total {}

# HELP edgeline_sim_runs_total Simulation runs executed
# TYPE edgeline_sim_runs_total counter
edgeline_sim_runs_total {}

# HELP edgeline_gradings_completed_total Grading records written
# TYPE edgeline_gradings_completed_total counter
edgeline_gradings_completed_total {}
"#,
            self.decisions_computed.total(),
            self.edge_decisions.total(),
            self.integrity_violations.total(),
            self.post_attempts.total(),
            self.post_validation_failures.total(),
            self.sim_runs.total(),
            self.gradings_completed.total(),
        )
    }
}
