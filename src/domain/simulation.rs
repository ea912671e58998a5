//! Simulation run records.
//!
//! A run stores distribution *statistics*, never raw samples: enough to
//! answer cover/over probability against arbitrary lines via the coarse
//! histograms, and to reproduce the run from its seed and config identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::signal::Wave;

/// Iteration tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimTier {
    #[serde(rename = "10k")]
    T10k,
    #[serde(rename = "25k")]
    T25k,
    #[serde(rename = "50k")]
    T50k,
    #[serde(rename = "100k")]
    T100k,
}

impl SimTier {
    pub fn iterations(&self) -> u32 {
        match self {
            SimTier::T10k => 10_000,
            SimTier::T25k => 25_000,
            SimTier::T50k => 50_000,
            SimTier::T100k => 100_000,
        }
    }

    pub fn from_iterations(iterations: u32) -> Option<SimTier> {
        match iterations {
            10_000 => Some(SimTier::T10k),
            25_000 => Some(SimTier::T25k),
            50_000 => Some(SimTier::T50k),
            100_000 => Some(SimTier::T100k),
            _ => None,
        }
    }
}

impl fmt::Display for SimTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimTier::T10k => f.write_str("10k"),
            SimTier::T25k => f.write_str("25k"),
            SimTier::T50k => f.write_str("50k"),
            SimTier::T100k => f.write_str("100k"),
        }
    }
}

impl FromStr for SimTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10k" => Ok(SimTier::T10k),
            "25k" => Ok(SimTier::T25k),
            "50k" => Ok(SimTier::T50k),
            "100k" => Ok(SimTier::T100k),
            other => Err(format!("unknown sim tier: {}", other)),
        }
    }
}

/// Coarse empirical histogram over a fixed-width binning.
///
/// Values outside the range clamp into the edge bins, so total mass is
/// always conserved and tail queries stay monotone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub bin_width: f64,
    pub counts: Vec<u64>,
    pub total: u64,
}

impl Histogram {
    pub fn new(min: f64, bin_width: f64, bins: usize) -> Self {
        Self {
            min,
            bin_width,
            counts: vec![0; bins],
            total: 0,
        }
    }

    fn bin_index(&self, value: f64) -> usize {
        let raw = ((value - self.min) / self.bin_width).floor();
        (raw.max(0.0) as usize).min(self.counts.len() - 1)
    }

    pub fn record(&mut self, value: f64) {
        let idx = self.bin_index(value);
        self.counts[idx] += 1;
        self.total += 1;
    }

    /// P(X > threshold), counting the straddling bin fractionally.
    pub fn prob_above(&self, threshold: f64) -> f64 {
        if self.total == 0 {
            return 0.5;
        }
        let mut above = 0.0;
        for (i, &count) in self.counts.iter().enumerate() {
            let lo = self.min + i as f64 * self.bin_width;
            let hi = lo + self.bin_width;
            if lo >= threshold {
                above += count as f64;
            } else if hi > threshold {
                // linear split of the straddling bin
                let frac = (hi - threshold) / self.bin_width;
                above += count as f64 * frac;
            }
        }
        (above / self.total as f64).clamp(0.0, 1.0)
    }

    pub fn prob_below(&self, threshold: f64) -> f64 {
        1.0 - self.prob_above(threshold)
    }
}

/// Immutable record of one Monte Carlo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRun {
    pub sim_run_id: String,
    pub event_id: String,
    pub wave: Wave,
    pub tier: SimTier,
    pub iterations: u32,
    /// P(home wins), ties split evenly
    pub home_win_prob: f64,
    /// Signed, home perspective
    pub mean_margin: f64,
    pub margin_variance: f64,
    pub mean_total: f64,
    pub total_variance: f64,
    pub margin_hist: Histogram,
    pub total_hist: Histogram,
    pub converged: bool,
    pub model_version: String,
    /// Adjustments applied before/after sampling ("weather:-0.18",
    /// "market_anchor:0.15", "mean_reversion:home:0.12", ...)
    pub regime_adjustments: Vec<String>,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
}

impl SimulationRun {
    /// P(home covers) for a quoted home handicap.
    ///
    /// Home at -5.5 covers when margin > 5.5, i.e. margin > -line.
    pub fn cover_prob_home(&self, spread_home: f64) -> f64 {
        self.margin_hist.prob_above(-spread_home)
    }

    /// P(total goes over the quoted line).
    pub fn over_prob(&self, total_line: f64) -> f64 {
        self.total_hist.prob_above(total_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_iterations() {
        assert_eq!(SimTier::T10k.iterations(), 10_000);
        assert_eq!(SimTier::from_iterations(50_000), Some(SimTier::T50k));
        assert_eq!(SimTier::from_iterations(12_345), None);
    }

    #[test]
    fn test_histogram_tail_probabilities() {
        let mut hist = Histogram::new(-50.0, 1.0, 100);
        // mass at +10 and -10, equal weight
        for _ in 0..500 {
            hist.record(10.2);
        }
        for _ in 0..500 {
            hist.record(-10.2);
        }

        assert!((hist.prob_above(0.0) - 0.5).abs() < 1e-9);
        assert!(hist.prob_above(15.0) < 1e-9);
        assert!((hist.prob_above(-15.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_clamps_outliers() {
        let mut hist = Histogram::new(0.0, 1.0, 10);
        hist.record(-100.0);
        hist.record(100.0);
        assert_eq!(hist.total, 2);
        assert_eq!(hist.counts[0], 1);
        assert_eq!(hist.counts[9], 1);
    }

    #[test]
    fn test_cover_prob_convention() {
        let mut margin_hist = Histogram::new(-50.0, 1.0, 100);
        // home wins by 8 every time
        for _ in 0..1000 {
            margin_hist.record(8.2);
        }
        let run = SimulationRun {
            sim_run_id: "sim-1".into(),
            event_id: "evt-1".into(),
            wave: Wave::Discovery,
            tier: SimTier::T10k,
            iterations: 1000,
            home_win_prob: 1.0,
            mean_margin: 8.2,
            margin_variance: 0.0,
            mean_total: 200.0,
            total_variance: 0.0,
            margin_hist,
            total_hist: Histogram::new(100.0, 2.0, 100),
            converged: true,
            model_version: "mc-v1".into(),
            regime_adjustments: vec![],
            seed: 7,
            created_at: chrono::Utc::now(),
        };

        // home -5.5 covers (margin 8.2 > 5.5); home -9.5 does not
        assert!(run.cover_prob_home(-5.5) > 0.99);
        assert!(run.cover_prob_home(-9.5) < 0.01);
    }
}
