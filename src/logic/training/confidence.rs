//! Confidence Policy - How much a window is trusted as training data
//!
//! No manual labels exist, so each window gets a weight in [0, 1] from
//! three independent signals, averaged:
//!
//! | Signal | Formula | Intent |
//! |---|---|---|
//! | rate | `1 / (1 + e^{(pps - center) / slope})` | extreme volume is suspect |
//! | similarity | `1 / (1 + d)`, `d` = distance to nearest trusted window | resembles known-good traffic |
//! | temporal context | high/low trust by UTC hour | business hours are better observed |
//!
//! The policy is a trait so the calibration can change without touching
//! the curator.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::{FeatureSnapshot, FeatureVector};
use crate::logic::model::scaler::{euclidean, log_compress};

/// Similarity signal when nothing trusted has been seen yet
pub const NEUTRAL_SIMILARITY: f64 = 0.5;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// pps at which the rate signal is 0.5
    pub rate_center_pps: f64,
    pub rate_slope_pps: f64,
    /// First high-trust hour (UTC, inclusive)
    pub high_trust_start_hour: u32,
    /// End of high-trust hours (UTC, exclusive)
    pub high_trust_end_hour: u32,
    pub high_trust_weight: f64,
    pub low_trust_weight: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            rate_center_pps: 1_000.0,
            rate_slope_pps: 200.0,
            high_trust_start_hour: 8,
            high_trust_end_hour: 20,
            high_trust_weight: 1.0,
            low_trust_weight: 0.5,
        }
    }
}

// ============================================================================
// SIGNALS
// ============================================================================

/// The three signals behind one weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSignals {
    pub rate: f64,
    pub similarity: f64,
    pub temporal: f64,
}

impl ConfidenceSignals {
    pub fn weight(&self) -> f64 {
        let w = (self.rate + self.similarity + self.temporal) / 3.0;
        if w.is_finite() {
            w.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub trait ConfidencePolicy: Send + Sync {
    /// `trusted` holds `log_compress`ed vectors of recently trusted windows
    fn signals(&self, snapshot: &FeatureSnapshot, trusted: &[FeatureVector], now: DateTime<Utc>) -> ConfidenceSignals;

    fn weight(&self, snapshot: &FeatureSnapshot, trusted: &[FeatureVector], now: DateTime<Utc>) -> f64 {
        self.signals(snapshot, trusted, now).weight()
    }
}

// ============================================================================
// DEFAULT POLICY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DefaultConfidencePolicy {
    config: ConfidenceConfig,
}

impl DefaultConfidencePolicy {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    pub fn rate_signal(&self, pps: f64) -> f64 {
        let slope = if self.config.rate_slope_pps > 0.0 { self.config.rate_slope_pps } else { 1.0 };
        let x = ((pps - self.config.rate_center_pps) / slope).clamp(-700.0, 700.0);
        1.0 / (1.0 + x.exp())
    }

    pub fn similarity_signal(&self, compressed: &FeatureVector, trusted: &[FeatureVector]) -> f64 {
        trusted
            .iter()
            .map(|t| euclidean(compressed, t))
            .min_by(f64::total_cmp)
            .map(|d| 1.0 / (1.0 + d))
            .unwrap_or(NEUTRAL_SIMILARITY)
    }

    pub fn temporal_signal(&self, now: DateTime<Utc>) -> f64 {
        let hour = now.hour();
        if (self.config.high_trust_start_hour..self.config.high_trust_end_hour).contains(&hour) {
            self.config.high_trust_weight
        } else {
            self.config.low_trust_weight
        }
    }
}

impl ConfidencePolicy for DefaultConfidencePolicy {
    fn signals(&self, snapshot: &FeatureSnapshot, trusted: &[FeatureVector], now: DateTime<Utc>) -> ConfidenceSignals {
        ConfidenceSignals {
            rate: self.rate_signal(snapshot.packets_per_second),
            similarity: self.similarity_signal(&log_compress(&snapshot.to_vector()), trusted),
            temporal: self.temporal_signal(now),
        }
    }
}
