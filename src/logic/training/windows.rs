//! Training Windows - Curated sample store
//!
//! Every evaluated window becomes a weighted training sample retained in:
//! - high-confidence: only samples whose weight clears the admit threshold
//! - all-data: every sample
//! - recent: every sample younger than the retention period
//!
//! Samples share the snapshot through `Arc`; the retrainer reads a
//! copy-on-read `TrainingView` so fitting never holds the lock.

use std::collections::VecDeque;
use std::sync::Arc;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::confidence::{ConfidencePolicy, DefaultConfidencePolicy};
use crate::logic::features::{FeatureSnapshot, FeatureVector};
use crate::logic::model::scaler::log_compress;
use crate::logic::model::WeightedVector;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub high_confidence_capacity: usize,
    pub all_data_capacity: usize,
    pub recent_capacity: usize,
    pub recent_retention_secs: u64,
    /// Minimum weight to enter the high-confidence window
    pub high_confidence_min_weight: f64,
    /// Trusted windows kept for the similarity signal
    pub similarity_buffer: usize,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            high_confidence_capacity: 3_000,
            all_data_capacity: 5_000,
            recent_capacity: 600,
            recent_retention_secs: 600,
            high_confidence_min_weight: 0.6,
            similarity_buffer: 32,
        }
    }
}

// ============================================================================
// SAMPLES
// ============================================================================

#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub snapshot: Arc<FeatureSnapshot>,
    pub weight: f64,
    pub recorded_at: DateTime<Utc>,
}

impl TrainingSample {
    pub fn weighted_vector(&self) -> WeightedVector {
        WeightedVector { vector: self.snapshot.to_vector(), weight: self.weight }
    }
}

/// Point-in-time copy of the three windows, oldest first
#[derive(Debug, Clone, Default)]
pub struct TrainingView {
    pub high_confidence: Vec<TrainingSample>,
    pub all_data: Vec<TrainingSample>,
    pub recent: Vec<TrainingSample>,
}

impl TrainingView {
    pub fn weighted(samples: &[TrainingSample]) -> Vec<WeightedVector> {
        samples.iter().map(TrainingSample::weighted_vector).collect()
    }

    /// Sliding sequences of consecutive all-data samples whose mean weight
    /// is at least `min_mean_weight`
    pub fn sequences(&self, length: usize, min_mean_weight: f64) -> Vec<Vec<FeatureVector>> {
        if length == 0 || self.all_data.len() < length {
            return Vec::new();
        }
        self.all_data
            .windows(length)
            .filter(|w| w.iter().map(|s| s.weight).sum::<f64>() / length as f64 >= min_mean_weight)
            .map(|w| w.iter().map(|s| s.snapshot.to_vector()).collect())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CuratorStats {
    pub total_samples: u64,
    pub high_confidence_samples: u64,
    /// high-confidence / total
    pub clean_data_ratio: f64,
    pub high_confidence_window: usize,
    pub all_data_window: usize,
    pub recent_window: usize,
}

// ============================================================================
// CURATOR
// ============================================================================

#[derive(Default)]
struct Windows {
    high_confidence: VecDeque<TrainingSample>,
    all_data: VecDeque<TrainingSample>,
    recent: VecDeque<TrainingSample>,
    /// log-compressed vectors of recently admitted windows
    trusted: VecDeque<FeatureVector>,
    total_samples: u64,
    high_confidence_samples: u64,
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(item);
}

pub struct TrainingCurator {
    config: CuratorConfig,
    policy: Box<dyn ConfidencePolicy>,
    windows: Mutex<Windows>,
}

impl TrainingCurator {
    pub fn new(config: CuratorConfig, policy: Box<dyn ConfidencePolicy>) -> Self {
        Self {
            config,
            policy,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// Weigh a window and store it; returns the weight
    pub fn curate(&self, snapshot: Arc<FeatureSnapshot>, now: DateTime<Utc>) -> f64 {
        let mut w = self.windows.lock();
        let trusted: Vec<FeatureVector> = w.trusted.iter().copied().collect();
        let weight = self.policy.weight(&snapshot, &trusted, now);

        let sample = TrainingSample { snapshot, weight, recorded_at: now };
        w.total_samples += 1;

        if weight >= self.config.high_confidence_min_weight {
            w.high_confidence_samples += 1;
            let compressed = log_compress(&sample.snapshot.to_vector());
            push_bounded(&mut w.trusted, compressed, self.config.similarity_buffer);
            push_bounded(&mut w.high_confidence, sample.clone(), self.config.high_confidence_capacity);
        }
        push_bounded(&mut w.all_data, sample.clone(), self.config.all_data_capacity);
        push_bounded(&mut w.recent, sample, self.config.recent_capacity);

        let cutoff = now - ChronoDuration::seconds(self.config.recent_retention_secs as i64);
        while w.recent.front().map_or(false, |s| s.recorded_at < cutoff) {
            w.recent.pop_front();
        }
        weight
    }

    /// Copy-on-read view of all windows
    pub fn view(&self) -> TrainingView {
        let w = self.windows.lock();
        TrainingView {
            high_confidence: w.high_confidence.iter().cloned().collect(),
            all_data: w.all_data.iter().cloned().collect(),
            recent: w.recent.iter().cloned().collect(),
        }
    }

    pub fn stats(&self) -> CuratorStats {
        let w = self.windows.lock();
        CuratorStats {
            total_samples: w.total_samples,
            high_confidence_samples: w.high_confidence_samples,
            clean_data_ratio: if w.total_samples > 0 {
                w.high_confidence_samples as f64 / w.total_samples as f64
            } else {
                0.0
            },
            high_confidence_window: w.high_confidence.len(),
            all_data_window: w.all_data.len(),
            recent_window: w.recent.len(),
        }
    }
}

impl Default for TrainingCurator {
    fn default() -> Self {
        Self::new(CuratorConfig::default(), Box::new(DefaultConfidencePolicy::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()
    }

    fn snap(pps: f64) -> Arc<FeatureSnapshot> {
        let mut s = FeatureSnapshot::empty();
        s.packets_per_second = pps;
        s.unique_ports = 4;
        Arc::new(s)
    }

    #[test]
    fn test_quiet_daytime_traffic_is_high_confidence() {
        let curator = TrainingCurator::default();
        let w = curator.curate(snap(200.0), noon());
        assert!(w >= 0.6);
        let stats = curator.stats();
        assert_eq!(stats.high_confidence_window, 1);
        assert_eq!(stats.all_data_window, 1);
        assert_eq!(stats.clean_data_ratio, 1.0);
    }

    #[test]
    fn test_flood_at_night_is_not_admitted() {
        let curator = TrainingCurator::default();
        let w = curator.curate(snap(50_000.0), midnight());
        assert!(w < 0.6, "weight = {}", w);
        let view = curator.view();
        assert!(view.high_confidence.is_empty());
        assert_eq!(view.all_data.len(), 1);
        assert_eq!(view.recent.len(), 1);
    }

    #[test]
    fn test_windows_are_capped() {
        let config = CuratorConfig {
            high_confidence_capacity: 5,
            all_data_capacity: 8,
            recent_capacity: 3,
            ..Default::default()
        };
        let curator = TrainingCurator::new(config, Box::new(DefaultConfidencePolicy::default()));
        for i in 0..20 {
            curator.curate(snap(100.0 + i as f64), noon());
        }
        let stats = curator.stats();
        assert_eq!(stats.total_samples, 20);
        assert_eq!(stats.high_confidence_window, 5);
        assert_eq!(stats.all_data_window, 8);
        assert_eq!(stats.recent_window, 3);
    }

    #[test]
    fn test_recent_window_expires_by_age() {
        let curator = TrainingCurator::default();
        curator.curate(snap(100.0), noon());
        curator.curate(snap(100.0), noon() + ChronoDuration::seconds(601));
        assert_eq!(curator.view().recent.len(), 1);
        assert_eq!(curator.view().all_data.len(), 2);
    }

    #[test]
    fn test_view_is_a_copy() {
        let curator = TrainingCurator::default();
        curator.curate(snap(100.0), noon());
        let view = curator.view();
        curator.curate(snap(100.0), noon());
        assert_eq!(view.all_data.len(), 1);
        assert_eq!(curator.view().all_data.len(), 2);
    }

    #[test]
    fn test_sequences_filter_by_mean_weight() {
        let curator = TrainingCurator::default();
        for _ in 0..12 {
            curator.curate(snap(100.0), noon());
        }
        let view = curator.view();
        assert_eq!(view.sequences(10, 0.5).len(), 3);
        assert!(view.sequences(10, 1.1).is_empty());
        assert!(view.sequences(20, 0.5).is_empty());
    }
}
