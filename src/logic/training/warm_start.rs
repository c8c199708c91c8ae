//! Warm Start - Synthetic benign corpus for cold start
//!
//! Until enough real high-confidence windows exist, the first retraining
//! cycle fits the scorers on a seeded synthetic corpus: a slow random walk
//! over load, packet size and latency that looks like quiet office traffic.
//! Same seed, same corpus.

use std::sync::Arc;
use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::windows::TrainingSample;
use crate::logic::features::FeatureSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmStartConfig {
    pub samples: usize,
    pub seed: u64,
}

impl Default for WarmStartConfig {
    fn default() -> Self {
        Self { samples: 300, seed: 0x5eed_f10e }
    }
}

/// Packets per window are 20 * load step, so the TCP share stays exact
const LOAD_UNIT: u64 = 20;
const MIN_LOAD_STEPS: i64 = 10;
const MAX_LOAD_STEPS: i64 = 40;

/// Generate the corpus as 1-second snapshots, oldest first
pub fn generate(config: &WarmStartConfig) -> Vec<FeatureSnapshot> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let start = Utc::now() - ChronoDuration::seconds(config.samples as i64);

    let mut load: i64 = 20;
    let mut packet_size: f64 = 600.0;
    let mut latency: f64 = 12.0;

    (0..config.samples)
        .map(|i| {
            load = (load + rng.gen_range(-1..=1)).clamp(MIN_LOAD_STEPS, MAX_LOAD_STEPS);
            packet_size = (packet_size + rng.gen_range(-4.0..4.0)).clamp(400.0, 900.0);
            latency = (latency + rng.gen_range(-0.3..0.3)).clamp(4.0, 30.0);

            let steps = load as u64;
            let packets = steps * LOAD_UNIT;
            let mut s = FeatureSnapshot::empty();
            s.window_start = start + ChronoDuration::seconds(i as i64);
            s.closed_at = s.window_start + ChronoDuration::seconds(1);
            s.elapsed_secs = 1.0;
            s.packets = packets;
            s.bytes = (packets as f64 * packet_size) as u64;
            s.packets_per_second = packets as f64;
            s.bytes_per_second = s.bytes as f64;
            s.unique_sources = 12;
            s.unique_destinations = 8;
            s.unique_ports = 6;
            // 85% TCP, 15% UDP
            s.tcp_packets = steps * 17;
            s.udp_packets = steps * 3;
            s.syn_packets = steps;
            s.avg_latency_ms = latency;
            s.min_latency_ms = latency * 0.5;
            s.max_latency_ms = latency * 2.0;
            s.p95_latency_ms = latency * 1.6;
            s.jitter_ms = latency * 0.25;
            s
        })
        .collect()
}

/// Corpus as full-weight training samples
pub fn samples(config: &WarmStartConfig) -> Vec<TrainingSample> {
    generate(config)
        .into_iter()
        .map(|s| TrainingSample {
            recorded_at: s.closed_at,
            snapshot: Arc::new(s),
            weight: 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::threat::RuleEngine;

    #[test]
    fn test_corpus_is_deterministic() {
        let config = WarmStartConfig::default();
        let a: Vec<_> = generate(&config).iter().map(|s| s.to_vector()).collect();
        let b: Vec<_> = generate(&config).iter().map(|s| s.to_vector()).collect();
        assert_eq!(a.len(), 300);
        assert_eq!(a, b);
    }

    #[test]
    fn test_corpus_is_benign() {
        let engine = RuleEngine::default();
        for s in generate(&WarmStartConfig::default()) {
            assert!(engine.evaluate(&s).is_empty(), "synthetic window tripped a rule: {:?}", s);
            assert!((s.tcp_ratio() - 0.85).abs() < 1e-12);
        }
    }
}
