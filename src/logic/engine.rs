//! Threat Engine - Decision facade over rules, ensemble and curator
//!
//! `detect` is pure with respect to engine state: the same snapshot against
//! the same model generation and history always yields the same decision.
//! `process` is what the evaluation lane calls on each closed window: it
//! detects, then feeds the window into the statistical history, the
//! temporal sequence and the training curator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use parking_lot::RwLock;

use crate::constants::DEFAULT_SUSPICIOUS_SOURCE_PACKETS;
use crate::logic::features::FeatureSnapshot;
use crate::logic::metrics;
use crate::logic::model::{Ensemble, EnsembleConfig, ModelGeneration, ModelLifecycle};
use crate::logic::threat::{decide, DecisionInput, RuleEngine, RuleThresholds, ThreatVerdict};
use crate::logic::training::{
    CuratorConfig, CuratorStats, DefaultConfidencePolicy, ConfidenceConfig, RetrainOutcome, Retrainer,
    RetrainerConfig, TrainingCurator,
};

/// Everything needed to build a `ThreatEngine`
#[derive(Debug, Clone, Default)]
pub struct EngineParts {
    pub rules: RuleThresholds,
    pub ensemble: EnsembleConfig,
    pub curator: CuratorConfig,
    pub confidence: ConfidenceConfig,
    pub retrainer: RetrainerConfig,
    pub suspicious_source_packets: Option<u64>,
}

pub struct ThreatEngine {
    rules: RwLock<RuleEngine>,
    ensemble: Arc<Ensemble>,
    curator: Arc<TrainingCurator>,
    retrainer: Retrainer,
    suspicious_source_packets: u64,
}

impl ThreatEngine {
    pub fn new(parts: EngineParts) -> Self {
        let ensemble = Arc::new(Ensemble::new(parts.ensemble));
        let curator = Arc::new(TrainingCurator::new(
            parts.curator,
            Box::new(DefaultConfidencePolicy::new(parts.confidence)),
        ));
        let retrainer = Retrainer::new(parts.retrainer, ensemble.clone(), curator.clone());

        Self {
            rules: RwLock::new(RuleEngine::new(parts.rules)),
            ensemble,
            curator,
            retrainer,
            suspicious_source_packets: parts.suspicious_source_packets.unwrap_or(DEFAULT_SUSPICIOUS_SOURCE_PACKETS),
        }
    }

    // ------------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------------

    /// Evaluate one snapshot without changing any engine state
    pub fn detect(&self, snapshot: &FeatureSnapshot) -> ThreatVerdict {
        let rule_matches = self.rules.read().matches(snapshot);
        let result = self.ensemble.score(&snapshot.to_vector());

        decide(
            snapshot,
            DecisionInput {
                rule_matches: &rule_matches,
                scores: result.readings,
                consensus: result.consensus,
                model_generation: result.generation,
                suspicious_source_packets: self.suspicious_source_packets,
            },
        )
    }

    /// Evaluate a flat feature map (keys as in the export record)
    pub fn detect_features(&self, features: &HashMap<String, f64>) -> ThreatVerdict {
        self.detect(&FeatureSnapshot::from_feature_map(features))
    }

    /// Detect, then learn from the window
    pub fn process(&self, snapshot: Arc<FeatureSnapshot>) -> ThreatVerdict {
        let started = Instant::now();
        let verdict = self.detect(&snapshot);

        let high = self.ensemble.consensus_policy().high_threshold;
        for reading in &verdict.scores {
            metrics::record_reading(reading, high);
        }
        for label in verdict.threat_types.iter().filter(|l| !l.is_ml()) {
            metrics::record_rule_match(*label);
        }
        metrics::record_verdict(&verdict);

        self.ensemble.observe(snapshot.to_vector());
        let weight = self.curator.curate(snapshot, Utc::now());

        metrics::record_processing_latency(started.elapsed());
        if verdict.detected {
            log::warn!(
                "Threat detected [{}] confidence {:.2}, sources {:?}",
                verdict.labels(),
                verdict.confidence,
                verdict.attacking_ips
            );
        } else if verdict.review_required {
            log::info!("Edge case flagged for review (snapshot {})", verdict.snapshot_id);
        }
        log::debug!("Window {} curated with weight {:.3}", verdict.snapshot_id, weight);
        verdict
    }

    // ------------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------------

    pub fn retrain_once(&self) -> RetrainOutcome {
        self.retrainer.run_cycle()
    }

    pub fn lifecycle(&self) -> ModelLifecycle {
        self.ensemble.lifecycle()
    }

    pub fn current_generation(&self) -> Arc<ModelGeneration> {
        self.ensemble.current_generation()
    }

    pub fn curator_stats(&self) -> CuratorStats {
        self.curator.stats()
    }

    // ------------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------------

    pub fn rule_thresholds(&self) -> RuleThresholds {
        self.rules.read().thresholds().clone()
    }

    /// Replace the rule thresholds; rejected values leave the old ones active
    pub fn set_rule_thresholds(&self, thresholds: RuleThresholds) -> Result<(), String> {
        thresholds.validate()?;
        self.rules.write().set_thresholds(thresholds);
        log::info!("Rule thresholds updated");
        Ok(())
    }
}

impl Default for ThreatEngine {
    fn default() -> Self {
        Self::new(EngineParts::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;
    use crate::logic::threat::{EnsembleOutcome, ScoreStatus, ThreatLabel};

    fn map(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn port_scan_features() -> HashMap<String, f64> {
        map(&[
            ("packets_per_second", 2_000.0),
            ("unique_ports", 1_000.0),
            ("unique_ips", 1.0),
            ("syn_packets", 1_950.0),
            ("tcp_packets", 1_960.0),
            ("udp_packets", 40.0),
        ])
    }

    #[test]
    fn test_port_scan_scenario() {
        let engine = ThreatEngine::default();
        let verdict = engine.detect_features(&port_scan_features());

        assert!(verdict.detected);
        assert!(verdict.threat_types.contains(&ThreatLabel::PortScan));
        assert!(verdict.threat_types.contains(&ThreatLabel::SynFlood));
        assert!(!verdict.threat_types.contains(&ThreatLabel::VolumetricDdos));
        assert!((verdict.confidence - 0.92).abs() < 1e-12);
    }

    #[test]
    fn test_detect_is_idempotent() {
        let engine = ThreatEngine::default();
        engine.retrain_once();
        let snapshot = FeatureSnapshot::from_feature_map(&port_scan_features());

        let first = engine.detect(&snapshot);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = engine.detect(&snapshot);
        assert_eq!(first, second);
        assert_eq!(first.window_closed_at, snapshot.closed_at);
        assert_eq!(engine.curator_stats().total_samples, 0);
    }

    #[test]
    fn test_all_scorers_failing_falls_back_to_rules() {
        let engine = ThreatEngine::default();
        assert!(matches!(engine.retrain_once(), RetrainOutcome::WarmStarted { .. }));

        let mut snapshot = FeatureSnapshot::from_feature_map(&port_scan_features());
        snapshot.jitter_ms = f64::NAN;
        let verdict = engine.detect(&snapshot);

        assert_eq!(verdict.scores.len(), 3);
        assert!(verdict.scores.iter().all(|r| r.status == ScoreStatus::Failed));
        assert_eq!(verdict.ensemble, EnsembleOutcome::Unknown);
        assert!(!verdict.review_required);

        let expected: BTreeSet<_> = [ThreatLabel::PortScan, ThreatLabel::SynFlood].into_iter().collect();
        assert!(verdict.detected);
        assert_eq!(verdict.threat_types, expected);
        assert!((verdict.confidence - 0.92).abs() < 1e-12);
        assert_eq!(verdict.model_generation, 1);
    }

    #[test]
    fn test_legitimate_burst_is_not_flagged_by_rules() {
        let engine = ThreatEngine::default();
        let verdict = engine.detect_features(&map(&[
            ("packets_per_second", 850.0),
            ("unique_ports", 3.0),
            ("tcp_ratio", 0.94),
        ]));
        assert!(verdict.threat_types.iter().all(|l| l.is_ml()));
    }

    #[test]
    fn test_cold_start_publishes_warm_generation() {
        let engine = ThreatEngine::default();
        assert_eq!(engine.lifecycle(), ModelLifecycle::Uninitialized);

        // untrained: trainable scorers are not ready, nothing alerts on quiet traffic
        let quiet = engine.detect(&FeatureSnapshot::empty());
        assert!(!quiet.detected);
        assert_eq!(quiet.ensemble, EnsembleOutcome::Unknown);

        assert!(matches!(engine.retrain_once(), RetrainOutcome::WarmStarted { generation: 1 }));
        assert_eq!(engine.lifecycle(), ModelLifecycle::WarmStarted);
        assert_eq!(engine.detect(&FeatureSnapshot::empty()).model_generation, 1);
    }

    #[test]
    fn test_process_feeds_history_and_curator() {
        let engine = ThreatEngine::default();
        let mut snapshot = FeatureSnapshot::empty();
        snapshot.packets_per_second = 120.0;
        snapshot.top_sources = vec![(Ipv4Addr::new(192, 168, 1, 9), 80)];

        let verdict = engine.process(Arc::new(snapshot));
        assert!(!verdict.detected);
        assert!(verdict.attacking_ips.is_empty());
        assert_eq!(engine.curator_stats().total_samples, 1);
        assert_eq!(engine.ensemble.statistical_history(), 1);
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        let engine = ThreatEngine::default();
        let bad = RuleThresholds { exfil_tcp_ratio: 2.0, ..Default::default() };
        assert!(engine.set_rule_thresholds(bad).is_err());
        assert_eq!(engine.rule_thresholds(), RuleThresholds::default());

        let lowered = RuleThresholds { port_scan_ports: 5, ..Default::default() };
        engine.set_rule_thresholds(lowered.clone()).unwrap();
        assert_eq!(engine.rule_thresholds(), lowered);
    }
}
