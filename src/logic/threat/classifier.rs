//! Threat Classifier - Decision orchestration
//!
//! Only the combination logic - no types, no scoring.
//! Input: rule matches, scorer readings, consensus decision
//! Output: ThreatVerdict

use std::collections::BTreeSet;

use super::engine::RuleMatch;
use super::types::{EnsembleOutcome, ScorerReading, ThreatLabel, ThreatVerdict};
use crate::logic::features::FeatureSnapshot;
use crate::logic::model::consensus::ConsensusDecision;

/// Everything the orchestrator needs besides the snapshot
#[derive(Debug, Clone)]
pub struct DecisionInput<'a> {
    pub rule_matches: &'a [RuleMatch],
    pub scores: Vec<ScorerReading>,
    pub consensus: ConsensusDecision,
    pub model_generation: u64,
    pub suspicious_source_packets: u64,
}

/// Combine rule and ensemble outputs into one verdict
///
/// - labels: union of rule labels and the ensemble label (positive only)
/// - detected: any rule fired OR the ensemble is positive
/// - confidence: max confidence among contributing labels, 0 when nothing
///   was detected
/// - an edge case never alerts on its own; it only flags review
pub fn decide(snapshot: &FeatureSnapshot, input: DecisionInput<'_>) -> ThreatVerdict {
    let mut threat_types: BTreeSet<ThreatLabel> = input.rule_matches.iter().map(|m| m.label).collect();
    let mut confidence = input
        .rule_matches
        .iter()
        .map(|m| m.confidence)
        .fold(0.0_f64, f64::max);

    let consensus = &input.consensus;
    if consensus.outcome == EnsembleOutcome::Positive {
        if let Some(label) = consensus.label {
            threat_types.insert(label);
        }
        confidence = confidence.max(consensus.confidence);
    }

    let detected = !threat_types.is_empty();
    if !detected {
        confidence = 0.0;
    }

    ThreatVerdict {
        snapshot_id: snapshot.id,
        detected,
        confidence: confidence.clamp(0.0, 1.0),
        threat_types,
        scores: input.scores,
        ensemble: consensus.outcome,
        review_required: consensus.outcome == EnsembleOutcome::EdgeCase,
        attacking_ips: snapshot.heavy_sources(input.suspicious_source_packets),
        model_generation: input.model_generation,
        window_closed_at: snapshot.closed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use crate::logic::model::consensus::ConsensusPolicy;
    use crate::logic::model::scorer::ScorerKind;

    fn readings(scores: [f64; 3]) -> Vec<ScorerReading> {
        vec![
            ScorerReading::ok(ScorerKind::Spatial, scores[0]),
            ScorerReading::ok(ScorerKind::Temporal, scores[1]),
            ScorerReading::ok(ScorerKind::Statistical, scores[2]),
        ]
    }

    fn input<'a>(matches: &'a [RuleMatch], scores: [f64; 3]) -> DecisionInput<'a> {
        let scores = readings(scores);
        DecisionInput {
            rule_matches: matches,
            consensus: ConsensusPolicy::default().decide(&scores),
            scores,
            model_generation: 3,
            suspicious_source_packets: 100,
        }
    }

    #[test]
    fn test_rules_only() {
        let matches = [
            RuleMatch { label: ThreatLabel::PortScan, confidence: 0.90 },
            RuleMatch { label: ThreatLabel::SynFlood, confidence: 0.92 },
        ];
        let v = decide(&FeatureSnapshot::empty(), input(&matches, [0.1, 0.1, 0.1]));
        assert!(v.detected);
        assert_eq!(v.confidence, 0.92);
        assert_eq!(v.ensemble, EnsembleOutcome::Negative);
        assert_eq!(v.model_generation, 3);
    }

    #[test]
    fn test_edge_case_does_not_alert() {
        let v = decide(&FeatureSnapshot::empty(), input(&[], [0.8, 0.2, 0.2]));
        assert!(!v.detected);
        assert!(v.review_required);
        assert_eq!(v.confidence, 0.0);
        assert!(v.threat_types.is_empty());
    }

    #[test]
    fn test_positive_ensemble_adds_label() {
        let v = decide(&FeatureSnapshot::empty(), input(&[], [0.9, 0.95, 0.1]));
        assert!(v.detected);
        assert!(v.threat_types.contains(&ThreatLabel::MlCriticalRisk));
        assert!((v.confidence - 0.925).abs() < 1e-12);
    }

    #[test]
    fn test_attacking_ips_from_top_sources() {
        let mut snap = FeatureSnapshot::empty();
        snap.top_sources = vec![(Ipv4Addr::new(203, 0, 113, 9), 1_950), (Ipv4Addr::new(10, 0, 0, 1), 12)];
        let v = decide(&snap, input(&[], [0.0, 0.0, 0.0]));
        assert_eq!(v.attacking_ips, vec![Ipv4Addr::new(203, 0, 113, 9)]);
    }
}
