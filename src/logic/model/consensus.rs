//! Consensus Policy - Majority vote over the scorers
//!
//! A scorer is "high" when its score reaches `high_threshold`. Only readings
//! with status `ok` are counted; `min_agreement` high scorers are required
//! no matter how many scorers are available.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CONSENSUS_THRESHOLD;
use crate::logic::threat::{EnsembleOutcome, ScorerReading, ThreatLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusPolicy {
    pub high_threshold: f64,
    pub min_agreement: usize,
    /// Mean high score above this escalates to critical
    pub critical_threshold: f64,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            high_threshold: DEFAULT_CONSENSUS_THRESHOLD,
            min_agreement: 2,
            critical_threshold: 0.8,
        }
    }
}

/// Outcome of one vote
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusDecision {
    pub outcome: EnsembleOutcome,
    /// Set only for positive outcomes
    pub label: Option<ThreatLabel>,
    /// Mean of the high scores (0 when none)
    pub confidence: f64,
    pub high_count: usize,
    pub available: usize,
}

impl ConsensusPolicy {
    pub fn decide(&self, readings: &[ScorerReading]) -> ConsensusDecision {
        let available: Vec<f64> = readings
            .iter()
            .filter(|r| r.status.is_available())
            .map(|r| r.score)
            .collect();
        let high: Vec<f64> = available.iter().copied().filter(|&s| s >= self.high_threshold).collect();
        let mean_high = if high.is_empty() {
            0.0
        } else {
            high.iter().sum::<f64>() / high.len() as f64
        };

        let min_agreement = self.min_agreement.max(1);
        let (outcome, label) = if available.is_empty() {
            (EnsembleOutcome::Unknown, None)
        } else if high.len() >= min_agreement {
            let label = if mean_high > self.critical_threshold {
                ThreatLabel::MlCriticalRisk
            } else {
                ThreatLabel::MlHighRisk
            };
            (EnsembleOutcome::Positive, Some(label))
        } else if high.len() == 1 {
            (EnsembleOutcome::EdgeCase, None)
        } else {
            (EnsembleOutcome::Negative, None)
        };

        ConsensusDecision {
            outcome,
            label,
            confidence: mean_high,
            high_count: high.len(),
            available: available.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::scorer::ScorerKind;
    use crate::logic::threat::ScoreStatus;

    fn vote(scores: [f64; 3]) -> ConsensusDecision {
        let readings: Vec<_> = ScorerKind::ALL
            .iter()
            .zip(scores)
            .map(|(k, s)| ScorerReading::ok(*k, s))
            .collect();
        ConsensusPolicy::default().decide(&readings)
    }

    #[test]
    fn test_two_high_is_positive() {
        let d = vote([0.8, 0.8, 0.2]);
        assert_eq!(d.outcome, EnsembleOutcome::Positive);
        assert_eq!(d.label, Some(ThreatLabel::MlHighRisk));
        assert!((d.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_one_high_is_edge_case() {
        let d = vote([0.8, 0.2, 0.2]);
        assert_eq!(d.outcome, EnsembleOutcome::EdgeCase);
        assert_eq!(d.label, None);
    }

    #[test]
    fn test_none_high_is_negative() {
        assert_eq!(vote([0.2, 0.2, 0.2]).outcome, EnsembleOutcome::Negative);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(vote([0.7, 0.7, 0.0]).outcome, EnsembleOutcome::Positive);
    }

    #[test]
    fn test_critical_escalation() {
        let d = vote([0.9, 0.95, 0.75]);
        assert_eq!(d.label, Some(ThreatLabel::MlCriticalRisk));
        assert_eq!(d.high_count, 3);
    }

    #[test]
    fn test_unavailable_scorers_do_not_vote() {
        let readings = [
            ScorerReading::ok(ScorerKind::Spatial, 0.9),
            ScorerReading::neutral(ScorerKind::Temporal, ScoreStatus::NotReady),
            ScorerReading::neutral(ScorerKind::Statistical, ScoreStatus::Disabled),
        ];
        let d = ConsensusPolicy::default().decide(&readings);
        // one available scorer can never reach agreement on its own
        assert_eq!(d.outcome, EnsembleOutcome::EdgeCase);
        assert_eq!(d.available, 1);

        let none = [ScorerReading::neutral(ScorerKind::Spatial, ScoreStatus::Failed)];
        assert_eq!(ConsensusPolicy::default().decide(&none).outcome, EnsembleOutcome::Unknown);
    }
}
