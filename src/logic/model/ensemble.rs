//! Ensemble - Model generations and scorer fan-out
//!
//! Fitted models live in an immutable `ModelGeneration` behind
//! `RwLock<Arc<..>>`: readers clone the `Arc` and never see a half-updated
//! model; the retrainer builds a new generation off to the side and swaps
//! it in atomically.
//!
//! The statistical scorer and the recent-window sequence are runtime state
//! updated only by `observe`, so `score` is read-only.

use std::collections::VecDeque;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::consensus::{ConsensusDecision, ConsensusPolicy};
use super::scorer::{AnomalyScorer, ScoreError, ScorerKind, ScoringInput};
use super::spatial::{SpatialConfig, SpatialModel};
use super::statistical::{StatisticalConfig, StatisticalScorer};
use super::temporal::{TemporalConfig, TemporalModel};
use crate::logic::features::{FeatureVector, LayoutInfo};
use crate::logic::threat::{ScoreStatus, ScorerReading};

// ============================================================================
// LIFECYCLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLifecycle {
    Uninitialized,
    WarmStarted,
    Trained,
    Retraining,
}

impl ModelLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelLifecycle::Uninitialized => "uninitialized",
            ModelLifecycle::WarmStarted => "warm_started",
            ModelLifecycle::Trained => "trained",
            ModelLifecycle::Retraining => "retraining",
        }
    }
}

// ============================================================================
// MODEL GENERATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ModelGeneration {
    /// 0 = nothing fitted yet
    pub id: u64,
    pub spatial: Option<Arc<SpatialModel>>,
    pub temporal: Option<Arc<TemporalModel>>,
    pub layout: LayoutInfo,
    pub trained_at: Option<DateTime<Utc>>,
    pub warm_start: bool,
    pub training_samples: usize,
}

impl ModelGeneration {
    pub fn empty() -> Self {
        Self {
            id: 0,
            spatial: None,
            temporal: None,
            layout: LayoutInfo::current(),
            trained_at: None,
            warm_start: false,
            training_samples: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.spatial.is_some() || self.temporal.is_some()
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub spatial: SpatialConfig,
    pub temporal: TemporalConfig,
    pub statistical: StatisticalConfig,
    pub consensus: ConsensusPolicy,
    pub spatial_enabled: bool,
    pub temporal_enabled: bool,
    pub statistical_enabled: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            spatial: SpatialConfig::default(),
            temporal: TemporalConfig::default(),
            statistical: StatisticalConfig::default(),
            consensus: ConsensusPolicy::default(),
            spatial_enabled: true,
            temporal_enabled: true,
            statistical_enabled: true,
        }
    }
}

impl EnsembleConfig {
    pub fn is_enabled(&self, kind: ScorerKind) -> bool {
        match kind {
            ScorerKind::Spatial => self.spatial_enabled,
            ScorerKind::Temporal => self.temporal_enabled,
            ScorerKind::Statistical => self.statistical_enabled,
        }
    }
}

/// Everything the ensemble produced for one window
#[derive(Debug, Clone)]
pub struct EnsembleResult {
    pub readings: Vec<ScorerReading>,
    pub consensus: ConsensusDecision,
    pub generation: u64,
}

// ============================================================================
// ENSEMBLE
// ============================================================================

pub struct Ensemble {
    config: EnsembleConfig,
    generation: RwLock<Arc<ModelGeneration>>,
    lifecycle: RwLock<ModelLifecycle>,
    statistical: RwLock<StatisticalScorer>,
    /// Previously observed windows, oldest first
    recent: RwLock<VecDeque<FeatureVector>>,
}

impl Ensemble {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            statistical: RwLock::new(StatisticalScorer::new(config.statistical.clone())),
            recent: RwLock::new(VecDeque::with_capacity(config.temporal.sequence_length)),
            generation: RwLock::new(Arc::new(ModelGeneration::empty())),
            lifecycle: RwLock::new(ModelLifecycle::Uninitialized),
            config,
        }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn consensus_policy(&self) -> &ConsensusPolicy {
        &self.config.consensus
    }

    // ------------------------------------------------------------------------
    // Generations
    // ------------------------------------------------------------------------

    pub fn current_generation(&self) -> Arc<ModelGeneration> {
        self.generation.read().clone()
    }

    /// Swap in a new generation
    pub fn publish(&self, generation: ModelGeneration) -> Arc<ModelGeneration> {
        let generation = Arc::new(generation);
        *self.generation.write() = generation.clone();
        log::info!(
            "Published model generation {} (spatial: {}, temporal: {}, warm start: {})",
            generation.id,
            generation.spatial.is_some(),
            generation.temporal.is_some(),
            generation.warm_start
        );
        generation
    }

    pub fn lifecycle(&self) -> ModelLifecycle {
        *self.lifecycle.read()
    }

    pub fn set_lifecycle(&self, state: ModelLifecycle) {
        *self.lifecycle.write() = state;
    }

    // ------------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------------

    /// Score one window without touching any state
    pub fn score(&self, current: &FeatureVector) -> EnsembleResult {
        let generation = self.current_generation();

        let mut sequence: Vec<FeatureVector> = {
            let recent = self.recent.read();
            let keep = self.config.temporal.sequence_length.saturating_sub(1);
            recent.iter().skip(recent.len().saturating_sub(keep)).copied().collect()
        };
        sequence.push(*current);
        let input = ScoringInput { current, sequence: &sequence };

        let readings: Vec<ScorerReading> = ScorerKind::ALL
            .iter()
            .map(|&kind| self.reading(kind, &generation, &input))
            .collect();
        let consensus = self.config.consensus.decide(&readings);

        EnsembleResult { readings, consensus, generation: generation.id }
    }

    fn reading(&self, kind: ScorerKind, generation: &ModelGeneration, input: &ScoringInput<'_>) -> ScorerReading {
        if !self.config.is_enabled(kind) {
            return ScorerReading::neutral(kind, ScoreStatus::Disabled);
        }
        if !generation.layout.is_current() && kind != ScorerKind::Statistical {
            return ScorerReading::neutral(kind, ScoreStatus::NotReady);
        }
        let result = match kind {
            ScorerKind::Spatial => run(generation.spatial.as_deref(), input),
            ScorerKind::Temporal => run(generation.temporal.as_deref(), input),
            ScorerKind::Statistical => self.statistical.read().score(input),
        };
        match result {
            Ok(score) => ScorerReading::ok(kind, score),
            Err(e) => {
                if let ScoreError::Degenerate(_) = e {
                    log::warn!("{} scorer failed: {}", kind, e);
                }
                ScorerReading::neutral(kind, e.status())
            }
        }
    }

    /// Feed an evaluated window into the runtime state
    pub fn observe(&self, v: FeatureVector) {
        self.statistical.write().observe(v);
        let mut recent = self.recent.write();
        let cap = self.config.temporal.sequence_length.max(1);
        while recent.len() >= cap {
            recent.pop_front();
        }
        recent.push_back(v);
    }

    pub fn statistical_history(&self) -> usize {
        self.statistical.read().history_len()
    }
}

impl Default for Ensemble {
    fn default() -> Self {
        Self::new(EnsembleConfig::default())
    }
}

fn run<S: AnomalyScorer>(model: Option<&S>, input: &ScoringInput<'_>) -> Result<f64, ScoreError> {
    match model {
        Some(m) => m.score(input),
        None => Err(ScoreError::NotReady("model not fitted".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::FEATURE_COUNT;
    use crate::logic::model::consensus::ConsensusDecision;
    use crate::logic::threat::EnsembleOutcome;

    #[test]
    fn test_fresh_ensemble_is_unknown() {
        let ensemble = Ensemble::default();
        let result = ensemble.score(&[1.0; FEATURE_COUNT]);
        assert_eq!(result.generation, 0);
        assert!(result.readings.iter().all(|r| r.status == ScoreStatus::NotReady));
        let ConsensusDecision { outcome, .. } = result.consensus;
        assert_eq!(outcome, EnsembleOutcome::Unknown);
        assert_eq!(ensemble.lifecycle(), ModelLifecycle::Uninitialized);
    }

    #[test]
    fn test_disabled_scorer_reports_disabled() {
        let config = EnsembleConfig { temporal_enabled: false, ..Default::default() };
        let ensemble = Ensemble::new(config);
        let result = ensemble.score(&[1.0; FEATURE_COUNT]);
        let temporal = result.readings.iter().find(|r| r.scorer == ScorerKind::Temporal).unwrap();
        assert_eq!(temporal.status, ScoreStatus::Disabled);
    }

    #[test]
    fn test_score_is_read_only() {
        let ensemble = Ensemble::default();
        for i in 0..40 {
            ensemble.observe([i as f64; FEATURE_COUNT]);
        }
        let a = ensemble.score(&[3.0; FEATURE_COUNT]);
        let b = ensemble.score(&[3.0; FEATURE_COUNT]);
        assert_eq!(a.readings, b.readings);
        assert_eq!(ensemble.statistical_history(), 40);
    }

    #[test]
    fn test_publish_swaps_generation() {
        let ensemble = Ensemble::default();
        let before = ensemble.current_generation();
        ensemble.publish(ModelGeneration { id: 7, ..ModelGeneration::empty() });
        assert_eq!(before.id, 0);
        assert_eq!(ensemble.current_generation().id, 7);
    }
}
