//! Statistical Baseline Scorer - Modified z-score (MAD)
//!
//! No training step. Each evaluation compares the current window to the
//! rolling history of observed windows:
//! `z = 0.6745 * (x - median) / MAD` per feature (MAD floored at 0.001),
//! per-feature score `min(|z| / 3.5, 1)`, aggregated by mean (default) or max.
//!
//! Features that are constant in the history have a floored MAD, so any
//! movement saturates them. Mean keeps one such feature from deciding the
//! vote; `Max` is available when a single-feature deviation should count.

use std::collections::VecDeque;
use serde::{Deserialize, Serialize};

use super::scorer::{checked_score, finite_input, AnomalyScorer, ScoreError, ScorerKind, ScoringInput};
use crate::logic::features::{qos, FeatureVector, FEATURE_COUNT};

const MAD_SCALE: f64 = 0.6745;
const MIN_MAD: f64 = 0.001;
/// |z| at which a feature counts as fully anomalous
const Z_CUTOFF: f64 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Max,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalConfig {
    pub history_size: usize,
    pub min_history: usize,
    pub aggregation: Aggregation,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            history_size: 1_000,
            min_history: 30,
            aggregation: Aggregation::Mean,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatisticalScorer {
    config: StatisticalConfig,
    history: VecDeque<FeatureVector>,
}

impl StatisticalScorer {
    pub fn new(config: StatisticalConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_size.min(4096)),
            config,
        }
    }

    /// Add an observed window to the rolling history
    pub fn observe(&mut self, v: FeatureVector) {
        if self.config.history_size == 0 {
            return;
        }
        while self.history.len() >= self.config.history_size {
            self.history.pop_front();
        }
        self.history.push_back(v);
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_ready(&self) -> bool {
        self.history.len() >= self.config.min_history.max(1)
    }

    /// Per-feature scores in layout order
    pub fn feature_scores(&self, v: &FeatureVector) -> Result<FeatureVector, ScoreError> {
        finite_input(v)?;
        if !self.is_ready() {
            return Err(ScoreError::NotReady(format!(
                "history {} of {}",
                self.history.len(),
                self.config.min_history
            )));
        }
        let mut scores = [0.0; FEATURE_COUNT];
        let mut column = Vec::with_capacity(self.history.len());
        for (i, score) in scores.iter_mut().enumerate() {
            column.clear();
            column.extend(self.history.iter().map(|h| h[i]));
            let median = qos::median(&column);
            let deviations: Vec<f64> = column.iter().map(|x| (x - median).abs()).collect();
            let mad = qos::median(&deviations).max(MIN_MAD);

            let z = MAD_SCALE * (v[i] - median) / mad;
            *score = (z.abs() / Z_CUTOFF).min(1.0);
        }
        Ok(scores)
    }

    pub fn score_vector(&self, v: &FeatureVector) -> Result<f64, ScoreError> {
        let scores = self.feature_scores(v)?;
        let aggregated = match self.config.aggregation {
            Aggregation::Max => scores.iter().copied().fold(0.0_f64, f64::max),
            Aggregation::Mean => scores.iter().sum::<f64>() / FEATURE_COUNT as f64,
        };
        checked_score(aggregated)
    }
}

impl Default for StatisticalScorer {
    fn default() -> Self {
        Self::new(StatisticalConfig::default())
    }
}

impl AnomalyScorer for StatisticalScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Statistical
    }

    fn score(&self, input: &ScoringInput<'_>) -> Result<f64, ScoreError> {
        self.score_vector(input.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(i: usize) -> FeatureVector {
        let mut v = [0.0; FEATURE_COUNT];
        v[0] = 500.0 + (i % 5) as f64 * 10.0;
        v[1] = 400_000.0 + (i % 7) as f64 * 1_000.0;
        v
    }

    #[test]
    fn test_not_ready_until_min_history() {
        let mut scorer = StatisticalScorer::default();
        for i in 0..29 {
            scorer.observe(steady(i));
        }
        assert!(matches!(scorer.score_vector(&steady(0)), Err(ScoreError::NotReady(_))));
        scorer.observe(steady(29));
        assert!(scorer.score_vector(&steady(0)).is_ok());
    }

    #[test]
    fn test_typical_window_scores_low() {
        let mut scorer = StatisticalScorer::default();
        for i in 0..100 {
            scorer.observe(steady(i));
        }
        let s = scorer.score_vector(&steady(2)).unwrap();
        assert!(s < 0.5, "score = {}", s);
    }

    fn trained(config: StatisticalConfig) -> StatisticalScorer {
        let mut scorer = StatisticalScorer::new(config);
        for i in 0..100 {
            scorer.observe(steady(i));
        }
        scorer
    }

    #[test]
    fn test_max_aggregation_saturates_on_spike() {
        let scorer = trained(StatisticalConfig { aggregation: Aggregation::Max, ..Default::default() });
        let mut spike = steady(0);
        spike[0] = 50_000.0;
        assert_eq!(scorer.score_vector(&spike).unwrap(), 1.0);
    }

    #[test]
    fn test_mean_aggregation_dilutes_single_feature() {
        let scorer = trained(StatisticalConfig::default());
        let mut spike = steady(0);
        spike[0] = 50_000.0;
        let s = scorer.score_vector(&spike).unwrap();
        assert!(s > 0.0 && s < 0.5);
    }

    #[test]
    fn test_loss_blip_on_constant_feature_stays_below_high() {
        // loss is 0 in every observed window, so its MAD is floored
        let mut blip = steady(0);
        blip[8] = 0.01;

        let mean = trained(StatisticalConfig::default()).score_vector(&blip).unwrap();
        assert!(mean < 0.7, "score = {}", mean);

        let max = trained(StatisticalConfig { aggregation: Aggregation::Max, ..Default::default() });
        assert_eq!(max.score_vector(&blip).unwrap(), 1.0);
    }

    #[test]
    fn test_non_finite_feature_fails() {
        let scorer = trained(StatisticalConfig::default());
        let mut corrupt = steady(0);
        corrupt[6] = f64::NAN;
        assert!(matches!(scorer.score_vector(&corrupt), Err(ScoreError::Degenerate(_))));
    }

    #[test]
    fn test_history_is_bounded() {
        let config = StatisticalConfig { history_size: 10, ..Default::default() };
        let mut scorer = StatisticalScorer::new(config);
        for i in 0..50 {
            scorer.observe(steady(i));
        }
        assert_eq!(scorer.history_len(), 10);
    }
}
