//! Spatial Scorer - Weighted density clustering
//!
//! DBSCAN in scaled feature space where each point carries its curator
//! weight. A point is core when the total weight inside its `eps`
//! neighbourhood (itself included) reaches `min_weight`. Clusters grow by
//! density reachability, so no cluster count is fixed up front.
//!
//! Scoring:
//! - nearest core point within `eps` assigns the cluster;
//!   score = `1 - cluster_weight / largest_cluster_weight`
//! - otherwise the point is an outlier;
//!   score = `0.75 + 0.25 * (1 - e^{-(d - eps) / eps})` with `d` the
//!   distance to the nearest core point

use std::collections::VecDeque;
use serde::{Deserialize, Serialize};

use super::scaler::{euclidean, FeatureScaler};
use super::scorer::{checked_score, finite_input, AnomalyScorer, ScoreError, ScorerKind, ScoringInput, TrainingError, WeightedVector};
use crate::logic::features::FeatureVector;

/// Outlier scores start here
pub const OUTLIER_FLOOR: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Neighbourhood radius in scaled space
    pub eps: f64,
    /// Neighbourhood weight needed for a core point
    pub min_weight: f64,
    /// Fit on at most this many of the most recent samples
    pub max_points: usize,
    pub min_samples: usize,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            eps: 1.0,
            min_weight: 5.0,
            max_points: 500,
            min_samples: 50,
        }
    }
}

/// Fitted clustering
#[derive(Debug, Clone)]
pub struct SpatialModel {
    config: SpatialConfig,
    scaler: FeatureScaler,
    /// Scaled core points with their cluster id
    core_points: Vec<(FeatureVector, usize)>,
    cluster_weights: Vec<f64>,
    largest_cluster_weight: f64,
    noise_points: usize,
}

impl SpatialModel {
    pub fn fit(samples: &[WeightedVector], config: &SpatialConfig) -> Result<Self, TrainingError> {
        if samples.len() < config.min_samples {
            return Err(TrainingError::InsufficientData { have: samples.len(), need: config.min_samples });
        }
        if !(config.eps > 0.0) {
            return Err(TrainingError::Degenerate(format!("eps must be positive, got {}", config.eps)));
        }
        let start = samples.len().saturating_sub(config.max_points);
        let samples = &samples[start..];

        let scaler = FeatureScaler::fit(samples)?;
        let points: Vec<FeatureVector> = samples.iter().map(|s| scaler.transform(&s.vector)).collect();
        let weights: Vec<f64> = samples.iter().map(|s| s.weight.clamp(0.0, 1.0)).collect();
        let n = points.len();

        // Neighbourhoods (n <= max_points, so O(n^2) is fine)
        let neighbours: Vec<Vec<usize>> = (0..n)
            .map(|i| (0..n).filter(|&j| euclidean(&points[i], &points[j]) <= config.eps).collect())
            .collect();
        let is_core: Vec<bool> = neighbours
            .iter()
            .map(|nb| nb.iter().map(|&j| weights[j]).sum::<f64>() >= config.min_weight)
            .collect();

        // Expand clusters from unvisited core points
        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut cluster_weights: Vec<f64> = Vec::new();
        for seed in 0..n {
            if !is_core[seed] || labels[seed].is_some() {
                continue;
            }
            let cluster = cluster_weights.len();
            cluster_weights.push(0.0);
            labels[seed] = Some(cluster);

            let mut queue = VecDeque::from([seed]);
            while let Some(p) = queue.pop_front() {
                cluster_weights[cluster] += weights[p];
                if !is_core[p] {
                    continue;
                }
                for &q in &neighbours[p] {
                    if labels[q].is_none() {
                        labels[q] = Some(cluster);
                        queue.push_back(q);
                    }
                }
            }
        }

        let largest = cluster_weights.iter().copied().fold(0.0_f64, f64::max);
        if cluster_weights.is_empty() || largest <= 0.0 {
            return Err(TrainingError::Degenerate("no dense region in training corpus".to_string()));
        }

        let core_points = (0..n)
            .filter(|&i| is_core[i])
            .filter_map(|i| labels[i].map(|c| (points[i], c)))
            .collect();
        let noise_points = labels.iter().filter(|l| l.is_none()).count();

        log::debug!(
            "Spatial fit: {} points, {} clusters, {} noise",
            n,
            cluster_weights.len(),
            noise_points
        );

        Ok(Self {
            config: config.clone(),
            scaler,
            core_points,
            cluster_weights,
            largest_cluster_weight: largest,
            noise_points,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_weights.len()
    }

    pub fn noise_points(&self) -> usize {
        self.noise_points
    }

    /// Score a raw (unscaled) feature vector
    pub fn score_vector(&self, v: &FeatureVector) -> Result<f64, ScoreError> {
        finite_input(v)?;
        let x = self.scaler.transform(v);
        let nearest = self
            .core_points
            .iter()
            .map(|(p, c)| (euclidean(&x, p), *c))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let (distance, cluster) = match nearest {
            Some(found) => found,
            None => return Err(ScoreError::NotReady("no core points".to_string())),
        };
        let eps = self.config.eps;
        if distance <= eps {
            checked_score(1.0 - self.cluster_weights[cluster] / self.largest_cluster_weight)
        } else {
            checked_score(OUTLIER_FLOOR + 0.25 * (1.0 - (-(distance - eps) / eps).exp()))
        }
    }
}

impl AnomalyScorer for SpatialModel {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Spatial
    }

    fn score(&self, input: &ScoringInput<'_>) -> Result<f64, ScoreError> {
        self.score_vector(input.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::FEATURE_COUNT;

    /// Tight blob around `center` (multiplicative jitter so the log scale stays tight)
    fn blob(center: f64, n: usize, weight: f64) -> Vec<WeightedVector> {
        (0..n)
            .map(|i| {
                let jitter = 1.0 + (i % 10) as f64 * 0.001;
                WeightedVector { vector: [center * jitter; FEATURE_COUNT], weight }
            })
            .collect()
    }

    #[test]
    fn test_insufficient_samples() {
        let samples = blob(100.0, 10, 1.0);
        let err = SpatialModel::fit(&samples, &SpatialConfig::default()).unwrap_err();
        assert_eq!(err, TrainingError::InsufficientData { have: 10, need: 50 });
    }

    #[test]
    fn test_members_of_largest_cluster_score_zero() {
        let mut samples = blob(100.0, 80, 1.0);
        samples.extend(blob(10_000.0, 20, 1.0));
        let model = SpatialModel::fit(&samples, &SpatialConfig::default()).unwrap();
        assert_eq!(model.cluster_count(), 2);

        let big = model.score_vector(&[100.0; FEATURE_COUNT]).unwrap();
        assert!(big.abs() < 1e-9);

        // smaller cluster: 1 - 20/80
        let small = model.score_vector(&[10_000.0; FEATURE_COUNT]).unwrap();
        assert!((small - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_scores_at_least_floor() {
        let mut samples = blob(100.0, 80, 1.0);
        samples.extend(blob(10_000.0, 20, 1.0));
        let model = SpatialModel::fit(&samples, &SpatialConfig::default()).unwrap();

        let far = model.score_vector(&[1e9; FEATURE_COUNT]).unwrap();
        assert!(far >= OUTLIER_FLOOR);
        assert!(far <= 1.0);
    }

    #[test]
    fn test_low_weight_points_are_not_core() {
        // 60 points at weight 0.05 never reach min_weight 5
        let samples = blob(100.0, 60, 0.05);
        let err = SpatialModel::fit(&samples, &SpatialConfig::default()).unwrap_err();
        assert!(matches!(err, TrainingError::Degenerate(_)));
    }
}
