//! Feature Scaler
//!
//! `ln(1 + max(x, 0))` compresses the heavy-tailed rate features, then a
//! per-feature (weighted) standardization fitted on the training corpus.

use serde::{Deserialize, Serialize};

use super::scorer::{TrainingError, WeightedVector};
use crate::logic::features::{FeatureVector, FEATURE_COUNT};

/// Std-devs below this are treated as 1.0
const MIN_STD: f64 = 1e-6;

/// `ln(1 + max(x, 0))` per element; non-finite values map to 0
pub fn log_compress(v: &FeatureVector) -> FeatureVector {
    let mut out = [0.0; FEATURE_COUNT];
    for (o, &x) in out.iter_mut().zip(v.iter()) {
        *o = if x.is_finite() { x.max(0.0).ln_1p() } else { 0.0 };
    }
    out
}

pub fn euclidean(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: FeatureVector,
    std: FeatureVector,
}

impl FeatureScaler {
    /// Fit on weighted samples. Falls back to equal weights when the
    /// weights sum to zero.
    pub fn fit(samples: &[WeightedVector]) -> Result<Self, TrainingError> {
        if samples.is_empty() {
            return Err(TrainingError::InsufficientData { have: 0, need: 1 });
        }
        let total: f64 = samples.iter().map(|s| s.weight.max(0.0)).sum();
        let weight_of = |s: &WeightedVector| if total > 0.0 { s.weight.max(0.0) / total } else { 1.0 / samples.len() as f64 };

        let compressed: Vec<(FeatureVector, f64)> =
            samples.iter().map(|s| (log_compress(&s.vector), weight_of(s))).collect();

        let mut mean = [0.0; FEATURE_COUNT];
        for (v, w) in &compressed {
            for i in 0..FEATURE_COUNT {
                mean[i] += w * v[i];
            }
        }
        let mut std = [0.0; FEATURE_COUNT];
        for (v, w) in &compressed {
            for i in 0..FEATURE_COUNT {
                std[i] += w * (v[i] - mean[i]).powi(2);
            }
        }
        for s in std.iter_mut() {
            *s = s.sqrt();
            if !s.is_finite() || *s < MIN_STD {
                *s = 1.0;
            }
        }
        Ok(Self { mean, std })
    }

    /// Fit with every sample weighted equally
    pub fn fit_unweighted(vectors: &[FeatureVector]) -> Result<Self, TrainingError> {
        let samples: Vec<WeightedVector> =
            vectors.iter().map(|v| WeightedVector { vector: *v, weight: 1.0 }).collect();
        Self::fit(&samples)
    }

    pub fn transform(&self, v: &FeatureVector) -> FeatureVector {
        let c = log_compress(v);
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (c[i] - self.mean[i]) / self.std[i];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_compress_clamps_negative() {
        let mut v = [0.0; FEATURE_COUNT];
        v[0] = -5.0;
        v[1] = std::f64::consts::E - 1.0;
        v[2] = f64::INFINITY;
        let c = log_compress(&v);
        assert_eq!(c[0], 0.0);
        assert!((c[1] - 1.0).abs() < 1e-12);
        assert_eq!(c[2], 0.0);
    }

    #[test]
    fn test_constant_feature_gets_unit_std() {
        let vectors: Vec<FeatureVector> = (0..10)
            .map(|i| {
                let mut v = [3.0; FEATURE_COUNT];
                v[0] = i as f64 * 10.0;
                v
            })
            .collect();
        let scaler = FeatureScaler::fit_unweighted(&vectors).unwrap();
        let t = scaler.transform(&[3.0; FEATURE_COUNT]);
        // constant feature maps to exactly 0
        assert_eq!(t[1], 0.0);
    }

    #[test]
    fn test_weights_shift_the_mean() {
        let low = WeightedVector { vector: [0.0; FEATURE_COUNT], weight: 0.9 };
        let high = WeightedVector { vector: [100.0; FEATURE_COUNT], weight: 0.1 };
        let scaler = FeatureScaler::fit(&[low, high]).unwrap();
        // weighted mean sits closer to the heavy sample
        assert!(scaler.transform(&[0.0; FEATURE_COUNT])[0] < 0.0);
        assert!(scaler.transform(&[0.0; FEATURE_COUNT])[0] > -1.0);
    }

    #[test]
    fn test_empty_fit_fails() {
        assert!(matches!(FeatureScaler::fit(&[]), Err(TrainingError::InsufficientData { .. })));
    }
}
