//! Temporal Scorer - Sequence reconstruction
//!
//! Linear autoencoder over flattened sequences of standardized snapshots:
//! the encoder/decoder pair is the top `latent_dim` principal directions of
//! the training sequences, found by power iteration with deflation.
//!
//! Reconstruction error is the mean squared residual of a sequence. The
//! reference error is the 95th percentile over the training set, and the
//! score is `r / (1 + r)` with `r = err / reference`.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::scaler::FeatureScaler;
use super::scorer::{checked_score, finite_input, AnomalyScorer, ScoreError, ScorerKind, ScoringInput, TrainingError};
use crate::logic::features::{qos, FeatureVector, FEATURE_COUNT};

const POWER_ITERATIONS: usize = 200;
const CONVERGENCE_EPS: f64 = 1e-10;
/// Eigenvalues below this carry no variance
const MIN_EIGENVALUE: f64 = 1e-10;
const MIN_REFERENCE_ERROR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub sequence_length: usize,
    pub latent_dim: usize,
    /// Train on at most this many (most recent) sequences
    pub max_sequences: usize,
    pub min_sequences: usize,
    /// Sequences whose mean sample weight is below this are skipped
    pub min_sequence_weight: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            latent_dim: 8,
            max_sequences: 200,
            min_sequences: 20,
            min_sequence_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemporalModel {
    sequence_length: usize,
    scaler: FeatureScaler,
    mean: Array1<f64>,
    /// One principal direction per row
    components: Array2<f64>,
    reference_error: f64,
}

impl TemporalModel {
    /// Fit on sequences (each `sequence_length` long, oldest first)
    pub fn fit(sequences: &[Vec<FeatureVector>], config: &TemporalConfig) -> Result<Self, TrainingError> {
        let seq_len = config.sequence_length.max(1);
        let usable: Vec<&Vec<FeatureVector>> = sequences.iter().filter(|s| s.len() == seq_len).collect();
        let start = usable.len().saturating_sub(config.max_sequences);
        let usable = &usable[start..];
        if usable.len() < config.min_sequences.max(2) {
            return Err(TrainingError::InsufficientData {
                have: usable.len(),
                need: config.min_sequences.max(2),
            });
        }

        let all_vectors: Vec<FeatureVector> = usable.iter().flat_map(|s| s.iter().copied()).collect();
        let scaler = FeatureScaler::fit_unweighted(&all_vectors)?;

        let dim = seq_len * FEATURE_COUNT;
        let n = usable.len();
        let mut data = Array2::<f64>::zeros((n, dim));
        for (row, seq) in usable.iter().enumerate() {
            let flat = flatten(&scaler, seq);
            data.row_mut(row).assign(&flat);
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| TrainingError::Degenerate("empty sequence matrix".to_string()))?;
        let centered = &data - &mean;
        let mut covariance = centered.t().dot(&centered) / (n as f64 - 1.0);

        let total_variance: f64 = covariance.diag().sum();
        if !total_variance.is_finite() || total_variance < MIN_EIGENVALUE {
            return Err(TrainingError::Degenerate("singular covariance (zero variance corpus)".to_string()));
        }

        let mut components = Array2::<f64>::zeros((config.latent_dim.min(dim), dim));
        let mut found = 0;
        for k in 0..components.nrows() {
            let (value, vector) = match dominant_eigenpair(&covariance, k) {
                Some(pair) => pair,
                None => break,
            };
            if value < MIN_EIGENVALUE {
                break;
            }
            components.row_mut(k).assign(&vector);
            // deflate
            let outer = outer_product(&vector);
            covariance = covariance - outer * value;
            found += 1;
        }
        if found == 0 {
            return Err(TrainingError::Degenerate("no principal direction found".to_string()));
        }
        let components = components.slice(ndarray::s![..found, ..]).to_owned();

        let mut model = Self {
            sequence_length: seq_len,
            scaler,
            mean,
            components,
            reference_error: 1.0,
        };
        let errors: Vec<f64> = (0..n)
            .map(|row| model.reconstruction_error_flat(&data.row(row).to_owned()))
            .collect();
        model.reference_error = qos::percentile(&errors, 0.95).max(MIN_REFERENCE_ERROR);

        log::debug!(
            "Temporal fit: {} sequences, {} components, reference error {:.6}",
            n,
            found,
            model.reference_error
        );
        Ok(model)
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn latent_dim(&self) -> usize {
        self.components.nrows()
    }

    pub fn reference_error(&self) -> f64 {
        self.reference_error
    }

    fn reconstruction_error_flat(&self, flat: &Array1<f64>) -> f64 {
        let centered = flat - &self.mean;
        let latent = self.components.dot(&centered);
        let reconstructed = self.components.t().dot(&latent);
        let residual = &centered - &reconstructed;
        residual.mapv(|r| r * r).mean().unwrap_or(0.0)
    }

    /// Mean squared reconstruction residual of one sequence
    pub fn reconstruction_error(&self, sequence: &[FeatureVector]) -> Result<f64, ScoreError> {
        if let Some(current) = sequence.last() {
            finite_input(current)?;
        }
        if sequence.len() < self.sequence_length {
            return Err(ScoreError::NotReady(format!(
                "need {} observed windows, have {}",
                self.sequence_length,
                sequence.len()
            )));
        }
        let tail = &sequence[sequence.len() - self.sequence_length..];
        let err = self.reconstruction_error_flat(&flatten(&self.scaler, tail));
        if err.is_finite() {
            Ok(err)
        } else {
            Err(ScoreError::Degenerate("non-finite reconstruction error".to_string()))
        }
    }

    pub fn score_sequence(&self, sequence: &[FeatureVector]) -> Result<f64, ScoreError> {
        let r = self.reconstruction_error(sequence)? / self.reference_error;
        checked_score(r / (1.0 + r))
    }
}

impl AnomalyScorer for TemporalModel {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Temporal
    }

    fn score(&self, input: &ScoringInput<'_>) -> Result<f64, ScoreError> {
        self.score_sequence(input.sequence)
    }
}

// ============================================================================
// LINEAR ALGEBRA HELPERS
// ============================================================================

fn flatten(scaler: &FeatureScaler, sequence: &[FeatureVector]) -> Array1<f64> {
    sequence.iter().flat_map(|v| scaler.transform(v)).collect()
}

fn outer_product(v: &Array1<f64>) -> Array2<f64> {
    let col = v.view().insert_axis(Axis(1));
    let row = v.view().insert_axis(Axis(0));
    col.dot(&row)
}

/// Power iteration on a symmetric PSD matrix. `salt` varies the start vector
/// between successive (deflated) calls.
fn dominant_eigenpair(matrix: &Array2<f64>, salt: usize) -> Option<(f64, Array1<f64>)> {
    let dim = matrix.nrows();
    let mut v = Array1::from_shape_fn(dim, |i| 1.0 + ((i + salt * 7) % 13) as f64 * 0.1);
    let norm = v.dot(&v).sqrt();
    v /= norm;

    for _ in 0..POWER_ITERATIONS {
        let next = matrix.dot(&v);
        let norm = next.dot(&next).sqrt();
        if !norm.is_finite() || norm < MIN_EIGENVALUE {
            return None;
        }
        let next = next / norm;
        let delta = (&next - &v).mapv(f64::abs).sum();
        v = next;
        if delta < CONVERGENCE_EPS {
            break;
        }
    }
    let value = v.dot(&matrix.dot(&v));
    value.is_finite().then_some((value, v))
}
