//! Scorer Contract - Shared interface of the three anomaly scorers
//!
//! Every scorer maps the current window (plus recent context) to a score in
//! [0, 1]. Scorers never panic on bad input: they return `ScoreError`, which
//! the ensemble turns into a neutral reading.

use serde::{Deserialize, Serialize};

use crate::logic::features::FeatureVector;
use crate::logic::threat::ScoreStatus;

// ============================================================================
// SCORER KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    Spatial,
    Temporal,
    Statistical,
}

impl ScorerKind {
    pub const ALL: [ScorerKind; 3] = [ScorerKind::Spatial, ScorerKind::Temporal, ScorerKind::Statistical];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::Spatial => "spatial",
            ScorerKind::Temporal => "temporal",
            ScorerKind::Statistical => "statistical",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// What a scorer gets to look at
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    /// Current window
    pub current: &'a FeatureVector,
    /// Most recent observed windows, oldest first, current last
    pub sequence: &'a [FeatureVector],
}

/// Feature vector with its curator weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedVector {
    pub vector: FeatureVector,
    pub weight: f64,
}

// ============================================================================
// TRAIT
// ============================================================================

pub trait AnomalyScorer: Send + Sync {
    fn kind(&self) -> ScorerKind;

    /// Score in [0, 1]
    fn score(&self, input: &ScoringInput<'_>) -> Result<f64, ScoreError>;
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// Untrained or not enough history
    NotReady(String),
    /// Numerical failure
    Degenerate(String),
}

impl ScoreError {
    pub fn status(&self) -> ScoreStatus {
        match self {
            ScoreError::NotReady(_) => ScoreStatus::NotReady,
            ScoreError::Degenerate(_) => ScoreStatus::Failed,
        }
    }
}

impl std::fmt::Display for ScoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreError::NotReady(e) => write!(f, "Scorer not ready: {}", e),
            ScoreError::Degenerate(e) => write!(f, "Scoring failed: {}", e),
        }
    }
}

impl std::error::Error for ScoreError {}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingError {
    InsufficientData { have: usize, need: usize },
    Degenerate(String),
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingError::InsufficientData { have, need } => {
                write!(f, "Insufficient training data: have {}, need {}", have, need)
            }
            TrainingError::Degenerate(e) => write!(f, "Degenerate training corpus: {}", e),
        }
    }
}

impl std::error::Error for TrainingError {}

/// Corrupt input is a scoring failure, never silently scaled away
pub fn finite_input(v: &FeatureVector) -> Result<(), ScoreError> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(ScoreError::Degenerate(format!("non-finite feature at index {}", i))),
        None => Ok(()),
    }
}

/// Reject non-finite scores before they reach consensus
pub fn checked_score(score: f64) -> Result<f64, ScoreError> {
    if score.is_finite() {
        Ok(score.clamp(0.0, 1.0))
    } else {
        Err(ScoreError::Degenerate(format!("non-finite score {}", score)))
    }
}
