//! Model Module - Anomaly scorers and consensus
//!
//! Three independent scorers over the window feature vector, combined by a
//! majority vote. Fitted models are published as immutable generations.

pub mod scorer;
pub mod scaler;
pub mod spatial;
pub mod temporal;
pub mod statistical;
pub mod consensus;
pub mod ensemble;

// Re-export common types
pub use scorer::{AnomalyScorer, ScoreError, ScorerKind, ScoringInput, TrainingError, WeightedVector};
pub use scaler::FeatureScaler;
pub use spatial::{SpatialConfig, SpatialModel};
pub use temporal::{TemporalConfig, TemporalModel};
pub use statistical::{Aggregation, StatisticalConfig, StatisticalScorer};
pub use consensus::{ConsensusDecision, ConsensusPolicy};
pub use ensemble::{Ensemble, EnsembleConfig, EnsembleResult, ModelGeneration, ModelLifecycle};
