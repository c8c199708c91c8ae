//! Training Module - Self-curated training data and background refits
//!
//! ## Structure
//! - `confidence`: per-window trust weight
//! - `windows`: high-confidence / all-data / recent sample store
//! - `warm_start`: synthetic corpus for the very first fit
//! - `retrainer`: fit and publish model generations

pub mod confidence;
pub mod windows;
pub mod warm_start;
pub mod retrainer;

// Re-export common types
pub use confidence::{ConfidenceConfig, ConfidencePolicy, ConfidenceSignals, DefaultConfidencePolicy};
pub use windows::{CuratorConfig, CuratorStats, TrainingCurator, TrainingSample, TrainingView};
pub use warm_start::WarmStartConfig;
pub use retrainer::{RetrainOutcome, Retrainer, RetrainerConfig};
