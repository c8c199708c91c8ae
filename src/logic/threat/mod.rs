//! Threat Module
//!
//! Turns a Feature Snapshot into a Threat Verdict.
//!
//! ## Structure
//! - `types`: labels, scorer readings, verdict
//! - `rules`: rule table and thresholds
//! - `engine`: stateless rule evaluation
//! - `classifier`: combines rules and the ensemble into a verdict
//!
//! ## Usage
//! ```ignore
//! use crate::logic::threat::RuleEngine;
//!
//! let labels = RuleEngine::default().evaluate(&snapshot);
//! ```

pub mod types;
pub mod rules;
pub mod engine;
pub mod classifier;

// Re-export main types for convenience
pub use types::{
    EnsembleOutcome,
    ScoreStatus,
    ScorerReading,
    ThreatLabel,
    ThreatVerdict,
};

pub use rules::{Rule, RuleThresholds, RULES};
pub use engine::{RuleEngine, RuleMatch};
pub use classifier::{decide, DecisionInput};
