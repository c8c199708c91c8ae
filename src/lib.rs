//! FlowGuard Core
//!
//! Windowed traffic aggregation and threat decision engine. Packet events
//! go in through a bounded queue, fixed-interval Feature Snapshots come out
//! of the aggregator, and each snapshot gets a Threat Verdict from a rule
//! table combined with a self-training anomaly ensemble.

pub mod constants;
pub mod logic;

pub use logic::analysis_loop::{start, PipelineError, PipelineHandle};
pub use logic::config::{ConfigError, EngineConfig};
pub use logic::engine::ThreatEngine;
pub use logic::features::{EventRecord, FeatureSnapshot};
pub use logic::threat::{ThreatLabel, ThreatVerdict};
